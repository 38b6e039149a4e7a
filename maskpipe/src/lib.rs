// src/lib.rs
pub mod error;
pub mod logging;

pub mod io {
    pub mod loader;
    pub mod writer;
}

pub mod render {
    pub mod palette;
    pub mod overlay;
}

pub mod pipeline {
    pub mod config;
    pub mod batch;
}
