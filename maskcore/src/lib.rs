// data module
pub mod data {
    pub mod point;
    pub mod raster;
}

// algorithm module
pub mod algorithm {
    pub mod scaling;
    pub mod assignment;
}
