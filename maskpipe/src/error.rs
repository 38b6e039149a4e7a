use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while loading, processing or writing a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No '{key}' array found in segmentation file '{path}'")]
    MissingData { path: PathBuf, key: String },

    #[error("Malformed input '{path}': {reason}")]
    MalformedInput { path: PathBuf, reason: String },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read array file '{path}': {reason}")]
    Npy { path: PathBuf, reason: String },

    #[error("Failed to process image '{path}': {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to serialize '{path}': {reason}")]
    Serialization { path: PathBuf, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.to_path_buf(), source }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        PipelineError::MalformedInput { path: path.to_path_buf(), reason: reason.into() }
    }

    pub fn npy(path: &Path, reason: impl ToString) -> Self {
        PipelineError::Npy { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn serialization(path: &Path, reason: impl ToString) -> Self {
        PipelineError::Serialization { path: path.to_path_buf(), reason: reason.to_string() }
    }

    pub fn image(path: &Path, source: image::ImageError) -> Self {
        PipelineError::Image { path: path.to_path_buf(), source }
    }
}
