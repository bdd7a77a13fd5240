use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the raster segmentation service.
///
/// Each variant carries the context of the stage that failed (upload validation,
/// raster decoding, model execution, ...). The HTTP layer maps `Validation` to a
/// client error and every other variant to a server error; the response message is
/// the `Display` text generated here.
#[derive(Error, Debug)]
pub enum RasterSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode error: {reason} (file: {path})")]
    Decode { path: String, reason: String },

    #[error("Model error: {operation} failed: {source}")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cannot reshape array of size {actual} into shape {expected:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: usize },

    #[error("{reason}")]
    Validation { field: String, reason: String },

    /// The request body ran past the configured limit while it was being read.
    #[error("{reason}")]
    PayloadTooLarge { reason: String },
}

pub type Result<T> = std::result::Result<T, RasterSegError>;

impl RasterSegError {
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Client-side failures are rejected before any work happens.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::PayloadTooLarge { .. })
    }
}

impl From<anyhow::Error> for RasterSegError {
    fn from(err: anyhow::Error) -> Self {
        RasterSegError::Configuration {
            message: err.to_string(),
        }
    }
}

/// I/O errors without a known path fall back to placeholder context. Callers that
/// know the path should build `FileSystem` themselves.
impl From<std::io::Error> for RasterSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<tiff::TiffError> for RasterSegError {
    fn from(err: tiff::TiffError) -> Self {
        Self::decode("unknown", err)
    }
}

impl From<image::ImageError> for RasterSegError {
    fn from(err: image::ImageError) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "preview encoding".to_string(),
            source: std::io::Error::other(err),
        }
    }
}

impl From<ort::Error> for RasterSegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors come out of tensor plumbing around the model, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for RasterSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
