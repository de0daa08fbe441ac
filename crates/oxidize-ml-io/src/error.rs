use oxidize_ml_core::TensorError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while fetching, caching or decoding dataset files.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Hash mismatch for {}: expected {expected}, got {actual}", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Array '{0}' not found in archive")]
    MissingArray(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported dtype '{0}'")]
    UnsupportedDtype(String),

    #[error("Pickle error: {0}")]
    Pickle(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type IoResult<T> = Result<T, IoError>;
