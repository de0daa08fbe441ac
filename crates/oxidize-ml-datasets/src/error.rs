use oxidize_ml_core::TensorError;
use oxidize_ml_io::IoError;
use thiserror::Error;

/// Errors raised by the dataset loaders.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("After filtering for sequences shorter than maxlen={maxlen}, no sequence was kept. Increase maxlen.")]
    EmptyAfterFiltering { maxlen: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No cache directory: set OXIDIZE_ML_DATASETS_DIR or a home directory")]
    NoCacheDir,
}

pub type DatasetResult<T> = Result<T, DatasetError>;
