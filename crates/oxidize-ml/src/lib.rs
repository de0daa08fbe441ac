//! # OxidizeML 🦀
//!
//! Loaders for standard Machine Learning benchmark datasets, written in pure Rust.
//!
//! ## Modules
//!
//! - **core**: `Tensor`, `Shape` and `RaggedArray` containers
//! - **io**: download cache, `.npy`/`.npz` archives, gzip IDX streams, JSON
//! - **datasets**: Boston Housing, Fashion-MNIST, IMDB reviews
//!
//! ```no_run
//! use oxidize_ml::prelude::*;
//!
//! let source = DatasetSource::from_env()?;
//! let ((x_train, y_train), (x_test, y_test)) =
//!     boston_housing::load_data(&source, 0.2, 113)?;
//! println!("{} train / {} test", x_train.len(), x_test.len());
//! # Ok::<(), DatasetError>(())
//! ```

/// Core containers.
pub use oxidize_ml_core as core;

/// File formats and the download cache.
pub use oxidize_ml_io as io;

/// Dataset loaders.
pub use oxidize_ml_datasets as datasets;

/// Common imports.
pub mod prelude {
    pub use oxidize_ml_core::{Element, RaggedArray, Shape, Tensor, TensorError};
    pub use oxidize_ml_datasets::{
        boston_housing, fashion_mnist, imdb, DatasetError, DatasetResult, DatasetSource,
        DatasetsConfig, ImdbOptions,
    };
    pub use oxidize_ml_io::{FileCache, IoError};
}
