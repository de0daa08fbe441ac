//! Downloadable benchmark datasets.
//!
//! Each loader resolves its files through a [`DatasetSource`] (a local cache
//! backed by a remote origin) and returns `((x_train, y_train), (x_test, y_test))`.

pub mod boston_housing;
pub mod config;
pub mod error;
pub mod fashion_mnist;
pub mod imdb;
pub mod shuffle;
pub mod source;

#[cfg(test)]
mod testing;

pub use config::DatasetsConfig;
pub use error::{DatasetError, DatasetResult};
pub use imdb::ImdbOptions;
pub use shuffle::permutation;
pub use source::DatasetSource;

/// `((train_samples, train_labels), (test_samples, test_labels))`
pub type Split<S, L> = ((S, L), (S, L));
