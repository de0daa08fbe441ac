use crate::error::{DatasetError, DatasetResult};

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const CACHE_DIR_ENV: &str = "OXIDIZE_ML_DATASETS_DIR";
pub const ORIGIN_ENV: &str = "OXIDIZE_ML_DATASETS_ORIGIN";
pub const DEFAULT_ORIGIN: &str = "https://storage.googleapis.com/tensorflow/tf-keras-datasets/";

/// Where dataset files are cached and where they are downloaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetsConfig {
    pub cache_dir: PathBuf,
    /// Base URL; a file's URL is this prefix followed by its name.
    pub origin: String,
}

impl DatasetsConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        DatasetsConfig {
            cache_dir: cache_dir.into(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }

    /// Read `OXIDIZE_ML_DATASETS_DIR` and `OXIDIZE_ML_DATASETS_ORIGIN`, falling
    /// back to `~/.oxidize-ml/datasets` and the public mirror.
    pub fn from_env() -> DatasetResult<Self> {
        DatasetsConfig::from_env_with(None, None)
    }

    /// Like [`DatasetsConfig::from_env`], with explicit values taking precedence.
    pub fn from_env_with(cache_dir: Option<PathBuf>, origin: Option<String>) -> DatasetResult<Self> {
        resolve(
            cache_dir.or_else(|| env::var_os(CACHE_DIR_ENV).map(PathBuf::from)),
            origin.or_else(|| env::var(ORIGIN_ENV).ok()),
            dirs::home_dir(),
        )
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn url_for(&self, fname: &str) -> String {
        if self.origin.ends_with('/') {
            format!("{}{}", self.origin, fname)
        } else {
            format!("{}/{}", self.origin, fname)
        }
    }
}

fn resolve(
    cache_dir: Option<PathBuf>,
    origin: Option<String>,
    home: Option<PathBuf>,
) -> DatasetResult<DatasetsConfig> {
    let cache_dir = match cache_dir.filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => home
            .map(|h| h.join(".oxidize-ml").join("datasets"))
            .ok_or(DatasetError::NoCacheDir)?,
    };
    let origin = origin
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    Ok(DatasetsConfig { cache_dir, origin })
}
