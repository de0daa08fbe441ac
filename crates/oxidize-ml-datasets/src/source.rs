use crate::config::DatasetsConfig;
use crate::error::DatasetResult;

use oxidize_ml_io::{FileCache, Fetch, HttpFetcher};
use std::path::PathBuf;

/// A download cache bound to an origin URL.
pub struct DatasetSource<F: Fetch = HttpFetcher> {
    cache: FileCache<F>,
    config: DatasetsConfig,
}

impl DatasetSource<HttpFetcher> {
    pub fn new(config: DatasetsConfig) -> DatasetResult<Self> {
        Ok(DatasetSource::with_fetcher(config, HttpFetcher::new()?))
    }

    /// Source configured from the environment.
    pub fn from_env() -> DatasetResult<Self> {
        DatasetSource::new(DatasetsConfig::from_env()?)
    }
}

impl<F: Fetch> DatasetSource<F> {
    pub fn with_fetcher(config: DatasetsConfig, fetcher: F) -> Self {
        DatasetSource {
            cache: FileCache::with_fetcher(config.cache_dir.clone(), fetcher),
            config,
        }
    }

    pub fn config(&self) -> &DatasetsConfig {
        &self.config
    }

    pub fn cache(&self) -> &FileCache<F> {
        &self.cache
    }

    /// Local path of `fname`, downloaded from the origin if needed.
    pub fn fetch(&self, fname: &str, file_hash: Option<&str>) -> DatasetResult<PathBuf> {
        let url = self.config.url_for(fname);
        Ok(self.cache.get_file(fname, &url, file_hash)?)
    }
}
