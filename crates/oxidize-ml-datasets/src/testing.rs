use crate::config::DatasetsConfig;
use crate::source::DatasetSource;

use oxidize_ml_io::{Fetch, IoError, IoResult};
use std::cell::Cell;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub const ORIGIN: &str = "http://mirror.test/";

/// Serves files from memory and counts requests.
#[derive(Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    calls: Cell<usize>,
}

impl MemoryFetcher {
    pub fn with_file(mut self, url: &str, body: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), body);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> IoResult<u64> {
        self.calls.set(self.calls.get() + 1);
        let body = self.files.get(url).ok_or_else(|| IoError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })?;
        dest.write_all(body)?;
        Ok(body.len() as u64)
    }
}

pub fn source_with(dir: &Path, fetcher: MemoryFetcher) -> DatasetSource<MemoryFetcher> {
    DatasetSource::with_fetcher(DatasetsConfig::new(dir).with_origin(ORIGIN), fetcher)
}
