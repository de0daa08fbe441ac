use crate::error::{IoError, IoResult};

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 65535;

/// Digest used to check a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Md5,
}

impl HashAlgorithm {
    /// 64 hex characters means SHA-256, anything else is treated as MD5.
    pub fn detect(hash: &str) -> Self {
        if hash.len() == 64 {
            HashAlgorithm::Sha256
        } else {
            HashAlgorithm::Md5
        }
    }
}

/// Hex digest of a file's contents.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> IoResult<String> {
    let mut file = File::open(path)?;
    match algorithm {
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(&mut file),
        HashAlgorithm::Md5 => digest_reader::<Md5>(&mut file),
    }
}

/// Check a file against an expected hex digest (algorithm inferred from its length).
pub fn validate_file(path: &Path, expected: &str) -> IoResult<bool> {
    let actual = hash_file(path, HashAlgorithm::detect(expected))?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

fn digest_reader<D: Digest>(reader: &mut impl Read) -> IoResult<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Source of remote bytes.
pub trait Fetch {
    /// Stream the resource at `url` into `dest`, returning the byte count.
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> IoResult<u64>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> IoResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("oxidize-ml/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> IoResult<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| IoError::Download {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IoError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.copy_to(dest).map_err(|source| IoError::Download {
            url: url.to_string(),
            source,
        })
    }
}

/// Directory of downloaded files, keyed by file name.
///
/// A file that is already present is returned as-is: its hash is only checked
/// when it is downloaded.
pub struct FileCache<F: Fetch = HttpFetcher> {
    dir: PathBuf,
    fetcher: F,
}

impl FileCache<HttpFetcher> {
    pub fn new(dir: impl Into<PathBuf>) -> IoResult<Self> {
        Ok(FileCache::with_fetcher(dir, HttpFetcher::new()?))
    }
}

impl<F: Fetch> FileCache<F> {
    pub fn with_fetcher(dir: impl Into<PathBuf>, fetcher: F) -> Self {
        FileCache {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Where `fname` lives in this cache, whether or not it exists yet.
    pub fn path_for(&self, fname: &str) -> PathBuf {
        self.dir.join(fname)
    }

    /// Return the local path of `fname`, downloading it from `origin` first
    /// when it is not cached.
    pub fn get_file(&self, fname: &str, origin: &str, file_hash: Option<&str>) -> IoResult<PathBuf> {
        let path = self.path_for(fname);
        if path.exists() {
            debug!(path = %path.display(), "cache hit");
            return Ok(path);
        }

        fs::create_dir_all(&self.dir)?;
        let partial = self.dir.join(format!("{fname}.part"));

        info!(url = origin, path = %path.display(), "downloading");
        let bytes = match self.download(origin, &partial, &path, file_hash) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, &path)?;
        info!(path = %path.display(), bytes, "download complete");

        Ok(path)
    }

    fn download(
        &self,
        origin: &str,
        partial: &Path,
        target: &Path,
        file_hash: Option<&str>,
    ) -> IoResult<u64> {
        let mut out = BufWriter::new(File::create(partial)?);
        let bytes = self.fetcher.fetch(origin, &mut out)?;
        out.flush()?;
        drop(out);

        if let Some(expected) = file_hash {
            let actual = hash_file(partial, HashAlgorithm::detect(expected))?;
            if !actual.eq_ignore_ascii_case(expected) {
                warn!(url = origin, expected, actual = %actual, "hash mismatch");
                return Err(IoError::HashMismatch {
                    path: target.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    struct MemoryFetcher {
        files: HashMap<String, Vec<u8>>,
        calls: Cell<usize>,
    }

    impl MemoryFetcher {
        fn new(url: &str, body: &[u8]) -> Self {
            let mut files = HashMap::new();
            files.insert(url.to_string(), body.to_vec());
            MemoryFetcher {
                files,
                calls: Cell::new(0),
            }
        }
    }

    impl Fetch for MemoryFetcher {
        fn fetch(&self, url: &str, dest: &mut dyn Write) -> IoResult<u64> {
            self.calls.set(self.calls.get() + 1);
            match self.files.get(url) {
                Some(body) => {
                    dest.write_all(body)?;
                    Ok(body.len() as u64)
                }
                None => Err(IoError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    #[test]
    fn test_detect_algorithm() {
        assert_eq!(HashAlgorithm::detect(HELLO_SHA256), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::detect(HELLO_MD5), HashAlgorithm::Md5);
    }

    #[test]
    fn test_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();
        assert_eq!(hash_file(&path, HashAlgorithm::Sha256).unwrap(), HELLO_SHA256);
        assert_eq!(hash_file(&path, HashAlgorithm::Md5).unwrap(), HELLO_MD5);
        assert!(validate_file(&path, &HELLO_MD5.to_uppercase()).unwrap());
        assert!(!validate_file(&path, HELLO_SHA256.replace('2', "3").as_str()).unwrap());
    }

    #[test]
    fn test_cache_miss_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("nested").join("cache");
        let cache = FileCache::with_fetcher(
            &cache_dir,
            MemoryFetcher::new("http://host/hello.txt", b"hello"),
        );

        let path = cache
            .get_file("hello.txt", "http://host/hello.txt", Some(HELLO_SHA256))
            .unwrap();
        assert_eq!(path, cache_dir.join("hello.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!cache_dir.join("hello.txt.part").exists());
        assert_eq!(cache.fetcher().calls.get(), 1);
    }

    #[test]
    fn test_cache_hit_skips_fetch_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), b"stale contents").unwrap();
        let cache = FileCache::with_fetcher(
            dir.path(),
            MemoryFetcher::new("http://host/hello.txt", b"hello"),
        );

        let path = cache
            .get_file("hello.txt", "http://host/hello.txt", Some(HELLO_MD5))
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"stale contents");
        assert_eq!(cache.fetcher().calls.get(), 0);
    }

    #[test]
    fn test_hash_mismatch_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::with_fetcher(
            dir.path(),
            MemoryFetcher::new("http://host/hello.txt", b"tampered"),
        );

        let err = cache
            .get_file("hello.txt", "http://host/hello.txt", Some(HELLO_MD5))
            .unwrap_err();
        match err {
            IoError::HashMismatch { expected, .. } => assert_eq!(expected, HELLO_MD5),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("hello.txt").exists());
        assert!(!dir.path().join("hello.txt.part").exists());
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::with_fetcher(
            dir.path(),
            MemoryFetcher::new("http://host/other.txt", b"x"),
        );

        let err = cache
            .get_file("hello.txt", "http://host/hello.txt", None)
            .unwrap_err();
        assert!(matches!(err, IoError::HttpStatus { status: 404, .. }));
        assert!(!dir.path().join("hello.txt").exists());
    }
}
