//! NumPy `.npz` archives: a zip file holding one `.npy` member per array.

use crate::error::{IoError, IoResult};
use crate::npy::{read_npy, NpyArray};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Read access to the arrays of an `.npz` archive.
pub struct NpzArchive<R: Read + Seek = BufReader<File>> {
    zip: ZipArchive<R>,
}

impl NpzArchive<BufReader<File>> {
    pub fn open(path: &Path) -> IoResult<Self> {
        debug!(path = %path.display(), "opening npz archive");
        NpzArchive::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> NpzArchive<R> {
    pub fn new(reader: R) -> IoResult<Self> {
        Ok(NpzArchive {
            zip: ZipArchive::new(reader)?,
        })
    }

    /// Array names, without the `.npy` suffix.
    pub fn names(&self) -> Vec<String> {
        self.zip
            .file_names()
            .map(|n| n.strip_suffix(".npy").unwrap_or(n).to_string())
            .collect()
    }

    /// Decode the array stored under `name`.
    pub fn by_name(&mut self, name: &str) -> IoResult<NpyArray> {
        let member = format!("{name}.npy");
        let member = if self.zip.file_names().any(|n| n == member) {
            member
        } else {
            name.to_string()
        };
        let mut file = self.zip.by_name(&member).map_err(|e| match e {
            ZipError::FileNotFound => IoError::MissingArray(name.to_string()),
            other => IoError::Zip(other),
        })?;
        read_npy(&mut file)
    }
}

/// Load every array of an `.npz` file, keyed by name.
pub fn load_named_arrays(path: &Path) -> IoResult<BTreeMap<String, NpyArray>> {
    let mut archive = NpzArchive::open(path)?;
    let mut arrays = BTreeMap::new();
    for name in archive.names() {
        let array = archive.by_name(&name)?;
        arrays.insert(name, array);
    }
    Ok(arrays)
}

/// Builds an `.npz` archive one array at a time.
pub struct NpzWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> NpzWriter<W> {
    /// Uncompressed archive, as written by `numpy.savez`.
    pub fn new(writer: W) -> Self {
        NpzWriter {
            zip: ZipWriter::new(writer),
            options: FileOptions::default().compression_method(CompressionMethod::Stored),
        }
    }

    /// Deflate-compressed archive, as written by `numpy.savez_compressed`.
    pub fn compressed(writer: W) -> Self {
        NpzWriter {
            zip: ZipWriter::new(writer),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    pub fn add_array(&mut self, name: &str, array: &NpyArray) -> IoResult<()> {
        self.zip.start_file(format!("{name}.npy"), self.options)?;
        array.write_to(&mut self.zip)?;
        Ok(())
    }

    pub fn finish(&mut self) -> IoResult<W> {
        Ok(self.zip.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npy::NpyData;
    use oxidize_ml_core::RaggedArray;
    use std::io::Cursor;

    fn archive_bytes(compressed: bool) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut writer = if compressed {
            NpzWriter::compressed(cursor)
        } else {
            NpzWriter::new(cursor)
        };
        writer
            .add_array("x", &NpyArray::float(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        writer
            .add_array("y", &NpyArray::int(vec![2], vec![0, 1]))
            .unwrap();
        writer
            .add_array("seqs", &NpyArray::sequences(&RaggedArray::from_rows(vec![vec![5i64], vec![]])))
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_names_and_lookup() {
        for compressed in [false, true] {
            let mut archive = NpzArchive::new(Cursor::new(archive_bytes(compressed))).unwrap();
            let mut names = archive.names();
            names.sort();
            assert_eq!(names, vec!["seqs", "x", "y"]);

            let y = archive.by_name("y").unwrap();
            assert_eq!(y.data, NpyData::Int(vec![0, 1]));
            let seqs = archive.by_name("seqs").unwrap().into_sequences().unwrap();
            assert_eq!(seqs.to_vecs(), vec![vec![5], vec![]]);
        }
    }

    #[test]
    fn test_missing_array() {
        let mut archive = NpzArchive::new(Cursor::new(archive_bytes(false))).unwrap();
        match archive.by_name("z") {
            Err(IoError::MissingArray(name)) => assert_eq!(name, "z"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_load_named_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.npz");
        std::fs::write(&path, archive_bytes(true)).unwrap();

        let arrays = load_named_arrays(&path).unwrap();
        assert_eq!(arrays.len(), 3);
        assert_eq!(arrays["x"].shape, vec![2, 2]);
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            NpzArchive::new(Cursor::new(b"plain text".to_vec())),
            Err(IoError::Zip(_))
        ));
    }
}
