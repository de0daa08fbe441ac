//! Gzip-compressed IDX files (the MNIST family layout).
//!
//! The fixed-size header is skipped rather than parsed: labels start after 8
//! bytes, images after 16.

use crate::error::{IoError, IoResult};

use flate2::read::GzDecoder;
use oxidize_ml_core::Tensor;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub const LABEL_HEADER_LEN: usize = 8;
pub const IMAGE_HEADER_LEN: usize = 16;

/// Fully decompress a gzip file.
pub fn read_gz(path: &Path) -> IoResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn payload<'a>(bytes: &'a [u8], header_len: usize, what: &str) -> IoResult<&'a [u8]> {
    bytes.get(header_len..).ok_or_else(|| {
        IoError::InvalidFormat(format!(
            "{} stream has {} bytes, shorter than its {}-byte header",
            what,
            bytes.len(),
            header_len
        ))
    })
}

/// Decompressed label stream to a 1-D tensor of class ids.
pub fn decode_labels(bytes: &[u8]) -> IoResult<Tensor<u8>> {
    Ok(Tensor::from_slice(payload(bytes, LABEL_HEADER_LEN, "label")?))
}

/// Decompressed image stream to an `(n, rows, cols)` tensor.
pub fn decode_images(bytes: &[u8], n: usize, rows: usize, cols: usize) -> IoResult<Tensor<u8>> {
    let pixels = payload(bytes, IMAGE_HEADER_LEN, "image")?;
    Ok(Tensor::new(pixels.to_vec(), vec![n, rows, cols])?)
}
