//! Fashion-MNIST: 70,000 grayscale 28x28 images of clothing in 10 classes.

use crate::error::DatasetResult;
use crate::source::DatasetSource;
use crate::Split;

use oxidize_ml_core::Tensor;
use oxidize_ml_io::{decode_images, decode_labels, read_gz, Fetch};
use std::path::{Path, PathBuf};
use tracing::info;

pub const IMAGE_ROWS: usize = 28;
pub const IMAGE_COLS: usize = 28;

/// Train labels, train images, test labels, test images.
pub const FILES: [&str; 4] = [
    "train-labels-idx1-ubyte.gz",
    "train-images-idx3-ubyte.gz",
    "t10k-labels-idx1-ubyte.gz",
    "t10k-images-idx3-ubyte.gz",
];

/// Class names, indexed by label value.
pub const CLASS_NAMES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

/// Images `[N, 28, 28]` and labels `[N]`, for train then test.
pub type FashionSplit = Split<Tensor<u8>, Tensor<u8>>;

pub fn class_name(label: u8) -> Option<&'static str> {
    CLASS_NAMES.get(label as usize).copied()
}

/// Fetch (if needed) and load the four IDX streams.
pub fn load_data<F: Fetch>(source: &DatasetSource<F>) -> DatasetResult<FashionSplit> {
    let mut paths: Vec<PathBuf> = Vec::with_capacity(FILES.len());
    for fname in FILES {
        paths.push(source.fetch(fname, None)?);
    }
    from_files(&paths[0], &paths[1], &paths[2], &paths[3])
}

/// Decode local copies of the four gzip streams.
pub fn from_files(
    train_labels: &Path,
    train_images: &Path,
    test_labels: &Path,
    test_images: &Path,
) -> DatasetResult<FashionSplit> {
    let train = read_pair(train_labels, train_images)?;
    let test = read_pair(test_labels, test_images)?;
    info!(
        train = train.1.len(),
        test = test.1.len(),
        "loaded fashion-mnist"
    );
    Ok((train, test))
}

/// The image count is taken from the label stream.
fn read_pair(labels: &Path, images: &Path) -> DatasetResult<(Tensor<u8>, Tensor<u8>)> {
    let y = decode_labels(&read_gz(labels)?)?;
    let x = decode_images(&read_gz(images)?, y.len(), IMAGE_ROWS, IMAGE_COLS)?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatasetError;
    use crate::testing::{source_with, MemoryFetcher, ORIGIN};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use oxidize_ml_core::TensorError;
    use oxidize_ml_io::IoError;
    use std::io::Write;

    const PIXELS: usize = IMAGE_ROWS * IMAGE_COLS;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn label_stream(labels: &[u8]) -> Vec<u8> {
        let mut out = vec![0, 0, 8, 1];
        out.extend((labels.len() as u32).to_be_bytes());
        out.extend_from_slice(labels);
        gzip(&out)
    }

    /// Image `i` is filled with the byte `i`.
    fn image_stream(n: usize) -> Vec<u8> {
        let mut out = vec![0, 0, 8, 3];
        out.extend((n as u32).to_be_bytes());
        out.extend(28u32.to_be_bytes());
        out.extend(28u32.to_be_bytes());
        for i in 0..n {
            out.extend(std::iter::repeat(i as u8).take(PIXELS));
        }
        gzip(&out)
    }

    fn write_cache(dir: &Path, train: &[u8], test: &[u8]) {
        std::fs::write(dir.join(FILES[0]), label_stream(train)).unwrap();
        std::fs::write(dir.join(FILES[1]), image_stream(train.len())).unwrap();
        std::fs::write(dir.join(FILES[2]), label_stream(test)).unwrap();
        std::fs::write(dir.join(FILES[3]), image_stream(test.len())).unwrap();
    }

    fn paths(dir: &Path) -> Vec<PathBuf> {
        FILES.iter().map(|f| dir.join(f)).collect()
    }

    #[test]
    fn test_decode_from_files() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), &[9, 0, 0, 3, 1], &[2, 7]);
        let p = paths(dir.path());

        let ((x_train, y_train), (x_test, y_test)) = from_files(&p[0], &p[1], &p[2], &p[3]).unwrap();
        assert_eq!(y_train.data(), &[9, 0, 0, 3, 1]);
        assert_eq!(x_train.shape_vec(), vec![5, 28, 28]);
        assert_eq!(x_test.shape_vec(), vec![2, 28, 28]);
        assert_eq!(y_test.data(), &[2, 7]);
        assert!(x_train.sample(3).unwrap().iter().all(|&p| p == 3));
        assert_eq!(x_test.get(&[1, 27, 27]).unwrap(), 1);
    }

    #[test]
    fn test_image_count_follows_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), &[1, 2, 3], &[4]);
        // three labels but only two training images
        std::fs::write(dir.path().join(FILES[1]), image_stream(2)).unwrap();
        let p = paths(dir.path());

        assert!(matches!(
            from_files(&p[0], &p[1], &p[2], &p[3]),
            Err(DatasetError::Io(IoError::Tensor(TensorError::ShapeMismatch { .. })))
        ));
    }

    #[test]
    fn test_load_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), &[0, 1, 2, 3], &[4, 5, 6]);
        let source = source_with(dir.path(), MemoryFetcher::default());

        let ((x_train, _), (x_test, _)) = load_data(&source).unwrap();
        assert_eq!(x_train.len(), 4);
        assert_eq!(x_test.len(), 3);
        assert_eq!(source.cache().fetcher().calls(), 0);
    }

    #[test]
    fn test_downloads_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MemoryFetcher::default()
            .with_file(&format!("{ORIGIN}{}", FILES[0]), label_stream(&[1, 2]))
            .with_file(&format!("{ORIGIN}{}", FILES[1]), image_stream(2))
            .with_file(&format!("{ORIGIN}{}", FILES[2]), label_stream(&[3]))
            .with_file(&format!("{ORIGIN}{}", FILES[3]), image_stream(1));
        let source = source_with(dir.path(), fetcher);

        let ((_, y_train), (_, y_test)) = load_data(&source).unwrap();
        assert_eq!(y_train.data(), &[1, 2]);
        assert_eq!(y_test.data(), &[3]);
        assert_eq!(source.cache().fetcher().calls(), 4);
        assert!(FILES.iter().all(|f| dir.path().join(f).exists()));

        load_data(&source).unwrap();
        assert_eq!(source.cache().fetcher().calls(), 4);
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(0), Some("T-shirt/top"));
        assert_eq!(class_name(9), Some("Ankle boot"));
        assert_eq!(class_name(10), None);
    }
}
