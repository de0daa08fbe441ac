//! Boston Housing price regression dataset.
//!
//! 506 samples with 13 continuous features each; the target is the median
//! home value in thousands of dollars.

use crate::error::{DatasetError, DatasetResult};
use crate::shuffle::permutation;
use crate::source::DatasetSource;
use crate::Split;

use oxidize_ml_core::{Tensor, TensorError};
use oxidize_ml_io::{Fetch, NpzArchive};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::info;

pub const FILE_NAME: &str = "boston_housing.npz";
pub const FILE_HASH: &str = "f553886a1f8d56431e820c5b82552d9d95cfcb96d1e678153f8839538947dff5";

pub const DEFAULT_TEST_SPLIT: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 113;

/// Features `[N, 13]` and targets `[N]`, for train then test.
pub type HousingSplit = Split<Tensor<f64>, Tensor<f64>>;

/// Fetch (if needed) and load the dataset, shuffled and split.
///
/// `test_split` is the fraction of samples held out for the test set.
pub fn load_data<F: Fetch>(
    source: &DatasetSource<F>,
    test_split: f64,
    seed: u64,
) -> DatasetResult<HousingSplit> {
    check_test_split(test_split)?;
    let path = source.fetch(FILE_NAME, Some(FILE_HASH))?;
    from_npz(&path, test_split, seed)
}

/// Load from a local `boston_housing.npz`.
pub fn from_npz(path: &Path, test_split: f64, seed: u64) -> DatasetResult<HousingSplit> {
    check_test_split(test_split)?;
    let mut archive = NpzArchive::open(path)?;
    let x: Tensor<f64> = archive.by_name("x")?.into_tensor()?;
    let y: Tensor<f64> = archive.by_name("y")?.into_tensor()?;
    let split = shuffle_split(&x, &y, test_split, seed)?;
    info!(
        train = split.0 .0.len(),
        test = split.1 .0.len(),
        "loaded boston housing"
    );
    Ok(split)
}

fn check_test_split(test_split: f64) -> DatasetResult<()> {
    if !(0.0..=1.0).contains(&test_split) {
        return Err(DatasetError::InvalidArgument(format!(
            "test_split must be within [0, 1], got {}",
            test_split
        )));
    }
    Ok(())
}

/// Apply one seeded permutation to `x` and `y`, then cut at
/// `floor(N * (1 - test_split))`.
pub fn shuffle_split(
    x: &Tensor<f64>,
    y: &Tensor<f64>,
    test_split: f64,
    seed: u64,
) -> DatasetResult<HousingSplit> {
    let n = x.len();
    if y.len() != n {
        return Err(TensorError::ShapeMismatch {
            expected: vec![n],
            got: y.shape_vec(),
        }
        .into());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let indices = permutation(n, &mut rng);
    let x = x.take_rows(&indices)?;
    let y = y.take_rows(&indices)?;

    let n_train = ((n as f64) * (1.0 - test_split)).floor() as usize;
    let (x_train, x_test) = x.split_rows(n_train)?;
    let (y_train, y_test) = y.split_rows(n_train)?;
    Ok(((x_train, y_train), (x_test, y_test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{source_with, MemoryFetcher};
    use approx::assert_relative_eq;
    use oxidize_ml_io::{IoError, NpyArray, NpzWriter};
    use std::fs::File;

    /// Row `i` has every feature equal to `i`, target `10 * i`.
    fn write_housing(path: &Path, n: usize) {
        let x: Vec<f64> = (0..n).flat_map(|i| std::iter::repeat(i as f64).take(13)).collect();
        let y: Vec<f64> = (0..n).map(|i| 10.0 * i as f64).collect();
        let mut writer = NpzWriter::new(File::create(path).unwrap());
        writer.add_array("x", &NpyArray::float(vec![n, 13], x)).unwrap();
        writer.add_array("y", &NpyArray::float(vec![n], y)).unwrap();
        writer.finish().unwrap();
    }

    fn fixture(n: usize) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        write_housing(&path, n);
        (dir, path)
    }

    fn row_ids(x: &Tensor<f64>) -> Vec<usize> {
        (0..x.len()).map(|i| x.sample(i).unwrap()[0] as usize).collect()
    }

    #[test]
    fn test_split_sizes() {
        let (_dir, path) = fixture(506);
        let ((x_train, y_train), (x_test, y_test)) = from_npz(&path, 0.2, 113).unwrap();
        assert_eq!(x_train.shape_vec(), vec![404, 13]);
        assert_eq!(y_train.shape_vec(), vec![404]);
        assert_eq!(x_test.shape_vec(), vec![102, 13]);
        assert_eq!(y_test.len(), 102);
    }

    #[test]
    fn test_rows_stay_paired() {
        let (_dir, path) = fixture(40);
        let ((x_train, y_train), (x_test, y_test)) = from_npz(&path, 0.25, 5).unwrap();
        for (x, y) in [(&x_train, &y_train), (&x_test, &y_test)] {
            for (i, id) in row_ids(x).into_iter().enumerate() {
                assert_relative_eq!(y.data()[i], 10.0 * id as f64);
                assert!(x.sample(i).unwrap().iter().all(|&v| v == id as f64));
            }
        }
    }

    #[test]
    fn test_union_is_whole_dataset() {
        let (_dir, path) = fixture(37);
        let ((x_train, _), (x_test, _)) = from_npz(&path, 0.3, 113).unwrap();
        assert_eq!(x_train.len(), 25);
        let mut ids = row_ids(&x_train);
        ids.extend(row_ids(&x_test));
        ids.sort_unstable();
        assert_eq!(ids, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_reproducibility() {
        let (_dir, path) = fixture(50);
        let a = from_npz(&path, 0.2, 113).unwrap();
        let b = from_npz(&path, 0.2, 113).unwrap();
        let c = from_npz(&path, 0.2, 114).unwrap();
        assert_eq!(a.0 .0, b.0 .0);
        assert_eq!(a.1 .1, b.1 .1);
        assert_ne!(row_ids(&a.0 .0), row_ids(&c.0 .0));

        let mut all_a = row_ids(&a.0 .0);
        all_a.extend(row_ids(&a.1 .0));
        let mut all_c = row_ids(&c.0 .0);
        all_c.extend(row_ids(&c.1 .0));
        all_a.sort_unstable();
        all_c.sort_unstable();
        assert_eq!(all_a, all_c);
    }

    #[test]
    fn test_split_extremes() {
        let (_dir, path) = fixture(10);
        let ((x_train, _), (x_test, _)) = from_npz(&path, 0.0, 1).unwrap();
        assert_eq!((x_train.len(), x_test.len()), (10, 0));
        let ((x_train, _), (x_test, _)) = from_npz(&path, 1.0, 1).unwrap();
        assert_eq!((x_train.len(), x_test.len()), (0, 10));
        assert!(matches!(
            from_npz(&path, 1.5, 1),
            Err(DatasetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mismatched_lengths() {
        let x = Tensor::new(vec![0.0; 26], vec![2, 13]).unwrap();
        let y = Tensor::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            shuffle_split(&x, &y, 0.2, 113),
            Err(DatasetError::Tensor(TensorError::ShapeMismatch { .. }))
        ));
    }

    #[test]
    fn test_load_from_cache_without_fetching() {
        let (dir, _path) = fixture(20);
        let source = source_with(dir.path(), MemoryFetcher::default());
        let ((x_train, _), _) = load_data(&source, 0.2, 113).unwrap();
        assert_eq!(x_train.len(), 16);
        assert_eq!(source.cache().fetcher().calls(), 0);
    }

    #[test]
    fn test_download_is_hash_checked() {
        let (fixture_dir, path) = fixture(20);
        let cache_dir = tempfile::tempdir().unwrap();
        let fetcher = MemoryFetcher::default()
            .with_file(&format!("http://mirror.test/{FILE_NAME}"), std::fs::read(&path).unwrap());
        let source = source_with(cache_dir.path(), fetcher);

        match load_data(&source, 0.2, 113) {
            Err(DatasetError::Io(IoError::HashMismatch { expected, .. })) => {
                assert_eq!(expected, FILE_HASH)
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!cache_dir.path().join(FILE_NAME).exists());
        drop(fixture_dir);
    }
}
