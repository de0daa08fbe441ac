//! IMDB movie review sentiment dataset.
//!
//! 50,000 reviews, pre-tokenized into word ids ranked by frequency (id `n` is
//! the n-th most common word), labelled positive (1) or negative (0).
//! Reviews are variable-length, so samples come back as a [`RaggedArray`].

use crate::error::{DatasetError, DatasetResult};
use crate::shuffle::permutation;
use crate::source::DatasetSource;
use crate::Split;

use oxidize_ml_core::{RaggedArray, Tensor, TensorError};
use oxidize_ml_io::{read_json, Fetch, NpzArchive};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub const FILE_NAME: &str = "imdb.npz";
pub const FILE_HASH: &str = "599dadb1135973df5b59232a0e9a887c";
pub const WORD_INDEX_FILE_NAME: &str = "imdb_word_index.json";
pub const WORD_INDEX_FILE_HASH: &str = "bfafd718b763782e994055a2d397834f";

/// Rendered in place of ids missing from the reverse index.
pub const UNKNOWN_WORD: &str = "?";

/// Sequences and labels, for train then test.
pub type ImdbSplit = Split<RaggedArray<i64>, Tensor<i64>>;

/// Preprocessing applied by [`load_data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImdbOptions {
    /// Keep ids below this value. `None` (or 0) keeps everything up to the
    /// largest id present.
    pub num_words: Option<usize>,
    /// Ids below this value are treated as out of vocabulary.
    pub skip_top: usize,
    /// Drop reviews longer than this, counted after the start marker is added.
    pub maxlen: Option<usize>,
    pub seed: u64,
    /// Prepended to every review.
    pub start_char: Option<i64>,
    /// Replaces filtered ids. When `None` they are removed instead.
    pub oov_char: Option<i64>,
    /// Added to every original word id.
    pub index_from: i64,
}

impl Default for ImdbOptions {
    fn default() -> Self {
        ImdbOptions {
            num_words: None,
            skip_top: 0,
            maxlen: None,
            seed: 113,
            start_char: Some(1),
            oov_char: Some(2),
            index_from: 3,
        }
    }
}

impl ImdbOptions {
    /// Read options from a JSON object; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> DatasetResult<Self> {
        Ok(read_json(path)?)
    }
}

/// Fetch (if needed) and load the reviews.
pub fn load_data<F: Fetch>(
    source: &DatasetSource<F>,
    options: &ImdbOptions,
) -> DatasetResult<ImdbSplit> {
    let path = source.fetch(FILE_NAME, Some(FILE_HASH))?;
    from_npz(&path, options)
}

/// Load from a local `imdb.npz`.
pub fn from_npz(path: &Path, options: &ImdbOptions) -> DatasetResult<ImdbSplit> {
    let mut archive = NpzArchive::open(path)?;
    let x_train = archive.by_name("x_train")?.into_sequences()?;
    let y_train: Tensor<i64> = archive.by_name("y_train")?.into_tensor()?;
    let x_test = archive.by_name("x_test")?.into_sequences()?;
    let y_test: Tensor<i64> = archive.by_name("y_test")?.into_tensor()?;
    debug!(
        train = x_train.len(),
        test = x_test.len(),
        tokens = x_train.total_len() + x_test.total_len(),
        "decoded imdb archive"
    );

    let split = preprocess((x_train, y_train), (x_test, y_test), options)?;
    info!(
        train = split.0 .0.len(),
        test = split.1 .0.len(),
        "loaded imdb"
    );
    Ok(split)
}

fn check_paired(x: &RaggedArray<i64>, y: &Tensor<i64>) -> DatasetResult<()> {
    if x.len() != y.len() {
        return Err(TensorError::ShapeMismatch {
            expected: vec![x.len()],
            got: y.shape_vec(),
        }
        .into());
    }
    Ok(())
}

/// Shuffle, remap, filter and re-split raw train/test sequences.
pub fn preprocess(
    train: (RaggedArray<i64>, Tensor<i64>),
    test: (RaggedArray<i64>, Tensor<i64>),
    options: &ImdbOptions,
) -> DatasetResult<ImdbSplit> {
    let (x_train, y_train) = train;
    let (x_test, y_test) = test;
    check_paired(&x_train, &y_train)?;
    check_paired(&x_test, &y_test)?;

    // One generator for both halves, train drawn first.
    let mut rng = StdRng::seed_from_u64(options.seed);
    let order = permutation(x_train.len(), &mut rng);
    let (x_train, y_train) = (x_train.take(&order)?, y_train.take_rows(&order)?);
    let order = permutation(x_test.len(), &mut rng);
    let (x_test, y_test) = (x_test.take(&order)?, y_test.take_rows(&order)?);

    let mut boundary = x_train.len();
    let xs = RaggedArray::concat(&[&x_train, &x_test]);
    let mut labels = Tensor::concatenate(&[&y_train, &y_test])?;

    let mut xs = remap(&xs, options.start_char, options.index_from);

    if let Some(maxlen) = options.maxlen {
        let (kept, filtered) = xs.filter_rows(|row| row.len() <= maxlen);
        if filtered.is_empty() {
            return Err(DatasetError::EmptyAfterFiltering { maxlen });
        }
        debug!(maxlen, dropped = xs.len() - filtered.len(), "filtered long reviews");
        // The split point stays at the original train size, so surviving test
        // reviews fill in for dropped train reviews.
        boundary = boundary.min(filtered.len());
        labels = labels.take_rows(&kept)?;
        xs = filtered;
    }

    let num_words = match options.num_words {
        Some(n) if n > 0 => n as i64,
        _ => xs.max_value().unwrap_or(0),
    };
    let xs = restrict_vocabulary(&xs, options.skip_top as i64, num_words, options.oov_char);

    let (x_train, x_test) = xs.split_at(boundary)?;
    let (y_train, y_test) = labels.split_rows(boundary)?;
    Ok(((x_train, y_train), (x_test, y_test)))
}

/// Shift ids by `index_from` and prepend `start_char`.
fn remap(xs: &RaggedArray<i64>, start_char: Option<i64>, index_from: i64) -> RaggedArray<i64> {
    match start_char {
        Some(start) => xs.map_rows(|row, out| {
            out.push(start);
            out.extend(row.iter().map(|w| w + index_from));
        }),
        None if index_from != 0 => xs.map_rows(|row, out| out.extend(row.iter().map(|w| w + index_from))),
        None => xs.clone(),
    }
}

/// Keep ids in `skip_top..num_words`; others become `oov_char` or are dropped.
fn restrict_vocabulary(
    xs: &RaggedArray<i64>,
    skip_top: i64,
    num_words: i64,
    oov_char: Option<i64>,
) -> RaggedArray<i64> {
    let in_vocab = |w: i64| skip_top <= w && w < num_words;
    match oov_char {
        Some(oov) => xs.map_rows(|row, out| {
            out.extend(row.iter().map(|&w| if in_vocab(w) { w } else { oov }))
        }),
        None => xs.map_rows(|row, out| out.extend(row.iter().copied().filter(|&w| in_vocab(w)))),
    }
}

// ─── Word index ─────────────────────────────────────────────────────────────

/// Fetch (if needed) and load the word to id mapping.
///
/// Ids are the raw ones stored in the archive, before `index_from` is applied.
pub fn load_word_index<F: Fetch>(source: &DatasetSource<F>) -> DatasetResult<HashMap<String, i64>> {
    let path = source.fetch(WORD_INDEX_FILE_NAME, Some(WORD_INDEX_FILE_HASH))?;
    word_index_from_json(&path)
}

pub fn word_index_from_json(path: &Path) -> DatasetResult<HashMap<String, i64>> {
    let index: HashMap<String, i64> = read_json(path)?;
    debug!(words = index.len(), "loaded word index");
    Ok(index)
}

/// Id to word mapping for sequences produced with the given `index_from`.
pub fn reverse_word_index(
    word_index: &HashMap<String, i64>,
    index_from: i64,
) -> HashMap<i64, String> {
    word_index
        .iter()
        .map(|(word, &id)| (id + index_from, word.clone()))
        .collect()
}

pub fn decode_review(sequence: &[i64], reverse_index: &HashMap<i64, String>) -> String {
    sequence
        .iter()
        .map(|id| reverse_index.get(id).map_or(UNKNOWN_WORD, String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
