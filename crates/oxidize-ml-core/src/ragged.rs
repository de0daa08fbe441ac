use crate::dtype::Element;
use crate::error::{TensorError, TensorResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered collection of variable-length rows.
///
/// Rows are stored back to back in `values`; row `i` spans
/// `values[offsets[i]..offsets[i + 1]]`. `offsets` always starts at 0 and has
/// one more entry than there are rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Element")]
pub struct RaggedArray<T: Element> {
    values: Vec<T>,
    offsets: Vec<usize>,
}

impl<T: Element> RaggedArray<T> {
    pub fn new() -> Self {
        RaggedArray {
            values: Vec::new(),
            offsets: vec![0],
        }
    }

    pub fn with_capacity(rows: usize, values: usize) -> Self {
        let mut offsets = Vec::with_capacity(rows + 1);
        offsets.push(0);
        RaggedArray {
            values: Vec::with_capacity(values),
            offsets,
        }
    }

    pub fn from_rows<R: AsRef<[T]>>(rows: impl IntoIterator<Item = R>) -> Self {
        let mut out = RaggedArray::new();
        for row in rows {
            out.push_row(row.as_ref());
        }
        out
    }

    pub fn push_row(&mut self, row: &[T]) {
        self.values.extend_from_slice(row);
        self.offsets.push(self.values.len());
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of values across all rows.
    pub fn total_len(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, i: usize) -> TensorResult<&[T]> {
        if i >= self.len() {
            return Err(TensorError::IndexOutOfBounds {
                index: i,
                axis: 0,
                size: self.len(),
            });
        }
        Ok(&self.values[self.offsets[i]..self.offsets[i + 1]])
    }

    pub fn row_len(&self, i: usize) -> TensorResult<usize> {
        self.row(i).map(|r| r.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.offsets
            .windows(2)
            .map(move |w| &self.values[w[0]..w[1]])
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn to_vecs(&self) -> Vec<Vec<T>> {
        self.iter().map(|r| r.to_vec()).collect()
    }

    /// Gather rows in the order given by `indices`.
    pub fn take(&self, indices: &[usize]) -> TensorResult<RaggedArray<T>> {
        let mut out = RaggedArray::with_capacity(indices.len(), self.values.len());
        for &idx in indices {
            out.push_row(self.row(idx)?);
        }
        Ok(out)
    }

    /// Rows of every input, in order.
    pub fn concat(parts: &[&RaggedArray<T>]) -> RaggedArray<T> {
        let rows = parts.iter().map(|p| p.len()).sum();
        let values = parts.iter().map(|p| p.total_len()).sum();
        let mut out = RaggedArray::with_capacity(rows, values);
        for part in parts {
            for row in part.iter() {
                out.push_row(row);
            }
        }
        out
    }

    /// Split into rows `[..at]` and `[at..]`.
    pub fn split_at(&self, at: usize) -> TensorResult<(RaggedArray<T>, RaggedArray<T>)> {
        if at > self.len() {
            return Err(TensorError::IndexOutOfBounds {
                index: at,
                axis: 0,
                size: self.len(),
            });
        }
        let pivot = self.offsets[at];
        let head = RaggedArray {
            values: self.values[..pivot].to_vec(),
            offsets: self.offsets[..=at].to_vec(),
        };
        let tail = RaggedArray {
            values: self.values[pivot..].to_vec(),
            offsets: self.offsets[at..].iter().map(|o| o - pivot).collect(),
        };
        Ok((head, tail))
    }

    /// Rebuild every row through `f`, which writes the new row into the buffer.
    pub fn map_rows<F>(&self, mut f: F) -> RaggedArray<T>
    where
        F: FnMut(&[T], &mut Vec<T>),
    {
        let mut out = RaggedArray::with_capacity(self.len(), self.values.len());
        for row in self.iter() {
            f(row, &mut out.values);
            out.offsets.push(out.values.len());
        }
        out
    }

    /// Indices of rows for which `keep` holds, and the kept rows.
    pub fn filter_rows<F>(&self, mut keep: F) -> (Vec<usize>, RaggedArray<T>)
    where
        F: FnMut(&[T]) -> bool,
    {
        let mut kept = Vec::new();
        let mut out = RaggedArray::with_capacity(self.len(), self.values.len());
        for (i, row) in self.iter().enumerate() {
            if keep(row) {
                kept.push(i);
                out.push_row(row);
            }
        }
        (kept, out)
    }

    /// Largest value across all rows, `None` when there are no values.
    pub fn max_value(&self) -> Option<T> {
        self.values
            .iter()
            .copied()
            .reduce(|a, b| if b > a { b } else { a })
    }

    pub fn max_row_len(&self) -> usize {
        self.offsets.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0)
    }
}

impl<T: Element> Default for RaggedArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> fmt::Display for RaggedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ragged(rows={}, values={}, max_len={}, dtype={})",
            self.len(),
            self.total_len(),
            self.max_row_len(),
            T::NAME
        )
    }
}
