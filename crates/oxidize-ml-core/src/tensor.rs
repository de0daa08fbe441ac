use crate::dtype::Element;
use crate::error::{TensorError, TensorResult};
use crate::shape::Shape;

use serde::{Deserialize, Serialize};
use std::fmt;

/// N-dimensional array returned by every dataset loader.
///
/// Stores data in a flat contiguous `Vec<T>` with row-major (C-order) layout.
/// Axis 0 is always the sample axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Element")]
pub struct Tensor<T: Element> {
    data: Vec<T>,
    shape: Shape,
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Element> Tensor<T> {
    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> TensorResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: s.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor { data, shape: s })
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![T::default(); s.numel()],
            shape: s,
        }
    }

    /// Create a 1-D tensor from a slice.
    pub fn from_slice(data: &[T]) -> Self {
        Tensor {
            data: data.to_vec(),
            shape: Shape::new(vec![data.len()]),
        }
    }

    /// Create a 1-D tensor, taking ownership of the data.
    pub fn from_vec(data: Vec<T>) -> Self {
        let n = data.len();
        Tensor {
            data,
            shape: Shape::new(vec![n]),
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Number of samples (size of axis 0).
    pub fn len(&self) -> usize {
        self.shape.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Multi-dimensional indexing: compute flat offset from indices.
    pub fn get(&self, indices: &[usize]) -> TensorResult<T> {
        let strides = self.shape.strides();
        if indices.len() != self.ndim() {
            return Err(TensorError::DimensionMismatch(format!(
                "Expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let mut offset = 0;
        for (i, &idx) in indices.iter().enumerate() {
            let dim_size = self.shape.dim(i)?;
            if idx >= dim_size {
                return Err(TensorError::IndexOutOfBounds {
                    index: idx,
                    axis: i,
                    size: dim_size,
                });
            }
            offset += idx * strides[i];
        }
        Ok(self.data[offset])
    }

    /// Borrow the flat data of sample `i` (one slice along axis 0).
    pub fn sample(&self, i: usize) -> TensorResult<&[T]> {
        let n = self.len();
        if i >= n || self.ndim() == 0 {
            return Err(TensorError::IndexOutOfBounds {
                index: i,
                axis: 0,
                size: n,
            });
        }
        let size = self.shape.sample_size();
        Ok(&self.data[i * size..(i + 1) * size])
    }

    /// Extract sample `i` as its own tensor (shape without axis 0).
    pub fn row(&self, i: usize) -> TensorResult<Tensor<T>> {
        let data = self.sample(i)?.to_vec();
        Tensor::new(data, self.shape.dims()[1..].to_vec())
    }

    // ─── Shape Manipulation ─────────────────────────────────────────────────

    /// Reshape the tensor (data remains the same, only shape changes).
    pub fn reshape(self, new_shape: Vec<usize>) -> TensorResult<Tensor<T>> {
        let ns = Shape::new(new_shape);
        if self.numel() != ns.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: ns.to_vec(),
                got: self.shape_vec(),
            });
        }
        Ok(Tensor {
            data: self.data,
            shape: ns,
        })
    }

    /// Gather samples along axis 0, in the order given by `indices`.
    pub fn take_rows(&self, indices: &[usize]) -> TensorResult<Tensor<T>> {
        if self.ndim() == 0 {
            return Err(TensorError::InvalidOperation(
                "take_rows() requires at least a 1D tensor".to_string(),
            ));
        }
        let size = self.shape.sample_size();
        let mut data = Vec::with_capacity(indices.len() * size);
        for &idx in indices {
            data.extend_from_slice(self.sample(idx)?);
        }
        Ok(Tensor {
            data,
            shape: self.shape.with_leading(indices.len())?,
        })
    }

    /// Samples `start..end` along axis 0.
    pub fn slice_rows(&self, start: usize, end: usize) -> TensorResult<Tensor<T>> {
        let n = self.len();
        if start > end || end > n {
            return Err(TensorError::IndexOutOfBounds {
                index: end,
                axis: 0,
                size: n,
            });
        }
        let size = self.shape.sample_size();
        Ok(Tensor {
            data: self.data[start * size..end * size].to_vec(),
            shape: self.shape.with_leading(end - start)?,
        })
    }

    /// Split along axis 0 into `[..at]` and `[at..]`.
    pub fn split_rows(&self, at: usize) -> TensorResult<(Tensor<T>, Tensor<T>)> {
        let n = self.len();
        Ok((self.slice_rows(0, at)?, self.slice_rows(at, n)?))
    }

    /// Concatenate tensors along axis 0.
    pub fn concatenate(tensors: &[&Tensor<T>]) -> TensorResult<Tensor<T>> {
        let first = tensors.first().ok_or(TensorError::EmptyTensor)?;
        if first.ndim() == 0 {
            return Err(TensorError::InvalidAxis { axis: 0, ndim: 0 });
        }
        let tail = &first.shape.dims()[1..];
        let mut data = Vec::with_capacity(tensors.iter().map(|t| t.numel()).sum());
        let mut total_rows = 0usize;
        for t in tensors {
            if t.ndim() != first.ndim() || &t.shape.dims()[1..] != tail {
                return Err(TensorError::ShapeMismatch {
                    expected: first.shape_vec(),
                    got: t.shape_vec(),
                });
            }
            data.extend_from_slice(&t.data);
            total_rows += t.len();
        }
        Ok(Tensor {
            data,
            shape: first.shape.with_leading(total_rows)?,
        })
    }

    // ─── Reductions ─────────────────────────────────────────────────────────

    /// Max of all elements.
    pub fn max_all(&self) -> TensorResult<T> {
        self.data
            .iter()
            .copied()
            .reduce(|a, b| if b > a { b } else { a })
            .ok_or(TensorError::EmptyTensor)
    }

    /// Min of all elements.
    pub fn min_all(&self) -> TensorResult<T> {
        self.data
            .iter()
            .copied()
            .reduce(|a, b| if b < a { b } else { a })
            .ok_or(TensorError::EmptyTensor)
    }
}

impl<T: Element> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

// ─── Display ────────────────────────────────────────────────────────────────

impl<T: Element> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ndim() == 1 {
            write!(f, "tensor([")?;
            for (i, v) in self.data.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                if i > 6 {
                    write!(f, "...")?;
                    break;
                }
                write!(f, "{}", v)?;
            }
            return write!(f, "], dtype={})", T::NAME);
        }
        if self.ndim() == 2 {
            let rows = self.shape.dims()[0];
            let cols = self.shape.dims()[1];
            writeln!(f, "tensor([")?;
            for i in 0..rows.min(8) {
                write!(f, "  [")?;
                for j in 0..cols.min(8) {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.data[i * cols + j])?;
                }
                if cols > 8 {
                    write!(f, ", ...")?;
                }
                writeln!(f, "],")?;
            }
            if rows > 8 {
                writeln!(f, "  ...")?;
            }
            return write!(f, "], shape={}, dtype={})", self.shape, T::NAME);
        }
        write!(
            f,
            "tensor(shape={}, dtype={}, numel={})",
            self.shape,
            T::NAME,
            self.numel()
        )
    }
}
