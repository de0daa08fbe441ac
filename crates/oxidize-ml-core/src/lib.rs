pub mod tensor;
pub mod shape;
pub mod dtype;
pub mod ragged;
pub mod error;

pub use tensor::Tensor;
pub use shape::Shape;
pub use dtype::Element;
pub use ragged::RaggedArray;
pub use error::{TensorError, TensorResult};
