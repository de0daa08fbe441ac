pub mod cache;
pub mod error;
pub mod idx;
pub mod json;
pub mod npy;
pub mod npz;
pub mod pickle;

pub use cache::{hash_file, validate_file, FileCache, Fetch, HashAlgorithm, HttpFetcher};
pub use error::{IoError, IoResult};
pub use idx::{decode_images, decode_labels, read_gz};
pub use json::{read_json, write_json};
pub use npy::{read_npy, NpyArray, NpyData};
pub use npz::{load_named_arrays, NpzArchive, NpzWriter};
pub use pickle::PickleValue;
