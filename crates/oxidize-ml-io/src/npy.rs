//! NumPy `.npy` array format.
//!
//! Layout: magic `\x93NUMPY`, a version pair, a little-endian header length
//! (`u16` for version 1, `u32` for versions 2 and 3), an ASCII Python dict
//! literal with `descr`, `fortran_order` and `shape`, then the raw payload.

use crate::error::{IoError, IoResult};
use crate::pickle::{self, PickleValue};
use oxidize_ml_core::{Element, RaggedArray, Tensor};
use std::io::{Read, Write};

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Decoded payload, widened to one storage type per dtype family.
#[derive(Debug, Clone, PartialEq)]
pub enum NpyData {
    /// `f2`/`f4`/`f8`
    Float(Vec<f64>),
    /// signed ints, `u2`/`u4`/`u8` and `b1`
    Int(Vec<i64>),
    /// `u1`
    UInt8(Vec<u8>),
    /// `O`: pickled Python objects
    Object(Vec<PickleValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub descr: String,
    pub shape: Vec<usize>,
    pub data: NpyData,
}

impl NpyArray {
    pub fn float(shape: Vec<usize>, data: Vec<f64>) -> Self {
        NpyArray {
            descr: "<f8".to_string(),
            shape,
            data: NpyData::Float(data),
        }
    }

    pub fn int(shape: Vec<usize>, data: Vec<i64>) -> Self {
        NpyArray {
            descr: "<i8".to_string(),
            shape,
            data: NpyData::Int(data),
        }
    }

    pub fn uint8(shape: Vec<usize>, data: Vec<u8>) -> Self {
        NpyArray {
            descr: "|u1".to_string(),
            shape,
            data: NpyData::UInt8(data),
        }
    }

    /// 1-D object array whose elements are integer lists.
    pub fn sequences(rows: &RaggedArray<i64>) -> Self {
        let items = rows
            .iter()
            .map(|row| PickleValue::List(row.iter().map(|&v| PickleValue::Int(v)).collect()))
            .collect();
        NpyArray {
            descr: "|O".to_string(),
            shape: vec![rows.len()],
            data: NpyData::Object(items),
        }
    }

    /// Number of entries along axis 0.
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a numeric array to a tensor of the requested element type.
    pub fn into_tensor<T: Element>(self) -> IoResult<Tensor<T>> {
        let data: Vec<T> = match self.data {
            NpyData::Float(v) => v.into_iter().map(T::from_f64).collect(),
            NpyData::Int(v) => v.into_iter().map(T::from_i64).collect(),
            NpyData::UInt8(v) => v.into_iter().map(|b| T::from_i64(b as i64)).collect(),
            NpyData::Object(_) => return Err(IoError::UnsupportedDtype(self.descr)),
        };
        Ok(Tensor::new(data, self.shape)?)
    }

    /// Interpret the array as a list of integer sequences.
    ///
    /// Object arrays of lists give ragged rows; a rectangular 2-D integer array
    /// gives one row per matrix row.
    pub fn into_sequences(self) -> IoResult<RaggedArray<i64>> {
        match self.data {
            NpyData::Object(items) => pickle::items_to_sequences(&items),
            NpyData::Int(values) if self.shape.len() == 2 => {
                let width = self.shape[1];
                let mut out = RaggedArray::with_capacity(self.shape[0], values.len());
                if width == 0 {
                    for _ in 0..self.shape[0] {
                        out.push_row(&[]);
                    }
                } else {
                    for row in values.chunks(width) {
                        out.push_row(row);
                    }
                }
                Ok(out)
            }
            _ => Err(IoError::UnsupportedDtype(format!(
                "{} with shape {:?} is not a sequence array",
                self.descr, self.shape
            ))),
        }
    }

    /// Serialize in `.npy` version 1.0 format.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        let (descr, payload) = match &self.data {
            NpyData::Float(v) => ("<f8", v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            NpyData::Int(v) => ("<i8", v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            NpyData::UInt8(v) => ("|u1", v.clone()),
            NpyData::Object(items) => {
                let rows = pickle::items_to_sequences(items)?;
                ("|O", pickle::dumps_object_array(&rows))
            }
        };
        let header = header_string(descr, &self.shape);
        writer.write_all(MAGIC)?;
        writer.write_all(&[1, 0])?;
        writer.write_all(&(header.len() as u16).to_le_bytes())?;
        writer.write_all(header.as_bytes())?;
        writer.write_all(&payload)?;
        Ok(())
    }
}

fn header_string(descr: &str, shape: &[usize]) -> String {
    let shape = match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape
    );
    // magic + version + length field, then the header, padded to 64 bytes
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');
    header
}

// ─── Reading ────────────────────────────────────────────────────────────────

/// Read one `.npy` array from a stream.
pub fn read_npy<R: Read>(reader: &mut R) -> IoResult<NpyArray> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(IoError::InvalidFormat("missing .npy magic string".to_string()));
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut b = [0u8; 2];
            reader.read_exact(&mut b)?;
            u16::from_le_bytes(b) as usize
        }
        2 | 3 => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            u32::from_le_bytes(b) as usize
        }
        v => {
            return Err(IoError::InvalidFormat(format!(
                "unsupported .npy version {}.{}",
                v, version[1]
            )))
        }
    };
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);
    let header = parse_header(&header)?;

    let numel = checked_numel(&header.shape).ok_or_else(|| {
        IoError::InvalidFormat(format!("shape {:?} overflows the address space", header.shape))
    })?;
    let dtype = Dtype::parse(&header.descr)?;

    let data = if let Dtype::Object = dtype {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let (shape, items) = pickle::object_array_items(pickle::loads(&raw)?)?;
        if checked_numel(&shape) != Some(numel) {
            return Err(IoError::InvalidFormat(format!(
                "pickled shape {:?} disagrees with header shape {:?}",
                shape, header.shape
            )));
        }
        NpyData::Object(items)
    } else {
        let len = numel.checked_mul(dtype.size()).ok_or_else(|| {
            IoError::InvalidFormat(format!("shape {:?} overflows the address space", header.shape))
        })?;
        // never trust the header for the allocation size
        let mut raw = Vec::new();
        reader.by_ref().take(len as u64).read_to_end(&mut raw)?;
        if raw.len() != len {
            return Err(IoError::InvalidFormat(format!(
                "payload has {} bytes, header shape {:?} needs {}",
                raw.len(),
                header.shape,
                len
            )));
        }
        dtype.decode(&raw)?
    };

    let data = if header.fortran_order && header.shape.len() > 1 {
        fortran_to_c(data, &header.shape)
    } else {
        data
    };

    Ok(NpyArray {
        descr: header.descr,
        shape: header.shape,
        data,
    })
}

fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn bad_header(msg: &str, header: &str) -> IoError {
    IoError::InvalidFormat(format!("{} in .npy header {:?}", msg, header.trim_end()))
}

/// Text following `'key':` in the header dict.
fn value_after<'h>(header: &'h str, key: &str) -> IoResult<&'h str> {
    let start = [format!("'{}'", key), format!("\"{}\"", key)]
        .iter()
        .find_map(|k| header.find(k.as_str()).map(|i| i + k.len()))
        .ok_or_else(|| bad_header(&format!("missing '{}'", key), header))?;
    let rest = header[start..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| bad_header(&format!("malformed '{}'", key), header))?;
    Ok(rest.trim_start())
}

fn parse_header(header: &str) -> IoResult<Header> {
    let rest = value_after(header, "descr")?;
    let descr = match rest.chars().next() {
        Some(q @ ('\'' | '"')) => {
            let body = &rest[1..];
            let end = body
                .find(q)
                .ok_or_else(|| bad_header("unterminated descr", header))?;
            body[..end].to_string()
        }
        Some('[') => return Err(IoError::UnsupportedDtype("structured dtype".to_string())),
        _ => return Err(bad_header("malformed descr", header)),
    };

    let rest = value_after(header, "fortran_order")?;
    let fortran_order = if rest.starts_with("True") {
        true
    } else if rest.starts_with("False") {
        false
    } else {
        return Err(bad_header("malformed fortran_order", header));
    };

    let rest = value_after(header, "shape")?;
    let body = rest
        .strip_prefix('(')
        .and_then(|r| r.find(')').map(|end| &r[..end]))
        .ok_or_else(|| bad_header("malformed shape", header))?;
    let shape = body
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| bad_header("malformed shape", header))
        })
        .collect::<IoResult<Vec<usize>>>()?;

    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Dtype {
    Float { size: usize, big: bool },
    Int { size: usize, big: bool },
    UInt { size: usize, big: bool },
    Bool,
    Object,
}

impl Dtype {
    fn parse(descr: &str) -> IoResult<Dtype> {
        let unsupported = || IoError::UnsupportedDtype(descr.to_string());
        let (order, rest) = match descr.chars().next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
            _ => ('=', descr),
        };
        let big = order == '>';
        let mut chars = rest.chars();
        let kind = chars.next().ok_or_else(unsupported)?;
        let digits = chars.as_str();
        if kind == 'O' {
            return Ok(Dtype::Object);
        }
        let size: usize = digits.parse().map_err(|_| unsupported())?;
        let dtype = match (kind, size) {
            ('f', 2 | 4 | 8) => Dtype::Float { size, big },
            ('i', 1 | 2 | 4 | 8) => Dtype::Int { size, big },
            ('u', 1 | 2 | 4 | 8) => Dtype::UInt { size, big },
            ('b', 1) => Dtype::Bool,
            _ => return Err(unsupported()),
        };
        Ok(dtype)
    }

    fn size(&self) -> usize {
        match *self {
            Dtype::Float { size, .. } | Dtype::Int { size, .. } | Dtype::UInt { size, .. } => size,
            Dtype::Bool => 1,
            Dtype::Object => 0,
        }
    }

    fn decode(&self, raw: &[u8]) -> IoResult<NpyData> {
        macro_rules! decode_as {
            ($ty:ty, $n:literal, $big:expr) => {
                chunks::<$n>(raw).map(move |b| {
                    if $big {
                        <$ty>::from_be_bytes(b)
                    } else {
                        <$ty>::from_le_bytes(b)
                    }
                })
            };
        }

        let data = match *self {
            Dtype::Float { size: 2, big } => {
                NpyData::Float(decode_as!(u16, 2, big).map(f16_to_f64).collect())
            }
            Dtype::Float { size: 4, big } => {
                NpyData::Float(decode_as!(f32, 4, big).map(f64::from).collect())
            }
            Dtype::Float { big, .. } => NpyData::Float(decode_as!(f64, 8, big).collect()),
            Dtype::Int { size: 1, .. } => NpyData::Int(raw.iter().map(|&b| b as i8 as i64).collect()),
            Dtype::Int { size: 2, big } => NpyData::Int(decode_as!(i16, 2, big).map(i64::from).collect()),
            Dtype::Int { size: 4, big } => NpyData::Int(decode_as!(i32, 4, big).map(i64::from).collect()),
            Dtype::Int { big, .. } => NpyData::Int(decode_as!(i64, 8, big).collect()),
            Dtype::UInt { size: 1, .. } => NpyData::UInt8(raw.to_vec()),
            Dtype::UInt { size: 2, big } => NpyData::Int(decode_as!(u16, 2, big).map(i64::from).collect()),
            Dtype::UInt { size: 4, big } => NpyData::Int(decode_as!(u32, 4, big).map(i64::from).collect()),
            Dtype::UInt { big, .. } => NpyData::Int(
                decode_as!(u64, 8, big)
                    .map(|v| {
                        i64::try_from(v).map_err(|_| {
                            IoError::InvalidFormat(format!("uint64 value {} overflows int64", v))
                        })
                    })
                    .collect::<IoResult<Vec<i64>>>()?,
            ),
            Dtype::Bool => NpyData::Int(raw.iter().map(|&b| (b != 0) as i64).collect()),
            Dtype::Object => return Err(IoError::UnsupportedDtype("|O".to_string())),
        };
        Ok(data)
    }
}

fn chunks<const N: usize>(raw: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    raw.chunks_exact(N).map(|c| {
        let mut out = [0u8; N];
        out.copy_from_slice(c);
        out
    })
}

/// IEEE 754 half precision to double.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = ((bits >> 10) & 0x1f) as i32;
    let frac = (bits & 0x3ff) as f64;
    match exp {
        0 => sign * frac * 2f64.powi(-24),
        0x1f if frac == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    }
}

/// Reorder column-major data into row-major order.
fn fortran_to_c(data: NpyData, shape: &[usize]) -> NpyData {
    fn reorder<T: Clone>(v: Vec<T>, shape: &[usize]) -> Vec<T> {
        let n = v.len();
        let mut out = Vec::with_capacity(n);
        let mut index = vec![0usize; shape.len()];
        for _ in 0..n {
            // column-major offset of the current row-major index
            let mut offset = 0;
            let mut stride = 1;
            for (i, &dim) in shape.iter().enumerate() {
                offset += index[i] * stride;
                stride *= dim;
            }
            out.push(v[offset].clone());
            for axis in (0..shape.len()).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        out
    }

    match data {
        NpyData::Float(v) => NpyData::Float(reorder(v, shape)),
        NpyData::Int(v) => NpyData::Int(reorder(v, shape)),
        NpyData::UInt8(v) => NpyData::UInt8(reorder(v, shape)),
        NpyData::Object(v) => NpyData::Object(reorder(v, shape)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw_npy(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_header_padding() {
        let header = header_string("<f8", &[404, 13]);
        assert_eq!((MAGIC.len() + 4 + header.len()) % 64, 0);
        assert!(header.ends_with('\n'));
        assert!(header.contains("'shape': (404, 13)"));
        assert!(header_string("|u1", &[7]).contains("'shape': (7,)"));
    }

    #[test]
    fn test_parse_header() {
        let h = parse_header("{'descr': '<i4', 'fortran_order': True, 'shape': (2, 3), }  \n")
            .unwrap();
        assert_eq!(h.descr, "<i4");
        assert!(h.fortran_order);
        assert_eq!(h.shape, vec![2, 3]);

        let h = parse_header("{'descr': '|O', 'fortran_order': False, 'shape': (), }").unwrap();
        assert!(h.shape.is_empty());
        assert!(parse_header("{'descr': '<f8'}").is_err());
    }

    #[test]
    fn test_dtype_parse() {
        assert_eq!(Dtype::parse("<f8").unwrap(), Dtype::Float { size: 8, big: false });
        assert_eq!(Dtype::parse(">i2").unwrap(), Dtype::Int { size: 2, big: true });
        assert_eq!(Dtype::parse("|u1").unwrap(), Dtype::UInt { size: 1, big: false });
        assert_eq!(Dtype::parse("|O").unwrap(), Dtype::Object);
        assert!(matches!(Dtype::parse("<c16"), Err(IoError::UnsupportedDtype(_))));
    }

    #[test]
    fn test_read_little_endian_floats() {
        let payload: Vec<u8> = [1.5f64, -2.0, 3.25].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_npy("{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }\n", &payload);
        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.shape, vec![3]);
        assert_eq!(arr.data, NpyData::Float(vec![1.5, -2.0, 3.25]));
    }

    #[test]
    fn test_read_big_endian_ints() {
        let payload: Vec<u8> = [7i32, -1].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = raw_npy("{'descr': '>i4', 'fortran_order': False, 'shape': (2,), }\n", &payload);
        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.data, NpyData::Int(vec![7, -1]));
    }

    #[test]
    fn test_read_version2_header() {
        let header = "{'descr': '|u1', 'fortran_order': False, 'shape': (2,), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[9, 200]);
        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.data, NpyData::UInt8(vec![9, 200]));
    }

    #[test]
    fn test_oversized_shape() {
        let bytes = raw_npy(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (18446744073709551615, 2), }\n",
            &[0; 16],
        );
        assert!(matches!(read_npy(&mut Cursor::new(bytes)), Err(IoError::InvalidFormat(_))));

        // fits in usize, but the bytes are not there
        let bytes = raw_npy(
            "{'descr': '<i8', 'fortran_order': False, 'shape': (1000000000000,), }\n",
            &[0; 16],
        );
        assert!(matches!(read_npy(&mut Cursor::new(bytes)), Err(IoError::InvalidFormat(_))));
        assert_eq!(checked_numel(&[usize::MAX, 2]), None);
        assert_eq!(checked_numel(&[]), Some(1));
    }

    #[test]
    fn test_fortran_order() {
        // [[1, 2, 3], [4, 5, 6]] stored column-major
        let payload: Vec<u8> = [1i64, 4, 2, 5, 3, 6].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = raw_npy("{'descr': '<i8', 'fortran_order': True, 'shape': (2, 3), }\n", &payload);
        let arr = read_npy(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(arr.data, NpyData::Int(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_half_precision() {
        assert_eq!(f16_to_f64(0x3c00), 1.0);
        assert_eq!(f16_to_f64(0xc000), -2.0);
        assert_eq!(f16_to_f64(0x3800), 0.5);
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = raw_npy("{'descr': '<f8', 'fortran_order': False, 'shape': (4,), }\n", &[0; 8]);
        assert!(matches!(read_npy(&mut Cursor::new(bytes)), Err(IoError::InvalidFormat(_))));
        assert!(matches!(
            read_npy(&mut Cursor::new(b"NOTNPY00".to_vec())),
            Err(IoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_write_then_read_matrix() {
        let arr = NpyArray::float(vec![2, 2], vec![0.1, 0.2, 0.3, 0.4]);
        let mut buf = Vec::new();
        arr.write_to(&mut buf).unwrap();
        assert_eq!(read_npy(&mut Cursor::new(buf)).unwrap(), arr);
    }

    #[test]
    fn test_object_array_sequences() {
        let rows = RaggedArray::from_rows(vec![vec![1i64, 2], vec![3, 4, 5]]);
        let mut buf = Vec::new();
        NpyArray::sequences(&rows).write_to(&mut buf).unwrap();

        let arr = read_npy(&mut Cursor::new(buf)).unwrap();
        assert_eq!(arr.descr, "|O");
        assert_eq!(arr.shape, vec![2]);
        assert!(arr.clone().into_tensor::<i64>().is_err());
        assert_eq!(arr.into_sequences().unwrap(), rows);
    }

    #[test]
    fn test_into_tensor() {
        let t: Tensor<f64> = NpyArray::int(vec![2, 2], vec![1, 2, 3, 4]).into_tensor().unwrap();
        assert_eq!(t.shape_vec(), vec![2, 2]);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);

        let rows = NpyArray::int(vec![2, 2], vec![1, 2, 3, 4]).into_sequences().unwrap();
        assert_eq!(rows.to_vecs(), vec![vec![1, 2], vec![3, 4]]);
    }
}
