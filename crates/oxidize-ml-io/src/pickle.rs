//! Restricted pickle codec for NumPy object arrays.
//!
//! `.npy` files with an object dtype (`|O`) store their payload as a pickled
//! `ndarray`. Ragged integer datasets are saved this way: a 1-D object array
//! whose elements are Python lists of ints. The reader below is a small
//! pickle virtual machine that understands the opcodes NumPy emits for such
//! arrays (protocols 2 through 5) and never executes anything: globals and
//! reductions are kept as inert values.

use crate::error::{IoError, IoResult};
use oxidize_ml_core::RaggedArray;
use std::collections::HashMap;

/// A decoded pickle value.
#[derive(Debug, Clone, PartialEq)]
pub enum PickleValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PickleValue>),
    Tuple(Vec<PickleValue>),
    Dict(Vec<(PickleValue, PickleValue)>),
    Global { module: String, name: String },
    Reduce {
        callable: Box<PickleValue>,
        args: Box<PickleValue>,
    },
    Build {
        object: Box<PickleValue>,
        state: Box<PickleValue>,
    },
}

impl PickleValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PickleValue::Int(v) => Some(*v),
            PickleValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PickleValue::None => "None",
            PickleValue::Bool(_) => "bool",
            PickleValue::Int(_) => "int",
            PickleValue::Float(_) => "float",
            PickleValue::Str(_) => "str",
            PickleValue::Bytes(_) => "bytes",
            PickleValue::List(_) => "list",
            PickleValue::Tuple(_) => "tuple",
            PickleValue::Dict(_) => "dict",
            PickleValue::Global { .. } => "global",
            PickleValue::Reduce { .. } => "reduce",
            PickleValue::Build { .. } => "object",
        }
    }
}

// ─── Opcodes ────────────────────────────────────────────────────────────────

const MARK: u8 = b'(';
const STOP: u8 = b'.';
const POP: u8 = b'0';
const POP_MARK: u8 = b'1';
const DUP: u8 = b'2';
const FLOAT: u8 = b'F';
const INT: u8 = b'I';
const BININT: u8 = b'J';
const BININT1: u8 = b'K';
const LONG: u8 = b'L';
const BININT2: u8 = b'M';
const NONE: u8 = b'N';
const REDUCE: u8 = b'R';
const BINSTRING: u8 = b'T';
const SHORT_BINSTRING: u8 = b'U';
const BINUNICODE: u8 = b'X';
const APPEND: u8 = b'a';
const BUILD: u8 = b'b';
const GLOBAL: u8 = b'c';
const DICT: u8 = b'd';
const EMPTY_DICT: u8 = b'}';
const APPENDS: u8 = b'e';
const GET: u8 = b'g';
const BINGET: u8 = b'h';
const LONG_BINGET: u8 = b'j';
const LIST: u8 = b'l';
const EMPTY_LIST: u8 = b']';
const PUT: u8 = b'p';
const BINPUT: u8 = b'q';
const LONG_BINPUT: u8 = b'r';
const SETITEM: u8 = b's';
const TUPLE: u8 = b't';
const EMPTY_TUPLE: u8 = b')';
const SETITEMS: u8 = b'u';
const BINFLOAT: u8 = b'G';
const PROTO: u8 = 0x80;
const NEWOBJ: u8 = 0x81;
const TUPLE1: u8 = 0x85;
const TUPLE2: u8 = 0x86;
const TUPLE3: u8 = 0x87;
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
const LONG1: u8 = 0x8a;
const LONG4: u8 = 0x8b;
const BINBYTES: u8 = b'B';
const SHORT_BINBYTES: u8 = b'C';
const SHORT_BINUNICODE: u8 = 0x8c;
const BINUNICODE8: u8 = 0x8d;
const BINBYTES8: u8 = 0x8e;
const STACK_GLOBAL: u8 = 0x93;
const MEMOIZE: u8 = 0x94;
const FRAME: u8 = 0x95;

const HIGHEST_PROTOCOL: u8 = 5;

// ─── Reader ─────────────────────────────────────────────────────────────────

/// Decode a pickle stream into a value tree.
pub fn loads(input: &[u8]) -> IoResult<PickleValue> {
    Unpickler {
        input,
        pos: 0,
        stack: Vec::new(),
        aliases: Vec::new(),
        marks: Vec::new(),
        memo: HashMap::new(),
    }
    .run()
}

struct Unpickler<'a> {
    input: &'a [u8],
    pos: usize,
    stack: Vec<PickleValue>,
    /// Memo keys bound to each stack slot, parallel to `stack`.
    aliases: Vec<Vec<u32>>,
    marks: Vec<usize>,
    memo: HashMap<u32, Memo>,
}

/// A memo entry follows its stack slot while the value is still there, so
/// containers filled after PUT are fetched complete. It is frozen into a copy
/// once the value is consumed.
enum Memo {
    Live(usize),
    Frozen(PickleValue),
}

fn err(msg: impl Into<String>) -> IoError {
    IoError::Pickle(msg.into())
}

impl<'a> Unpickler<'a> {
    fn take(&mut self, n: usize) -> IoResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| err("unexpected end of pickle stream"))?;
        let input = self.input;
        let bytes = &input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self) -> IoResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn len_u32(&mut self) -> IoResult<usize> {
        Ok(u32::from_le_bytes(self.array::<4>()?) as usize)
    }

    fn len_u64(&mut self) -> IoResult<usize> {
        usize::try_from(u64::from_le_bytes(self.array::<8>()?))
            .map_err(|_| err("length does not fit in memory"))
    }

    fn line(&mut self) -> IoResult<&'a str> {
        let input = self.input;
        let rest = &input[self.pos..];
        let n = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| err("unterminated text argument"))?;
        let text = std::str::from_utf8(&rest[..n]).map_err(|e| err(e.to_string()))?;
        self.pos += n + 1;
        Ok(text)
    }

    fn utf8(&mut self, n: usize) -> IoResult<PickleValue> {
        let bytes = self.take(n)?;
        let text = std::str::from_utf8(bytes).map_err(|e| err(e.to_string()))?;
        Ok(PickleValue::Str(text.to_string()))
    }

    fn bytes(&mut self, n: usize) -> IoResult<PickleValue> {
        Ok(PickleValue::Bytes(self.take(n)?.to_vec()))
    }

    fn push(&mut self, value: PickleValue) {
        self.stack.push(value);
        self.aliases.push(Vec::new());
    }

    /// Remove every stack value from `from` upwards, freezing memo entries
    /// that still point at them.
    fn split_stack(&mut self, from: usize) -> Vec<PickleValue> {
        for (slot, keys) in self.aliases.drain(from..).enumerate() {
            let slot = from + slot;
            for key in keys {
                if let Some(entry) = self.memo.get_mut(&key) {
                    if matches!(entry, Memo::Live(i) if *i == slot) {
                        *entry = Memo::Frozen(self.stack[slot].clone());
                    }
                }
            }
        }
        self.stack.split_off(from)
    }

    fn pop(&mut self) -> IoResult<PickleValue> {
        let from = self
            .stack
            .len()
            .checked_sub(1)
            .ok_or_else(|| err("stack underflow"))?;
        self.split_stack(from)
            .pop()
            .ok_or_else(|| err("stack underflow"))
    }

    fn pop_mark(&mut self) -> IoResult<Vec<PickleValue>> {
        let mark = self.marks.pop().ok_or_else(|| err("missing MARK"))?;
        if mark > self.stack.len() {
            return Err(err("MARK points past the top of the stack"));
        }
        Ok(self.split_stack(mark))
    }

    fn pop_tuple(&mut self, n: usize) -> IoResult<PickleValue> {
        if self.stack.len() < n {
            return Err(err("stack underflow"));
        }
        let items = self.split_stack(self.stack.len() - n);
        Ok(PickleValue::Tuple(items))
    }

    fn top_mut(&mut self) -> IoResult<&mut PickleValue> {
        self.stack.last_mut().ok_or_else(|| err("stack underflow"))
    }

    fn extend_list(&mut self, items: Vec<PickleValue>) -> IoResult<()> {
        match self.top_mut()? {
            PickleValue::List(list) => {
                list.extend(items);
                Ok(())
            }
            other => Err(err(format!("APPEND on a {}", other.kind()))),
        }
    }

    fn set_items(&mut self, items: Vec<PickleValue>) -> IoResult<()> {
        if items.len() % 2 != 0 {
            return Err(err("odd number of dict items"));
        }
        match self.top_mut()? {
            PickleValue::Dict(entries) => {
                let mut it = items.into_iter();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    entries.push((k, v));
                }
                Ok(())
            }
            other => Err(err(format!("SETITEM on a {}", other.kind()))),
        }
    }

    fn put(&mut self, key: u32) -> IoResult<()> {
        let slot = self
            .stack
            .len()
            .checked_sub(1)
            .ok_or_else(|| err("stack underflow"))?;
        self.memo.insert(key, Memo::Live(slot));
        self.aliases[slot].push(key);
        Ok(())
    }

    fn get(&mut self, key: u32) -> IoResult<()> {
        let value = match self.memo.get(&key) {
            Some(Memo::Live(slot)) => self.stack[*slot].clone(),
            Some(Memo::Frozen(value)) => value.clone(),
            None => return Err(err(format!("memo key {key} not found"))),
        };
        self.push(value);
        Ok(())
    }

    fn run(mut self) -> IoResult<PickleValue> {
        loop {
            let op = self.byte()?;
            match op {
                PROTO => {
                    let proto = self.byte()?;
                    if proto > HIGHEST_PROTOCOL {
                        return Err(err(format!("unsupported pickle protocol {proto}")));
                    }
                }
                FRAME => {
                    self.array::<8>()?;
                }
                STOP => return self.pop(),
                MARK => self.marks.push(self.stack.len()),
                POP => {
                    self.pop()?;
                }
                POP_MARK => {
                    self.pop_mark()?;
                }
                DUP => {
                    let top = self.stack.last().ok_or_else(|| err("stack underflow"))?.clone();
                    self.push(top);
                }

                NONE => self.push(PickleValue::None),
                NEWTRUE => self.push(PickleValue::Bool(true)),
                NEWFALSE => self.push(PickleValue::Bool(false)),

                BININT1 => {
                    let v = self.byte()?;
                    self.push(PickleValue::Int(v as i64));
                }
                BININT2 => {
                    let v = u16::from_le_bytes(self.array::<2>()?);
                    self.push(PickleValue::Int(v as i64));
                }
                BININT => {
                    let v = i32::from_le_bytes(self.array::<4>()?);
                    self.push(PickleValue::Int(v as i64));
                }
                LONG1 => {
                    let n = self.byte()? as usize;
                    let v = decode_long(self.take(n)?)?;
                    self.push(PickleValue::Int(v));
                }
                LONG4 => {
                    let n = self.len_u32()?;
                    let v = decode_long(self.take(n)?)?;
                    self.push(PickleValue::Int(v));
                }
                INT => {
                    let text = self.line()?;
                    let value = match text {
                        "00" => PickleValue::Bool(false),
                        "01" => PickleValue::Bool(true),
                        _ => PickleValue::Int(
                            text.parse().map_err(|_| err(format!("bad INT '{text}'")))?,
                        ),
                    };
                    self.push(value);
                }
                LONG => {
                    let text = self.line()?;
                    let v = text
                        .trim_end_matches('L')
                        .parse()
                        .map_err(|_| err(format!("bad LONG '{text}'")))?;
                    self.push(PickleValue::Int(v));
                }
                BINFLOAT => {
                    let v = f64::from_be_bytes(self.array::<8>()?);
                    self.push(PickleValue::Float(v));
                }
                FLOAT => {
                    let text = self.line()?;
                    let v = text.parse().map_err(|_| err(format!("bad FLOAT '{text}'")))?;
                    self.push(PickleValue::Float(v));
                }

                SHORT_BINSTRING | SHORT_BINBYTES => {
                    let n = self.byte()? as usize;
                    let v = self.bytes(n)?;
                    self.push(v);
                }
                BINSTRING | BINBYTES => {
                    let n = self.len_u32()?;
                    let v = self.bytes(n)?;
                    self.push(v);
                }
                BINBYTES8 => {
                    let n = self.len_u64()?;
                    let v = self.bytes(n)?;
                    self.push(v);
                }
                SHORT_BINUNICODE => {
                    let n = self.byte()? as usize;
                    let v = self.utf8(n)?;
                    self.push(v);
                }
                BINUNICODE => {
                    let n = self.len_u32()?;
                    let v = self.utf8(n)?;
                    self.push(v);
                }
                BINUNICODE8 => {
                    let n = self.len_u64()?;
                    let v = self.utf8(n)?;
                    self.push(v);
                }

                EMPTY_TUPLE => self.push(PickleValue::Tuple(Vec::new())),
                TUPLE1 | TUPLE2 | TUPLE3 => {
                    let tuple = self.pop_tuple((op - TUPLE1 + 1) as usize)?;
                    self.push(tuple);
                }
                TUPLE => {
                    let items = self.pop_mark()?;
                    self.push(PickleValue::Tuple(items));
                }
                EMPTY_LIST => self.push(PickleValue::List(Vec::new())),
                LIST => {
                    let items = self.pop_mark()?;
                    self.push(PickleValue::List(items));
                }
                APPEND => {
                    let item = self.pop()?;
                    self.extend_list(vec![item])?;
                }
                APPENDS => {
                    let items = self.pop_mark()?;
                    self.extend_list(items)?;
                }
                EMPTY_DICT => self.push(PickleValue::Dict(Vec::new())),
                DICT => {
                    let items = self.pop_mark()?;
                    self.push(PickleValue::Dict(Vec::new()));
                    self.set_items(items)?;
                }
                SETITEM => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    self.set_items(vec![key, value])?;
                }
                SETITEMS => {
                    let items = self.pop_mark()?;
                    self.set_items(items)?;
                }

                GLOBAL => {
                    let module = self.line()?.to_string();
                    let name = self.line()?.to_string();
                    self.push(PickleValue::Global { module, name });
                }
                STACK_GLOBAL => {
                    let name = self.pop()?;
                    let module = self.pop()?;
                    match (module, name) {
                        (PickleValue::Str(module), PickleValue::Str(name)) => {
                            self.push(PickleValue::Global { module, name })
                        }
                        _ => return Err(err("STACK_GLOBAL expects two strings")),
                    }
                }
                REDUCE | NEWOBJ => {
                    let args = Box::new(self.pop()?);
                    let callable = Box::new(self.pop()?);
                    self.push(PickleValue::Reduce { callable, args });
                }
                BUILD => {
                    let state = Box::new(self.pop()?);
                    let object = Box::new(self.pop()?);
                    self.push(PickleValue::Build { object, state });
                }

                BINPUT => {
                    let key = self.byte()? as u32;
                    self.put(key)?;
                }
                LONG_BINPUT => {
                    let key = u32::from_le_bytes(self.array::<4>()?);
                    self.put(key)?;
                }
                PUT => {
                    let text = self.line()?;
                    let key = text.parse().map_err(|_| err(format!("bad PUT '{text}'")))?;
                    self.put(key)?;
                }
                MEMOIZE => {
                    let key = self.memo.len() as u32;
                    self.put(key)?;
                }
                BINGET => {
                    let key = self.byte()? as u32;
                    self.get(key)?;
                }
                LONG_BINGET => {
                    let key = u32::from_le_bytes(self.array::<4>()?);
                    self.get(key)?;
                }
                GET => {
                    let text = self.line()?;
                    let key = text.parse().map_err(|_| err(format!("bad GET '{text}'")))?;
                    self.get(key)?;
                }

                other => {
                    return Err(err(format!(
                        "unsupported opcode 0x{other:02x} at offset {}",
                        self.pos - 1
                    )))
                }
            }
        }
    }
}

/// Little-endian two's complement integer of up to 8 bytes.
fn decode_long(bytes: &[u8]) -> IoResult<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(err(format!("{}-byte integer does not fit in i64", bytes.len())));
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    let mut buf = if negative { [0xffu8; 8] } else { [0u8; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

// ─── NumPy object arrays ────────────────────────────────────────────────────

/// Shape and flat element list of a pickled `numpy.ndarray`.
///
/// NumPy reduces an array to `_reconstruct(ndarray, (0,), b'b')` followed by a
/// BUILD whose state is `(version, shape, dtype, is_fortran, data)`; for object
/// arrays `data` is a list of the elements.
pub fn object_array_items(value: PickleValue) -> IoResult<(Vec<usize>, Vec<PickleValue>)> {
    let state = match value {
        PickleValue::Build { state, .. } => *state,
        other => {
            return Err(err(format!(
                "expected a pickled ndarray, found a {}",
                other.kind()
            )))
        }
    };
    let mut fields = match state {
        PickleValue::Tuple(fields) if fields.len() == 5 => fields,
        _ => return Err(err("ndarray state is not a 5-tuple")),
    };

    let shape = match &fields[1] {
        PickleValue::Tuple(dims) => dims
            .iter()
            .map(|d| {
                d.as_int()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| err("ndarray shape must hold non-negative ints"))
            })
            .collect::<IoResult<Vec<usize>>>()?,
        _ => return Err(err("ndarray shape is not a tuple")),
    };

    let items = match fields.pop() {
        Some(PickleValue::List(items)) => items,
        Some(other) => {
            return Err(err(format!(
                "ndarray data is a {}, expected an object list",
                other.kind()
            )))
        }
        None => return Err(err("ndarray state is empty")),
    };

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| err(format!("ndarray shape {shape:?} overflows")))?;
    if items.len() != expected {
        return Err(err(format!(
            "ndarray holds {} elements but its shape {:?} needs {}",
            items.len(),
            shape,
            expected
        )));
    }
    Ok((shape, items))
}

/// Interpret object-array elements as integer sequences.
pub fn items_to_sequences(items: &[PickleValue]) -> IoResult<RaggedArray<i64>> {
    let total = items
        .iter()
        .map(|item| match item {
            PickleValue::List(v) | PickleValue::Tuple(v) => v.len(),
            _ => 0,
        })
        .sum();
    let mut out = RaggedArray::with_capacity(items.len(), total);
    for (i, item) in items.iter().enumerate() {
        let row = match item {
            PickleValue::List(v) | PickleValue::Tuple(v) => v,
            other => {
                return Err(err(format!(
                    "element {i} is a {}, expected a list of ints",
                    other.kind()
                )))
            }
        };
        let values = row
            .iter()
            .map(|v| {
                v.as_int()
                    .ok_or_else(|| err(format!("element {i} contains a {}", v.kind())))
            })
            .collect::<IoResult<Vec<i64>>>()?;
        out.push_row(&values);
    }
    Ok(out)
}

// ─── Writer ─────────────────────────────────────────────────────────────────

/// Pickle a ragged integer array as a 1-D NumPy object array of lists
/// (protocol 2, the layout `numpy.save` produces).
pub fn dumps_object_array(rows: &RaggedArray<i64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + rows.total_len() * 3 + rows.len() * 3);
    out.extend_from_slice(&[PROTO, 2]);

    write_global(&mut out, "numpy.core.multiarray", "_reconstruct");
    write_global(&mut out, "numpy", "ndarray");
    write_int(&mut out, 0);
    out.push(TUPLE1);
    write_short_binstring(&mut out, b"b");
    out.push(TUPLE3);
    out.push(REDUCE);

    // state: (1, (n,), dtype('O8'), False, [rows...])
    out.push(MARK);
    write_int(&mut out, 1);
    write_int(&mut out, rows.len() as i64);
    out.push(TUPLE1);

    write_global(&mut out, "numpy", "dtype");
    write_short_binstring(&mut out, b"O8");
    out.push(NEWFALSE);
    out.push(NEWTRUE);
    out.push(TUPLE3);
    out.push(REDUCE);
    out.push(MARK);
    write_int(&mut out, 3);
    write_short_binstring(&mut out, b"|");
    out.extend_from_slice(&[NONE, NONE, NONE]);
    write_int(&mut out, -1);
    write_int(&mut out, -1);
    write_int(&mut out, 63);
    out.push(TUPLE);
    out.push(BUILD);

    out.push(NEWFALSE);
    out.push(EMPTY_LIST);
    out.push(MARK);
    for row in rows.iter() {
        out.push(EMPTY_LIST);
        if !row.is_empty() {
            out.push(MARK);
            for &v in row {
                write_int(&mut out, v);
            }
            out.push(APPENDS);
        }
    }
    out.push(APPENDS);
    out.push(TUPLE);
    out.push(BUILD);
    out.push(STOP);
    out
}

fn write_global(out: &mut Vec<u8>, module: &str, name: &str) {
    out.push(GLOBAL);
    out.extend_from_slice(module.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(name.as_bytes());
    out.push(b'\n');
}

fn write_short_binstring(out: &mut Vec<u8>, s: &[u8]) {
    out.push(SHORT_BINSTRING);
    out.push(s.len() as u8);
    out.extend_from_slice(s);
}

fn write_int(out: &mut Vec<u8>, v: i64) {
    if (0..=0xff).contains(&v) {
        out.push(BININT1);
        out.push(v as u8);
    } else if (0..=0xffff).contains(&v) {
        out.push(BININT2);
        out.extend_from_slice(&(v as u16).to_le_bytes());
    } else if let Ok(v) = i32::try_from(v) {
        out.push(BININT);
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        out.push(LONG1);
        out.push(8);
        out.extend_from_slice(&v.to_le_bytes());
    }
}
