use std::fmt;

use serde::{Deserialize, Serialize};

/// Trait bound for scalar types storable in a tensor.
/// Supports unsigned bytes, signed integers and floats.
pub trait Element:
    Copy
    + Clone
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Serialize
    + for<'de> Deserialize<'de>
    + 'static
{
    /// Short NumPy-style name, used in summaries and error messages.
    const NAME: &'static str;

    fn from_f64(v: f64) -> Self;
    fn from_i64(v: i64) -> Self;
    fn to_f64(self) -> f64;
}

impl Element for u8 {
    const NAME: &'static str = "uint8";

    #[inline] fn from_f64(v: f64) -> Self { v as u8 }
    #[inline] fn from_i64(v: i64) -> Self { v as u8 }
    #[inline] fn to_f64(self) -> f64 { self as f64 }
}

impl Element for i32 {
    const NAME: &'static str = "int32";

    #[inline] fn from_f64(v: f64) -> Self { v as i32 }
    #[inline] fn from_i64(v: i64) -> Self { v as i32 }
    #[inline] fn to_f64(self) -> f64 { self as f64 }
}

impl Element for i64 {
    const NAME: &'static str = "int64";

    #[inline] fn from_f64(v: f64) -> Self { v as i64 }
    #[inline] fn from_i64(v: i64) -> Self { v }
    #[inline] fn to_f64(self) -> f64 { self as f64 }
}

impl Element for f32 {
    const NAME: &'static str = "float32";

    #[inline] fn from_f64(v: f64) -> Self { v as f32 }
    #[inline] fn from_i64(v: i64) -> Self { v as f32 }
    #[inline] fn to_f64(self) -> f64 { self as f64 }
}

impl Element for f64 {
    const NAME: &'static str = "float64";

    #[inline] fn from_f64(v: f64) -> Self { v }
    #[inline] fn from_i64(v: i64) -> Self { v as f64 }
    #[inline] fn to_f64(self) -> f64 { self }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(u8::from_i64(200), 200u8);
        assert_eq!(i64::from_f64(3.0), 3);
        assert_eq!(f64::from_i64(-4), -4.0);
        assert_eq!(7u8.to_f64(), 7.0);
    }

    #[test]
    fn test_names() {
        assert_eq!(<u8 as Element>::NAME, "uint8");
        assert_eq!(<f64 as Element>::NAME, "float64");
    }
}
