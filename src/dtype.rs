use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// DType: semantic scalar kinds
//
// Every tensor buffer holds exactly one Rust element type, and that type maps
// to one DType tag through the `Element` trait. Transcendental arithmetic is
// carried out in f64 and converted back. Sums and products go through the
// exact accumulator `Element::Acc`, so int64 values above 2^53 survive:
//
//   float -> int   truncates toward zero (saturating at the type bounds)
//   int   -> int   saturates at the type bounds
//   float -> bool  truncates, then tests `> 0`
//   bool  -> num   true = 1, false = 0

/// Tag naming the element type of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    /// The dtype used when none is requested.
    pub const DEFAULT: DType = DType::Float64;

    /// Stable name used in serialized records.
    pub fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    /// Whether values of this kind carry a fractional part.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Converts any scalar into this kind.
    ///
    /// # Errors
    /// [`Error::UnsupportedDType`] when a text value is not a number or a
    /// boolean literal.
    pub fn parse(&self, value: impl Into<Scalar>) -> Result<Scalar> {
        let value = value.into();
        Ok(match self {
            DType::Bool => Scalar::Bool(bool::parse(value)?),
            DType::Int32 => Scalar::Int32(i32::parse(value)?),
            DType::Int64 => Scalar::Int64(i64::parse(value)?),
            DType::Float32 => Scalar::Float32(f32::parse(value)?),
            DType::Float64 => Scalar::Float64(f64::parse(value)?),
        })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = Error;

    /// Accepts the stable names plus the boxed-type names older state files use.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bool" | "Boolean" => Ok(DType::Bool),
            "int32" | "Integer" => Ok(DType::Int32),
            "int64" | "Long" => Ok(DType::Int64),
            "float32" | "Float" => Ok(DType::Float32),
            "float64" | "Double" => Ok(DType::Float64),
            other => Err(Error::UnsupportedDType {
                value: other.to_string(),
                dtype: DType::DEFAULT,
            }),
        }
    }
}

/// A single loosely typed value, the input side of [`Element::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
}

impl Scalar {
    /// Numeric value of this scalar.
    ///
    /// # Errors
    /// [`Error::UnsupportedDType`] for text that is neither a number nor
    /// `true`/`false`.
    pub fn as_f64(&self, target: DType) -> Result<f64> {
        match self {
            Scalar::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Scalar::Int32(v) => Ok(f64::from(*v)),
            Scalar::Int64(v) => Ok(*v as f64),
            Scalar::Float32(v) => Ok(f64::from(*v)),
            Scalar::Float64(v) => Ok(*v),
            Scalar::Text(s) => {
                let trimmed = s.trim();
                match trimmed {
                    "true" => Ok(1.0),
                    "false" => Ok(0.0),
                    _ => trimmed.parse::<f64>().map_err(|_| Error::UnsupportedDType {
                        value: s.clone(),
                        dtype: target,
                    }),
                }
            }
        }
    }
}

macro_rules! scalar_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Scalar::$variant(v)
            }
        })*
    };
}

scalar_from!(bool => Bool, i32 => Int32, i64 => Int64, f32 => Float32, f64 => Float64, String => Text);

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

// Element: binds a Rust type to its DType tag
//
// Kernels are written once against this trait. Float math reads elements as
// f64 and converts back with `from_f64`; add, sub, mul and matmul accumulate
// in `Acc`, which is wide enough to hold the exact result before narrowing.

/// Rust types that can be stored in a tensor buffer.
pub trait Element:
    Copy + Send + Sync + PartialEq + PartialOrd + Default + fmt::Debug + 'static
{
    /// The tag for this element type.
    const DTYPE: DType;

    /// Widens to f64.
    fn to_f64(self) -> f64;

    /// Narrows from f64 following the cast rules of this module.
    fn from_f64(v: f64) -> Self;

    /// Converts a whole number without passing through f64.
    fn from_i64(v: i64) -> Self;

    /// Whole-number value; floats truncate toward zero and saturate.
    fn to_i64(self) -> i64;

    /// Exact accumulator for sums and products.
    type Acc: Copy + Send + Sync + Default;

    /// Widens into the accumulator.
    fn widen(self) -> Self::Acc;

    /// Narrows an accumulated value, saturating for integers.
    fn narrow(acc: Self::Acc) -> Self;

    /// Accumulator addition; integer accumulators saturate.
    fn acc_add(x: Self::Acc, y: Self::Acc) -> Self::Acc;

    fn acc_sub(x: Self::Acc, y: Self::Acc) -> Self::Acc;

    fn acc_mul(x: Self::Acc, y: Self::Acc) -> Self::Acc;

    /// Parses any scalar into this element type.
    ///
    /// Whole numbers, including integral text, keep every digit.
    fn parse(value: impl Into<Scalar>) -> Result<Self> {
        match value.into() {
            Scalar::Bool(b) => Ok(Self::from_i64(i64::from(b))),
            Scalar::Int32(v) => Ok(Self::from_i64(i64::from(v))),
            Scalar::Int64(v) => Ok(Self::from_i64(v)),
            Scalar::Text(s) if !Self::DTYPE.is_float() => match s.trim().parse::<i64>() {
                Ok(v) => Ok(Self::from_i64(v)),
                Err(_) => Scalar::Text(s).as_f64(Self::DTYPE).map(Self::from_f64),
            },
            other => other.as_f64(Self::DTYPE).map(Self::from_f64),
        }
    }

    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    fn one() -> Self {
        Self::from_f64(1.0)
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;
    type Acc = f64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    #[allow(clippy::cast_precision_loss)]
    fn from_i64(v: i64) -> Self {
        v as f64
    }
    #[allow(clippy::cast_possible_truncation)]
    fn to_i64(self) -> i64 {
        self as i64
    }
    fn widen(self) -> f64 {
        self
    }
    fn narrow(acc: f64) -> Self {
        acc
    }
    fn acc_add(x: f64, y: f64) -> f64 {
        x + y
    }
    fn acc_sub(x: f64, y: f64) -> f64 {
        x - y
    }
    fn acc_mul(x: f64, y: f64) -> f64 {
        x * y
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;
    type Acc = f64;
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    #[allow(clippy::cast_precision_loss)]
    fn from_i64(v: i64) -> Self {
        v as f32
    }
    #[allow(clippy::cast_possible_truncation)]
    fn to_i64(self) -> i64 {
        self as i64
    }
    fn widen(self) -> f64 {
        f64::from(self)
    }
    #[allow(clippy::cast_possible_truncation)]
    fn narrow(acc: f64) -> Self {
        acc as f32
    }
    fn acc_add(x: f64, y: f64) -> f64 {
        x + y
    }
    fn acc_sub(x: f64, y: f64) -> f64 {
        x - y
    }
    fn acc_mul(x: f64, y: f64) -> f64 {
        x * y
    }
}

impl Element for i64 {
    const DTYPE: DType = DType::Int64;
    type Acc = i128;
    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        self as f64
    }
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v as i64
    }
    fn from_i64(v: i64) -> Self {
        v
    }
    fn to_i64(self) -> i64 {
        self
    }
    fn widen(self) -> i128 {
        i128::from(self)
    }
    fn narrow(acc: i128) -> Self {
        i64::try_from(acc).unwrap_or(if acc < 0 { i64::MIN } else { i64::MAX })
    }
    fn acc_add(x: i128, y: i128) -> i128 {
        x.saturating_add(y)
    }
    fn acc_sub(x: i128, y: i128) -> i128 {
        x.saturating_sub(y)
    }
    fn acc_mul(x: i128, y: i128) -> i128 {
        x.saturating_mul(y)
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::Int32;
    type Acc = i128;
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(v: f64) -> Self {
        v as i32
    }
    fn from_i64(v: i64) -> Self {
        i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
    }
    fn to_i64(self) -> i64 {
        i64::from(self)
    }
    fn widen(self) -> i128 {
        i128::from(self)
    }
    fn narrow(acc: i128) -> Self {
        i32::try_from(acc).unwrap_or(if acc < 0 { i32::MIN } else { i32::MAX })
    }
    fn acc_add(x: i128, y: i128) -> i128 {
        x.saturating_add(y)
    }
    fn acc_sub(x: i128, y: i128) -> i128 {
        x.saturating_sub(y)
    }
    fn acc_mul(x: i128, y: i128) -> i128 {
        x.saturating_mul(y)
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;
    type Acc = i64;
    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }
    fn from_f64(v: f64) -> Self {
        v.trunc() > 0.0
    }
    fn from_i64(v: i64) -> Self {
        v > 0
    }
    fn to_i64(self) -> i64 {
        i64::from(self)
    }
    fn widen(self) -> i64 {
        i64::from(self)
    }
    fn narrow(acc: i64) -> Self {
        acc > 0
    }
    fn acc_add(x: i64, y: i64) -> i64 {
        x.saturating_add(y)
    }
    fn acc_sub(x: i64, y: i64) -> i64 {
        x.saturating_sub(y)
    }
    fn acc_mul(x: i64, y: i64) -> i64 {
        x.saturating_mul(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for d in [
            DType::Bool,
            DType::Int32,
            DType::Int64,
            DType::Float32,
            DType::Float64,
        ] {
            assert_eq!(d.name().parse::<DType>().unwrap(), d);
        }
        assert_eq!("Double".parse::<DType>().unwrap(), DType::Float64);
        assert!("complex128".parse::<DType>().is_err());
    }

    #[test]
    fn casts_follow_kind_rules() {
        assert_eq!(i32::parse(2.9f64).unwrap(), 2);
        assert_eq!(i32::parse(-2.9f64).unwrap(), -2);
        assert_eq!(i64::parse(true).unwrap(), 1);
        assert!(bool::parse(3i32).unwrap());
        assert!(!bool::parse(0i64).unwrap());
        assert!(!bool::parse(-1.0f64).unwrap());
        assert!(!bool::parse(0.5f64).unwrap());
        assert_eq!(f64::parse(false).unwrap(), 0.0);
        assert_eq!(f32::parse("1.5").unwrap(), 1.5);
    }

    #[test]
    fn bad_text_is_unsupported() {
        let err = f64::parse("twelve").unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDType {
                dtype: DType::Float64,
                ..
            }
        ));
    }

    #[test]
    fn wide_integers_parse_exactly() {
        let big = (1i64 << 53) + 1;
        assert_eq!(i64::parse(big).unwrap(), big);
        assert_eq!(i64::parse(format!("{big}")).unwrap(), big);
        assert_eq!(i64::parse(" -7 ").unwrap(), -7);
        assert_eq!(i32::parse(big).unwrap(), i32::MAX);
        assert_eq!(i64::parse("2.5").unwrap(), 2);
        assert_eq!(DType::Int64.parse(big).unwrap(), Scalar::Int64(big));
    }

    #[test]
    fn narrowing_saturates() {
        assert_eq!(i64::narrow(i128::from(i64::MAX) + 1), i64::MAX);
        assert_eq!(i64::narrow(i128::from(i64::MIN) - 1), i64::MIN);
        assert_eq!(i32::narrow(i128::from(i32::MIN) * 2), i32::MIN);
        assert_eq!(i64::acc_mul(i128::MAX, 2), i128::MAX);
        assert!(bool::narrow(2));
        assert!(!bool::narrow(0));
    }

    #[test]
    fn dtype_parse_produces_tagged_scalar() {
        assert_eq!(DType::Int32.parse(7.8f64).unwrap(), Scalar::Int32(7));
        assert_eq!(DType::Bool.parse("true").unwrap(), Scalar::Bool(true));
    }
}
