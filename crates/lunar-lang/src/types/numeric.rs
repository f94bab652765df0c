//! Host numeric widths and their conversion table.
//!
//! Each `NumericKind` owns one `KindOps` entry: construction from a script
//! number, exact conversion from another primitive, and string parsing. The
//! wrapper bridge only ever goes through this table.

use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::ScriptError;
use crate::interop::host::HostType;

pub const DEFAULT_RADIX: u32 = 10;

// ─── Kinds ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Decimal,
}

impl NumericKind {
    pub const ALL: [NumericKind; 10] = [
        Self::SByte, Self::Byte, Self::Int16, Self::UInt16, Self::Int32,
        Self::UInt32, Self::Int64, Self::UInt64, Self::Single, Self::Decimal,
    ];

    /// Name of the type constructor scripts see.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SByte   => "SByte",
            Self::Byte    => "Byte",
            Self::Int16   => "Int16",
            Self::UInt16  => "UInt16",
            Self::Int32   => "Int32",
            Self::UInt32  => "UInt32",
            Self::Int64   => "Int64",
            Self::UInt64  => "UInt64",
            Self::Single  => "Single",
            Self::Decimal => "Decimal",
        }
    }

    pub fn index(&self) -> usize { *self as usize }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn host_type(&self) -> HostType {
        match self {
            Self::SByte   => HostType::of::<i8>(),
            Self::Byte    => HostType::of::<u8>(),
            Self::Int16   => HostType::of::<i16>(),
            Self::UInt16  => HostType::of::<u16>(),
            Self::Int32   => HostType::of::<i32>(),
            Self::UInt32  => HostType::of::<u32>(),
            Self::Int64   => HostType::of::<i64>(),
            Self::UInt64  => HostType::of::<u64>(),
            Self::Single  => HostType::of::<f32>(),
            Self::Decimal => HostType::of::<Decimal>(),
        }
    }

    pub fn from_host_type(ty: &HostType) -> Option<Self> {
        Self::ALL.into_iter().find(|k| &k.host_type() == ty)
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Single | Self::Decimal)
    }

    pub fn is_signed(&self) -> bool {
        !matches!(self, Self::Byte | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// 64-bit widths can also be built from two 32-bit halves.
    pub fn has_low_high_ctor(&self) -> bool {
        matches!(self, Self::Int64 | Self::UInt64)
    }

    pub fn ops(&self) -> &'static KindOps {
        &KIND_OPS[self.index()]
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Primitive values ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Decimal(Decimal),
}

impl Primitive {
    pub fn kind(&self) -> NumericKind {
        match self {
            Self::SByte(_)   => NumericKind::SByte,
            Self::Byte(_)    => NumericKind::Byte,
            Self::Int16(_)   => NumericKind::Int16,
            Self::UInt16(_)  => NumericKind::UInt16,
            Self::Int32(_)   => NumericKind::Int32,
            Self::UInt32(_)  => NumericKind::UInt32,
            Self::Int64(_)   => NumericKind::Int64,
            Self::UInt64(_)  => NumericKind::UInt64,
            Self::Single(_)  => NumericKind::Single,
            Self::Decimal(_) => NumericKind::Decimal,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match *self {
            Self::SByte(v)   => v as f64,
            Self::Byte(v)    => v as f64,
            Self::Int16(v)   => v as f64,
            Self::UInt16(v)  => v as f64,
            Self::Int32(v)   => v as f64,
            Self::UInt32(v)  => v as f64,
            Self::Int64(v)   => v as f64,
            Self::UInt64(v)  => v as f64,
            Self::Single(v)  => v as f64,
            Self::Decimal(v) => v.to_f64().unwrap_or(f64::NAN),
        }
    }

    /// The integer value, for integer widths.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Self::SByte(v)  => Some(v.into()),
            Self::Byte(v)   => Some(v.into()),
            Self::Int16(v)  => Some(v.into()),
            Self::UInt16(v) => Some(v.into()),
            Self::Int32(v)  => Some(v.into()),
            Self::UInt32(v) => Some(v.into()),
            Self::Int64(v)  => Some(v.into()),
            Self::UInt64(v) => Some(v.into()),
            Self::Single(_) | Self::Decimal(_) => None,
        }
    }

    /// Two's-complement upper-case hexadecimal, for integer widths.
    pub fn to_hex_string(&self) -> Option<String> {
        match *self {
            Self::SByte(v)  => Some(format!("{v:X}")),
            Self::Byte(v)   => Some(format!("{v:X}")),
            Self::Int16(v)  => Some(format!("{v:X}")),
            Self::UInt16(v) => Some(format!("{v:X}")),
            Self::Int32(v)  => Some(format!("{v:X}")),
            Self::UInt32(v) => Some(format!("{v:X}")),
            Self::Int64(v)  => Some(format!("{v:X}")),
            Self::UInt64(v) => Some(format!("{v:X}")),
            Self::Single(_) | Self::Decimal(_) => None,
        }
    }

    pub fn host_type(&self) -> HostType { self.kind().host_type() }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SByte(v)   => write!(f, "{v}"),
            Self::Byte(v)    => write!(f, "{v}"),
            Self::Int16(v)   => write!(f, "{v}"),
            Self::UInt16(v)  => write!(f, "{v}"),
            Self::Int32(v)   => write!(f, "{v}"),
            Self::UInt32(v)  => write!(f, "{v}"),
            Self::Int64(v)   => write!(f, "{v}"),
            Self::UInt64(v)  => write!(f, "{v}"),
            Self::Single(v)  => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! primitive_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Primitive {
            fn from(v: $ty) -> Self { Self::$variant(v) }
        })*
    };
}

primitive_from! {
    i8 => SByte, u8 => Byte, i16 => Int16, u16 => UInt16, i32 => Int32,
    u32 => UInt32, i64 => Int64, u64 => UInt64, f32 => Single, Decimal => Decimal,
}

// ─── Per-kind operations ──────────────────────────────────────────────────────

/// Build from a script number. Integer widths truncate and saturate.
pub type FromF64Fn = fn(f64) -> Result<Primitive, ScriptError>;

/// Exact conversion from any primitive; unrepresentable values overflow.
pub type ConvertFn = fn(&Primitive) -> Result<Primitive, ScriptError>;

/// Parse text with an optional radix.
pub type ParseFn = fn(&str, Option<u32>) -> Result<Primitive, ScriptError>;

pub struct KindOps {
    pub from_f64: FromF64Fn,
    pub convert:  ConvertFn,
    pub parse:    ParseFn,
}

static KIND_OPS: [KindOps; 10] = [
    KindOps { from_f64: sbyte::from_f64,  convert: sbyte::convert,  parse: sbyte::parse },
    KindOps { from_f64: byte::from_f64,   convert: byte::convert,   parse: byte::parse },
    KindOps { from_f64: int16::from_f64,  convert: int16::convert,  parse: int16::parse },
    KindOps { from_f64: uint16::from_f64, convert: uint16::convert, parse: uint16::parse },
    KindOps { from_f64: int32::from_f64,  convert: int32::convert,  parse: int32::parse },
    KindOps { from_f64: uint32::from_f64, convert: uint32::convert, parse: uint32::parse },
    KindOps { from_f64: int64::from_f64,  convert: int64::convert,  parse: int64::parse },
    KindOps { from_f64: uint64::from_f64, convert: uint64::convert, parse: uint64::parse },
    KindOps { from_f64: single::from_f64, convert: single::convert, parse: single::parse },
    KindOps { from_f64: decimal::from_f64, convert: decimal::convert, parse: decimal::parse },
];

// ── Integer widths ───────────────────────────────────────────────────────────

macro_rules! integer_kind {
    ($module:ident, $variant:ident, $int:ty, $bits:ty) => {
        mod $module {
            use super::*;

            const KIND: NumericKind = NumericKind::$variant;

            pub(super) fn from_f64(v: f64) -> Result<Primitive, ScriptError> {
                Ok(Primitive::$variant(v as $int))
            }

            pub(super) fn convert(p: &Primitive) -> Result<Primitive, ScriptError> {
                let wide = integral_value(p, KIND)?;
                <$int>::try_from(wide)
                    .map(Primitive::$variant)
                    .map_err(|_| overflow(p, KIND))
            }

            pub(super) fn parse(s: &str, radix: Option<u32>) -> Result<Primitive, ScriptError> {
                match radix.unwrap_or(DEFAULT_RADIX) {
                    10 => {
                        let wide = s.trim().parse::<i128>().map_err(|e| int_error(e.kind(), s, KIND))?;
                        <$int>::try_from(wide)
                            .map(Primitive::$variant)
                            .map_err(|_| ScriptError::Overflow { from: "String", to: KIND.name(), value: s.to_string() })
                    }
                    r @ (2 | 8 | 16) => {
                        let mut digits = s.trim();
                        if r == 16 {
                            digits = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits);
                        }
                        <$bits>::from_str_radix(digits, r)
                            .map(|bits| Primitive::$variant(bits as $int))
                            .map_err(|e| int_error(e.kind(), s, KIND))
                    }
                    r => Err(invalid_radix(r, KIND)),
                }
            }
        }
    };
}

integer_kind!(sbyte,  SByte,  i8,  u8);
integer_kind!(byte,   Byte,   u8,  u8);
integer_kind!(int16,  Int16,  i16, u16);
integer_kind!(uint16, UInt16, u16, u16);
integer_kind!(int32,  Int32,  i32, u32);
integer_kind!(uint32, UInt32, u32, u32);
integer_kind!(int64,  Int64,  i64, u64);
integer_kind!(uint64, UInt64, u64, u64);

// ── Single ───────────────────────────────────────────────────────────────────

mod single {
    use super::*;

    pub(super) fn from_f64(v: f64) -> Result<Primitive, ScriptError> {
        Ok(Primitive::Single(v as f32))
    }

    pub(super) fn convert(p: &Primitive) -> Result<Primitive, ScriptError> {
        match *p {
            Primitive::Single(v) => Ok(Primitive::Single(v)),
            Primitive::Decimal(d) => d.to_f32().map(Primitive::Single).ok_or_else(|| overflow(p, NumericKind::Single)),
            _ => Ok(Primitive::Single(p.to_f64() as f32)),
        }
    }

    pub(super) fn parse(s: &str, radix: Option<u32>) -> Result<Primitive, ScriptError> {
        if let Some(r) = radix {
            return Err(radix_not_supported(r, NumericKind::Single));
        }
        s.trim()
            .parse::<f32>()
            .map(Primitive::Single)
            .map_err(|_| format_error(s, NumericKind::Single))
    }
}

// ── Decimal ──────────────────────────────────────────────────────────────────

mod decimal {
    use super::*;

    pub(super) fn from_f64(v: f64) -> Result<Primitive, ScriptError> {
        Decimal::from_f64(v)
            .map(Primitive::Decimal)
            .ok_or_else(|| ScriptError::Overflow { from: "Number", to: "Decimal", value: v.to_string() })
    }

    pub(super) fn convert(p: &Primitive) -> Result<Primitive, ScriptError> {
        let d = match *p {
            Primitive::Decimal(d) => Some(d),
            Primitive::Single(v) => Decimal::from_f32(v),
            _ => p.as_i128().and_then(Decimal::from_i128),
        };
        d.map(Primitive::Decimal).ok_or_else(|| overflow(p, NumericKind::Decimal))
    }

    pub(super) fn parse(s: &str, radix: Option<u32>) -> Result<Primitive, ScriptError> {
        if let Some(r) = radix {
            return Err(radix_not_supported(r, NumericKind::Decimal));
        }
        let t = s.trim();
        Decimal::from_str(t)
            .or_else(|_| Decimal::from_scientific(t))
            .map(Primitive::Decimal)
            .map_err(|_| format_error(s, NumericKind::Decimal))
    }
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

/// Integral value of `p` on the way to an integer width. Fractions round half
/// to even before the range check.
fn integral_value(p: &Primitive, target: NumericKind) -> Result<i128, ScriptError> {
    match *p {
        Primitive::Single(v) => {
            let r = (v as f64).round_ties_even();
            if !r.is_finite() || r < i128::MIN as f64 || r >= i128::MAX as f64 {
                return Err(overflow(p, target));
            }
            Ok(r as i128)
        }
        Primitive::Decimal(d) => d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i128()
            .ok_or_else(|| overflow(p, target)),
        _ => p.as_i128().ok_or_else(|| overflow(p, target)),
    }
}

fn overflow(p: &Primitive, target: NumericKind) -> ScriptError {
    ScriptError::Overflow { from: p.kind().name(), to: target.name(), value: p.to_string() }
}

fn format_error(s: &str, target: NumericKind) -> ScriptError {
    ScriptError::Format { input: s.to_string(), target: target.name() }
}

fn int_error(kind: &IntErrorKind, s: &str, target: NumericKind) -> ScriptError {
    match kind {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            ScriptError::Overflow { from: "String", to: target.name(), value: s.to_string() }
        }
        _ => format_error(s, target),
    }
}

fn invalid_radix(radix: u32, target: NumericKind) -> ScriptError {
    ScriptError::bad_argument(3, target.name(), format!("invalid base {radix}, expected 2, 8, 10 or 16"))
}

fn radix_not_supported(radix: u32, target: NumericKind) -> ScriptError {
    ScriptError::bad_argument(3, target.name(), format!("base {radix} given, but {target} takes no base"))
}
