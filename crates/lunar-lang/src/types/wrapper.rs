//! Primitive wrapper bridge.
//!
//! A `PrimitiveWrapper` keeps a host numeric value at its exact width while
//! scripts treat it as a number. Every wrapper of a kind shares one metatable
//! providing `__eq`, `__lt` and `__le`; arithmetic goes through the generic
//! operator path via `to_f64`.

use std::fmt;

use crate::error::ScriptError;
use crate::interop::host::{HostObject, StaticType};
use crate::runtime::callback::{CallbackArguments, ExecutionContext};
use crate::runtime::table::{Table, TableRef};
use crate::runtime::value::{DynValue, UserData};
use crate::types::numeric::{NumericKind, Primitive};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveWrapper {
    value: Primitive,
}

impl PrimitiveWrapper {
    pub fn new(value: impl Into<Primitive>) -> Self {
        Self { value: value.into() }
    }

    /// Native conversion from a script number: integer widths truncate toward
    /// zero and saturate at their bounds.
    pub fn from_f64(kind: NumericKind, v: f64) -> Result<Self, ScriptError> {
        (kind.ops().from_f64)(v).map(|value| Self { value })
    }

    /// Exact conversion of another wrapper's value. Narrowing that cannot hold
    /// the value overflows.
    pub fn from_wrapper(kind: NumericKind, other: &PrimitiveWrapper) -> Result<Self, ScriptError> {
        (kind.ops().convert)(&other.value).map(|value| Self { value })
    }

    /// Parse `s` in `radix` (integer widths only, default 10).
    pub fn parse(kind: NumericKind, s: &str, radix: Option<u32>) -> Result<Self, ScriptError> {
        (kind.ops().parse)(s, radix).map(|value| Self { value })
    }

    /// `low | high << 32` from two unsigned 32-bit halves, for the 64-bit widths.
    pub fn from_low_high(kind: NumericKind, low: f64, high: f64) -> Result<Self, ScriptError> {
        let bits = u64::from(to_u32_checked(low)?) | (u64::from(to_u32_checked(high)?) << 32);
        match kind {
            NumericKind::Int64 => Ok(Self::new(bits as i64)),
            NumericKind::UInt64 => Ok(Self::new(bits)),
            other => Err(ScriptError::bad_argument(
                3,
                other.name(),
                "only Int64 and UInt64 take a high word",
            )),
        }
    }

    pub fn kind(&self) -> NumericKind { self.value.kind() }

    pub fn primitive(&self) -> Primitive { self.value }

    pub fn to_f64(&self) -> f64 { self.value.to_f64() }

    pub fn to_hex_string(&self) -> Option<String> { self.value.to_hex_string() }
}

impl fmt::Display for PrimitiveWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

/// The radix argument of a string constructor: a whole number within `u32`.
fn radix_arg(name: &str, v: &DynValue) -> Result<u32, ScriptError> {
    let r = v.to_number().ok_or_else(|| ScriptError::bad_argument_type(3, name, "number", v))?;
    if r.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&r) {
        return Err(ScriptError::bad_argument(3, name, format!("invalid base {r}, expected 2, 8, 10 or 16")));
    }
    Ok(r as u32)
}

/// Round half to even, then require the result to fit a `u32`.
fn to_u32_checked(v: f64) -> Result<u32, ScriptError> {
    let r = v.round_ties_even();
    if !(0.0..=u32::MAX as f64).contains(&r) {
        return Err(ScriptError::Overflow { from: "Number", to: "UInt32", value: v.to_string() });
    }
    Ok(r as u32)
}

// ─── Metatables ───────────────────────────────────────────────────────────────

/// Build the metatable shared by every wrapper of `kind`.
pub(crate) fn build_metatable(kind: NumericKind) -> TableRef {
    let mt = Table::new();
    mt.set("__eq", comparison(kind, "__eq", |a, b| a == b));
    mt.set("__lt", comparison(kind, "__lt", |a, b| a < b));
    mt.set("__le", comparison(kind, "__le", |a, b| a <= b));
    mt
}

fn comparison(kind: NumericKind, event: &'static str, cmp: fn(f64, f64) -> bool) -> DynValue {
    let name = format!("{}{event}", kind.name());
    let fn_name = name.clone();
    DynValue::callback(name, move |_, args| {
        let a = operand(&fn_name, args, 0)?;
        let b = operand(&fn_name, args, 1)?;
        Ok(DynValue::boolean(cmp(a, b)))
    })
}

/// A comparison operand: a wrapper (via `to_f64`) or anything coercible to a number.
fn operand(fn_name: &str, args: &CallbackArguments, index: usize) -> Result<f64, ScriptError> {
    let v = args.get(index);
    if let DynValue::UserData(u) = &v {
        return match u.object().downcast_ref::<PrimitiveWrapper>() {
            Some(w) => Ok(w.to_f64()),
            None => Err(ScriptError::bad_argument(
                index + 1,
                fn_name,
                format!("primitive wrapper expected, got userdata<{}>", u.object().host_type().name()),
            )),
        };
    }
    v.to_number()
        .ok_or_else(|| ScriptError::bad_argument_type(index + 1, fn_name, "number", &v))
}

// ─── Type constructor objects ─────────────────────────────────────────────────

/// The script-visible constructor for `kind`: a static userdata whose `__call`
/// builds wrappers.
pub fn type_object(kind: NumericKind) -> DynValue {
    let mt = Table::new();
    mt.set(
        "__call",
        DynValue::callback(format!("{}__call", kind.name()), move |ctx, args| construct(kind, ctx, args)),
    );
    DynValue::UserData(UserData::with_metatable(HostObject::new(StaticType::new(kind.host_type())), mt))
}

/// `Kind(type, value[, radix | high])`. Argument 0 is the type object itself.
fn construct(kind: NumericKind, ctx: &ExecutionContext, args: &CallbackArguments) -> Result<DynValue, ScriptError> {
    let name = kind.name();
    if args.len() < 2 {
        return Err(ScriptError::value_expected(1, name));
    }
    let wrapper = match args.get(1) {
        DynValue::Number(n) if kind.has_low_high_ctor() && args.len() > 2 => {
            let high = args.get(2);
            let high = high
                .as_number()
                .ok_or_else(|| ScriptError::bad_argument_type(3, name, "number", &high))?;
            PrimitiveWrapper::from_low_high(kind, n, high)?
        }
        DynValue::Number(n) => PrimitiveWrapper::from_f64(kind, n)?,
        DynValue::String(s) => {
            let radix = match args.get(2) {
                DynValue::Nil => None,
                v => Some(radix_arg(name, &v)?),
            };
            PrimitiveWrapper::parse(kind, &s, radix)?
        }
        other => match other.as_primitive_wrapper() {
            Some(w) => PrimitiveWrapper::from_wrapper(kind, w)?,
            None => return Err(ScriptError::value_expected(1, name)),
        },
    };
    Ok(ctx.script().wrap(wrapper))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_compose_sixty_four_bits() {
        let w = PrimitiveWrapper::from_low_high(NumericKind::Int64, 4294967295.0, 4294967295.0).unwrap();
        assert_eq!(w.primitive(), Primitive::Int64(-1));
        let w = PrimitiveWrapper::from_low_high(NumericKind::UInt64, 1.0, 1.0).unwrap();
        assert_eq!(w.primitive(), Primitive::UInt64((1 << 32) | 1));
    }

    #[test]
    fn halves_must_fit_u32() {
        assert!(matches!(
            PrimitiveWrapper::from_low_high(NumericKind::Int64, -1.0, 0.0),
            Err(ScriptError::Overflow { .. })
        ));
        assert!(matches!(
            PrimitiveWrapper::from_low_high(NumericKind::UInt64, 0.0, 4294967296.0),
            Err(ScriptError::Overflow { .. })
        ));
    }

    #[test]
    fn metatable_has_comparisons() {
        let mt = build_metatable(NumericKind::Int32);
        for event in ["__eq", "__lt", "__le"] {
            assert!(mt.get(event).as_function().is_some(), "{event} missing");
        }
        assert_eq!(mt.get("__eq").as_function().map(|f| f.name().to_string()).as_deref(), Some("Int32__eq"));
    }
}
