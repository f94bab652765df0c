//! Standard conversions between script values and host values.
//!
//! Script → host consults the custom converters first and falls back to the
//! rules below when none applies. Host → script does the same with the
//! host-type keyed converters.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::error::ScriptError;
use crate::interop::descriptor::ParamType;
use crate::interop::host::{HostArray, HostType, HostValue, StaticType};
use crate::runtime::callback::CallbackFunction;
use crate::runtime::table::{Table, TableRef};
use crate::runtime::value::DynValue;
use crate::types::numeric::{NumericKind, Primitive};
use crate::types::wrapper::PrimitiveWrapper;
use crate::Script;

/// Where a conversion happens, for error messages.
#[derive(Debug, Clone, Copy)]
pub struct ArgSite<'a> {
    pub function: &'a str,
    /// 1-based argument position.
    pub index:    usize,
}

// ─── Script → host ────────────────────────────────────────────────────────────

/// Convert `value` for a parameter of type `ty`. Nil (or a missing argument)
/// takes `default` when the parameter declares one.
pub fn to_host(
    script: &Script,
    value: &DynValue,
    ty: &ParamType,
    default: Option<&HostValue>,
    site: ArgSite<'_>,
) -> Result<HostValue, ScriptError> {
    let value = value.first();

    let custom = ty
        .host_type()
        .and_then(|host_type| script.converters().lookup_script_to_host(&value, host_type))
        .and_then(|convert| convert(&value));
    if let Some(v) = custom {
        return Ok(v);
    }

    if let (true, Some(d)) = (value.is_nil(), default) {
        return Ok(d.clone());
    }

    standard_to_host(script, &value, ty, site)
}

fn standard_to_host(
    script: &Script,
    value: &DynValue,
    ty: &ParamType,
    site: ArgSite<'_>,
) -> Result<HostValue, ScriptError> {
    let mismatch = |expected: &str| ScriptError::bad_argument_type(site.index, site.function, expected, value);

    match ty {
        ParamType::Dyn => Ok(HostValue::Dyn(value.clone())),
        ParamType::Any | ParamType::Generic(_) => Ok(natural(value)),
        ParamType::Bool => Ok(HostValue::Bool(value.is_truthy())),
        ParamType::Number => value.to_number().map(HostValue::Number).ok_or_else(|| mismatch("number")),
        ParamType::String => match value {
            DynValue::String(s) => Ok(HostValue::Str(s.to_string())),
            _ => value.to_concat_string().map(HostValue::Str).ok_or_else(|| mismatch("string")),
        },
        ParamType::Primitive(kind) => match value {
            DynValue::Number(n) => number_to_primitive(*kind, *n).map(HostValue::Primitive),
            _ => match value.as_primitive_wrapper() {
                Some(w) => PrimitiveWrapper::from_wrapper(*kind, w).map(|w| HostValue::Primitive(w.primitive())),
                None => Err(mismatch("number")),
            },
        },
        ParamType::Object(expected) => match value {
            DynValue::Nil => Ok(HostValue::Null),
            DynValue::UserData(u) if u.object().host_type() == *expected => Ok(HostValue::Object(u.object().clone())),
            _ => Err(mismatch(format!("userdata<{}>", expected.name()).as_str())),
        },
        ParamType::Table => match value {
            DynValue::Table(_) => Ok(HostValue::Dyn(value.clone())),
            _ => Err(mismatch("table")),
        },
        ParamType::Function => match value {
            DynValue::Function(_) => Ok(HostValue::Dyn(value.clone())),
            _ => Err(mismatch("function")),
        },
        ParamType::TypeToken => static_type_of(value)
            .map(HostValue::Type)
            .ok_or_else(|| mismatch("type")),
        ParamType::Nullable(inner) => match value {
            DynValue::Nil => Ok(HostValue::Null),
            _ => standard_to_host(script, value, inner, site),
        },
        ParamType::Array(element) => match value {
            DynValue::Table(t) => {
                let items = t
                    .array_values()
                    .iter()
                    .map(|v| to_host(script, v, element, None, site))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(HostValue::Array(HostArray::new((**element).clone(), items)))
            }
            DynValue::UserData(u) => match u.object().downcast_ref::<HostArray>() {
                Some(a) if a.element == **element => Ok(HostValue::Array(a.clone())),
                _ => Err(mismatch("array")),
            },
            _ => Err(mismatch("table")),
        },
        ParamType::Script | ParamType::Context | ParamType::Arguments | ParamType::Pointer => Err(
            ScriptError::bad_argument(site.index, site.function, "parameter cannot be bound from a script value"),
        ),
    }
}

/// Host form of a script value when the parameter does not constrain it.
pub fn natural(value: &DynValue) -> HostValue {
    match value {
        DynValue::Nil => HostValue::Null,
        DynValue::Boolean(b) => HostValue::Bool(*b),
        DynValue::Number(n) => HostValue::Number(*n),
        DynValue::String(s) => HostValue::Str(s.to_string()),
        DynValue::UserData(u) => {
            let object = u.object();
            if let Some(w) = object.downcast_ref::<PrimitiveWrapper>() {
                HostValue::Primitive(w.primitive())
            } else if let Some(s) = object.downcast_ref::<StaticType>() {
                HostValue::Type(s.host_type())
            } else if let Some(a) = object.downcast_ref::<HostArray>() {
                HostValue::Array(a.clone())
            } else {
                HostValue::Object(object.clone())
            }
        }
        DynValue::Tuple(_) => natural(&value.first()),
        _ => HostValue::Dyn(value.clone()),
    }
}

/// Runtime host type of a script value, as a generic slot infers it.
/// Nil has none.
pub fn runtime_type_of(value: &DynValue) -> Option<HostType> {
    match value {
        DynValue::Nil => None,
        DynValue::Boolean(_) => Some(HostType::of::<bool>()),
        DynValue::Number(_) => Some(HostType::of::<f64>()),
        DynValue::String(_) => Some(HostType::of::<String>()),
        DynValue::Table(_) => Some(HostType::of::<Table>()),
        DynValue::Function(_) => Some(HostType::of::<CallbackFunction>()),
        DynValue::UserData(u) => Some(match value.as_primitive_wrapper() {
            Some(w) => w.kind().host_type(),
            None => u.object().host_type(),
        }),
        DynValue::Tuple(_) => runtime_type_of(&value.first()),
        DynValue::TailCallRequest(_) => None,
    }
}

/// The host type a static userdata stands for.
pub fn static_type_of(value: &DynValue) -> Option<HostType> {
    value
        .as_user_data()?
        .object()
        .downcast_ref::<StaticType>()
        .map(StaticType::host_type)
}

/// Checked conversion of a script number to an integer width: rounds half to
/// even and overflows outside the width's range. Floating widths convert natively.
pub fn number_to_primitive(kind: NumericKind, n: f64) -> Result<Primitive, ScriptError> {
    if !kind.is_integer() {
        return (kind.ops().from_f64)(n);
    }
    let overflow = || ScriptError::Overflow { from: "Number", to: kind.name(), value: n.to_string() };
    let rounded = Decimal::from_f64(n.round_ties_even()).ok_or_else(overflow)?;
    (kind.ops().convert)(&Primitive::Decimal(rounded)).map_err(|_| overflow())
}

// ─── Host → script ────────────────────────────────────────────────────────────

pub fn to_script(script: &Script, value: HostValue) -> DynValue {
    let custom = value
        .host_type()
        .and_then(|host_type| script.converters().lookup_host_to_script(host_type));
    if let Some(convert) = custom {
        return convert(script, &value);
    }

    match value {
        HostValue::Void | HostValue::Null => DynValue::Nil,
        HostValue::Bool(b) => DynValue::Boolean(b),
        HostValue::Number(n) => DynValue::Number(n),
        HostValue::Primitive(p) => script.wrap_primitive(p),
        HostValue::Str(s) => DynValue::from(s),
        HostValue::Object(o) => script.user_data(o),
        HostValue::Array(a) => DynValue::Table(array_to_table(script, a)),
        HostValue::Type(t) => script.static_type(t),
        HostValue::Dyn(v) => v,
        HostValue::Args(args) => DynValue::tuple(args.as_slice().iter().cloned()),
        HostValue::Script(_) | HostValue::Context(_) => DynValue::Nil,
    }
}

/// One-dimensional arrays become 1-based sequences; higher ranks nest row by row.
fn array_to_table(script: &Script, array: HostArray) -> TableRef {
    if array.dims.len() <= 1 {
        return Table::from_array(array.items.into_iter().map(|v| to_script(script, v)));
    }
    let row_len: usize = array.dims[1..].iter().product();
    let rows = array.dims[0];
    let mut items = array.items.into_iter();
    let table = Table::new();
    for r in 0..rows {
        let row = HostArray {
            element: array.element.clone(),
            dims:    array.dims[1..].to_vec(),
            items:   items.by_ref().take(row_len).collect(),
        };
        table.set_index(r as i64 + 1, DynValue::Table(array_to_table(script, row)));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_to_integer_is_checked() {
        assert_eq!(number_to_primitive(NumericKind::Int32, 41.5).unwrap(), Primitive::Int32(42));
        assert_eq!(number_to_primitive(NumericKind::Int32, 42.5).unwrap(), Primitive::Int32(42));
        assert!(matches!(number_to_primitive(NumericKind::Byte, 256.0), Err(ScriptError::Overflow { .. })));
        assert!(matches!(number_to_primitive(NumericKind::UInt32, -1.0), Err(ScriptError::Overflow { .. })));
        assert!(matches!(number_to_primitive(NumericKind::Int64, f64::NAN), Err(ScriptError::Overflow { .. })));
    }

    #[test]
    fn runtime_type_of_nil_is_none() {
        assert_eq!(runtime_type_of(&DynValue::Nil), None);
        assert_eq!(runtime_type_of(&DynValue::number(1.0)), Some(HostType::of::<f64>()));
    }
}
