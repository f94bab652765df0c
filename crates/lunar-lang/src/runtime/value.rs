use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::ScriptError;
use crate::interop::host::HostObject;
use crate::runtime::callback::{CallbackArguments, CallbackFunction, ExecutionContext};
use crate::runtime::table::TableRef;
use crate::types::wrapper::PrimitiveWrapper;

// ─── Data kinds ───────────────────────────────────────────────────────────────

/// The tag of a [`DynValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    UserData,
    Tuple,
    TailCallRequest,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nil             => "nil",
            Self::Boolean         => "boolean",
            Self::Number          => "number",
            Self::String          => "string",
            Self::Table           => "table",
            Self::Function        => "function",
            Self::UserData        => "userdata",
            Self::Tuple           => "tuple",
            Self::TailCallRequest => "tailcallrequest",
        }
    }

    /// Kinds a custom converter may be registered for. Tuples and call requests
    /// never reach a host parameter.
    pub fn is_convertible(&self) -> bool {
        !matches!(self, Self::Tuple | Self::TailCallRequest)
    }
}

// ─── UserData ─────────────────────────────────────────────────────────────────

/// A host object exposed to scripts, with a metatable created on demand.
///
/// Clones share both the object and the metatable slot, so a metatable attached
/// through one handle is visible through every other.
#[derive(Clone)]
pub struct UserData {
    object:    HostObject,
    metatable: Arc<OnceLock<TableRef>>,
}

impl UserData {
    pub fn new(object: HostObject) -> Self {
        Self { object, metatable: Arc::new(OnceLock::new()) }
    }

    /// A userdata whose metatable is already set.
    pub fn with_metatable(object: HostObject, metatable: TableRef) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(metatable);
        Self { object, metatable: Arc::new(slot) }
    }

    pub fn object(&self) -> &HostObject { &self.object }

    pub fn metatable(&self) -> Option<&TableRef> { self.metatable.get() }

    pub fn ptr_eq(&self, other: &UserData) -> bool {
        self.object.ptr_eq(&other.object)
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("object", &self.object)
            .field("has_metatable", &self.metatable.get().is_some())
            .finish()
    }
}

// ─── Tail-call request ────────────────────────────────────────────────────────

/// A call the processor runs in place of the current frame.
#[derive(Debug, Clone)]
pub struct TailCallData {
    pub function:      DynValue,
    pub args:          Vec<DynValue>,
    /// Receives the primary result of `function`.
    pub continuation:  Option<Arc<CallbackFunction>>,
    /// Receives the error value if `function` raises.
    pub error_handler: Option<Arc<CallbackFunction>>,
}

// ─── DynValue ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum DynValue {
    Nil,
    Boolean(bool),
    Number(f64),
    String(Arc<str>),
    Table(TableRef),
    Function(Arc<CallbackFunction>),
    UserData(UserData),
    /// Multiple return values. Never contains another tuple.
    Tuple(Arc<[DynValue]>),
    TailCallRequest(Arc<TailCallData>),
}

impl DynValue {
    pub const NIL:   DynValue = DynValue::Nil;
    pub const TRUE:  DynValue = DynValue::Boolean(true);
    pub const FALSE: DynValue = DynValue::Boolean(false);

    pub fn nil() -> Self { Self::Nil }

    pub fn boolean(b: bool) -> Self { Self::Boolean(b) }

    pub fn number(n: f64) -> Self { Self::Number(n) }

    pub fn string(s: impl AsRef<str>) -> Self { Self::String(Arc::from(s.as_ref())) }

    pub fn table(t: TableRef) -> Self { Self::Table(t) }

    pub fn user_data(object: HostObject) -> Self { Self::UserData(UserData::new(object)) }

    pub fn function(f: CallbackFunction) -> Self { Self::Function(Arc::new(f)) }

    /// Wrap a host closure as a script function.
    pub fn callback<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExecutionContext, &CallbackArguments) -> Result<DynValue, ScriptError> + Send + Sync + 'static,
    {
        Self::function(CallbackFunction::new(name, f))
    }

    /// Build a tuple, splicing the elements of any nested tuple in place.
    pub fn tuple(values: impl IntoIterator<Item = DynValue>) -> Self {
        let mut flat = Vec::new();
        for v in values {
            match v {
                DynValue::Tuple(inner) => flat.extend(inner.iter().cloned()),
                other => flat.push(other),
            }
        }
        Self::Tuple(Arc::from(flat))
    }

    pub fn tail_call_request(data: TailCallData) -> Self {
        Self::TailCallRequest(Arc::new(data))
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Nil                => DataType::Nil,
            Self::Boolean(_)         => DataType::Boolean,
            Self::Number(_)          => DataType::Number,
            Self::String(_)          => DataType::String,
            Self::Table(_)           => DataType::Table,
            Self::Function(_)        => DataType::Function,
            Self::UserData(_)        => DataType::UserData,
            Self::Tuple(_)           => DataType::Tuple,
            Self::TailCallRequest(_) => DataType::TailCallRequest,
        }
    }

    /// The kind name scripts observe through `type()`. Primitive wrappers are numbers.
    pub fn type_name(&self) -> &'static str {
        if self.as_primitive_wrapper().is_some() {
            return "number";
        }
        self.data_type().name()
    }

    pub fn is_nil(&self) -> bool { matches!(self, Self::Nil) }

    /// Everything except nil and false is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Boolean(b) => *b,
            Self::Tuple(items) => items.first().is_some_and(DynValue::is_truthy),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self { Self::Boolean(b) => Some(*b), _ => None }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self { Self::Number(n) => Some(*n), _ => None }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Self::String(s) => Some(s), _ => None }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self { Self::Table(t) => Some(t), _ => None }
    }

    pub fn as_function(&self) -> Option<&Arc<CallbackFunction>> {
        match self { Self::Function(f) => Some(f), _ => None }
    }

    pub fn as_user_data(&self) -> Option<&UserData> {
        match self { Self::UserData(u) => Some(u), _ => None }
    }

    pub fn as_tuple(&self) -> Option<&[DynValue]> {
        match self { Self::Tuple(items) => Some(items), _ => None }
    }

    pub fn as_primitive_wrapper(&self) -> Option<&PrimitiveWrapper> {
        self.as_user_data()?.object().downcast_ref::<PrimitiveWrapper>()
    }

    /// The single value this value stands for: the first element of a tuple,
    /// nil for an empty one, the value itself otherwise.
    pub fn first(&self) -> DynValue {
        match self {
            Self::Tuple(items) => items.first().cloned().unwrap_or(Self::Nil),
            other => other.clone(),
        }
    }

    // ── Coercion ─────────────────────────────────────────────────────────────

    /// Numeric view used by the arithmetic machinery: numbers, numeric strings
    /// and primitive wrappers.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => parse_number(s),
            Self::Tuple(_) => self.first().to_number(),
            _ => self.as_primitive_wrapper().map(PrimitiveWrapper::to_f64),
        }
    }

    /// String view used by concatenation: strings, numbers and primitive wrappers.
    pub fn to_concat_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.to_string()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Tuple(_) => self.first().to_concat_string(),
            _ => self.as_primitive_wrapper().map(|w| w.to_string()),
        }
    }

    /// Human-readable rendering, as `tostring` produces it.
    pub fn to_print_string(&self) -> String {
        match self {
            Self::Nil => "nil".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Table(t) => format!("table: {:p}", Arc::as_ptr(t)),
            Self::Function(f) => format!("function: {}", f.name()),
            Self::UserData(u) => match u.object().downcast_ref::<PrimitiveWrapper>() {
                Some(w) => w.to_string(),
                None => format!("userdata: {}", u.object().host_type().name()),
            },
            Self::Tuple(items) => items
                .iter()
                .map(DynValue::to_print_string)
                .collect::<Vec<_>>()
                .join("\t"),
            Self::TailCallRequest(_) => "(tail call request)".to_string(),
        }
    }
}

impl Default for DynValue {
    fn default() -> Self { Self::Nil }
}

impl PartialEq for DynValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::UserData(a), Self::UserData(b)) => a.ptr_eq(b),
            (Self::Tuple(a), Self::Tuple(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y),
            (Self::TailCallRequest(a), Self::TailCallRequest(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for DynValue {
    fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<f64> for DynValue {
    fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<&str> for DynValue {
    fn from(s: &str) -> Self { Self::string(s) }
}

impl From<String> for DynValue {
    fn from(s: String) -> Self { Self::String(Arc::from(s)) }
}

// ─── Number formatting ────────────────────────────────────────────────────────

/// Format a number the way scripts print it, independent of any locale:
/// integral values without a fraction, everything else in shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// Parse a numeric string: decimal with optional exponent, or `0x` hexadecimal.
pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    let (negative, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let v = u64::from_str_radix(hex, 16).ok()? as f64;
        return Some(if negative { -v } else { v });
    }
    if t.is_empty() || t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    t.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-12.0), "-12");
        assert_eq!(format_number(0.01), "0.01");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn numeric_strings_parse() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("0x10"), Some(16.0));
        assert_eq!(parse_number("-0x10"), Some(-16.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn nested_tuples_are_spliced() {
        let inner = DynValue::tuple([DynValue::number(2.0), DynValue::number(3.0)]);
        let outer = DynValue::tuple([DynValue::number(1.0), inner]);
        assert_eq!(outer.as_tuple().map(<[DynValue]>::len), Some(3));
    }
}
