//! Host-side values as seen by the dispatch bridge.

use std::any::{Any, TypeId};
use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::interop::descriptor::ParamType;
use crate::runtime::callback::{CallbackArguments, ExecutionContext};
use crate::runtime::value::DynValue;
use crate::types::numeric::Primitive;
use crate::Script;

// ─── Host types ───────────────────────────────────────────────────────────────

/// Identity of a host type. Equality and hashing use the `TypeId` only.
#[derive(Clone, Copy)]
pub struct HostType {
    id:   TypeId,
    name: &'static str,
}

impl HostType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    pub fn id(&self) -> TypeId { self.id }

    pub fn name(&self) -> &'static str { self.name }

    pub fn is<T: ?Sized + 'static>(&self) -> bool { self.id == TypeId::of::<T>() }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for HostType {}

impl Hash for HostType {
    fn hash<H: Hasher>(&self, state: &mut H) { self.id.hash(state); }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Script-side handle on a host type itself: a type token for generic
/// slots and the receiver of static members and constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticType {
    ty: HostType,
}

impl StaticType {
    pub fn new(ty: HostType) -> Self { Self { ty } }

    pub fn host_type(&self) -> HostType { self.ty }
}

// ─── Host objects ─────────────────────────────────────────────────────────────

/// A shared, type-erased host object.
#[derive(Clone)]
pub struct HostObject {
    ty:    HostType,
    value: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { ty: HostType::of::<T>(), value }
    }

    pub fn host_type(&self) -> HostType { self.ty }

    pub fn is<T: Any>(&self) -> bool { self.ty.is::<T>() }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject<{}>", self.ty.name)
    }
}

// ─── Host arrays ──────────────────────────────────────────────────────────────

/// A host array with a declared element type. Multi-dimensional arrays are
/// stored row-major with their extents in `dims`.
#[derive(Debug, Clone)]
pub struct HostArray {
    pub element: ParamType,
    pub dims:    Vec<usize>,
    pub items:   Vec<HostValue>,
}

impl HostArray {
    pub fn new(element: ParamType, items: Vec<HostValue>) -> Self {
        Self { element, dims: vec![items.len()], items }
    }

    pub fn rank(&self) -> usize { self.dims.len() }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Element at the given coordinates.
    pub fn get(&self, index: &[usize]) -> Option<&HostValue> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0usize;
        for (i, d) in index.iter().zip(&self.dims) {
            if i >= d {
                return None;
            }
            flat = flat * d + i;
        }
        self.items.get(flat)
    }
}

// ─── Host values ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum HostValue {
    /// No value: the result of a method without a return type.
    Void,
    Null,
    Bool(bool),
    Number(f64),
    Primitive(Primitive),
    Str(String),
    Object(HostObject),
    Array(HostArray),
    Type(HostType),
    /// A script value passed through untouched.
    Dyn(DynValue),
    Script(Script),
    Context(ExecutionContext),
    Args(CallbackArguments),
}

impl HostValue {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(HostObject::new(value))
    }

    /// Runtime host type of the value; `None` for null and void.
    pub fn host_type(&self) -> Option<HostType> {
        match self {
            Self::Void | Self::Null => None,
            Self::Bool(_)      => Some(HostType::of::<bool>()),
            Self::Number(_)    => Some(HostType::of::<f64>()),
            Self::Primitive(p) => Some(p.host_type()),
            Self::Str(_)       => Some(HostType::of::<String>()),
            Self::Object(o)    => Some(o.host_type()),
            Self::Array(_)     => Some(HostType::of::<HostArray>()),
            Self::Type(_)      => Some(HostType::of::<HostType>()),
            Self::Dyn(_)       => Some(HostType::of::<DynValue>()),
            Self::Script(_)    => Some(HostType::of::<Script>()),
            Self::Context(_)   => Some(HostType::of::<ExecutionContext>()),
            Self::Args(_)      => Some(HostType::of::<CallbackArguments>()),
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Self::Null | Self::Void) }

    pub fn as_bool(&self) -> Option<bool> {
        match self { Self::Bool(b) => Some(*b), _ => None }
    }

    /// Numeric view over plain numbers and primitives.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Primitive(p) => Some(p.to_f64()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Primitive(p) => p.as_i128().and_then(|v| i64::try_from(v).ok()),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self { Self::Primitive(p) => Some(*p), _ => None }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Self::Str(s) => Some(s), _ => None }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self { Self::Object(o) => Some(o), _ => None }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_object()?.downcast_ref::<T>()
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self { Self::Array(a) => Some(a), _ => None }
    }

    pub fn as_type(&self) -> Option<HostType> {
        match self { Self::Type(t) => Some(*t), _ => None }
    }

    pub fn as_dyn(&self) -> Option<&DynValue> {
        match self { Self::Dyn(v) => Some(v), _ => None }
    }

    pub fn as_script(&self) -> Option<&Script> {
        match self { Self::Script(s) => Some(s), _ => None }
    }

    pub fn as_context(&self) -> Option<&ExecutionContext> {
        match self { Self::Context(c) => Some(c), _ => None }
    }

    pub fn as_args(&self) -> Option<&CallbackArguments> {
        match self { Self::Args(a) => Some(a), _ => None }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self { Self::Str(s) }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self { Self::Str(s.to_string()) }
}

impl From<HostObject> for HostValue {
    fn from(o: HostObject) -> Self { Self::Object(o) }
}

impl From<HostType> for HostValue {
    fn from(t: HostType) -> Self { Self::Type(t) }
}

impl From<DynValue> for HostValue {
    fn from(v: DynValue) -> Self { Self::Dyn(v) }
}

impl From<Primitive> for HostValue {
    fn from(p: Primitive) -> Self { Self::Primitive(p) }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

macro_rules! host_value_from_primitive {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HostValue {
            fn from(v: $ty) -> Self { Self::Primitive(Primitive::from(v)) }
        })*
    };
}

host_value_from_primitive!(i8, u8, i16, u16, i32, u32, i64, u64, f32, Decimal);

// ─── Calls ────────────────────────────────────────────────────────────────────

/// Failure returned by host code.
pub type HostError = Box<dyn StdError + Send + Sync + 'static>;

pub type HostResult = Result<HostValue, HostError>;

/// Bound arguments of one host invocation. Out and by-ref parameters are read
/// back from `args` after the call returns.
#[derive(Debug, Clone)]
pub struct HostCall {
    pub receiver:  Option<HostObject>,
    pub type_args: Vec<HostType>,
    pub args:      Vec<HostValue>,
}

impl HostCall {
    pub fn arg(&self, index: usize) -> &HostValue {
        self.args.get(index).unwrap_or(&HostValue::Null)
    }

    pub fn type_arg(&self, index: usize) -> Option<HostType> {
        self.type_args.get(index).copied()
    }

    pub fn receiver<T: Any>(&self) -> Option<&T> {
        self.receiver.as_ref()?.downcast_ref::<T>()
    }

    /// Store the post-call value of an out or by-ref parameter.
    pub fn set_out(&mut self, index: usize, value: impl Into<HostValue>) {
        if let Some(slot) = self.args.get_mut(index) {
            *slot = value.into();
        }
    }
}

/// A host member implementation.
pub type HostFn = Arc<dyn Fn(&mut HostCall) -> HostResult + Send + Sync>;
