//! Method descriptors: bind dynamically typed call arguments to a host member.
//!
//! A descriptor is built once at registration from a closure and a parameter
//! list. Open generic methods declare N leading type slots; each slot consumes
//! one call-site argument and resolves to a host type at call time, so no
//! runtime reflection is involved.

use std::sync::{Arc, OnceLock};

use tracing::{trace, warn};

use crate::error::ScriptError;
use crate::interop::conversions::{self, ArgSite};
use crate::interop::host::{HostArray, HostCall, HostFn, HostObject, HostResult, HostType, HostValue};
use crate::runtime::callback::{CallbackArguments, CallbackFunction, ExecutionContext};
use crate::runtime::table::Table;
use crate::runtime::value::DynValue;
use crate::types::numeric::NumericKind;
use crate::Script;

// ─── Parameter types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Bool,
    /// Plain script number (`f64`).
    Number,
    String,
    Primitive(NumericKind),
    Object(HostType),
    /// Unconstrained: the value's natural host form.
    Any,
    /// The script value itself.
    Dyn,
    Table,
    Function,
    /// A static userdata standing for a host type.
    TypeToken,
    Nullable(Box<ParamType>),
    Array(Box<ParamType>),
    /// The method's i-th type argument.
    Generic(usize),
    Script,
    Context,
    Arguments,
    /// Raw pointer. Members using it cannot be described.
    Pointer,
}

impl ParamType {
    pub fn nullable(inner: ParamType) -> Self { Self::Nullable(Box::new(inner)) }

    pub fn array(element: ParamType) -> Self { Self::Array(Box::new(element)) }

    pub fn object<T: 'static>() -> Self { Self::Object(HostType::of::<T>()) }

    /// Key under which custom converters for this parameter are registered.
    pub fn host_type(&self) -> Option<HostType> {
        match self {
            Self::Bool         => Some(HostType::of::<bool>()),
            Self::Number       => Some(HostType::of::<f64>()),
            Self::String       => Some(HostType::of::<String>()),
            Self::Primitive(k) => Some(k.host_type()),
            Self::Object(t)    => Some(*t),
            Self::Any          => Some(HostType::of::<HostValue>()),
            Self::Dyn          => Some(HostType::of::<DynValue>()),
            Self::Table        => Some(HostType::of::<Table>()),
            Self::Function     => Some(HostType::of::<CallbackFunction>()),
            Self::TypeToken    => Some(HostType::of::<HostType>()),
            Self::Nullable(t)  => t.host_type(),
            Self::Array(_)     => Some(HostType::of::<HostArray>()),
            Self::Script       => Some(HostType::of::<Script>()),
            Self::Context      => Some(HostType::of::<ExecutionContext>()),
            Self::Arguments    => Some(HostType::of::<CallbackArguments>()),
            Self::Generic(_) | Self::Pointer => None,
        }
    }

    /// The parameter type matching a concrete host type.
    pub fn for_host_type(ty: HostType) -> Self {
        if let Some(kind) = NumericKind::from_host_type(&ty) {
            return Self::Primitive(kind);
        }
        let known = [
            (HostType::of::<bool>(), Self::Bool),
            (HostType::of::<f64>(), Self::Number),
            (HostType::of::<String>(), Self::String),
            (HostType::of::<DynValue>(), Self::Dyn),
            (HostType::of::<HostValue>(), Self::Any),
            (HostType::of::<Table>(), Self::Table),
            (HostType::of::<CallbackFunction>(), Self::Function),
            (HostType::of::<HostType>(), Self::TypeToken),
            (HostType::of::<Script>(), Self::Script),
            (HostType::of::<ExecutionContext>(), Self::Context),
            (HostType::of::<CallbackArguments>(), Self::Arguments),
        ];
        known
            .into_iter()
            .find(|(t, _)| *t == ty)
            .map_or(Self::Object(ty), |(_, p)| p)
    }

    /// This type with every `Generic(i)` replaced by the i-th resolved type
    /// argument. Unresolved slots stay generic.
    pub fn substitute(&self, type_args: &[HostType]) -> ParamType {
        match self {
            Self::Generic(i) => type_args.get(*i).map_or_else(|| self.clone(), |t| Self::for_host_type(*t)),
            Self::Nullable(t) => Self::nullable(t.substitute(type_args)),
            Self::Array(t) => Self::array(t.substitute(type_args)),
            other => other.clone(),
        }
    }

    fn contains_pointer(&self) -> bool {
        match self {
            Self::Pointer => true,
            Self::Nullable(t) | Self::Array(t) => t.contains_pointer(),
            _ => false,
        }
    }

    fn max_generic(&self) -> Option<usize> {
        match self {
            Self::Generic(i) => Some(*i),
            Self::Nullable(t) | Self::Array(t) => t.max_generic(),
            _ => None,
        }
    }

    /// Whether a missing argument can still bind.
    fn accepts_nil(&self) -> bool {
        matches!(self, Self::Nullable(_) | Self::Object(_) | Self::Any | Self::Dyn | Self::Bool | Self::Generic(_))
    }
}

// ─── Parameters ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name:        String,
    pub ty:          ParamType,
    pub is_out:      bool,
    pub is_by_ref:   bool,
    pub default:     Option<HostValue>,
    pub is_variadic: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self { name: name.into(), ty, is_out: false, is_by_ref: false, default: None, is_variadic: false }
    }

    /// Output-only: receives a placeholder and is returned after the call.
    pub fn out(mut self) -> Self {
        self.is_out = true;
        self
    }

    pub fn by_ref(mut self) -> Self {
        self.is_by_ref = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<HostValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Trailing parameter collecting every remaining argument. `ty` must be an array.
    pub fn variadic(mut self) -> Self {
        self.is_variadic = true;
        self
    }
}

/// Upper bound on the element count of a script-constructed array.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

// ─── Access modes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Resolved from `GlobalOptions::default_access_mode` at call time.
    #[default]
    Default,
    /// Binding plan rebuilt on every call.
    Reflection,
    /// Binding plan built on first call and cached.
    LazyOptimized,
    /// Binding plan built with the descriptor.
    Preoptimized,
    /// Member not exposed. Invalid for a descriptor.
    HideMembers,
}

// ─── Binding plan ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    TypeSlot,
    ExtensionReceiver,
    Script,
    Context,
    Arguments,
    Out,
    Variadic,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Constructor,
    ArrayConstructor,
}

// ─── Descriptor ───────────────────────────────────────────────────────────────

pub struct MethodDescriptor {
    name:          String,
    kind:          MemberKind,
    is_static:     bool,
    extension_of:  Option<HostType>,
    generic_count: usize,
    /// Synthetic type slots first, then the declared parameters.
    parameters:    Vec<Parameter>,
    returns:       Option<ParamType>,
    access_mode:   AccessMode,
    plan:          OnceLock<Arc<[Binding]>>,
    func:          HostFn,
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_static", &self.is_static)
            .field("generic_count", &self.generic_count)
            .field("parameters", &self.parameters)
            .field("access_mode", &self.access_mode)
            .finish_non_exhaustive()
    }
}

pub struct MethodBuilder {
    name:          String,
    kind:          MemberKind,
    is_static:     bool,
    extension_of:  Option<HostType>,
    generic_count: usize,
    parameters:    Vec<Parameter>,
    returns:       Option<ParamType>,
    access_mode:   AccessMode,
    func:          HostFn,
}

impl MethodBuilder {
    pub fn constructor(mut self) -> Self {
        self.kind = MemberKind::Constructor;
        self.is_static = true;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// A static method whose first parameter is the receiver when called on an
    /// object of `target`.
    pub fn extension_of(mut self, target: HostType) -> Self {
        self.extension_of = Some(target);
        self.is_static = true;
        self
    }

    /// Open generic method with `count` type parameters.
    pub fn generic(mut self, count: usize) -> Self {
        self.generic_count = count;
        self
    }

    pub fn param(mut self, p: Parameter) -> Self {
        self.parameters.push(p);
        self
    }

    pub fn returns(mut self, ty: ParamType) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    pub fn build(self) -> Result<MethodDescriptor, ScriptError> {
        let invalid = |reason: &str| ScriptError::InvalidDescriptor { member: self.name.clone(), reason: reason.to_string() };

        if self.access_mode == AccessMode::HideMembers {
            return Err(invalid("invalid access mode"));
        }
        if self.parameters.iter().any(|p| p.ty.contains_pointer()) {
            return Err(invalid("pointer parameters are not supported"));
        }
        if self.returns.as_ref().is_some_and(ParamType::contains_pointer) {
            return Err(invalid("pointer return types are not supported"));
        }
        let beyond_arity = |t: &ParamType| t.max_generic().is_some_and(|i| i >= self.generic_count);
        if self.returns.as_ref().is_some_and(beyond_arity) {
            return Err(invalid("unresolved generic return type"));
        }
        if self.parameters.iter().any(|p| beyond_arity(&p.ty)) {
            return Err(invalid("unresolved generic parameter type"));
        }
        let last = self.parameters.len().saturating_sub(1);
        for (i, p) in self.parameters.iter().enumerate() {
            if p.is_variadic && (i != last || !matches!(p.ty, ParamType::Array(_))) {
                return Err(invalid("only the last parameter can be variadic, and it must be an array"));
            }
        }
        if self.extension_of.is_some() && self.parameters.is_empty() {
            return Err(invalid("extension method without a receiver parameter"));
        }

        let mut access_mode = self.access_mode;
        if self.parameters.iter().any(|p| p.is_by_ref) {
            access_mode = AccessMode::Reflection;
        }

        let mut parameters: Vec<Parameter> = (0..self.generic_count)
            .map(|i| Parameter::new(format!("generic{i}"), ParamType::Any))
            .collect();
        parameters.extend(self.parameters);

        let descriptor = MethodDescriptor {
            name: self.name,
            kind: self.kind,
            is_static: self.is_static,
            extension_of: self.extension_of,
            generic_count: self.generic_count,
            parameters,
            returns: self.returns,
            access_mode,
            plan: OnceLock::new(),
            func: self.func,
        };
        if access_mode == AccessMode::Preoptimized {
            let _ = descriptor.plan.set(descriptor.build_plan());
        }
        Ok(descriptor)
    }

    /// Build, or log and return `None` for a member that cannot be exposed.
    pub fn try_build(self) -> Option<MethodDescriptor> {
        let name = self.name.clone();
        match self.build() {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(member = %name, "member not visible to scripts: {e}");
                None
            }
        }
    }
}

impl MethodDescriptor {
    pub fn builder<F>(name: impl Into<String>, func: F) -> MethodBuilder
    where
        F: Fn(&mut HostCall) -> HostResult + Send + Sync + 'static,
    {
        MethodBuilder {
            name:          name.into(),
            kind:          MemberKind::Method,
            is_static:     false,
            extension_of:  None,
            generic_count: 0,
            parameters:    Vec::new(),
            returns:       None,
            access_mode:   AccessMode::Default,
            func:          Arc::new(func),
        }
    }

    /// Synthetic constructor for a `rank`-dimensional array of `element`:
    /// one integer extent per dimension, every slot holding the element's default.
    pub fn array_constructor(element: ParamType, rank: usize) -> MethodDescriptor {
        let elem = element.clone();
        let func: HostFn = Arc::new(move |call: &mut HostCall| -> HostResult {
            let mut dims = Vec::with_capacity(call.args.len());
            for (i, extent) in call.args.iter().enumerate() {
                let n = extent.as_i64().unwrap_or(0);
                let n = usize::try_from(n)
                    .map_err(|_| ScriptError::bad_argument(i + 1, "__new", format!("negative array extent {n}")))?;
                dims.push(n);
            }
            let len = dims
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .filter(|&len| len <= MAX_ARRAY_LEN)
                .ok_or_else(|| ScriptError::bad_argument(1, "__new", format!("array extents {dims:?} too large")))?;
            let items = vec![default_for(&elem); len];
            Ok(HostValue::Array(HostArray { element: elem.clone(), dims, items }))
        });
        MethodDescriptor {
            name:          format!("__new[{rank}]"),
            kind:          MemberKind::ArrayConstructor,
            is_static:     true,
            extension_of:  None,
            generic_count: 0,
            parameters:    (0..rank)
                .map(|i| Parameter::new(format!("idx{i}"), ParamType::Primitive(NumericKind::Int32)))
                .collect(),
            returns:       Some(ParamType::array(element)),
            access_mode:   AccessMode::Default,
            plan:          OnceLock::new(),
            func,
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn kind(&self) -> MemberKind { self.kind }

    pub fn is_static(&self) -> bool { self.is_static }

    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, MemberKind::Constructor | MemberKind::ArrayConstructor)
    }

    pub fn extension_of(&self) -> Option<HostType> { self.extension_of }

    pub fn generic_count(&self) -> usize { self.generic_count }

    pub fn parameters(&self) -> &[Parameter] { &self.parameters }

    pub fn returns(&self) -> Option<&ParamType> { self.returns.as_ref() }

    pub fn access_mode(&self) -> AccessMode { self.access_mode }

    /// Whether a binding plan is currently cached.
    pub fn is_optimized(&self) -> bool { self.plan.get().is_some() }

    /// Whether a call with `argc` script arguments (receiver excluded) can bind.
    /// Without a receiver an extension method takes its target from the arguments.
    pub fn accepts(&self, argc: usize, has_receiver: bool) -> bool {
        let plan = self.build_plan();
        let mut required = 0usize;
        let mut max = 0usize;
        for (p, b) in self.parameters.iter().zip(plan.iter()) {
            match b {
                Binding::TypeSlot => {
                    required = max + 1;
                    max += 1;
                }
                Binding::Convert => {
                    max += 1;
                    if p.default.is_none() && !p.ty.accepts_nil() {
                        required = max;
                    }
                }
                Binding::ExtensionReceiver if !has_receiver => {
                    max += 1;
                    required = max;
                }
                Binding::Variadic | Binding::Arguments => return argc >= required,
                _ => {}
            }
        }
        argc >= required && argc <= max
    }

    fn build_plan(&self) -> Arc<[Binding]> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if i < self.generic_count {
                    return Binding::TypeSlot;
                }
                if i == self.generic_count && self.extension_of.is_some() {
                    return Binding::ExtensionReceiver;
                }
                match p.ty {
                    ParamType::Script => Binding::Script,
                    ParamType::Context => Binding::Context,
                    ParamType::Arguments => Binding::Arguments,
                    _ if p.is_out => Binding::Out,
                    _ if p.is_variadic => Binding::Variadic,
                    _ => Binding::Convert,
                }
            })
            .collect()
    }

    fn binding_plan(&self, script: &Script) -> Arc<[Binding]> {
        let mode = match self.access_mode {
            AccessMode::Default => script.global_options().default_access_mode(),
            m => m,
        };
        match mode {
            AccessMode::Reflection => self.build_plan(),
            _ => Arc::clone(self.plan.get_or_init(|| self.build_plan())),
        }
    }

    /// Bind `args` and invoke the member. `receiver` is the object for instance
    /// and extension calls.
    pub fn execute(
        &self,
        script: &Script,
        receiver: Option<&HostObject>,
        ctx: &ExecutionContext,
        args: &CallbackArguments,
    ) -> Result<DynValue, ScriptError> {
        let plan = self.binding_plan(script);
        let mut j = usize::from(args.is_method_call());
        let mut type_args = Vec::with_capacity(self.generic_count);
        let mut call_args = Vec::with_capacity(self.parameters.len() - self.generic_count);
        let mut out_indices = Vec::new();

        for (i, (param, binding)) in self.parameters.iter().zip(plan.iter()).enumerate() {
            if i >= self.generic_count && (param.is_out || param.is_by_ref) {
                out_indices.push(i - self.generic_count);
            }
            match binding {
                Binding::TypeSlot => {
                    let arg = args.get(j);
                    j += 1;
                    let ty = conversions::static_type_of(&arg)
                        .or_else(|| conversions::runtime_type_of(&arg))
                        .ok_or_else(|| ScriptError::GenericBinding { method: self.name.clone() })?;
                    type_args.push(ty);
                }
                Binding::ExtensionReceiver => match receiver {
                    Some(obj) => call_args.push(HostValue::Object(obj.clone())),
                    None => {
                        call_args.push(self.convert_arg(script, args, j, param, &type_args)?);
                        j += 1;
                    }
                },
                Binding::Script => call_args.push(HostValue::Script(script.clone())),
                Binding::Context => call_args.push(HostValue::Context(ctx.clone())),
                Binding::Arguments => call_args.push(HostValue::Args(args.skip_method_call())),
                Binding::Out => call_args.push(HostValue::Null),
                Binding::Variadic => {
                    call_args.push(self.collect_variadic(script, args, j, param, &type_args)?);
                    j = args.len();
                }
                Binding::Convert => {
                    call_args.push(self.convert_arg(script, args, j, param, &type_args)?);
                    j += 1;
                }
            }
        }

        trace!(method = %self.name, type_args = type_args.len(), argc = call_args.len(), "dispatch");
        let mut call = HostCall {
            receiver: if self.is_static { None } else { receiver.cloned() },
            type_args,
            args: call_args,
        };
        let result = (self.func)(&mut call).map_err(|e| match e.downcast::<ScriptError>() {
            Ok(script_error) => *script_error,
            Err(other) => ScriptError::host(self.name.clone(), other),
        })?;

        if out_indices.is_empty() {
            return Ok(script.to_script(result));
        }
        let mut values = Vec::with_capacity(out_indices.len() + 1);
        if !matches!(result, HostValue::Void) {
            values.push(script.to_script(result));
        }
        for idx in out_indices {
            let v = call.args.get(idx).cloned().unwrap_or(HostValue::Null);
            values.push(script.to_script(v));
        }
        Ok(DynValue::tuple(values))
    }

    fn convert_arg(
        &self,
        script: &Script,
        args: &CallbackArguments,
        j: usize,
        param: &Parameter,
        type_args: &[HostType],
    ) -> Result<HostValue, ScriptError> {
        let arg = args.raw_get(j).cloned().unwrap_or_default();
        let site = ArgSite { function: &self.name, index: j + 1 };
        let ty = param.ty.substitute(type_args);
        conversions::to_host(script, &arg, &ty, param.default.as_ref(), site)
    }

    fn collect_variadic(
        &self,
        script: &Script,
        args: &CallbackArguments,
        from: usize,
        param: &Parameter,
        type_args: &[HostType],
    ) -> Result<HostValue, ScriptError> {
        let element = match param.ty.substitute(type_args) {
            ParamType::Array(e) => *e,
            other => other,
        };
        let extra = args.as_slice().get(from..).unwrap_or_default();

        // A lone host array of the right element type is passed as the array itself.
        let passthrough = match extra {
            [DynValue::UserData(u)] => u.object().downcast_ref::<HostArray>().filter(|a| a.element == element),
            _ => None,
        };
        if let Some(a) = passthrough {
            return Ok(HostValue::Array(a.clone()));
        }

        let items = extra
            .iter()
            .enumerate()
            .map(|(k, v)| {
                let site = ArgSite { function: &self.name, index: from + k + 1 };
                conversions::to_host(script, v, &element, None, site)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HostValue::Array(HostArray::new(element, items)))
    }
}

/// Default value of an array element.
fn default_for(element: &ParamType) -> HostValue {
    match element {
        ParamType::Bool => HostValue::Bool(false),
        ParamType::Number => HostValue::Number(0.0),
        ParamType::Primitive(kind) => (kind.ops().from_f64)(0.0).map_or(HostValue::Null, HostValue::Primitive),
        _ => HostValue::Null,
    }
}
