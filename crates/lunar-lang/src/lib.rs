pub mod error;
pub mod options;
pub mod runtime;
pub mod types;
pub mod interop;
pub mod namespaces;

pub use error::{ErrorCode, ScriptError};
pub use options::{FuzzySymbolMatching, GlobalOptions, ScriptOptions};
pub use runtime::arith::BinOp;
pub use runtime::callback::{CallbackArguments, CallbackFunction, ExecutionContext};
pub use runtime::stack::FastStack;
pub use runtime::table::{Table, TableKey, TableRef};
pub use runtime::value::{DataType, DynValue, TailCallData, UserData};
pub use types::numeric::{NumericKind, Primitive};
pub use types::wrapper::PrimitiveWrapper;
pub use interop::converters::CustomConverters;
pub use interop::descriptor::{AccessMode, MethodDescriptor, ParamType, Parameter};
pub use interop::host::{HostArray, HostCall, HostObject, HostResult, HostType, HostValue, StaticType};
pub use interop::registry::TypeRegistry;

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::interop::conversions::{self, ArgSite};
use crate::interop::registry::{select_overload, CONSTRUCTOR};
use crate::namespaces::ModuleRegistry;
use crate::runtime::arith::{self, BinopRegistry};
use crate::runtime::processor::{CallDepth, Processor};
use crate::types::wrapper;

// ─── Script ───────────────────────────────────────────────────────────────────

/// One script instance: its globals, its options and the process-wide
/// registries it was created against. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Script {
    inner: Arc<ScriptInner>,
}

struct ScriptInner {
    globals:            TableRef,
    options:            ScriptOptions,
    global:             Arc<GlobalOptions>,
    operators:          BinopRegistry,
    wrapper_metatables: [OnceLock<TableRef>; 10],
    depth:              CallDepth,
}

impl Script {
    /// A script with default options, bound to `GlobalOptions::shared()`, with
    /// the standard modules installed.
    pub fn new() -> Self {
        Self::with_options(ScriptOptions::default())
    }

    pub fn with_options(options: ScriptOptions) -> Self {
        Self::with_global_options(options, GlobalOptions::shared())
    }

    /// A script bound to its own set of registries instead of the shared one.
    pub fn with_global_options(options: ScriptOptions, global: Arc<GlobalOptions>) -> Self {
        let script = Self {
            inner: Arc::new(ScriptInner {
                globals: Table::new(),
                options,
                global,
                operators: BinopRegistry::default(),
                wrapper_metatables: std::array::from_fn(|_| OnceLock::new()),
                depth:              CallDepth::default(),
            }),
        };
        ModuleRegistry::standard().install(&script);
        script
    }

    pub fn globals(&self) -> &TableRef { &self.inner.globals }

    pub fn options(&self) -> &ScriptOptions { &self.inner.options }

    pub fn global_options(&self) -> &Arc<GlobalOptions> { &self.inner.global }

    pub fn converters(&self) -> &CustomConverters { self.inner.global.converters() }

    pub fn types(&self) -> &TypeRegistry { self.inner.global.types() }

    pub fn ptr_eq(&self, other: &Script) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    /// Call levels currently in use: pending frames plus re-entrant calls.
    pub fn call_depth(&self) -> &CallDepth { &self.inner.depth }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// Call `function` with `args`, running every tail-call request it issues.
    ///
    /// Calls made while another call is running (from a callback, or through an
    /// operator metamethod) count against `call_stack_capacity`. Errors are only
    /// rewrapped for `rethrow_exception_nested` when leaving the outermost call.
    pub fn call(&self, function: &DynValue, args: Vec<DynValue>) -> Result<DynValue, ScriptError> {
        let entry = self.inner.depth.enter(self.inner.options.call_stack_capacity)?;
        let result = Processor::new(self.clone()).call(function, args);
        let rewrap = entry.is_outermost() && self.inner.global.rethrow_exception_nested();
        match result {
            Err(e) if rewrap && e.host_cause().is_none() => {
                let method = function.as_function().map_or("<script>", |f| f.name()).to_string();
                Err(ScriptError::HostInvocation { method, source: Arc::new(e) })
            }
            other => other,
        }
    }

    /// Look up a global by name and call it.
    pub fn call_global(&self, name: &str, args: Vec<DynValue>) -> Result<DynValue, ScriptError> {
        let f = self.globals().get(name);
        if f.is_nil() {
            return Err(ScriptError::runtime(format!("attempt to call a nil value (global '{name}')")));
        }
        self.call(&f, args)
    }

    // ── Primitive wrappers ────────────────────────────────────────────────────

    /// Script value for a host primitive, with its kind's shared metatable.
    pub fn wrap_primitive(&self, value: impl Into<Primitive>) -> DynValue {
        self.wrap(PrimitiveWrapper::new(value))
    }

    pub fn wrap(&self, w: PrimitiveWrapper) -> DynValue {
        let mt = self.wrapper_metatable(w.kind());
        DynValue::UserData(UserData::with_metatable(HostObject::new(w), mt))
    }

    pub fn wrapper_metatable(&self, kind: NumericKind) -> TableRef {
        Arc::clone(self.inner.wrapper_metatables[kind.index()].get_or_init(|| wrapper::build_metatable(kind)))
    }

    // ── Host values ───────────────────────────────────────────────────────────

    pub fn to_script(&self, value: impl Into<HostValue>) -> DynValue {
        conversions::to_script(self, value.into())
    }

    pub fn to_host(&self, value: &DynValue, ty: &ParamType) -> Result<HostValue, ScriptError> {
        conversions::to_host(self, value, ty, None, ArgSite { function: "to_host", index: 1 })
    }

    pub fn user_data(&self, object: HostObject) -> DynValue {
        if let Some(w) = object.downcast_ref::<PrimitiveWrapper>() {
            return self.wrap(*w);
        }
        DynValue::UserData(UserData::new(object))
    }

    /// Static userdata for `ty`. Calling it runs the type's constructors.
    pub fn static_type(&self, ty: HostType) -> DynValue {
        let mt = Table::new();
        mt.set(
            "__call",
            DynValue::callback(format!("{}.{CONSTRUCTOR}", ty.name()), move |ctx, args| {
                let script = ctx.script();
                let ctors = script.types().resolve(ty, CONSTRUCTOR, FuzzySymbolMatching::NONE);
                let argc = args.len().saturating_sub(usize::from(args.is_method_call()));
                match select_overload(&ctors, argc, false) {
                    Some(ctor) => ctor.execute(script, None, ctx, args),
                    None => Err(ScriptError::runtime(format!("{} has no constructor", ty.name()))),
                }
            }),
        );
        DynValue::UserData(UserData::with_metatable(HostObject::new(StaticType::new(ty)), mt))
    }

    /// Static userdata for a registered host type.
    pub fn create_static<T: 'static>(&self) -> Result<DynValue, ScriptError> {
        let ty = HostType::of::<T>();
        if !self.types().is_registered(ty) {
            return Err(ScriptError::runtime(format!("type {} is not registered", ty.name())));
        }
        Ok(self.static_type(ty))
    }

    /// A callable for member `name` of `target`, bound to it. Static userdata
    /// expose static members; objects with a proxy expose the proxy's members.
    pub fn member(&self, target: &DynValue, name: &str) -> Result<DynValue, ScriptError> {
        let u = target
            .as_user_data()
            .ok_or_else(|| ScriptError::runtime(format!("attempt to index a {} value", target.type_name())))?;

        let (ty, receiver) = match u.object().downcast_ref::<StaticType>() {
            Some(s) => (s.host_type(), None),
            None => match self.types().proxy_for(u.object()) {
                Some(proxy) => (proxy.host_type(), Some(proxy)),
                None => (u.object().host_type(), Some(u.object().clone())),
            },
        };

        let mut overloads = self.types().resolve(ty, name, self.inner.global.fuzzy_symbol_matching());
        if receiver.is_none() {
            overloads.retain(|m| m.is_static());
        }
        if overloads.is_empty() {
            return Err(ScriptError::runtime(format!("cannot find member '{name}' on {}", ty.name())));
        }

        let label = overloads[0].name().to_string();
        Ok(DynValue::callback(label, move |ctx, args| {
            let argc = args.len().saturating_sub(usize::from(args.is_method_call()));
            match select_overload(&overloads, argc, receiver.is_some()) {
                Some(m) => m.execute(ctx.script(), receiver.as_ref(), ctx, args),
                None => Err(ScriptError::runtime("no overload to call")),
            }
        }))
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    pub fn arith(&self, op: BinOp, l: &DynValue, r: &DynValue) -> Result<DynValue, ScriptError> {
        self.inner.operators.eval(self, op, l, r)
    }

    pub fn negate(&self, v: &DynValue) -> Result<DynValue, ScriptError> {
        arith::negate(self, v)
    }

    pub fn concat(&self, l: &DynValue, r: &DynValue) -> Result<DynValue, ScriptError> {
        arith::concat(self, l, r)
    }

    pub fn equals(&self, l: &DynValue, r: &DynValue) -> Result<bool, ScriptError> {
        arith::equals(self, l, r)
    }

    pub fn less_than(&self, l: &DynValue, r: &DynValue) -> Result<bool, ScriptError> {
        arith::less_than(self, l, r)
    }

    pub fn less_equal(&self, l: &DynValue, r: &DynValue) -> Result<bool, ScriptError> {
        arith::less_equal(self, l, r)
    }
}

impl Default for Script {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
