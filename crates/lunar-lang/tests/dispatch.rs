//! Host type registration and method dispatch through `Script::member`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use lunar_lang::{
    AccessMode, CallbackArguments, DynValue, ExecutionContext, FuzzySymbolMatching, GlobalOptions, HostCall,
    HostObject, HostResult, HostType, HostValue, MethodDescriptor, NumericKind, ParamType, Parameter, Primitive,
    Script, ScriptError, ScriptOptions,
};
use lunar_lang::interop::converters::ScriptToHostFn;
use lunar_lang::interop::registry::CONSTRUCTOR;

// ─── Helpers ─────────────────────────────────────────────────────────────────

struct Counter {
    value: AtomicI64,
}

#[derive(Debug, thiserror::Error)]
#[error("counter jammed")]
struct Jammed;

fn script() -> Script {
    Script::with_global_options(ScriptOptions::default(), Arc::new(GlobalOptions::new()))
}

fn num(n: f64) -> DynValue { DynValue::number(n) }

fn s(v: &str) -> DynValue { DynValue::string(v) }

fn counter_ty() -> HostType { HostType::of::<Counter>() }

fn member(sc: &Script, ty: HostType, d: MethodDescriptor) {
    sc.types().register_member(ty, d).unwrap_or_else(|e| panic!("register failed: {e}"));
}

fn receiver(call: &HostCall) -> Result<&Counter, lunar_lang::interop::host::HostError> {
    call.receiver::<Counter>().ok_or_else(|| "Counter receiver expected".into())
}

fn register_counter(sc: &Script) {
    let ty = sc.types().register_type::<Counter>("Counter").host_type;

    member(sc, ty, MethodDescriptor::builder(CONSTRUCTOR, |call: &mut HostCall| {
        let start = call.arg(0).as_i64().unwrap_or(0);
        Ok(HostValue::object(Counter { value: AtomicI64::new(start) }))
    })
    .constructor()
    .param(Parameter::new("start", ParamType::Primitive(NumericKind::Int32)).with_default(0i32))
    .build()
    .unwrap());

    member(sc, ty, MethodDescriptor::builder("Add", |call: &mut HostCall| {
        let by = call.arg(0).as_f64().unwrap_or(0.0) as i64;
        receiver(call)?.value.fetch_add(by, Ordering::SeqCst);
        Ok(HostValue::Void)
    })
    .param(Parameter::new("by", ParamType::Number))
    .build()
    .unwrap());

    member(sc, ty, MethodDescriptor::builder("Get", |call: &mut HostCall| {
        Ok(HostValue::from(receiver(call)?.value.load(Ordering::SeqCst)))
    })
    .returns(ParamType::Primitive(NumericKind::Int64))
    .build()
    .unwrap());

    member(sc, ty, MethodDescriptor::builder("Jam", |_: &mut HostCall| -> HostResult { Err(Box::new(Jammed)) })
        .build()
        .unwrap());
}

fn setup() -> (Script, DynValue) {
    let sc = script();
    register_counter(&sc);
    let ty = sc.create_static::<Counter>().unwrap_or_else(|e| panic!("create_static failed: {e}"));
    (sc, ty)
}

fn call_member(sc: &Script, target: &DynValue, name: &str, args: Vec<DynValue>) -> Result<DynValue, ScriptError> {
    let m = sc.member(target, name)?;
    sc.call(&m, args)
}

fn get(sc: &Script, counter: &DynValue) -> i64 {
    let v = call_member(sc, counter, "Get", vec![]).unwrap_or_else(|e| panic!("Get failed: {e}"));
    match v.as_primitive_wrapper().map(|w| w.primitive()) {
        Some(Primitive::Int64(n)) => n,
        other => panic!("expected Int64, got {other:?}"),
    }
}

// ─── Constructors and instance members ───────────────────────────────────────

#[test]
fn static_type_constructs_instances() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![num(5.0)]).unwrap();
    assert_eq!(c.type_name(), "userdata");
    assert_eq!(get(&sc, &c), 5);
}

#[test]
fn missing_argument_takes_the_default() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![]).unwrap();
    assert_eq!(get(&sc, &c), 0);
}

#[test]
fn members_bind_their_receiver() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![num(1.0)]).unwrap();
    call_member(&sc, &c, "Add", vec![num(41.0)]).unwrap();
    assert_eq!(get(&sc, &c), 42);
}

#[test]
fn fuzzy_matching_finds_pascal_case_members() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![]).unwrap();
    call_member(&sc, &c, "add", vec![num(3.0)]).unwrap();
    assert_eq!(get(&sc, &c), 3);

    sc.global_options().set_fuzzy_symbol_matching(FuzzySymbolMatching::NONE);
    assert!(sc.member(&c, "add").is_err());
}

#[test]
fn instance_members_are_hidden_on_the_static_type() {
    let (sc, ty) = setup();
    assert!(sc.member(&ty, "Add").is_err());
}

#[test]
fn unregistered_type_has_no_static() {
    struct Stranger;
    let sc = script();
    assert!(sc.create_static::<Stranger>().is_err());
}

#[test]
fn conversion_failure_names_argument_and_types() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![]).unwrap();
    let err = call_member(&sc, &c, "Add", vec![s("lots")]).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 to 'Add' (number expected, got string)");
}

// ─── Overloads ────────────────────────────────────────────────────────────────

#[test]
fn overload_chosen_by_argument_count() {
    let sc = script();
    let ty = sc.types().register_type::<Counter>("Counter").host_type;
    let one = MethodDescriptor::builder("Scale", |call: &mut HostCall| Ok(HostValue::Number(call.arg(0).as_f64().unwrap_or(0.0))))
        .static_member()
        .param(Parameter::new("a", ParamType::Number))
        .build()
        .unwrap();
    let two = MethodDescriptor::builder("Scale", |call: &mut HostCall| {
        Ok(HostValue::Number(call.arg(0).as_f64().unwrap_or(0.0) * call.arg(1).as_f64().unwrap_or(0.0)))
    })
    .static_member()
    .param(Parameter::new("a", ParamType::Number))
    .param(Parameter::new("b", ParamType::Number))
    .build()
    .unwrap();
    member(&sc, ty, one);
    member(&sc, ty, two);

    let st = sc.static_type(ty);
    assert_eq!(call_member(&sc, &st, "Scale", vec![num(3.0)]).unwrap(), num(3.0));
    assert_eq!(call_member(&sc, &st, "Scale", vec![num(3.0), num(4.0)]).unwrap(), num(12.0));
}

// ─── Open generic methods ─────────────────────────────────────────────────────

fn register_type_name(sc: &Script) -> DynValue {
    let ty = sc.types().register_type::<Counter>("Counter").host_type;
    member(sc, ty, MethodDescriptor::builder("TypeName", |call: &mut HostCall| {
        Ok(HostValue::from(call.type_arg(0).map(|t| t.name().to_string())))
    })
    .static_member()
    .generic(1)
    .returns(ParamType::String)
    .build()
    .unwrap());
    sc.static_type(ty)
}

#[test]
fn generic_slot_infers_runtime_type() {
    let sc = script();
    let st = register_type_name(&sc);
    assert_eq!(call_member(&sc, &st, "TypeName", vec![num(1.0)]).unwrap(), s("f64"));
    let wrapped = sc.wrap_primitive(7u8);
    assert_eq!(call_member(&sc, &st, "TypeName", vec![wrapped]).unwrap(), s("u8"));
}

#[test]
fn generic_slot_uses_a_type_token_directly() {
    let sc = script();
    let st = register_type_name(&sc);
    let name = call_member(&sc, &st, "TypeName", vec![st.clone()]).unwrap();
    assert!(name.as_str().is_some_and(|n| n.ends_with("Counter")));
}

#[test]
fn missing_generic_argument_is_a_binding_error() {
    let sc = script();
    let st = register_type_name(&sc);
    let err = call_member(&sc, &st, "TypeName", vec![]).unwrap_err();
    assert!(matches!(err, ScriptError::GenericBinding { ref method } if method == "TypeName"));
}

#[test]
fn unresolvable_generic_return_is_invisible() {
    let d = MethodDescriptor::builder("Make", |_: &mut HostCall| Ok(HostValue::Void))
        .generic(1)
        .returns(ParamType::Generic(3))
        .try_build();
    assert!(d.is_none());
}

#[test]
fn generic_parameters_convert_to_their_type_argument() {
    let sc = script();
    let (ty, st) = statics(&sc);
    member(&sc, ty, MethodDescriptor::builder("Echo", |call: &mut HostCall| {
        Ok(HostValue::from(call.arg(0).as_primitive().map(|p| p.kind().to_string())))
    })
    .static_member()
    .generic(1)
    .param(Parameter::new("x", ParamType::Generic(0)))
    .returns(ParamType::String)
    .build()
    .unwrap());

    let int32 = sc.globals().get("Int32");
    assert_eq!(call_member(&sc, &st, "Echo", vec![int32, num(5.0)]).unwrap(), s("Int32"));
    let err = call_member(&sc, &st, "Echo", vec![sc.globals().get("Byte"), num(300.0)]).unwrap_err();
    assert!(matches!(err, ScriptError::Overflow { .. }));
}

#[test]
fn generic_parameters_use_converters_of_their_type_argument() {
    let sc = script();
    let (ty, st) = statics(&sc);
    let length: ScriptToHostFn = Arc::new(|v: &DynValue| v.as_str().map(|t| HostValue::Primitive(Primitive::Int32(t.len() as i32))));
    sc.converters()
        .set_script_to_host(lunar_lang::DataType::String, HostType::of::<i32>(), Some(length), None)
        .unwrap();
    member(&sc, ty, MethodDescriptor::builder("Echo", |call: &mut HostCall| {
        Ok(HostValue::from(call.arg(0).as_i64().unwrap_or(-1) as f64))
    })
    .static_member()
    .generic(1)
    .param(Parameter::new("x", ParamType::Generic(0)))
    .build()
    .unwrap());

    let int32 = sc.globals().get("Int32");
    assert_eq!(call_member(&sc, &st, "Echo", vec![int32, s("four")]).unwrap(), num(4.0));
}

// ─── Out, by-ref and variadic parameters ──────────────────────────────────────

fn statics(sc: &Script) -> (HostType, DynValue) {
    let ty = sc.types().register_type::<Counter>("Counter").host_type;
    (ty, sc.static_type(ty))
}

#[test]
fn out_parameters_follow_the_primary_result() {
    let sc = script();
    let (ty, st) = statics(&sc);
    member(&sc, ty, MethodDescriptor::builder("TryParse", |call: &mut HostCall| {
        let parsed = call.arg(0).as_str().and_then(|t| t.parse::<i32>().ok());
        call.set_out(1, parsed.unwrap_or(0));
        Ok(HostValue::Bool(parsed.is_some()))
    })
    .static_member()
    .param(Parameter::new("text", ParamType::String))
    .param(Parameter::new("result", ParamType::Primitive(NumericKind::Int32)).out())
    .build()
    .unwrap());

    let r = call_member(&sc, &st, "TryParse", vec![s("12")]).unwrap();
    let items = r.as_tuple().unwrap_or_else(|| panic!("expected a tuple, got {r:?}"));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], DynValue::TRUE);
    assert_eq!(items[1].as_primitive_wrapper().map(|w| w.primitive()), Some(Primitive::Int32(12)));
}

#[test]
fn void_return_leaves_only_outputs() {
    let sc = script();
    let (ty, st) = statics(&sc);
    member(&sc, ty, MethodDescriptor::builder("Double", |call: &mut HostCall| {
        let x = call.arg(0).as_f64().unwrap_or(0.0);
        call.set_out(0, x * 2.0);
        Ok(HostValue::Void)
    })
    .static_member()
    .param(Parameter::new("x", ParamType::Number).by_ref())
    .build()
    .unwrap());

    let r = call_member(&sc, &st, "Double", vec![num(3.0)]).unwrap();
    assert_eq!(r, DynValue::tuple([num(6.0)]));
    let d = sc.types().resolve(ty, "Double", FuzzySymbolMatching::NONE);
    assert_eq!(d[0].access_mode(), AccessMode::Reflection);
    assert!(!d[0].is_optimized());
}

#[test]
fn variadic_tail_collects_remaining_arguments() {
    let sc = script();
    let (ty, st) = statics(&sc);
    member(&sc, ty, MethodDescriptor::builder("Sum", |call: &mut HostCall| {
        let base = call.arg(0).as_f64().unwrap_or(0.0);
        let rest: f64 = call.arg(1).as_array().map_or(0.0, |a| a.items.iter().filter_map(HostValue::as_f64).sum());
        Ok(HostValue::Number(base + rest))
    })
    .static_member()
    .param(Parameter::new("base", ParamType::Number))
    .param(Parameter::new("rest", ParamType::array(ParamType::Number)).variadic())
    .build()
    .unwrap());

    assert_eq!(call_member(&sc, &st, "Sum", vec![num(1.0)]).unwrap(), num(1.0));
    assert_eq!(call_member(&sc, &st, "Sum", vec![num(1.0), num(2.0), num(3.0), num(4.0)]).unwrap(), num(10.0));
}

#[test]
fn ambient_parameters_are_injected() {
    let sc = script();
    let (ty, st) = statics(&sc);
    member(&sc, ty, MethodDescriptor::builder("Argc", |call: &mut HostCall| {
        let has_script = call.arg(0).as_script().is_some();
        let argc = call.arg(1).as_args().map_or(0, CallbackArguments::len);
        Ok(HostValue::Str(format!("{has_script}:{argc}")))
    })
    .static_member()
    .param(Parameter::new("script", ParamType::Script))
    .param(Parameter::new("args", ParamType::Arguments))
    .build()
    .unwrap());

    assert_eq!(call_member(&sc, &st, "Argc", vec![num(1.0), num(2.0)]).unwrap(), s("true:2"));
}

// ─── Extensions and proxies ───────────────────────────────────────────────────

#[test]
fn extension_methods_bind_the_receiver_first() {
    let (sc, ty) = setup();
    sc.types()
        .register_extension(
            MethodDescriptor::builder("Doubled", |call: &mut HostCall| {
                let c = call.arg(0).downcast_ref::<Counter>().ok_or("Counter expected")?;
                Ok(HostValue::Number(c.value.load(Ordering::SeqCst) as f64 * 2.0))
            })
            .extension_of(counter_ty())
            .param(Parameter::new("self", ParamType::object::<Counter>()))
            .build()
            .unwrap(),
        )
        .unwrap();
    let c = sc.call(&ty, vec![num(21.0)]).unwrap();
    assert_eq!(call_member(&sc, &c, "Doubled", vec![]).unwrap(), num(42.0));
}

#[test]
fn extension_target_is_an_argument_when_called_statically() {
    let (sc, ty) = setup();
    let value = |call: &HostCall| call.arg(0).downcast_ref::<Counter>().map(|c| c.value.load(Ordering::SeqCst) as f64);
    let scaled_by = MethodDescriptor::builder("Scaled", move |call: &mut HostCall| {
        Ok(HostValue::Number(value(call).ok_or("Counter expected")? * call.arg(1).as_f64().unwrap_or(0.0)))
    })
    .extension_of(counter_ty())
    .param(Parameter::new("self", ParamType::object::<Counter>()))
    .param(Parameter::new("by", ParamType::Number))
    .build()
    .unwrap();
    let scaled_ten = MethodDescriptor::builder("Scaled", move |call: &mut HostCall| {
        Ok(HostValue::Number(value(call).ok_or("Counter expected")? * 10.0))
    })
    .extension_of(counter_ty())
    .param(Parameter::new("self", ParamType::object::<Counter>()))
    .build()
    .unwrap();
    sc.types().register_extension(scaled_by).unwrap();
    sc.types().register_extension(scaled_ten).unwrap();

    let c = sc.call(&ty, vec![num(2.0)]).unwrap();
    assert_eq!(call_member(&sc, &c, "Scaled", vec![num(3.0)]).unwrap(), num(6.0));
    assert_eq!(call_member(&sc, &ty, "Scaled", vec![c.clone()]).unwrap(), num(20.0));
    assert_eq!(call_member(&sc, &ty, "Scaled", vec![c, num(3.0)]).unwrap(), num(6.0));
}

#[test]
fn extension_without_target_is_rejected() {
    let sc = script();
    let d = MethodDescriptor::builder("Loose", |_: &mut HostCall| Ok(HostValue::Void)).build().unwrap();
    assert!(matches!(sc.types().register_extension(d), Err(ScriptError::InvalidDescriptor { .. })));
}

struct Account {
    balance: f64,
}

struct AccountView {
    inner: Arc<Account>,
}

struct Bank;

#[test]
fn proxies_expose_their_members_and_hosts_see_the_original() {
    let sc = script();
    let view_ty = sc
        .types()
        .register_proxy::<Account, AccountView, _>("AccountView", |a| AccountView { inner: a })
        .host_type;
    member(&sc, view_ty, MethodDescriptor::builder("Balance", |call: &mut HostCall| {
        let v = call.receiver::<AccountView>().ok_or("AccountView expected")?;
        Ok(HostValue::Number(v.inner.balance))
    })
    .build()
    .unwrap());

    let bank = sc.types().register_type::<Bank>("Bank").host_type;
    member(&sc, bank, MethodDescriptor::builder("Audit", |call: &mut HostCall| {
        Ok(HostValue::Bool(call.arg(0).downcast_ref::<Account>().is_some()))
    })
    .static_member()
    .param(Parameter::new("account", ParamType::object::<Account>()))
    .build()
    .unwrap());

    let acct = sc.user_data(HostObject::new(Account { balance: 12.5 }));
    assert_eq!(call_member(&sc, &acct, "balance", vec![]).unwrap(), num(12.5));
    let st = sc.static_type(bank);
    assert_eq!(call_member(&sc, &st, "Audit", vec![acct]).unwrap(), DynValue::TRUE);
}

// ─── Host failures ────────────────────────────────────────────────────────────

#[test]
fn host_failure_keeps_its_cause() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![]).unwrap();
    let err = call_member(&sc, &c, "Jam", vec![]).unwrap_err();
    assert!(matches!(err, ScriptError::HostInvocation { ref method, .. } if method == "Jam"));
    assert!(err.host_cause().is_some_and(|cause| cause.downcast_ref::<Jammed>().is_some()));
    assert!(!err.is_recoverable());
}

#[test]
fn script_errors_from_host_code_pass_through_unwrapped() {
    let sc = script();
    let (ty, st) = statics(&sc);
    member(&sc, ty, MethodDescriptor::builder("Picky", |_: &mut HostCall| -> HostResult {
        Err(Box::new(ScriptError::bad_argument(1, "Picky", "not today")))
    })
    .static_member()
    .build()
    .unwrap());
    let err = call_member(&sc, &st, "Picky", vec![]).unwrap_err();
    assert!(matches!(err, ScriptError::BadArgument { .. }));
}

// ─── Array constructor and access modes ───────────────────────────────────────

#[test]
fn array_constructor_builds_default_filled_tables() {
    let sc = script();
    let d = MethodDescriptor::array_constructor(ParamType::Number, 2);
    let ctx = ExecutionContext::new(sc.clone());
    let args = CallbackArguments::new(vec![num(2.0), num(3.0)], false);
    let v = d.execute(&sc, None, &ctx, &args).unwrap();

    let rows = v.as_table().unwrap_or_else(|| panic!("expected a table, got {v:?}"));
    assert_eq!(rows.len(), 2);
    let row = rows.get_index(1);
    assert_eq!(row.as_table().map(|t| t.len()), Some(3));
    assert_eq!(row.as_table().map(|t| t.get_index(3)), Some(num(0.0)));
}

#[test]
fn negative_array_extent_is_bad_argument() {
    let sc = script();
    let d = MethodDescriptor::array_constructor(ParamType::Bool, 1);
    let ctx = ExecutionContext::new(sc.clone());
    let args = CallbackArguments::new(vec![num(-1.0)], false);
    assert!(matches!(d.execute(&sc, None, &ctx, &args), Err(ScriptError::BadArgument { .. })));
}

#[test]
fn lazy_mode_caches_the_plan_on_first_call() {
    let (sc, ty) = setup();
    let c = sc.call(&ty, vec![]).unwrap();
    let add = sc.types().resolve(counter_ty(), "Add", FuzzySymbolMatching::NONE);
    assert!(!add[0].is_optimized());
    call_member(&sc, &c, "Add", vec![num(1.0)]).unwrap();
    assert!(add[0].is_optimized());
}

#[test]
fn reflection_default_never_caches() {
    let (sc, ty) = setup();
    sc.global_options().set_default_access_mode(AccessMode::Reflection).unwrap();
    let c = sc.call(&ty, vec![]).unwrap();
    call_member(&sc, &c, "Add", vec![num(1.0)]).unwrap();
    let add = sc.types().resolve(counter_ty(), "Add", FuzzySymbolMatching::NONE);
    assert!(!add[0].is_optimized());
    assert!(sc.global_options().set_default_access_mode(AccessMode::Default).is_err());
}
