//! Conversion registry: custom script→host and host→script converters.

use std::sync::Arc;
use std::thread;

use lunar_lang::{
    CustomConverters, DataType, DynValue, GlobalOptions, HostObject, HostType, HostValue, NumericKind,
    ParamType, Script, ScriptError, ScriptOptions,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn script() -> Script {
    Script::with_global_options(ScriptOptions::default(), Arc::new(GlobalOptions::new()))
}

fn string_ty() -> HostType { HostType::of::<String>() }

#[derive(Debug, PartialEq)]
struct Celsius(f64);

// ─── Script → host ────────────────────────────────────────────────────────────

#[test]
fn lookup_without_entry_is_none() {
    let c = CustomConverters::new();
    assert!(c.lookup_script_to_host(&DynValue::number(1.0), string_ty()).is_none());
    assert!(c.is_empty());
}

#[test]
fn registered_converter_is_found_for_its_data_kind_only() {
    let c = CustomConverters::new();
    c.register_script_to_host(DataType::Number, string_ty(), |v| {
        v.as_number().map(|n| HostValue::Str(format!("#{n}")))
    })
    .unwrap();
    let convert = c.lookup_script_to_host(&DynValue::number(7.0), string_ty()).unwrap();
    assert_eq!(convert(&DynValue::number(7.0)).and_then(|h| h.as_str().map(String::from)).as_deref(), Some("#7"));
    assert!(c.lookup_script_to_host(&DynValue::string("7"), string_ty()).is_none());
}

#[test]
fn false_predicate_falls_back() {
    let c = CustomConverters::new();
    c.register_script_to_host_when(
        DataType::Number,
        string_ty(),
        |_| Some(HostValue::Str("big".into())),
        |v| v.as_number().is_some_and(|n| n > 100.0),
    )
    .unwrap();
    assert!(c.lookup_script_to_host(&DynValue::number(5.0), string_ty()).is_none());
    assert!(c.lookup_script_to_host(&DynValue::number(500.0), string_ty()).is_some());
}

#[test]
fn registering_none_removes_the_entry() {
    let c = CustomConverters::new();
    c.register_script_to_host(DataType::Boolean, string_ty(), |_| None).unwrap();
    assert!(!c.is_empty());
    c.set_script_to_host(DataType::Boolean, string_ty(), None, None).unwrap();
    assert!(c.is_empty());
}

#[test]
fn tuple_kind_is_rejected() {
    let c = CustomConverters::new();
    let err = c.register_script_to_host(DataType::Tuple, string_ty(), |_| None).unwrap_err();
    assert!(matches!(err, ScriptError::BadArgument { .. }));
}

#[test]
fn clear_removes_both_directions() {
    let c = CustomConverters::new();
    c.register_script_to_host(DataType::String, string_ty(), |_| None).unwrap();
    c.register_host_to_script::<Celsius, _>(|_, t| DynValue::number(t.0));
    c.clear();
    assert!(c.is_empty());
    assert!(c.lookup_host_to_script(HostType::of::<Celsius>()).is_none());
}

#[test]
fn concurrent_registration_and_lookup() {
    let c = Arc::new(CustomConverters::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                for _ in 0..100 {
                    let kind = if i % 2 == 0 { DataType::Number } else { DataType::String };
                    c.register_script_to_host(kind, string_ty(), |_| None).unwrap();
                    let _ = c.lookup_script_to_host(&DynValue::number(1.0), string_ty());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert!(c.lookup_script_to_host(&DynValue::string("x"), string_ty()).is_some());
}

// ─── Through the script boundary ──────────────────────────────────────────────

#[test]
fn custom_converter_wins_over_standard_conversion() {
    let sc = script();
    sc.converters()
        .register_script_to_host(DataType::Boolean, string_ty(), |v| {
            Some(HostValue::Str(if v.is_truthy() { "yes" } else { "no" }.into()))
        })
        .unwrap();
    let h = sc.to_host(&DynValue::TRUE, &ParamType::String).unwrap();
    assert_eq!(h.as_str(), Some("yes"));
}

#[test]
fn converter_returning_none_uses_standard_conversion() {
    let sc = script();
    sc.converters().register_script_to_host(DataType::Number, string_ty(), |_| None).unwrap();
    let h = sc.to_host(&DynValue::number(2.0), &ParamType::String).unwrap();
    assert_eq!(h.as_str(), Some("2"));
}

#[test]
fn standard_conversion_reports_mismatch() {
    let sc = script();
    let err = sc.to_host(&DynValue::TRUE, &ParamType::Number).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 to 'to_host' (number expected, got boolean)");
}

#[test]
fn number_to_integer_parameter_is_checked() {
    let sc = script();
    let ok = sc.to_host(&DynValue::number(200.0), &ParamType::Primitive(NumericKind::Byte)).unwrap();
    assert_eq!(ok.as_i64(), Some(200));
    let err = sc.to_host(&DynValue::number(300.0), &ParamType::Primitive(NumericKind::Byte)).unwrap_err();
    assert!(matches!(err, ScriptError::Overflow { .. }));
}

#[test]
fn nullable_receives_null_for_nil() {
    let sc = script();
    let h = sc.to_host(&DynValue::Nil, &ParamType::nullable(ParamType::Number)).unwrap();
    assert!(h.is_null());
}

// ─── Host → script ────────────────────────────────────────────────────────────

#[test]
fn host_object_converter_is_exact_type_keyed() {
    let sc = script();
    sc.converters().register_host_to_script::<Celsius, _>(|_, t| DynValue::number(t.0 * 9.0 / 5.0 + 32.0));
    assert_eq!(sc.to_script(HostObject::new(Celsius(100.0))), DynValue::number(212.0));
}

#[test]
fn standard_host_results() {
    let sc = script();
    assert_eq!(sc.to_script(2.5), DynValue::number(2.5));
    assert_eq!(sc.to_script("hi"), DynValue::string("hi"));
    assert_eq!(sc.to_script(HostValue::Void), DynValue::Nil);
    assert_eq!(sc.to_script(None::<f64>), DynValue::Nil);
    let w = sc.to_script(7i32);
    assert_eq!(w.type_name(), "number");
    assert_eq!(w.as_primitive_wrapper().map(|w| w.kind()), Some(NumericKind::Int32));
}
