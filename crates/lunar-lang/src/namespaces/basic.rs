//! Always-installed value inspection: `type`, `tostring`, `tonumber`.

use crate::error::ScriptError;
use crate::runtime::callback::{CallbackArguments, ExecutionContext};
use crate::runtime::value::{parse_number, DynValue};
use crate::Script;
use super::{check_argc, function, Export, Module};

pub struct BasicModule;

impl Module for BasicModule {
    fn name(&self) -> &'static str { "basic" }

    fn exports(&self) -> Vec<Export> {
        vec![function("type"), function("tostring"), function("tonumber")]
    }

    fn call(
        &self,
        name: &str,
        _ctx: &ExecutionContext,
        args: &CallbackArguments,
    ) -> Result<Option<DynValue>, ScriptError> {
        let v = match name {
            "type" => {
                check_argc("type", args, 1)?;
                DynValue::string(args.get(0).type_name())
            }
            "tostring" => {
                check_argc("tostring", args, 1)?;
                DynValue::string(args.get(0).to_print_string())
            }
            "tonumber" => {
                check_argc("tonumber", args, 1)?;
                tonumber(&args.get(0), &args.get(1))?
            }
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    fn constant(&self, _script: &Script, _name: &str) -> Option<DynValue> { None }
}

fn tonumber(v: &DynValue, base: &DynValue) -> Result<DynValue, ScriptError> {
    if base.is_nil() {
        return Ok(v.to_number().map_or(DynValue::Nil, DynValue::Number));
    }
    let base = base
        .as_number()
        .ok_or_else(|| ScriptError::bad_argument_type(2, "tonumber", "number", base))?;
    if !(2.0..=36.0).contains(&base) || base.fract() != 0.0 {
        return Err(ScriptError::bad_argument(2, "tonumber", "base out of range"));
    }
    let text = match v {
        DynValue::String(s) => s.trim().to_string(),
        DynValue::Number(n) => return Ok(if base == 10.0 { DynValue::Number(*n) } else { DynValue::Nil }),
        other => return Err(ScriptError::bad_argument_type(1, "tonumber", "string", other)),
    };
    if base == 10.0 {
        return Ok(parse_number(&text).map_or(DynValue::Nil, DynValue::Number));
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    Ok(match i64::from_str_radix(digits, base as u32) {
        Ok(n) if negative => DynValue::Number(-(n as f64)),
        Ok(n) => DynValue::Number(n as f64),
        Err(_) => DynValue::Nil,
    })
}
