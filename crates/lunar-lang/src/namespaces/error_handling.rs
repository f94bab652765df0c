//! Protected calls and raising errors: `pcall`, `error`.
//!
//! `pcall(f, ...)` never calls `f` itself. It answers with a tail-call request
//! over `f` carrying a continuation and an error handler, and the processor
//! runs `f` in the current frame:
//!   • success → continuation(result)  → `(true, result)`
//!   • failure → handler(error value)  → `(true, error)`, reported as `(false, error)`

use std::sync::{Arc, OnceLock};

use crate::error::ScriptError;
use crate::runtime::callback::{CallbackArguments, CallbackFunction, ExecutionContext};
use crate::runtime::value::{DynValue, TailCallData};
use crate::Script;
use super::{check_argc, function, Export, Module};

pub struct ErrorHandlingModule;

impl Module for ErrorHandlingModule {
    fn name(&self) -> &'static str { "error_handling" }

    fn exports(&self) -> Vec<Export> {
        vec![function("pcall"), function("error")]
    }

    fn call(
        &self,
        name: &str,
        _ctx: &ExecutionContext,
        args: &CallbackArguments,
    ) -> Result<Option<DynValue>, ScriptError> {
        match name {
            "pcall" => pcall(args).map(Some),
            "error" => {
                check_argc("error", args, 1)?;
                Err(ScriptError::Raised { value: args.get(0) })
            }
            _ => Ok(None),
        }
    }

    fn constant(&self, _script: &Script, _name: &str) -> Option<DynValue> { None }
}

/// Build the tail-call request for `pcall(target, args...)`.
pub fn pcall(args: &CallbackArguments) -> Result<DynValue, ScriptError> {
    let Some(target) = args.raw_get(0) else {
        return Err(ScriptError::value_expected(1, "pcall"));
    };
    Ok(DynValue::tail_call_request(TailCallData {
        function:      target.clone(),
        args:          args.as_slice()[1..].to_vec(),
        continuation:  Some(Arc::clone(continuation())),
        error_handler: Some(Arc::clone(error_handler())),
    }))
}

fn continuation() -> &'static Arc<CallbackFunction> {
    static K: OnceLock<Arc<CallbackFunction>> = OnceLock::new();
    K.get_or_init(|| Arc::new(CallbackFunction::new("pcall_continuation", pcall_continuation)))
}

fn error_handler() -> &'static Arc<CallbackFunction> {
    static H: OnceLock<Arc<CallbackFunction>> = OnceLock::new();
    H.get_or_init(|| Arc::new(CallbackFunction::new("pcall_onerror", pcall_onerror)))
}

/// `(true, primary result)`.
pub fn pcall_continuation(_ctx: &ExecutionContext, args: &CallbackArguments) -> Result<DynValue, ScriptError> {
    Ok(DynValue::tuple([DynValue::TRUE, args.get(0)]))
}

/// `(true, error value)`. The processor turns the flag to `false`.
pub fn pcall_onerror(_ctx: &ExecutionContext, args: &CallbackArguments) -> Result<DynValue, ScriptError> {
    Ok(DynValue::tuple([DynValue::TRUE, args.get(0)]))
}
