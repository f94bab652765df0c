use std::fmt;

use crate::error::ScriptError;
use crate::runtime::value::DynValue;
use crate::Script;

/// Host closure invoked when a script calls a callback function.
pub type CallbackFn =
    dyn Fn(&ExecutionContext, &CallbackArguments) -> Result<DynValue, ScriptError> + Send + Sync;

/// A script-callable function implemented by the host.
pub struct CallbackFunction {
    name: String,
    func: Box<CallbackFn>,
}

impl CallbackFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ExecutionContext, &CallbackArguments) -> Result<DynValue, ScriptError> + Send + Sync + 'static,
    {
        Self { name: name.into(), func: Box::new(func) }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn invoke(&self, ctx: &ExecutionContext, args: &CallbackArguments) -> Result<DynValue, ScriptError> {
        (self.func)(ctx, args)
    }
}

impl fmt::Debug for CallbackFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

// ─── Execution context ────────────────────────────────────────────────────────

/// What a callback sees of the running script.
#[derive(Clone)]
pub struct ExecutionContext {
    script: Script,
}

impl ExecutionContext {
    pub fn new(script: Script) -> Self { Self { script } }

    pub fn script(&self) -> &Script { &self.script }

    /// Call `function` to completion from host code.
    pub fn call(&self, function: &DynValue, args: Vec<DynValue>) -> Result<DynValue, ScriptError> {
        self.script.call(function, args)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExecutionContext")
    }
}

// ─── Arguments ────────────────────────────────────────────────────────────────

/// Arguments of a callback invocation. A trailing tuple is expanded in place.
#[derive(Debug, Clone, Default)]
pub struct CallbackArguments {
    args:           Vec<DynValue>,
    is_method_call: bool,
}

impl CallbackArguments {
    pub fn new(args: Vec<DynValue>, is_method_call: bool) -> Self {
        let mut args = args;
        if let Some(DynValue::Tuple(tail)) = args.last().cloned() {
            args.pop();
            args.extend(tail.iter().cloned());
        }
        Self { args, is_method_call }
    }

    pub fn len(&self) -> usize { self.args.len() }

    pub fn is_empty(&self) -> bool { self.args.is_empty() }

    pub fn is_method_call(&self) -> bool { self.is_method_call }

    /// Argument at `index`, nil when absent. A tuple argument yields its first element.
    pub fn get(&self, index: usize) -> DynValue {
        self.args.get(index).map(DynValue::first).unwrap_or_default()
    }

    /// Argument at `index` exactly as passed.
    pub fn raw_get(&self, index: usize) -> Option<&DynValue> { self.args.get(index) }

    pub fn as_slice(&self) -> &[DynValue] { &self.args }

    /// The same arguments without the implicit receiver of a method call.
    pub fn skip_method_call(&self) -> CallbackArguments {
        if !self.is_method_call {
            return self.clone();
        }
        Self { args: self.args.iter().skip(1).cloned().collect(), is_method_call: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_tuple_is_expanded() {
        let tail = DynValue::tuple([DynValue::number(2.0), DynValue::number(3.0)]);
        let args = CallbackArguments::new(vec![DynValue::number(1.0), tail], false);
        assert_eq!(args.len(), 3);
        assert_eq!(args.get(2), DynValue::number(3.0));
        assert_eq!(args.get(9), DynValue::Nil);
    }

    #[test]
    fn method_call_receiver_can_be_skipped() {
        let args = CallbackArguments::new(vec![DynValue::string("self"), DynValue::number(1.0)], true);
        let rest = args.skip_method_call();
        assert_eq!(rest.len(), 1);
        assert!(!rest.is_method_call());
        assert_eq!(rest.get(0), DynValue::number(1.0));
    }
}
