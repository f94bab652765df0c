//! Trampoline that runs callables to completion.
//!
//! A callable may answer with a `TailCallRequest` instead of a value. The
//! processor then pushes a pending frame holding the request's continuation and
//! error handler, runs the requested call in place, and routes its result (or
//! its error) back through that frame. Nested protected calls therefore grow
//! the bounded frame stack, never the native one.
//!
//! Host code may also re-enter the script (`ExecutionContext::call`, operator
//! metamethods). Every processor of a script draws on one [`CallDepth`]
//! budget, so such re-entry is bounded by the same capacity as pending frames.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::ScriptError;
use crate::runtime::callback::{CallbackArguments, CallbackFunction, ExecutionContext};
use crate::runtime::stack::FastStack;
use crate::runtime::table::metamethod;
use crate::runtime::value::DynValue;
use crate::Script;

// ─── Call depth ───────────────────────────────────────────────────────────────

/// Call levels in use across every processor of one script: each pending
/// frame, and each call entered while another is already running.
#[derive(Debug, Default)]
pub struct CallDepth {
    entries: AtomicUsize,
    frames:  AtomicUsize,
}

impl CallDepth {
    pub fn in_use(&self) -> usize {
        self.entries.load(Ordering::Acquire).saturating_sub(1) + self.frames.load(Ordering::Acquire)
    }

    /// Register a call into the script. The outermost call is free; a
    /// re-entrant one costs a level and fails once `capacity` is spent.
    pub fn enter(&self, capacity: usize) -> Result<CallEntry<'_>, ScriptError> {
        let before = self.entries.fetch_add(1, Ordering::AcqRel);
        let entry = CallEntry { depth: self, outermost: before == 0 };
        if self.in_use() > capacity {
            debug!(capacity, "call depth exhausted on re-entry");
            return Err(ScriptError::StackOverflow);
        }
        Ok(entry)
    }

    fn claim_frame(&self, capacity: usize) -> Result<(), ScriptError> {
        self.frames.fetch_add(1, Ordering::AcqRel);
        if self.in_use() > capacity {
            self.release_frames(1);
            return Err(ScriptError::StackOverflow);
        }
        Ok(())
    }

    fn release_frames(&self, n: usize) {
        self.frames.fetch_sub(n, Ordering::AcqRel);
    }
}

/// One active call into the script; leaves on drop.
pub struct CallEntry<'a> {
    depth:     &'a CallDepth,
    outermost: bool,
}

impl CallEntry<'_> {
    pub fn is_outermost(&self) -> bool { self.outermost }
}

impl Drop for CallEntry<'_> {
    fn drop(&mut self) {
        self.depth.entries.fetch_sub(1, Ordering::AcqRel);
    }
}

// ─── Processor ────────────────────────────────────────────────────────────────

struct PendingFrame {
    continuation:  Option<Arc<CallbackFunction>>,
    error_handler: Option<Arc<CallbackFunction>>,
}

enum Step {
    Call(DynValue, Vec<DynValue>),
    Recover(Arc<CallbackFunction>, DynValue),
    Return(DynValue),
}

pub struct Processor {
    script: Script,
    ctx:    ExecutionContext,
    frames: FastStack<PendingFrame>,
}

impl Processor {
    pub fn new(script: Script) -> Self {
        let capacity = script.options().call_stack_capacity;
        let ctx = ExecutionContext::new(script.clone());
        Self { script, ctx, frames: FastStack::new(capacity) }
    }

    /// Number of protected or continued calls currently pending.
    pub fn depth(&self) -> usize { self.frames.len() }

    /// Call `function` with `args` and drive every tail-call request it produces.
    pub fn call(&mut self, function: &DynValue, args: Vec<DynValue>) -> Result<DynValue, ScriptError> {
        let base = self.frames.len();
        let mut step = Step::Call(function.clone(), args);

        loop {
            let outcome = match step {
                Step::Call(f, args) => self.invoke(&f, args),
                Step::Recover(handler, err_value) => handler
                    .invoke(&self.ctx, &CallbackArguments::new(vec![err_value], false))
                    .map(mark_failed),
                Step::Return(v) => Ok(v),
            };

            step = match outcome {
                Ok(DynValue::TailCallRequest(req)) => {
                    trace!(
                        depth = self.frames.len(),
                        protected = req.error_handler.is_some(),
                        "tail call request"
                    );
                    let frame = PendingFrame {
                        continuation:  req.continuation.clone(),
                        error_handler: req.error_handler.clone(),
                    };
                    match self.push_frame(frame) {
                        Ok(()) => Step::Call(req.function.clone(), req.args.clone()),
                        Err(overflow) => self.unwind(base, overflow)?,
                    }
                }
                Ok(value) => {
                    if self.frames.len() == base {
                        return Ok(value);
                    }
                    let frame = self.frames.pop();
                    self.script.call_depth().release_frames(1);
                    match frame.continuation {
                        Some(k) => Step::Call(DynValue::Function(k), vec![value.first()]),
                        None => Step::Return(value),
                    }
                }
                Err(err) => self.unwind(base, err)?,
            };
        }
    }

    /// Find the nearest pending frame above `base` able to handle `err` and
    /// drop every frame above it. Fails with `err` when no frame catches it.
    fn unwind(&mut self, base: usize, err: ScriptError) -> Result<Step, ScriptError> {
        let catchable = err.is_recoverable() || self.script.global_options().should_pcall_catch(&err);
        let handler_at = if catchable {
            (base..self.frames.len())
                .rev()
                .find(|&i| self.frames.get(i).is_some_and(|f| f.error_handler.is_some()))
        } else {
            None
        };

        let Some(index) = handler_at else {
            self.truncate_frames(base);
            return Err(err);
        };
        let handler = self.frames.get(index).and_then(|f| f.error_handler.clone());
        self.truncate_frames(index);
        debug!(code = err.code().as_str(), depth = index, "protected call caught error: {err}");
        match handler {
            Some(h) => Ok(Step::Recover(h, err.to_dyn_value())),
            None => Err(err),
        }
    }

    fn push_frame(&mut self, frame: PendingFrame) -> Result<(), ScriptError> {
        let capacity = self.script.options().call_stack_capacity;
        self.script.call_depth().claim_frame(capacity)?;
        self.frames.push(frame).inspect_err(|_| self.script.call_depth().release_frames(1))
    }

    fn truncate_frames(&mut self, count: usize) {
        let dropped = self.frames.len().saturating_sub(count);
        self.frames.truncate(count);
        self.script.call_depth().release_frames(dropped);
    }

    fn invoke(&self, function: &DynValue, args: Vec<DynValue>) -> Result<DynValue, ScriptError> {
        match function {
            DynValue::Function(f) => {
                trace!(function = f.name(), argc = args.len(), "invoke");
                f.invoke(&self.ctx, &CallbackArguments::new(args, false))
            }
            DynValue::Tuple(_) => self.invoke(&function.first(), args),
            DynValue::Table(_) | DynValue::UserData(_) => match metamethod(function, "__call") {
                Some(DynValue::Function(m)) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(function.clone());
                    full.extend(args);
                    trace!(function = m.name(), argc = full.len(), "invoke __call");
                    m.invoke(&self.ctx, &CallbackArguments::new(full, true))
                }
                _ => Err(not_callable(function)),
            },
            _ => Err(not_callable(function)),
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.script.call_depth().release_frames(self.frames.len());
    }
}

fn not_callable(v: &DynValue) -> ScriptError {
    ScriptError::runtime(format!("attempt to call a {} value", v.type_name()))
}

/// Error handlers answer `(true, error)`; the protected call reports `(false, error)`.
fn mark_failed(result: DynValue) -> DynValue {
    match &result {
        DynValue::Tuple(items) if items.first() == Some(&DynValue::TRUE) => {
            DynValue::tuple(std::iter::once(DynValue::FALSE).chain(items.iter().skip(1).cloned()))
        }
        _ => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_true_is_flipped() {
        let v = mark_failed(DynValue::tuple([DynValue::TRUE, DynValue::string("boom")]));
        assert_eq!(v, DynValue::tuple([DynValue::FALSE, DynValue::string("boom")]));
    }

    #[test]
    fn other_handler_results_pass_through() {
        assert_eq!(mark_failed(DynValue::number(1.0)), DynValue::number(1.0));
        let t = DynValue::tuple([DynValue::FALSE]);
        assert_eq!(mark_failed(t.clone()), t);
    }

    #[test]
    fn outermost_entry_is_free() {
        let depth = CallDepth::default();
        let outer = depth.enter(0).unwrap_or_else(|e| panic!("outer entry refused: {e}"));
        assert!(outer.is_outermost());
        assert!(matches!(depth.enter(0), Err(ScriptError::StackOverflow)));
        assert_eq!(depth.in_use(), 0);
    }

    #[test]
    fn entries_and_frames_share_one_budget() {
        let depth = CallDepth::default();
        let _outer = depth.enter(2).unwrap_or_else(|e| panic!("{e}"));
        assert!(depth.claim_frame(2).is_ok());
        let inner = depth.enter(2).unwrap_or_else(|e| panic!("{e}"));
        assert!(!inner.is_outermost());
        assert!(matches!(depth.claim_frame(2), Err(ScriptError::StackOverflow)));
        drop(inner);
        depth.release_frames(1);
        assert_eq!(depth.in_use(), 0);
    }
}
