use std::sync::Arc;

use tracing::debug;

use crate::error::ScriptError;
use crate::runtime::callback::{CallbackArguments, ExecutionContext};
use crate::runtime::value::DynValue;
use crate::Script;

pub mod basic;
pub mod error_handling;
pub mod primitives;

// ─── Export ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind { Function, Constant }

#[derive(Debug, Clone, Copy)]
pub struct Export {
    pub name: &'static str,
    pub kind: ExportKind,
}

// ─── Module interface ─────────────────────────────────────────────────────────

/// A set of globals installed into every script: functions dispatched by name
/// through `call`, constants produced per script by `constant`.
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;
    fn exports(&self) -> Vec<Export>;

    /// `Ok(None)` when `name` is not one of this module's functions.
    fn call(
        &self,
        name: &str,
        ctx: &ExecutionContext,
        args: &CallbackArguments,
    ) -> Result<Option<DynValue>, ScriptError>;

    fn constant(&self, script: &Script, name: &str) -> Option<DynValue>;
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self { Self { modules: Vec::new() } }

    pub fn register(&mut self, m: Arc<dyn Module>) { self.modules.push(m); }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules.iter().find(|m| m.name() == name).map(|m| m.as_ref())
    }

    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(Arc::new(basic::BasicModule));
        r.register(Arc::new(error_handling::ErrorHandlingModule));
        r.register(Arc::new(primitives::PrimitivesModule));
        r
    }

    /// Bind every export of every module as a global of `script`.
    pub fn install(&self, script: &Script) {
        let globals = script.globals();
        for module in &self.modules {
            for export in module.exports() {
                let value = match export.kind {
                    ExportKind::Function => {
                        let module = Arc::clone(module);
                        let name = export.name;
                        DynValue::callback(name, move |ctx, args| {
                            module
                                .call(name, ctx, args)?
                                .ok_or_else(|| ScriptError::runtime(format!("`{name}` is not implemented")))
                        })
                    }
                    ExportKind::Constant => module.constant(script, export.name).unwrap_or(DynValue::Nil),
                };
                globals.set(export.name, value);
            }
            debug!(module = module.name(), "module installed");
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self { Self::standard() }
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

pub(crate) fn check_argc(name: &str, args: &CallbackArguments, n: usize) -> Result<(), ScriptError> {
    if args.len() < n {
        Err(ScriptError::value_expected(args.len() + 1, name))
    } else {
        Ok(())
    }
}

pub(crate) fn function(name: &'static str) -> Export {
    Export { name, kind: ExportKind::Function }
}

pub(crate) fn constant(name: &'static str) -> Export {
    Export { name, kind: ExportKind::Constant }
}
