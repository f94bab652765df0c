//! Custom conversion registry.
//!
//! Script → host converters are keyed by (script data kind, host type) and may
//! carry a predicate; host → script converters are keyed by exact host type.
//! A missing entry, a failing predicate or a converter answering `None` all
//! mean "use the standard conversion".

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::ScriptError;
use crate::interop::host::{HostType, HostValue};
use crate::runtime::value::{DataType, DynValue};
use crate::Script;

pub type ScriptToHostFn = Arc<dyn Fn(&DynValue) -> Option<HostValue> + Send + Sync>;

pub type ConversionPredicate = Arc<dyn Fn(&DynValue) -> bool + Send + Sync>;

pub type HostToScriptFn = Arc<dyn Fn(&Script, &HostValue) -> DynValue + Send + Sync>;

#[derive(Clone)]
struct ScriptToHostEntry {
    converter: ScriptToHostFn,
    predicate: Option<ConversionPredicate>,
}

#[derive(Default)]
pub struct CustomConverters {
    script_to_host: DashMap<(DataType, HostType), ScriptToHostEntry>,
    host_to_script: DashMap<HostType, HostToScriptFn>,
}

impl CustomConverters {
    pub fn new() -> Self { Self::default() }

    // ── Script → host ────────────────────────────────────────────────────────

    /// Install, replace or (with `converter: None`) remove the converter for
    /// values of `kind` headed for `host_type`. A predicate without a converter
    /// is rejected.
    pub fn set_script_to_host(
        &self,
        kind: DataType,
        host_type: HostType,
        converter: Option<ScriptToHostFn>,
        predicate: Option<ConversionPredicate>,
    ) -> Result<(), ScriptError> {
        if !kind.is_convertible() {
            return Err(ScriptError::bad_argument(
                1,
                "set_script_to_host",
                format!("{} values cannot be converted", kind.name()),
            ));
        }
        match converter {
            Some(converter) => {
                debug!(kind = kind.name(), host_type = host_type.name(), guarded = predicate.is_some(), "script→host converter set");
                self.script_to_host.insert((kind, host_type), ScriptToHostEntry { converter, predicate });
            }
            None if predicate.is_some() => {
                return Err(ScriptError::bad_argument(
                    4,
                    "set_script_to_host",
                    "conversion predicate given without a converter",
                ));
            }
            None => {
                debug!(kind = kind.name(), host_type = host_type.name(), "script→host converter removed");
                self.script_to_host.remove(&(kind, host_type));
            }
        }
        Ok(())
    }

    /// Closure-taking form of [`set_script_to_host`](Self::set_script_to_host).
    pub fn register_script_to_host<F>(&self, kind: DataType, host_type: HostType, converter: F) -> Result<(), ScriptError>
    where
        F: Fn(&DynValue) -> Option<HostValue> + Send + Sync + 'static,
    {
        self.set_script_to_host(kind, host_type, Some(Arc::new(converter)), None)
    }

    /// Like [`register_script_to_host`](Self::register_script_to_host), guarded by `predicate`.
    pub fn register_script_to_host_when<F, P>(
        &self,
        kind: DataType,
        host_type: HostType,
        converter: F,
        predicate: P,
    ) -> Result<(), ScriptError>
    where
        F: Fn(&DynValue) -> Option<HostValue> + Send + Sync + 'static,
        P: Fn(&DynValue) -> bool + Send + Sync + 'static,
    {
        self.set_script_to_host(kind, host_type, Some(Arc::new(converter)), Some(Arc::new(predicate)))
    }

    /// The converter applicable to `value` headed for `host_type`, if any.
    pub fn lookup_script_to_host(&self, value: &DynValue, host_type: HostType) -> Option<ScriptToHostFn> {
        // Clone out of the map so the predicate runs without holding a shard lock.
        let entry = self.script_to_host.get(&(value.data_type(), host_type))?.value().clone();
        match entry.predicate {
            Some(p) if !p(value) => None,
            _ => Some(entry.converter),
        }
    }

    // ── Host → script ────────────────────────────────────────────────────────

    pub fn set_host_to_script(&self, host_type: HostType, converter: Option<HostToScriptFn>) {
        match converter {
            Some(c) => {
                debug!(host_type = host_type.name(), "host→script converter set");
                self.host_to_script.insert(host_type, c);
            }
            None => {
                self.host_to_script.remove(&host_type);
            }
        }
    }

    /// Register a converter for host objects of type `T`. Strings, numbers and
    /// other non-object values need [`set_host_to_script`](Self::set_host_to_script).
    pub fn register_host_to_script<T, F>(&self, converter: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Script, &T) -> DynValue + Send + Sync + 'static,
    {
        let f: HostToScriptFn = Arc::new(move |script, value| match value.downcast_ref::<T>() {
            Some(v) => converter(script, v),
            None => DynValue::Nil,
        });
        self.set_host_to_script(HostType::of::<T>(), Some(f));
    }

    pub fn lookup_host_to_script(&self, host_type: HostType) -> Option<HostToScriptFn> {
        self.host_to_script.get(&host_type).map(|e| Arc::clone(e.value()))
    }

    /// Remove every converter in both directions.
    pub fn clear(&self) {
        self.script_to_host.clear();
        self.host_to_script.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.script_to_host.is_empty() && self.host_to_script.is_empty()
    }
}
