//! Host type registry: the members scripts can reach on each host type.
//!
//! Consumed by:
//!   • `Script::member` for instance, static and extension lookup
//!   • static userdata for constructors registered under `__new`
//!
//! Exposing a host type = `register_type` plus one `register_member` per
//! member. Overloads share a name and are told apart by argument count.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::ScriptError;
use crate::interop::descriptor::MethodDescriptor;
use crate::interop::host::{HostObject, HostType};
use crate::options::FuzzySymbolMatching;

/// Member name under which constructors are registered.
pub const CONSTRUCTOR: &str = "__new";

// ─── Descriptors ──────────────────────────────────────────────────────────────

pub struct TypeDescriptor {
    pub name:      String,
    pub host_type: HostType,
    members:       DashMap<String, Vec<Arc<MethodDescriptor>>>,
}

impl TypeDescriptor {
    fn new(name: String, host_type: HostType) -> Self {
        Self { name, host_type, members: DashMap::new() }
    }

    /// Overloads registered under exactly `name`.
    pub fn overloads(&self, name: &str) -> Vec<Arc<MethodDescriptor>> {
        self.members.get(name).map(|m| m.value().clone()).unwrap_or_default()
    }

    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

pub type ProxyFactory = Arc<dyn Fn(&HostObject) -> Option<HostObject> + Send + Sync>;

// ─── Registry ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct TypeRegistry {
    types:      DashMap<HostType, Arc<TypeDescriptor>>,
    extensions: DashMap<String, Vec<Arc<MethodDescriptor>>>,
    proxies:    DashMap<HostType, ProxyFactory>,
}

impl TypeRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register `T` under `name`. Registering twice keeps the first descriptor.
    pub fn register_type<T: 'static>(&self, name: impl Into<String>) -> Arc<TypeDescriptor> {
        self.register_host_type(HostType::of::<T>(), name)
    }

    pub fn register_host_type(&self, ty: HostType, name: impl Into<String>) -> Arc<TypeDescriptor> {
        let entry = self.types.entry(ty).or_insert_with(|| {
            let name = name.into();
            debug!(host_type = ty.name(), name = %name, "type registered");
            Arc::new(TypeDescriptor::new(name, ty))
        });
        Arc::clone(entry.value())
    }

    pub fn is_registered(&self, ty: HostType) -> bool { self.types.contains_key(&ty) }

    pub fn descriptor(&self, ty: HostType) -> Option<Arc<TypeDescriptor>> {
        self.types.get(&ty).map(|d| Arc::clone(d.value()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.iter().find(|e| e.value().name == name).map(|e| Arc::clone(e.value()))
    }

    /// Add `member` to the registered type `ty`.
    pub fn register_member(&self, ty: HostType, member: MethodDescriptor) -> Result<(), ScriptError> {
        let descriptor = self.descriptor(ty).ok_or_else(|| {
            ScriptError::runtime(format!("cannot add member '{}' to unregistered type {}", member.name(), ty.name()))
        })?;
        debug!(host_type = ty.name(), member = member.name(), "member registered");
        descriptor
            .members
            .entry(member.name().to_string())
            .or_default()
            .push(Arc::new(member));
        Ok(())
    }

    /// Add an extension method. It becomes visible on every object of its target type.
    pub fn register_extension(&self, member: MethodDescriptor) -> Result<(), ScriptError> {
        let Some(target) = member.extension_of() else {
            return Err(ScriptError::InvalidDescriptor {
                member: member.name().to_string(),
                reason: "not an extension method".to_string(),
            });
        };
        debug!(target = target.name(), member = member.name(), "extension registered");
        self.extensions.entry(member.name().to_string()).or_default().push(Arc::new(member));
        Ok(())
    }

    /// Expose objects of `Target` to scripts through `Proxy`: scripts see the
    /// proxy's members while host parameters still receive the original object.
    pub fn register_proxy<Target, Proxy, F>(&self, name: impl Into<String>, factory: F) -> Arc<TypeDescriptor>
    where
        Target: Send + Sync + 'static,
        Proxy: Send + Sync + 'static,
        F: Fn(Arc<Target>) -> Proxy + Send + Sync + 'static,
    {
        let descriptor = self.register_type::<Proxy>(name);
        let factory: ProxyFactory =
            Arc::new(move |obj: &HostObject| obj.downcast_arc::<Target>().map(|t| HostObject::new(factory(t))));
        self.proxies
            .insert(HostType::of::<Target>(), factory);
        descriptor
    }

    /// The proxy standing in for `obj`, if its type has one.
    pub fn proxy_for(&self, obj: &HostObject) -> Option<HostObject> {
        let factory = self.proxies.get(&obj.host_type()).map(|p| Arc::clone(p.value()))?;
        factory(obj)
    }

    /// All overloads reachable as `name` on `ty`: own members first, then
    /// extensions targeting `ty`. Fallback spellings are tried in order until one matches.
    pub fn resolve(&self, ty: HostType, name: &str, fuzzy: FuzzySymbolMatching) -> Vec<Arc<MethodDescriptor>> {
        let own = self.descriptor(ty);
        for candidate in fuzzy.candidates(name) {
            let mut found = own.as_ref().map(|d| d.overloads(&candidate)).unwrap_or_default();
            if let Some(ext) = self.extensions.get(&candidate) {
                found.extend(ext.value().iter().filter(|m| m.extension_of() == Some(ty)).cloned());
            }
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    pub fn clear(&self) {
        self.types.clear();
        self.extensions.clear();
        self.proxies.clear();
    }
}

/// Pick the overload accepting `argc` arguments, or the first one when none
/// matches exactly so its binding reports the mismatch.
pub fn select_overload(
    overloads: &[Arc<MethodDescriptor>],
    argc: usize,
    has_receiver: bool,
) -> Option<&Arc<MethodDescriptor>> {
    overloads.iter().find(|m| m.accepts(argc, has_receiver)).or_else(|| overloads.first())
}
