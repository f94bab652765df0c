//! Per-script and process-wide configuration.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::ScriptError;
use crate::interop::converters::CustomConverters;
use crate::interop::descriptor::AccessMode;
use crate::interop::registry::TypeRegistry;

// ─── Per-script options ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Maximum call depth: pending tail-call frames (nested protected calls)
    /// plus calls re-entering the script while another call runs.
    pub call_stack_capacity: usize,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self { call_stack_capacity: 256 }
    }
}

// ─── Fuzzy symbol matching ────────────────────────────────────────────────────

/// Fallback spellings tried when a member name is not found as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzySymbolMatching {
    /// `some_method` → `someMethod`
    pub camelify:           bool,
    /// `someMethod` → `SomeMethod`
    pub upper_first_letter: bool,
    /// `some_method` → `SomeMethod`
    pub pascal_case:        bool,
}

impl FuzzySymbolMatching {
    pub const NONE: Self = Self { camelify: false, upper_first_letter: false, pascal_case: false };

    /// `name` followed by each enabled fallback spelling, without duplicates.
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let mut out = vec![name.to_string()];
        let mut push = |s: String| {
            if !out.contains(&s) {
                out.push(s);
            }
        };
        if self.upper_first_letter {
            push(upper_first(name));
        }
        if self.camelify {
            push(camelify(name));
        }
        if self.pascal_case {
            push(upper_first(&camelify(name)));
        }
        out
    }
}

impl Default for FuzzySymbolMatching {
    fn default() -> Self {
        Self { camelify: true, upper_first_letter: true, pascal_case: true }
    }
}

fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn camelify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

// ─── Process-wide options ─────────────────────────────────────────────────────

pub type PcallCatchPredicate = Arc<dyn Fn(&ScriptError) -> bool + Send + Sync>;

#[derive(Clone)]
struct Settings {
    should_pcall_catch:       Option<PcallCatchPredicate>,
    rethrow_exception_nested: bool,
    default_access_mode:      AccessMode,
    fuzzy_symbol_matching:    FuzzySymbolMatching,
}

/// Registries and switches shared by every script created against them.
pub struct GlobalOptions {
    converters: CustomConverters,
    types:      TypeRegistry,
    settings:   RwLock<Settings>,
}

static SHARED: OnceLock<Arc<GlobalOptions>> = OnceLock::new();

impl GlobalOptions {
    /// A fresh, isolated set of options.
    pub fn new() -> Self {
        Self {
            converters: CustomConverters::new(),
            types:      TypeRegistry::new(),
            settings:   RwLock::new(Settings {
                should_pcall_catch:       None,
                rethrow_exception_nested: false,
                default_access_mode:      AccessMode::LazyOptimized,
                fuzzy_symbol_matching:    FuzzySymbolMatching::default(),
            }),
        }
    }

    /// The process-wide instance used by `Script::new`.
    pub fn shared() -> Arc<GlobalOptions> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(GlobalOptions::new())))
    }

    pub fn converters(&self) -> &CustomConverters { &self.converters }

    pub fn types(&self) -> &TypeRegistry { &self.types }

    /// Whether a protected call may catch a host failure. Never, unless a
    /// predicate says otherwise.
    pub fn should_pcall_catch(&self, err: &ScriptError) -> bool {
        let predicate = self.settings.read().should_pcall_catch.clone();
        predicate.is_some_and(|p| p(err))
    }

    pub fn set_should_pcall_catch<F>(&self, predicate: F)
    where
        F: Fn(&ScriptError) -> bool + Send + Sync + 'static,
    {
        self.settings.write().should_pcall_catch = Some(Arc::new(predicate));
    }

    pub fn clear_should_pcall_catch(&self) {
        self.settings.write().should_pcall_catch = None;
    }

    pub fn rethrow_exception_nested(&self) -> bool {
        self.settings.read().rethrow_exception_nested
    }

    pub fn set_rethrow_exception_nested(&self, on: bool) {
        self.settings.write().rethrow_exception_nested = on;
    }

    /// Mode used by descriptors declared with `AccessMode::Default`.
    pub fn default_access_mode(&self) -> AccessMode {
        match self.settings.read().default_access_mode {
            AccessMode::Default | AccessMode::HideMembers => AccessMode::LazyOptimized,
            m => m,
        }
    }

    pub fn set_default_access_mode(&self, mode: AccessMode) -> Result<(), ScriptError> {
        if mode == AccessMode::Default {
            return Err(ScriptError::bad_argument(1, "set_default_access_mode", "Default is not a concrete access mode"));
        }
        self.settings.write().default_access_mode = mode;
        Ok(())
    }

    pub fn fuzzy_symbol_matching(&self) -> FuzzySymbolMatching {
        self.settings.read().fuzzy_symbol_matching
    }

    pub fn set_fuzzy_symbol_matching(&self, fuzzy: FuzzySymbolMatching) {
        self.settings.write().fuzzy_symbol_matching = fuzzy;
    }
}

impl Default for GlobalOptions {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_candidates_follow_enabled_rules() {
        let all = FuzzySymbolMatching::default();
        assert_eq!(all.candidates("get_value"), ["get_value", "Get_value", "getValue", "GetValue"]);
        assert_eq!(all.candidates("getValue"), ["getValue", "GetValue"]);
        assert_eq!(FuzzySymbolMatching::NONE.candidates("get_value"), ["get_value"]);
    }

    #[test]
    fn leading_underscore_is_kept() {
        assert_eq!(camelify("_private_name"), "_privateName");
    }

    #[test]
    fn pcall_catch_defaults_to_never() {
        let g = GlobalOptions::new();
        let err = ScriptError::host("X", "boom".into());
        assert!(!g.should_pcall_catch(&err));
        g.set_should_pcall_catch(|e: &ScriptError| e.host_cause().is_some());
        assert!(g.should_pcall_catch(&err));
        g.clear_should_pcall_catch();
        assert!(!g.should_pcall_catch(&err));
    }
}
