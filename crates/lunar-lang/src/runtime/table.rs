use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::runtime::value::DynValue;

pub type TableRef = Arc<Table>;

/// Keys a table can be indexed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Int(i64),
    Str(Arc<str>),
}

impl From<&str> for TableKey {
    fn from(s: &str) -> Self { Self::Str(Arc::from(s)) }
}

impl From<i64> for TableKey {
    fn from(i: i64) -> Self { Self::Int(i) }
}

/// Shared, interiorly mutable script table. Used for globals, metatables and
/// host arrays converted to script values.
#[derive(Debug, Default)]
pub struct Table {
    entries:   RwLock<HashMap<TableKey, DynValue>>,
    metatable: RwLock<Option<TableRef>>,
}

impl Table {
    pub fn new() -> TableRef { Arc::new(Self::default()) }

    /// A table holding `values` at indices `1..=n`.
    pub fn from_array(values: impl IntoIterator<Item = DynValue>) -> TableRef {
        let t = Self::new();
        for (i, v) in values.into_iter().enumerate() {
            t.set_index(i as i64 + 1, v);
        }
        t
    }

    pub fn get(&self, key: &str) -> DynValue {
        self.raw_get(&TableKey::from(key))
    }

    /// Setting nil removes the entry.
    pub fn set(&self, key: &str, value: DynValue) {
        self.raw_set(TableKey::from(key), value);
    }

    pub fn get_index(&self, index: i64) -> DynValue {
        self.raw_get(&TableKey::Int(index))
    }

    pub fn set_index(&self, index: i64, value: DynValue) {
        self.raw_set(TableKey::Int(index), value);
    }

    pub fn raw_get(&self, key: &TableKey) -> DynValue {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    pub fn raw_set(&self, key: TableKey, value: DynValue) {
        let mut entries = self.entries.write();
        if value.is_nil() {
            entries.remove(&key);
        } else {
            entries.insert(key, value);
        }
    }

    /// The border of the array part: the largest `n` with `t[1..=n]` all non-nil.
    pub fn len(&self) -> usize {
        let entries = self.entries.read();
        let mut n = 0usize;
        while entries.contains_key(&TableKey::Int(n as i64 + 1)) {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }

    /// Values at `1..=len()`, in order.
    pub fn array_values(&self) -> Vec<DynValue> {
        (1..=self.len() as i64).map(|i| self.get_index(i)).collect()
    }

    pub fn metatable(&self) -> Option<TableRef> { self.metatable.read().clone() }

    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        *self.metatable.write() = metatable;
    }
}

/// Look up `name` in the metatable of `value`, if it has one.
pub fn metamethod(value: &DynValue, name: &str) -> Option<DynValue> {
    let mt = match value {
        DynValue::Table(t) => t.metatable()?,
        DynValue::UserData(u) => u.metatable()?.clone(),
        _ => return None,
    };
    let m = mt.get(name);
    (!m.is_nil()).then_some(m)
}
