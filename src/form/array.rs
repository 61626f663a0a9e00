//! Dynamic lists of entries with identities that survive reordering.

use std::fmt;

use indexmap::IndexSet;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{FieldPath, FieldRules, ItemRules};

use super::{
    engine::{FormCore, FormEngine},
    error::FormError,
};

/// Identity of one array entry. Moves, swaps and removals of other entries
/// never change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StableId(Uuid);

impl StableId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a field array. `key` is its identity; the position is only
/// its place in [`FieldArray::entries`] and changes on every reorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayEntry {
    pub key: StableId,
    pub value: Value,
}

/// Controller bookkeeping for one array in the value tree.
#[derive(Debug, Clone)]
pub(crate) struct ArrayState {
    pub keys: Vec<StableId>,
    pub item_rules: ItemRules,
}

impl FormCore {
    /// Creates the nodes backing entry `index` of `array`.
    fn attach_entry(&mut self, array: &FieldPath, index: usize, rules: &ItemRules) {
        let entry_path = array.child_index(index);
        let entry_keys: Option<IndexSet<String>> = self
            .registry
            .value_at(&entry_path)
            .and_then(Value::as_object)
            .map(|object| object.keys().cloned().collect());
        match entry_keys {
            Some(mut keys) => {
                keys.extend(rules.fields.keys().cloned());
                for key in keys {
                    let field_rules = rules.rules_for(Some(&key));
                    self.registry.attach(entry_path.child_key(key), field_rules);
                }
            }
            None => {
                self.registry.attach(entry_path, rules.rules_for(None));
            }
        }
    }

    /// Rebuilds keys and nodes of `array` from the current value tree. Old
    /// entry nodes are destroyed, so their in-flight results go stale.
    fn seed_array(&mut self, array: &FieldPath) {
        let Some(state) = self.arrays.get(array) else {
            return;
        };
        let rules = state.item_rules.clone();
        self.registry.relocate(array, |_| None);
        let len = self
            .registry
            .value_at(array)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let keys: Vec<StableId> = (0..len).map(|_| StableId::new()).collect();
        for index in 0..len {
            self.attach_entry(array, index, &rules);
        }
        debug!("seeded field array {array} with {len} entries");
        if let Some(state) = self.arrays.get_mut(array) {
            state.keys = keys;
        }
    }

    /// Re-seeds every bound array at or underneath `path`.
    pub(crate) fn reseed_arrays_under(&mut self, path: &FieldPath) {
        let affected: Vec<FieldPath> = self
            .arrays
            .keys()
            .filter(|array| array.starts_with(path))
            .cloned()
            .collect();
        for array in affected {
            self.seed_array(&array);
        }
    }

    fn array_len(&self, array: &FieldPath) -> Result<usize, FormError> {
        if !self.arrays.contains_key(array) {
            return Err(FormError::unknown(array));
        }
        self.registry
            .value_at(array)
            .and_then(Value::as_array)
            .map(Vec::len)
            .ok_or_else(|| FormError::NotAnArray {
                path: array.to_string(),
            })
    }

    fn check_index(&self, array: &FieldPath, index: usize, len: usize) -> Result<(), FormError> {
        if index < len {
            return Ok(());
        }
        warn!("index {index} out of range for field array {array} of length {len}");
        Err(FormError::IndexOutOfRange {
            array: array.to_string(),
            index,
            len,
        })
    }

    fn finish_array_edit(&mut self, array: &FieldPath) {
        self.registry.refresh_dirty_under(array);
        self.settle();
        self.edited(array);
        self.flush();
    }
}

/// Handle over one array field.
///
/// Entry nodes live at positional paths (`phNumbers.1.number`); after a
/// remove or move those paths shift, while [`StableId`]s and pending
/// validations stay with their entry.
#[derive(Debug, Clone)]
pub struct FieldArray {
    form: FormEngine,
    path: FieldPath,
}

impl FormEngine {
    /// Binds a controller to the array at `name`, creating an empty one when
    /// the tree has nothing there. Binding an already bound array returns a
    /// handle to the existing controller.
    pub fn field_array(&self, name: &str, item_rules: ItemRules) -> Result<FieldArray, FormError> {
        let path = FieldPath::parse(name)?;
        let mut core = self.lock();
        if !core.arrays.contains_key(&path) {
            core.registry.seed(&path, Value::Array(Vec::new()));
            if !core.registry.value_at(&path).is_some_and(Value::is_array) {
                return Err(FormError::NotAnArray {
                    path: path.to_string(),
                });
            }
            core.arrays.insert(
                path.clone(),
                ArrayState {
                    keys: Vec::new(),
                    item_rules,
                },
            );
            core.seed_array(&path);
            core.bus.field_changed(&path);
            core.flush();
        }
        drop(core);
        Ok(FieldArray {
            form: self.clone(),
            path,
        })
    }
}

impl FieldArray {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn append(&self, entry: Value) -> Result<StableId, FormError> {
        let len = self.len()?;
        self.insert(len, entry)
    }

    pub fn prepend(&self, entry: Value) -> Result<StableId, FormError> {
        self.insert(0, entry)
    }

    /// Inserts before `index`; `index == len` appends.
    pub fn insert(&self, index: usize, entry: Value) -> Result<StableId, FormError> {
        let mut core = self.form.lock();
        let len = core.array_len(&self.path)?;
        core.check_index(&self.path, index, len + 1)?;

        core.registry
            .relocate(&self.path, |old| Some(if old >= index { old + 1 } else { old }));
        if let Some(items) = core.registry.array_mut(&self.path) {
            items.insert(index, entry);
        }
        let id = StableId::new();
        let Some(state) = core.arrays.get_mut(&self.path) else {
            return Err(FormError::unknown(&self.path));
        };
        state.keys.insert(index, id);
        let rules = state.item_rules.clone();
        core.attach_entry(&self.path, index, &rules);
        core.finish_array_edit(&self.path);
        Ok(id)
    }

    /// Removes the entry at `index` and returns its value. Validation still
    /// running for the entry is discarded when it resolves.
    pub fn remove(&self, index: usize) -> Result<Value, FormError> {
        let mut core = self.form.lock();
        let len = core.array_len(&self.path)?;
        core.check_index(&self.path, index, len)?;

        core.registry.relocate(&self.path, |old| {
            if old == index {
                None
            } else if old > index {
                Some(old - 1)
            } else {
                Some(old)
            }
        });
        let removed = core
            .registry
            .array_mut(&self.path)
            .map(|items| items.remove(index))
            .unwrap_or(Value::Null);
        if let Some(state) = core.arrays.get_mut(&self.path) {
            state.keys.remove(index);
        }
        core.finish_array_edit(&self.path);
        Ok(removed)
    }

    /// Moves the entry at `from` so that it ends up at `to`.
    pub fn move_entry(&self, from: usize, to: usize) -> Result<(), FormError> {
        let mut core = self.form.lock();
        let len = core.array_len(&self.path)?;
        core.check_index(&self.path, from, len)?;
        core.check_index(&self.path, to, len)?;
        if from == to {
            return Ok(());
        }

        core.registry.relocate(&self.path, |old| {
            Some(match old {
                old if old == from => to,
                old if from < to && old > from && old <= to => old - 1,
                old if from > to && old >= to && old < from => old + 1,
                old => old,
            })
        });
        if let Some(items) = core.registry.array_mut(&self.path) {
            let item = items.remove(from);
            items.insert(to, item);
        }
        if let Some(state) = core.arrays.get_mut(&self.path) {
            let key = state.keys.remove(from);
            state.keys.insert(to, key);
        }
        core.finish_array_edit(&self.path);
        Ok(())
    }

    pub fn swap(&self, a: usize, b: usize) -> Result<(), FormError> {
        let mut core = self.form.lock();
        let len = core.array_len(&self.path)?;
        core.check_index(&self.path, a, len)?;
        core.check_index(&self.path, b, len)?;
        if a == b {
            return Ok(());
        }

        core.registry.relocate(&self.path, |old| {
            Some(match old {
                old if old == a => b,
                old if old == b => a,
                old => old,
            })
        });
        if let Some(items) = core.registry.array_mut(&self.path) {
            items.swap(a, b);
        }
        if let Some(state) = core.arrays.get_mut(&self.path) {
            state.keys.swap(a, b);
        }
        core.finish_array_edit(&self.path);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, FormError> {
        self.form.lock().array_len(&self.path)
    }

    pub fn is_empty(&self) -> Result<bool, FormError> {
        self.len().map(|len| len == 0)
    }

    pub fn keys(&self) -> Result<Vec<StableId>, FormError> {
        let core = self.form.lock();
        core.array_len(&self.path)?;
        Ok(core
            .arrays
            .get(&self.path)
            .map(|state| state.keys.clone())
            .unwrap_or_default())
    }

    pub fn entries(&self) -> Result<Vec<ArrayEntry>, FormError> {
        let core = self.form.lock();
        core.array_len(&self.path)?;
        let keys = core
            .arrays
            .get(&self.path)
            .map(|state| state.keys.as_slice())
            .unwrap_or_default();
        let items = core
            .registry
            .value_at(&self.path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(keys
            .iter()
            .zip(items)
            .map(|(key, value)| ArrayEntry {
                key: *key,
                value: value.clone(),
            })
            .collect())
    }

    /// Path of the field `key` inside entry `index`.
    pub fn field_path(&self, index: usize, key: &str) -> String {
        self.path.child_index(index).child_key(key).to_string()
    }
}

impl ItemRules {
    pub(crate) fn rules_for(&self, key: Option<&str>) -> FieldRules {
        match key {
            Some(key) => self.fields.get(key).cloned().unwrap_or_default(),
            None => self.entry.clone(),
        }
    }
}
