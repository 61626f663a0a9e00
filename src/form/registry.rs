use indexmap::IndexMap;
use log::trace;
use serde_json::{Map, Value};

use crate::{
    domain::{FieldPath, FieldRules, Segment},
    validation::{ErrorInfo, ErrorKind, SchemaReport},
};

use super::{
    node::{FieldNode, FieldState, NodeId},
    options::ResetOptions,
    tree::{insert_path, remove_path, value_at_path},
};

/// Everything needed to run one validation pass for one node, detached from
/// the registry so validators run without the engine lock.
#[derive(Debug, Clone)]
pub(crate) struct RunTicket {
    pub node: NodeId,
    pub path: FieldPath,
    pub generation: u64,
    pub value: Value,
    pub all_values: Value,
    pub rules: FieldRules,
}

/// Owner of the value tree and of every field node. Nothing else mutates
/// node state.
#[derive(Debug, Clone)]
pub(crate) struct FieldRegistry {
    values: Value,
    defaults: Value,
    original_defaults: Value,
    nodes: IndexMap<FieldPath, FieldNode>,
    form_errors: IndexMap<String, ErrorInfo>,
    next_id: u64,
}

impl FieldRegistry {
    pub fn new(defaults: Value) -> Self {
        let defaults = match defaults {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            values: defaults.clone(),
            defaults: defaults.clone(),
            original_defaults: defaults,
            nodes: IndexMap::new(),
            form_errors: IndexMap::new(),
            next_id: 0,
        }
    }

    pub fn values(&self) -> &Value {
        &self.values
    }

    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    pub fn value_at(&self, path: &FieldPath) -> Option<&Value> {
        value_at_path(&self.values, path)
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn node(&self, path: &FieldPath) -> Option<&FieldNode> {
        self.nodes.get(path)
    }

    pub fn paths(&self) -> Vec<FieldPath> {
        self.nodes.keys().cloned().collect()
    }

    /// Registered paths at or underneath `path`, in registration order.
    pub fn covering(&self, path: &FieldPath) -> Vec<FieldPath> {
        self.nodes
            .keys()
            .filter(|candidate| candidate.starts_with(path))
            .cloned()
            .collect()
    }

    /// Creates the node if missing. Returns `false` when the path was already
    /// registered, in which case nothing changes.
    pub fn register(&mut self, path: &FieldPath, initial: Option<Value>, rules: FieldRules) -> bool {
        if self.nodes.contains_key(path) {
            return false;
        }
        if value_at_path(&self.values, path).is_none() {
            let initial = initial.unwrap_or(Value::Null);
            if value_at_path(&self.defaults, path).is_none() {
                insert_path(&mut self.defaults, path.segments(), initial.clone());
            }
            insert_path(&mut self.values, path.segments(), initial);
        }
        self.attach(path.clone(), rules);
        true
    }

    /// Puts `initial` at `path` in both the values and the defaults where
    /// either has nothing yet. No node is created.
    pub fn seed(&mut self, path: &FieldPath, initial: Value) {
        if value_at_path(&self.defaults, path).is_none() {
            insert_path(&mut self.defaults, path.segments(), initial.clone());
        }
        if value_at_path(&self.values, path).is_none() {
            insert_path(&mut self.values, path.segments(), initial);
        }
    }

    /// Creates a node for a value that is already in the tree (array entries).
    pub fn attach(&mut self, path: FieldPath, rules: FieldRules) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        trace!("registered field node {path} ({id:?})");
        let mut node = FieldNode::new(id, rules);
        node.dirty = value_at_path(&self.values, &path) != value_at_path(&self.defaults, &path);
        self.nodes.insert(path, node);
        id
    }

    /// Destroys the node at `path` and every node underneath it. Outstanding
    /// async results for them become permanently stale.
    pub fn unregister(&mut self, path: &FieldPath, drop_value: bool) -> Vec<FieldPath> {
        let doomed = self.covering(path);
        for target in &doomed {
            if let Some(mut node) = self.nodes.shift_remove(target) {
                node.bump();
                trace!("destroyed field node {target} ({:?})", node.id);
            }
        }
        if drop_value {
            remove_path(&mut self.values, path);
        }
        doomed
    }

    /// Writes into the value tree. Every node whose value is affected gets a
    /// new generation, so in-flight checks of the old value go stale.
    pub fn write(&mut self, path: &FieldPath, value: Value) {
        insert_path(&mut self.values, path.segments(), value);
        for (node_path, node) in self.nodes.iter_mut() {
            if node_path.overlaps(path) {
                node.bump();
            }
        }
    }

    pub fn array_mut(&mut self, path: &FieldPath) -> Option<&mut Vec<Value>> {
        super::tree::value_at_path_mut(&mut self.values, path)?.as_array_mut()
    }

    pub fn refresh_dirty(&mut self, path: &FieldPath) {
        let dirty = value_at_path(&self.values, path) != value_at_path(&self.defaults, path);
        if let Some(node) = self.nodes.get_mut(path) {
            node.dirty = dirty;
        }
    }

    pub fn refresh_dirty_under(&mut self, prefix: &FieldPath) {
        for path in self.covering(prefix) {
            self.refresh_dirty(&path);
        }
    }

    pub fn mark_touched(&mut self, path: &FieldPath) -> bool {
        match self.nodes.get_mut(path) {
            Some(node) if !node.touched => {
                node.touched = true;
                true
            }
            _ => false,
        }
    }

    pub fn begin_run(&mut self, path: &FieldPath) -> Option<RunTicket> {
        let value = value_at_path(&self.values, path).cloned().unwrap_or(Value::Null);
        let all_values = self.values.clone();
        let node = self.nodes.get_mut(path)?;
        let generation = node.bump();
        node.pending = true;
        Some(RunTicket {
            node: node.id,
            path: path.clone(),
            generation,
            value,
            all_values,
            rules: node.rules.clone(),
        })
    }

    /// Applies a run's outcome if the run is still the latest for a live node.
    pub fn settle_run(&mut self, id: NodeId, generation: u64, outcome: Option<ErrorInfo>) -> Option<FieldPath> {
        let (path, node) = self.nodes.iter_mut().find(|(_, node)| node.id == id)?;
        if node.generation != generation {
            return None;
        }
        node.pending = false;
        node.error = outcome;
        Some(path.clone())
    }

    pub fn cancel_run(&mut self, id: NodeId, generation: u64) -> Option<FieldPath> {
        let (path, node) = self.nodes.iter_mut().find(|(_, node)| node.id == id)?;
        if node.generation != generation || !node.pending {
            return None;
        }
        node.pending = false;
        Some(path.clone())
    }

    /// Applies a schema adapter report to `targets`. Errors at unregistered
    /// paths go to the nearest registered ancestor; when `full` is set, the
    /// ones without any registered ancestor become form-level errors.
    pub fn apply_schema(&mut self, targets: &[FieldPath], report: &SchemaReport, full: bool) {
        let mut owned: IndexMap<FieldPath, ErrorInfo> = IndexMap::new();
        let mut orphans: IndexMap<String, ErrorInfo> = IndexMap::new();
        for (raw, message) in &report.errors_by_path {
            let info = ErrorInfo::new(ErrorKind::RuleViolation, message.clone()).with_rule("schema");
            let Ok(path) = FieldPath::parse(raw) else {
                orphans.entry(raw.clone()).or_insert(info);
                continue;
            };
            match self.owner_of(&path) {
                Some(owner) => {
                    owned.entry(owner).or_insert(info);
                }
                None => {
                    orphans.entry(raw.clone()).or_insert(info);
                }
            }
        }
        for target in targets {
            if let Some(node) = self.nodes.get_mut(target) {
                node.bump();
                node.error = owned.get(target).cloned();
            }
        }
        if full {
            self.form_errors = orphans;
        }
    }

    fn owner_of(&self, path: &FieldPath) -> Option<FieldPath> {
        let mut cursor = Some(path.clone());
        while let Some(candidate) = cursor {
            if candidate.is_root() {
                return None;
            }
            if self.nodes.contains_key(&candidate) {
                return Some(candidate);
            }
            cursor = candidate.parent();
        }
        None
    }

    pub fn set_error(&mut self, path: &FieldPath, error: ErrorInfo) -> bool {
        match self.nodes.get_mut(path) {
            Some(node) => {
                node.error = Some(error);
                true
            }
            None => false,
        }
    }

    pub fn clear_errors_under(&mut self, prefix: &FieldPath) {
        for (path, node) in self.nodes.iter_mut() {
            if path.starts_with(prefix) {
                node.error = None;
            }
        }
    }

    pub fn clear_all_errors(&mut self) {
        for node in self.nodes.values_mut() {
            node.error = None;
        }
        self.form_errors.clear();
    }

    pub fn errors(&self) -> IndexMap<String, ErrorInfo> {
        let mut errors: IndexMap<String, ErrorInfo> = self
            .nodes
            .iter()
            .filter_map(|(path, node)| node.error.clone().map(|error| (path.to_string(), error)))
            .collect();
        for (path, error) in &self.form_errors {
            errors.entry(path.clone()).or_insert_with(|| error.clone());
        }
        errors
    }

    pub fn touched_fields(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.touched)
            .map(|(path, _)| path.to_string())
            .collect()
    }

    pub fn dirty_fields(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.dirty)
            .map(|(path, _)| path.to_string())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.values != self.defaults
    }

    pub fn is_valid(&self) -> bool {
        self.form_errors.is_empty() && self.nodes.values().all(|node| node.error.is_none())
    }

    pub fn any_pending(&self) -> bool {
        self.nodes.values().any(|node| node.pending)
    }

    pub fn field_state(&self, path: &FieldPath) -> Option<FieldState> {
        let node = self.nodes.get(path)?;
        Some(FieldState {
            path: path.to_string(),
            value: self.value_at(path).cloned().unwrap_or(Value::Null),
            touched: node.touched,
            dirty: node.dirty,
            validating: node.pending,
            error: node.error.clone(),
        })
    }

    /// Replaces the value tree and clears interaction state. Every in-flight
    /// validation is invalidated.
    pub fn reset(&mut self, values: Option<Value>, options: &ResetOptions) {
        match values {
            Some(values) => {
                if !options.keep_default_values {
                    self.defaults = values.clone();
                }
                self.values = values;
            }
            None => {
                if !options.keep_default_values {
                    self.defaults = self.original_defaults.clone();
                }
                self.values = self.defaults.clone();
            }
        }
        if !options.keep_errors {
            self.form_errors.clear();
        }
        for node in self.nodes.values_mut() {
            node.bump();
            node.dirty = false;
            if !options.keep_touched {
                node.touched = false;
            }
            if !options.keep_errors {
                node.error = None;
            }
        }
        let paths = self.paths();
        for path in paths {
            self.refresh_dirty(&path);
        }
    }

    /// Re-addresses the nodes of the entries of `array`. `map` receives an
    /// entry's old index and returns its new one, or `None` to destroy the
    /// entry's nodes. Node ids, and with them pending runs, follow the entry.
    pub fn relocate<F>(&mut self, array: &FieldPath, map: F) -> Vec<NodeId>
    where
        F: Fn(usize) -> Option<usize>,
    {
        let mut destroyed = Vec::new();
        let nodes = std::mem::take(&mut self.nodes);
        for (path, mut node) in nodes {
            let Some(rest) = path.strip_prefix(array) else {
                self.nodes.insert(path, node);
                continue;
            };
            let Some((Segment::Index(index), tail)) = rest.split_first() else {
                self.nodes.insert(path, node);
                continue;
            };
            match map(*index) {
                Some(next) => {
                    let moved = array.child_index(next).join(tail);
                    if moved != path {
                        trace!("re-addressed field node {path} -> {moved} ({:?})", node.id);
                    }
                    self.nodes.insert(moved, node);
                }
                None => {
                    node.bump();
                    trace!("destroyed field node {path} ({:?})", node.id);
                    destroyed.push(node.id);
                }
            }
        }
        destroyed
    }
}
