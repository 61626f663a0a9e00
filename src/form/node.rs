use serde::Serialize;
use serde_json::Value;

use crate::{domain::FieldRules, validation::ErrorInfo};

/// Identity of a field node, stable across re-addressing (array moves and
/// removals shift paths, never ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u64);

#[derive(Debug, Clone)]
pub(crate) struct FieldNode {
    pub id: NodeId,
    pub rules: FieldRules,
    pub touched: bool,
    pub dirty: bool,
    pub error: Option<ErrorInfo>,
    /// Bumped on every edit and validation run; async results carrying an
    /// older generation are stale.
    pub generation: u64,
    /// A run with the current generation has not settled yet.
    pub pending: bool,
}

impl FieldNode {
    pub fn new(id: NodeId, rules: FieldRules) -> Self {
        Self {
            id,
            rules,
            touched: false,
            dirty: false,
            error: None,
            generation: 0,
            pending: false,
        }
    }

    pub fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.pending = false;
        self.generation
    }
}

/// Read view of a single field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldState {
    pub path: String,
    pub value: Value,
    pub touched: bool,
    pub dirty: bool,
    pub validating: bool,
    pub error: Option<ErrorInfo>,
}
