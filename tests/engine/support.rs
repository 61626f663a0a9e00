use std::sync::{Arc, Mutex};

use formwork::{FieldRules, RuleOutcome};
use futures::channel::oneshot;
use serde_json::Value;

/// Async validator whose calls stay pending until the test resolves them,
/// in whatever order it likes.
#[derive(Clone, Default)]
pub struct Gate {
    calls: Arc<Mutex<Vec<(Value, Option<oneshot::Sender<RuleOutcome>>)>>>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self, name: &str) -> FieldRules {
        self.attach(FieldRules::new(), name)
    }

    pub fn attach(&self, rules: FieldRules, name: &str) -> FieldRules {
        let gate = self.clone();
        rules.validate_async(name, move |value: Value| {
            let (sender, receiver) = oneshot::channel();
            gate.calls.lock().unwrap().push((value, Some(sender)));
            async move { receiver.await.unwrap_or(Ok(())) }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn value(&self, call: usize) -> Value {
        self.calls.lock().unwrap()[call].0.clone()
    }

    pub fn resolve(&self, call: usize, outcome: RuleOutcome) {
        let sender = self.calls.lock().unwrap()[call]
            .1
            .take()
            .expect("call already resolved");
        let _ = sender.send(outcome);
    }

    /// Yields to the runtime until `count` calls were dispatched.
    pub async fn wait_for(&self, count: usize) {
        while self.calls() < count {
            tokio::task::yield_now().await;
        }
    }
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
