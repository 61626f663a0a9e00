//! Staged rule evaluation and the bookkeeping that keeps async results from
//! landing on values they were not computed for.

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Mutex, Weak},
    task::{Context, Poll},
};

use futures::{
    FutureExt,
    future::{BoxFuture, join_all},
};
use log::{debug, error, warn};
use serde_json::Value;

use crate::{
    domain::{AsyncValidatorFn, FieldPath, FieldRules, Rule},
    form::{
        FormEngine, FormError,
        engine::{FormCore, lock_core},
        node::NodeId,
        registry::RunTicket,
    },
};

use super::error::{ErrorInfo, ErrorKind};

const THREW_MESSAGE: &str = "validation could not be completed";

/// Outcome of a validation run: the field's resulting error, or `None`.
///
/// The sync stage has already been applied when this is handed out; awaiting
/// it drives the async validators. Dropping it before completion abandons the
/// async stage and clears the field's pending flag.
#[must_use = "async validators only run while the validation is polled"]
pub struct Validation {
    inner: BoxFuture<'static, Option<ErrorInfo>>,
}

impl Validation {
    fn new<F>(future: F) -> Self
    where
        F: Future<Output = Option<ErrorInfo>> + Send + 'static,
    {
        Self { inner: future.boxed() }
    }

    pub fn ready(outcome: Option<ErrorInfo>) -> Self {
        Self::new(futures::future::ready(outcome))
    }

    /// Nothing was validated.
    pub fn skipped() -> Self {
        Self::ready(None)
    }

    /// Drives every run together and yields the first error in input order.
    pub fn join(runs: Vec<Validation>) -> Self {
        if runs.is_empty() {
            return Self::skipped();
        }
        Self::new(async move { join_all(runs).await.into_iter().flatten().next() })
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation").finish_non_exhaustive()
    }
}

impl Future for Validation {
    type Output = Option<ErrorInfo>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

/// An async stage that has not reported back yet.
struct PendingRun {
    core: Weak<Mutex<FormCore>>,
    node: NodeId,
    generation: u64,
    path: FieldPath,
    done: bool,
}

impl PendingRun {
    fn finish(mut self, outcome: Option<ErrorInfo>) {
        self.done = true;
        if let Some(core) = self.core.upgrade() {
            finish_run(&core, self.node, self.generation, &self.path, outcome);
        }
    }
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let mut core = lock_core(&core);
        if let Some(path) = core.registry.cancel_run(self.node, self.generation) {
            debug!("validation of {path} abandoned before completion");
            core.bus.field_changed(&path);
            core.settle();
            core.flush();
        }
    }
}

fn finish_run(core: &Mutex<FormCore>, node: NodeId, generation: u64, dispatched: &FieldPath, outcome: Option<ErrorInfo>) {
    let mut core = lock_core(core);
    match core.registry.settle_run(node, generation, outcome) {
        Some(path) => core.bus.field_changed(&path),
        None => debug!("discarding stale validation result for {dispatched}"),
    }
    core.settle();
    core.flush();
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Length for the length rules: chars of a non-empty string or elements of a
/// non-empty array.
fn measured_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.chars().count()),
        Value::Array(items) if !items.is_empty() => Some(items.len()),
        _ => None,
    }
}

/// Runs every sync rule in stage order and returns the first failure. A
/// panicking validator counts as a failure of its own rule.
pub(crate) fn run_sync_stage(rules: &FieldRules, value: &Value, all_values: &Value) -> Option<ErrorInfo> {
    for rule in rules.sync_rules() {
        let failure = match rule {
            Rule::Required { message } => {
                is_empty_value(value).then(|| ErrorInfo::new(ErrorKind::RequiredMissing, message.as_str()))
            }
            Rule::Pattern { regex, message } => match value.as_str() {
                Some(text) if !text.is_empty() && !regex.is_match(text) => {
                    Some(ErrorInfo::new(ErrorKind::PatternMismatch, message.as_str()))
                }
                _ => None,
            },
            Rule::MinLength { limit, message } => measured_len(value)
                .filter(|len| len < limit)
                .map(|_| ErrorInfo::new(ErrorKind::TooShort, message.as_str())),
            Rule::MaxLength { limit, message } => measured_len(value)
                .filter(|len| len > limit)
                .map(|_| ErrorInfo::new(ErrorKind::TooLong, message.as_str())),
            Rule::Min { limit, message } => value
                .as_f64()
                .filter(|number| number < limit)
                .map(|_| ErrorInfo::new(ErrorKind::BelowMin, message.as_str())),
            Rule::Max { limit, message } => value
                .as_f64()
                .filter(|number| number > limit)
                .map(|_| ErrorInfo::new(ErrorKind::AboveMax, message.as_str())),
            Rule::Validate { name, check } => {
                match std::panic::catch_unwind(AssertUnwindSafe(|| check(value, all_values))) {
                    Ok(verdict) => verdict
                        .err()
                        .map(|message| ErrorInfo::new(ErrorKind::RuleViolation, message).with_rule(name.as_str())),
                    Err(payload) => {
                        error!("validator `{name}` panicked: {}", panic_message(payload.as_ref()));
                        Some(ErrorInfo::new(ErrorKind::AsyncValidatorThrew, THREW_MESSAGE).with_rule(name.as_str()))
                    }
                }
            }
            Rule::ValidateAsync { .. } => None,
        };
        if failure.is_some() {
            return failure;
        }
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Dispatches every async validator at once; the lowest-indexed failure wins.
/// Panics and validator errors are contained here.
pub(crate) async fn run_async_stage(path: FieldPath, checks: Vec<(String, AsyncValidatorFn)>, value: Value) -> Option<ErrorInfo> {
    let path = &path;
    let runs = checks.into_iter().map(|(name, check)| {
        let value = value.clone();
        async move {
            let verdict = match std::panic::catch_unwind(AssertUnwindSafe(|| check(value))) {
                Ok(pending) => AssertUnwindSafe(pending).catch_unwind().await,
                Err(payload) => Err(payload),
            };
            match verdict {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(message))) => {
                    Some(ErrorInfo::new(ErrorKind::AsyncValidatorFailure, message).with_rule(name))
                }
                Ok(Err(err)) => {
                    error!("async validator `{name}` for {path} failed: {err:#}");
                    Some(ErrorInfo::new(ErrorKind::AsyncValidatorThrew, THREW_MESSAGE).with_rule(name))
                }
                Err(payload) => {
                    error!(
                        "async validator `{name}` for {path} panicked: {}",
                        panic_message(payload.as_ref())
                    );
                    Some(ErrorInfo::new(ErrorKind::AsyncValidatorThrew, THREW_MESSAGE).with_rule(name))
                }
            }
        }
    });
    join_all(runs).await.into_iter().flatten().next()
}

impl FormEngine {
    /// Validates the field at `path`, or every field underneath it.
    pub fn validate_field(&self, path: &str) -> Result<Validation, FormError> {
        self.validate_fields(&[path])
    }

    /// Validates several fields together; yields the first error in the
    /// order given.
    pub fn validate_fields(&self, paths: &[&str]) -> Result<Validation, FormError> {
        let mut targets: Vec<FieldPath> = Vec::new();
        {
            let core = self.lock();
            for raw in paths {
                let path = FieldPath::parse(raw)?;
                let covered = core.registry.covering(&path);
                if covered.is_empty() {
                    warn!("validation requested for unknown field path {path}");
                    return Err(FormError::unknown(&path));
                }
                for target in covered {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }
        let _hold = self.hold_bus();
        Ok(self.validate_targets(targets, false))
    }

    /// Validates every registered field (or runs one full schema pass) and
    /// reports whether the form is valid once everything settled.
    pub async fn validate_all(&self) -> bool {
        let targets = self.lock().registry.paths();
        let validation = {
            let _hold = self.hold_bus();
            self.validate_targets(targets, true)
        };
        validation.await;
        self.lock().registry.is_valid()
    }

    pub(crate) fn validate_targets(&self, targets: Vec<FieldPath>, full: bool) -> Validation {
        let resolver = self.lock().options.resolver.clone();
        if let Some(resolver) = resolver {
            return self.validate_with_schema(resolver.as_ref(), &targets, full);
        }
        let tickets: Vec<RunTicket> = {
            let mut core = self.lock();
            let tickets: Vec<RunTicket> = targets
                .iter()
                .filter_map(|path| core.registry.begin_run(path))
                .collect();
            if !tickets.is_empty() && core.machine.start_validation() {
                core.bus.state_changed();
            }
            for ticket in &tickets {
                core.bus.field_changed(&ticket.path);
            }
            tickets
        };
        Validation::join(tickets.into_iter().map(|ticket| self.run_ticket(ticket)).collect())
    }

    fn validate_with_schema(&self, resolver: &dyn super::SchemaAdapter, targets: &[FieldPath], full: bool) -> Validation {
        let values = {
            let mut core = self.lock();
            if core.machine.start_validation() {
                core.bus.state_changed();
            }
            core.registry.values().clone()
        };
        let report = resolver.validate(&values);
        let mut core = self.lock();
        core.registry.apply_schema(targets, &report, full);
        for target in targets {
            core.bus.field_changed(target);
        }
        let first = targets
            .iter()
            .find_map(|target| core.registry.node(target).and_then(|node| node.error.clone()));
        let valid = core.registry.is_valid();
        if core.machine.settle(valid, false) {
            core.bus.state_changed();
        }
        core.flush();
        Validation::ready(first)
    }

    fn run_ticket(&self, ticket: RunTicket) -> Validation {
        let sync_outcome = run_sync_stage(&ticket.rules, &ticket.value, &ticket.all_values);
        let core = self.downgrade();
        if sync_outcome.is_some() || !ticket.rules.has_async() {
            if let Some(core) = core.upgrade() {
                finish_run(&core, ticket.node, ticket.generation, &ticket.path, sync_outcome.clone());
            }
            return Validation::ready(sync_outcome);
        }

        let run = PendingRun {
            core,
            node: ticket.node,
            generation: ticket.generation,
            path: ticket.path.clone(),
            done: false,
        };
        let checks = ticket.rules.async_rules();
        Validation::new(async move {
            let outcome = run_async_stage(ticket.path, checks, ticket.value).await;
            run.finish(outcome.clone());
            outcome
        })
    }
}
