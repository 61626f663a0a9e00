use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::ErrorInfo;

use super::engine::FormEngine;

/// Lifecycle phase of the whole form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormPhase {
    #[default]
    Pristine,
    Editing,
    Validating,
    Valid,
    Invalid,
    Submitting,
    SubmitSuccess,
    SubmitFailure,
}

/// Phase plus submission bookkeeping. Field-level state lives in the
/// registry; this only aggregates.
#[derive(Debug, Clone, Default)]
pub(crate) struct FormMachine {
    phase: FormPhase,
    is_submitted: bool,
    is_submit_successful: bool,
    submit_count: u32,
}

impl FormMachine {
    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn is_submitted(&self) -> bool {
        self.is_submitted
    }

    fn transition(&mut self, next: FormPhase) -> bool {
        if self.phase == next {
            return false;
        }
        debug!("form phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        true
    }

    /// A value changed. Ignored while submitting.
    pub fn edit(&mut self) -> bool {
        match self.phase {
            FormPhase::Submitting => false,
            _ => self.transition(FormPhase::Editing),
        }
    }

    pub fn start_validation(&mut self) -> bool {
        match self.phase {
            FormPhase::Submitting => false,
            _ => self.transition(FormPhase::Validating),
        }
    }

    /// Settles on `Valid`/`Invalid` once nothing is pending. Only leaves
    /// `Validating`; a form that is being edited or submitted stays put.
    pub fn settle(&mut self, valid: bool, pending: bool) -> bool {
        if pending || self.phase != FormPhase::Validating {
            return false;
        }
        self.transition(if valid {
            FormPhase::Valid
        } else {
            FormPhase::Invalid
        })
    }

    /// Re-derives `Valid`/`Invalid` after errors were edited by hand.
    pub fn refresh(&mut self, valid: bool) -> bool {
        match self.phase {
            FormPhase::Valid | FormPhase::Invalid => self.transition(if valid {
                FormPhase::Valid
            } else {
                FormPhase::Invalid
            }),
            _ => false,
        }
    }

    /// Enters `Submitting` and returns what to restore if the submit is
    /// abandoned; `None` when a submit is already running.
    pub fn begin_submit(&mut self) -> Option<PriorSubmit> {
        if self.phase == FormPhase::Submitting {
            return None;
        }
        let prior = PriorSubmit {
            phase: self.phase,
            successful: self.is_submit_successful,
        };
        self.is_submit_successful = false;
        self.transition(FormPhase::Submitting);
        Some(prior)
    }

    /// A submit stopped before reaching a verdict. The count is untouched.
    pub fn abandon_submit(&mut self, prior: PriorSubmit) -> bool {
        if self.phase != FormPhase::Submitting {
            return false;
        }
        self.is_submit_successful = prior.successful;
        self.transition(prior.phase)
    }

    pub fn reject_submit(&mut self) {
        self.submit_count += 1;
        self.is_submitted = true;
        self.is_submit_successful = false;
        self.transition(FormPhase::Invalid);
    }

    pub fn finish_submit(&mut self, success: bool) {
        self.submit_count += 1;
        self.is_submitted = true;
        self.is_submit_successful = success;
        self.transition(if success {
            FormPhase::SubmitSuccess
        } else {
            FormPhase::SubmitFailure
        });
    }

    /// Back to `Pristine`. The submit count survives every reset.
    pub fn reset(&mut self, keep_is_submitted: bool) {
        if !keep_is_submitted {
            self.is_submitted = false;
            self.is_submit_successful = false;
        }
        self.transition(FormPhase::Pristine);
    }
}

/// Machine state from before a submit started.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PriorSubmit {
    phase: FormPhase,
    successful: bool,
}

/// Immutable view of the whole form at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSnapshot {
    pub values: Value,
    pub phase: FormPhase,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
    pub is_submitting: bool,
    pub is_submitted: bool,
    pub is_submit_successful: bool,
    pub submit_count: u32,
    pub errors: IndexMap<String, ErrorInfo>,
    pub touched: Vec<String>,
    pub dirty_fields: Vec<String>,
}

impl FormSnapshot {
    pub(crate) fn capture(registry: &super::registry::FieldRegistry, machine: &FormMachine) -> Self {
        Self {
            values: registry.values().clone(),
            phase: machine.phase,
            is_dirty: registry.is_dirty(),
            is_valid: registry.is_valid(),
            is_validating: registry.any_pending(),
            is_submitting: machine.phase == FormPhase::Submitting,
            is_submitted: machine.is_submitted,
            is_submit_successful: machine.is_submit_successful,
            submit_count: machine.submit_count,
            errors: registry.errors(),
            touched: registry.touched_fields(),
            dirty_fields: registry.dirty_fields(),
        }
    }
}

/// Result of [`FormEngine::submit`].
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Another submit was still running; nothing happened.
    Blocked,
    /// Validation passed and the success handler completed.
    Submitted,
    /// Validation failed; the error handler received these errors.
    Invalid(IndexMap<String, ErrorInfo>),
    /// Validation passed but the success handler returned an error.
    HandlerFailed(anyhow::Error),
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, SubmitOutcome::Blocked)
    }
}

/// Puts the machine back if a submit future is dropped or unwinds before it
/// reaches a verdict.
struct SubmitGuard<'a> {
    engine: &'a FormEngine,
    prior: PriorSubmit,
    settled: bool,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut core = self.engine.lock();
        if core.machine.abandon_submit(self.prior) {
            warn!("submit abandoned before completion");
            core.bus.state_changed();
            core.settle();
            core.flush();
        }
    }
}

/// Returns `Pending` once, waking itself straight away.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

impl FormEngine {
    /// Runs the submit lifecycle: full validation, then `on_valid` with a copy
    /// of the values or `on_invalid` with every field error.
    ///
    /// The form enters `Submitting` on the first poll and then yields, so a
    /// second call polled alongside this one returns
    /// [`SubmitOutcome::Blocked`] without running either handler. Dropping
    /// the future before it finishes restores the phase it started from.
    pub async fn submit<V, Fut, I>(&self, on_valid: V, on_invalid: I) -> SubmitOutcome
    where
        V: FnOnce(Value) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
        I: FnOnce(&IndexMap<String, ErrorInfo>),
    {
        let prior = {
            let mut core = self.lock();
            let Some(prior) = core.machine.begin_submit() else {
                debug!("submit ignored: already submitting");
                return SubmitOutcome::Blocked;
            };
            core.bus.state_changed();
            core.flush();
            prior
        };
        let mut guard = SubmitGuard {
            engine: self,
            prior,
            settled: false,
        };
        YieldOnce(false).await;

        if !self.validate_all().await {
            guard.settled = true;
            let errors = {
                let mut core = self.lock();
                core.machine.reject_submit();
                core.bus.state_changed();
                core.flush();
                core.registry.errors()
            };
            debug!("submit rejected with {} error(s)", errors.len());
            on_invalid(&errors);
            return SubmitOutcome::Invalid(errors);
        }

        let values = self.values();
        let verdict = on_valid(values).await;
        guard.settled = true;
        match verdict {
            Ok(()) => {
                let mut core = self.lock();
                core.machine.finish_submit(true);
                core.bus.state_changed();
                core.flush();
                if core.options.reset_on_submit_success {
                    core.reset(None, Default::default());
                }
                SubmitOutcome::Submitted
            }
            Err(err) => {
                warn!("submit handler failed: {err:#}");
                let mut core = self.lock();
                core.machine.finish_submit(false);
                core.bus.state_changed();
                core.flush();
                SubmitOutcome::HandlerFailed(err)
            }
        }
    }
}
