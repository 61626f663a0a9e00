//! Change notification for observers of a form.
//!
//! Mutations record what they touched into a pending [`StateDiff`]; the
//! engine flushes it once per logical update, so a reset that clears fifty
//! fields produces one notification, not fifty.

use std::{
    collections::BTreeSet,
    pin::Pin,
    sync::{Arc, Mutex, Weak},
    task::{Context, Poll},
};

use futures::{
    Stream, StreamExt,
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use log::trace;
use serde::Serialize;

use crate::domain::FieldPath;

use super::{engine::FormCore, state::FormSnapshot};

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    /// Changes at, above or below any of these paths.
    Fields(Vec<FieldPath>),
    /// Aggregate flag and phase changes only.
    State,
}

impl Selector {
    fn matches(&self, diff: &StateDiff) -> bool {
        match self {
            Selector::All => !diff.is_empty(),
            Selector::State => diff.state,
            Selector::Fields(paths) => diff
                .fields
                .iter()
                .any(|changed| paths.iter().any(|watched| watched.overlaps(changed))),
        }
    }
}

/// Paths whose value or field state changed, and whether the aggregate
/// state changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDiff {
    pub fields: BTreeSet<FieldPath>,
    pub state: bool,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && !self.state
    }
}

#[derive(Debug, Clone)]
pub struct FormUpdate {
    pub snapshot: Arc<FormSnapshot>,
    pub diff: StateDiff,
}

#[derive(Debug)]
struct Slot {
    id: u64,
    selector: Selector,
    sender: UnboundedSender<FormUpdate>,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionBus {
    slots: Vec<Slot>,
    next_id: u64,
    pending: StateDiff,
    held: usize,
}

impl SubscriptionBus {
    pub fn field_changed(&mut self, path: &FieldPath) {
        self.pending.fields.insert(path.clone());
    }

    pub fn state_changed(&mut self) {
        self.pending.state = true;
    }

    pub fn hold(&mut self) {
        self.held += 1;
    }

    pub fn release(&mut self) {
        self.held = self.held.saturating_sub(1);
    }

    /// The pending diff, if it should be delivered now and someone wants it.
    pub fn take_ready(&mut self) -> Option<StateDiff> {
        if self.held > 0 || self.pending.is_empty() {
            return None;
        }
        let diff = std::mem::take(&mut self.pending);
        self.slots
            .iter()
            .any(|slot| slot.selector.matches(&diff))
            .then_some(diff)
    }

    pub fn broadcast(&mut self, snapshot: Arc<FormSnapshot>, diff: StateDiff) {
        self.slots.retain(|slot| {
            if !slot.selector.matches(&diff) {
                return true;
            }
            let update = FormUpdate {
                snapshot: Arc::clone(&snapshot),
                diff: diff.clone(),
            };
            slot.sender.unbounded_send(update).is_ok()
        });
    }

    fn add(&mut self, selector: Selector) -> (u64, UnboundedReceiver<FormUpdate>) {
        let (sender, receiver) = mpsc::unbounded();
        self.next_id += 1;
        let id = self.next_id;
        self.slots.push(Slot {
            id,
            selector,
            sender,
        });
        (id, receiver)
    }

    fn remove(&mut self, id: u64) {
        self.slots.retain(|slot| slot.id != id);
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.slots.len()
    }
}

/// A stream of [`FormUpdate`]s. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<FormUpdate>,
    core: Weak<Mutex<FormCore>>,
    closed: bool,
}

impl Subscription {
    pub(crate) fn open(core: &Arc<Mutex<FormCore>>, guard: &mut FormCore, selector: Selector) -> Self {
        let (id, receiver) = guard.bus.add(selector);
        trace!("subscriber {id} attached");
        Self {
            id,
            receiver,
            core: Arc::downgrade(core),
            closed: false,
        }
    }

    /// Stops delivery. Updates already queued are discarded too. Calling it
    /// again does nothing.
    pub fn unsubscribe(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver.close();
        if let Some(core) = self.core.upgrade() {
            super::engine::lock_core(&core).bus.remove(self.id);
        }
        trace!("subscriber {} detached", self.id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next queued update without waiting.
    pub fn try_recv(&mut self) -> Option<FormUpdate> {
        if self.closed {
            return None;
        }
        self.receiver.try_next().ok().flatten()
    }
}

impl Stream for Subscription {
    type Item = FormUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
