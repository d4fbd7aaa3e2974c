//! Mirror events for subscribers.

use ballot_types::{AccountAddress, PollId, TxRef};

/// What moved a poll to `Ended`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndCause {
    /// A read or vote found `now > end_time`.
    Expired,
    /// The creator ended the poll.
    Explicit,
    /// The ledger reports the poll inactive.
    LedgerReported,
    /// The creation transaction was reverted.
    CreationFailed,
}

/// Mirror-level events observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug)]
pub enum MirrorEvent {
    /// Emitted once per real `→ Ended` transition, never on a no-op.
    PollEnded { poll: PollId, cause: EndCause },
    PollActivated { poll: PollId },
    VoteRecorded {
        poll: PollId,
        voter: AccountAddress,
        option_index: u32,
        tx_ref: TxRef,
    },
    /// A ledger outcome was queued for the reconciler.
    RepairQueued { poll: PollId, tx_ref: TxRef },
    /// Mirror and ledger disagree in a way the relay will not fix on its own.
    ConsistencyAlarm { poll: PollId, detail: String },
}

/// Synchronous fan-out event bus.
///
/// Listeners run inline on the emitting task; keep them fast.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&MirrorEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&MirrorEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &MirrorEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
