//! Readiness tracking for a flag client.
//!
//! The SDK reports lifecycle events from its own background tasks. They are
//! delivered here as [`SdkEvent`] messages; the machine folds them into a
//! monotonic `(ready, ready_timed_out)` pair and publishes every transition on
//! a watch channel so observers never have to poll.

use tokio::sync::watch;

/// Lifecycle events emitted by an SDK client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkEvent {
    /// Flag definitions were downloaded.
    Ready,
    /// The ready timeout elapsed before any definitions were available.
    ReadyTimedOut,
    /// Fresh definitions replaced the ones already in use.
    Updated,
}

/// Derived single-valued view of a [`ReadinessSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Uninitialized,
    Ready,
    ReadyTimedOut,
}

/// The readiness flags at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessSnapshot {
    pub ready: bool,
    pub ready_timed_out: bool,
}

impl ReadinessSnapshot {
    /// Ready wins over a timeout that was reported earlier.
    pub fn state(&self) -> ReadinessState {
        if self.ready {
            ReadinessState::Ready
        } else if self.ready_timed_out {
            ReadinessState::ReadyTimedOut
        } else {
            ReadinessState::Uninitialized
        }
    }

    /// True once the client either became ready or gave up waiting.
    ///
    /// Hosts show a loading indicator until this holds.
    pub fn is_settled(&self) -> bool {
        self.ready || self.ready_timed_out
    }
}

/// Owns the readiness flags of one client.
///
/// Writers only ever set flags; nothing clears them.
#[derive(Debug)]
pub struct ReadinessStateMachine {
    tx: watch::Sender<ReadinessSnapshot>,
}

impl Default for ReadinessStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessStateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ReadinessSnapshot::default());
        Self { tx }
    }

    /// Mark definitions as downloaded.
    ///
    /// Observers are notified on every call, including repeated ones.
    pub fn record_ready(&self) {
        self.tx.send_modify(|s| s.ready = true);
    }

    /// Mark the ready timeout as elapsed. Never touches `ready`.
    pub fn record_timed_out(&self) {
        self.tx.send_modify(|s| s.ready_timed_out = true);
    }

    /// Fold one SDK lifecycle message into the state.
    pub fn apply(&self, event: SdkEvent) {
        match event {
            SdkEvent::Ready | SdkEvent::Updated => self.record_ready(),
            SdkEvent::ReadyTimedOut => self.record_timed_out(),
        }
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        *self.tx.borrow()
    }

    /// A read-only view that is woken on every transition.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessSnapshot> {
        self.tx.subscribe()
    }
}
