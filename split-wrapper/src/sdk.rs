//! The capability the wrapper needs from a Split SDK client.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use split_wrapper_core::{Attributes, Event, SdkEvent};

use crate::config::UserConsent;

/// Callback invoked when an SDK lifecycle event fires.
pub type EventListener = Arc<dyn Fn() + Send + Sync>;

/// A Split SDK client as seen by the wrapper.
///
/// Evaluation and tracking are synchronous and must not block; lifecycle
/// events are delivered to listeners from whatever task the SDK runs them on.
#[async_trait]
pub trait SplitSdk: Send + Sync {
    /// Treatment for `flag`, or the control treatment while definitions are
    /// unavailable.
    fn get_treatment(&self, flag: &str, attributes: Option<&Attributes>) -> String;

    /// Queue `event` under `traffic_type`. Returns whether it was queued.
    fn track(&self, traffic_type: &str, event: &Event) -> bool;

    /// Register `listener` for `event`.
    ///
    /// If the event already fired, the listener runs immediately.
    fn on(&self, event: SdkEvent, listener: EventListener);

    /// Change whether tracked data may be sent. SDKs without a consent
    /// model ignore this.
    fn set_user_consent(&self, _consent: UserConsent) {}

    /// Send queued impressions and events now.
    async fn flush(&self);

    /// Stop background work, flush what is left and drop all listeners.
    async fn destroy(&self);
}

/// Listener bookkeeping shared by SDK implementations.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    listeners: Vec<(SdkEvent, EventListener)>,
    fired: HashSet<SdkEvent>,
    closed: bool,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener, running it right away if `event` already fired.
    pub fn subscribe(&self, event: SdkEvent, listener: EventListener) {
        let run_now = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.listeners.push((event, Arc::clone(&listener)));
            state.fired.contains(&event)
        };
        if run_now {
            listener();
        }
    }

    /// Fire `event`. Listeners run outside the lock.
    pub fn emit(&self, event: SdkEvent) {
        let to_run: Vec<EventListener> = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.fired.insert(event);
            state
                .listeners
                .iter()
                .filter(|(e, _)| *e == event)
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in to_run {
            listener();
        }
    }

    pub fn has_fired(&self, event: SdkEvent) -> bool {
        self.lock().fired.contains(&event)
    }

    /// Drop every listener; later subscriptions and emits are ignored.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, EventListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let listener: EventListener = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn emit_runs_matching_listeners_only() {
        let registry = ListenerRegistry::new();
        let (ready, on_ready) = counter();
        let (timeout, on_timeout) = counter();
        registry.subscribe(SdkEvent::Ready, on_ready);
        registry.subscribe(SdkEvent::ReadyTimedOut, on_timeout);

        registry.emit(SdkEvent::Ready);
        registry.emit(SdkEvent::Ready);

        assert_eq!(ready.load(Ordering::SeqCst), 2);
        assert_eq!(timeout.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn late_subscriber_runs_immediately() {
        let registry = ListenerRegistry::new();
        registry.emit(SdkEvent::Ready);
        assert!(registry.has_fired(SdkEvent::Ready));

        let (ready, on_ready) = counter();
        registry.subscribe(SdkEvent::Ready, on_ready);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_registry_is_silent() {
        let registry = ListenerRegistry::new();
        let (ready, on_ready) = counter();
        registry.subscribe(SdkEvent::Ready, on_ready);
        registry.close();

        registry.emit(SdkEvent::Ready);
        let (late, on_late) = counter();
        registry.subscribe(SdkEvent::Ready, on_late);

        assert_eq!(ready.load(Ordering::SeqCst), 0);
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_subscribe_from_inside_a_callback() {
        let registry = Arc::new(ListenerRegistry::new());
        let (inner, on_inner) = counter();
        let reg = Arc::clone(&registry);
        registry.subscribe(
            SdkEvent::Ready,
            Arc::new(move || reg.subscribe(SdkEvent::Updated, Arc::clone(&on_inner))),
        );

        registry.emit(SdkEvent::Ready);
        registry.emit(SdkEvent::Updated);
        assert_eq!(inner.load(Ordering::SeqCst), 1);
    }
}
