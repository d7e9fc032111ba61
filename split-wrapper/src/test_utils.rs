//! Test utilities for the Split wrapper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use split_wrapper_core::{Attributes, Event, SdkEvent, CONTROL_TREATMENT};

use crate::config::UserConsent;
use crate::sdk::{EventListener, ListenerRegistry, SplitSdk};

/// A scripted SDK: serves fixed treatments once `Ready` has been delivered.
#[derive(Default)]
pub struct MockSdk {
    treatments: Mutex<HashMap<String, String>>,
    ready: AtomicBool,
    destroyed: AtomicBool,
    listeners: ListenerRegistry,
    evaluations: Mutex<Vec<(String, Option<Attributes>)>>,
    tracked: Mutex<Vec<(String, String)>>,
    consent: Mutex<Option<UserConsent>>,
    flushes: AtomicUsize,
    destroys: AtomicUsize,
    // When set, destroy leaves listeners registered so late events still reach them.
    keeps_listeners: AtomicBool,
}

impl MockSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_treatment(self, flag: &str, treatment: &str) -> Self {
        self.treatments
            .lock()
            .unwrap()
            .insert(flag.to_string(), treatment.to_string());
        self
    }

    /// An SDK that keeps delivering events after destroy, like one whose
    /// background task outlives the handle.
    pub fn keeping_listeners_after_destroy(self) -> Self {
        self.keeps_listeners.store(true, Ordering::SeqCst);
        self
    }

    /// Fire `event` as the SDK would from its background task.
    pub fn deliver(&self, event: SdkEvent) {
        if event == SdkEvent::Ready {
            self.ready.store(true, Ordering::SeqCst);
        }
        self.listeners.emit(event);
    }

    pub fn evaluations(&self) -> Vec<(String, Option<Attributes>)> {
        self.evaluations.lock().unwrap().clone()
    }

    /// `(traffic type, event type)` pairs accepted by `track`.
    pub fn tracked(&self) -> Vec<(String, String)> {
        self.tracked.lock().unwrap().clone()
    }

    pub fn consent(&self) -> Option<UserConsent> {
        *self.consent.lock().unwrap()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SplitSdk for MockSdk {
    fn get_treatment(&self, flag: &str, attributes: Option<&Attributes>) -> String {
        self.evaluations
            .lock()
            .unwrap()
            .push((flag.to_string(), attributes.cloned()));
        if !self.ready.load(Ordering::SeqCst) || self.destroyed.load(Ordering::SeqCst) {
            return CONTROL_TREATMENT.to_string();
        }
        self.treatments
            .lock()
            .unwrap()
            .get(flag)
            .cloned()
            .unwrap_or_else(|| CONTROL_TREATMENT.to_string())
    }

    fn track(&self, traffic_type: &str, event: &Event) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        self.tracked
            .lock()
            .unwrap()
            .push((traffic_type.to_string(), event.event_type.clone()));
        true
    }

    fn on(&self, event: SdkEvent, listener: EventListener) {
        self.listeners.subscribe(event, listener);
    }

    fn set_user_consent(&self, consent: UserConsent) {
        *self.consent.lock().unwrap() = Some(consent);
    }

    async fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    async fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.destroyed.store(true, Ordering::SeqCst);
        if !self.keeps_listeners.load(Ordering::SeqCst) {
            self.listeners.close();
        }
    }
}
