//! A Split SDK client that talks to the flag service over HTTP.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use split_wrapper_core::{
    Attributes, Event, EventBuffer, Impression, SdkEvent, TrackedEvent, CONTROL_TREATMENT,
};

use crate::config::{ClientConfig, UserConsent};
use crate::definitions::{DefinitionsFetcher, SharedDefinitions};
use crate::delivery::DeliveryManager;
use crate::error::{Error, Result};
use crate::headers::build_client;
use crate::sdk::{EventListener, ListenerRegistry, SplitSdk};

/// How long `destroy` waits for the background task to stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

struct Timings {
    ready_timeout: Option<Duration>,
    features_refresh: Duration,
    fetch_retry: Duration,
    events_push: Duration,
}

impl Timings {
    fn from_config(config: &ClientConfig) -> Self {
        Self {
            ready_timeout: config.ready_timeout(),
            features_refresh: config.features_refresh(),
            fetch_retry: config.fetch_retry(),
            events_push: config.events_push(),
        }
    }
}

struct SdkInner {
    key: String,
    consent: AtomicU8,
    definitions: SharedDefinitions,
    fetcher: DefinitionsFetcher,
    delivery: DeliveryManager,
    events: EventBuffer<TrackedEvent>,
    impressions: EventBuffer<Impression>,
    listeners: ListenerRegistry,
}

impl SdkInner {
    fn consent(&self) -> UserConsent {
        UserConsent::from_u8(self.consent.load(Ordering::Acquire))
    }

    async fn refresh_definitions(&self) -> Result<()> {
        let Some(definitions) = self.fetcher.fetch().await? else {
            tracing::trace!("flag definitions not modified");
            return Ok(());
        };

        let flags = definitions.len();
        let change_number = definitions.change_number();
        if self.definitions.update(definitions) {
            tracing::debug!(flags, change_number, "flag definitions loaded");
            self.listeners.emit(SdkEvent::Ready);
        } else {
            tracing::debug!(flags, change_number, "flag definitions updated");
            self.listeners.emit(SdkEvent::Updated);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        match self.consent() {
            UserConsent::Granted => self.delivery.flush_all(&self.events, &self.impressions).await,
            UserConsent::Unknown => {
                tracing::debug!(
                    events = self.events.len(),
                    impressions = self.impressions.len(),
                    "user consent unknown, holding queued data"
                );
                Ok(())
            }
            UserConsent::Declined => Ok(()),
        }
    }

    fn record_impression(&self, flag: &str, treatment: &str) {
        if self.consent() == UserConsent::Declined {
            return;
        }
        let queued = self.impressions.push(Impression {
            feature: flag.to_string(),
            key_name: self.key.clone(),
            treatment: treatment.to_string(),
            time: now_millis(),
        });
        if !queued {
            tracing::trace!(flag, "impression queue full, dropping impression");
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Split SDK client for a single matching key.
///
/// Definitions are polled in the background until [`SplitSdk::destroy`] is
/// called or the client is dropped.
pub struct HttpSplitSdk {
    inner: Arc<SdkInner>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl HttpSplitSdk {
    /// Start a client for `key`. Must be called from within a Tokio runtime.
    pub fn start(api_key: &str, key: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Configuration(format!("a Tokio runtime is required: {e}")))?;

        let client = build_client(api_key)?;
        let capacity = config.queue_capacity();
        let inner = Arc::new(SdkInner {
            key: key.into(),
            consent: AtomicU8::new(config.user_consent.as_u8()),
            definitions: SharedDefinitions::new(),
            fetcher: DefinitionsFetcher::new(client.clone(), config.sdk_url()),
            delivery: DeliveryManager::new(client, config.events_url()),
            events: EventBuffer::new(capacity),
            impressions: EventBuffer::new(capacity),
            listeners: ListenerRegistry::new(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run_background_tasks(
            Arc::clone(&inner),
            shutdown_rx,
            Timings::from_config(config),
        ));

        tracing::debug!(key = %inner.key, sdk_url = config.sdk_url(), "split client started");

        Ok(Self {
            inner,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            background_tasks: Mutex::new(vec![task]),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn user_consent(&self) -> UserConsent {
        self.inner.consent()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.definitions.is_initialized()
    }

    /// Number of events waiting for delivery.
    pub fn queued_events(&self) -> usize {
        self.inner.events.len()
    }

    /// Number of impressions waiting for delivery.
    pub fn queued_impressions(&self) -> usize {
        self.inner.impressions.len()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

async fn run_background_tasks(
    inner: Arc<SdkInner>,
    mut shutdown_rx: oneshot::Receiver<()>,
    timings: Timings,
) {
    let ready_deadline = tokio::time::sleep(timings.ready_timeout.unwrap_or_default());
    tokio::pin!(ready_deadline);
    let mut awaiting_ready = timings.ready_timeout.is_some();

    let next_fetch = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(next_fetch);

    let mut push_interval = tokio::time::interval_at(
        Instant::now() + timings.events_push,
        timings.events_push,
    );

    // Fetches run as their own task so a slow service cannot hold up the
    // ready deadline or shutdown.
    let mut fetch_task: Option<JoinHandle<Result<()>>> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                if let Some(task) = fetch_task.take() {
                    task.abort();
                }
                break;
            }
            _ = &mut ready_deadline, if awaiting_ready => {
                awaiting_ready = false;
                if !inner.definitions.is_initialized() {
                    tracing::warn!(
                        timeout_ms = timings.ready_timeout.unwrap_or_default().as_millis() as u64,
                        "flag definitions not available before the ready timeout"
                    );
                    inner.listeners.emit(SdkEvent::ReadyTimedOut);
                }
            }
            _ = &mut next_fetch, if fetch_task.is_none() => {
                let inner = Arc::clone(&inner);
                fetch_task = Some(tokio::spawn(async move { inner.refresh_definitions().await }));
            }
            joined = async {
                match fetch_task.as_mut() {
                    Some(task) => task.await,
                    None => std::future::pending().await,
                }
            }, if fetch_task.is_some() => {
                fetch_task = None;
                let failed = match joined {
                    Ok(Ok(())) => false,
                    Ok(Err(e)) => {
                        tracing::error!("Failed to fetch flag definitions: {}", e);
                        true
                    }
                    Err(e) => {
                        tracing::error!("Flag definitions fetch task failed: {}", e);
                        true
                    }
                };
                let delay = if failed && !inner.definitions.is_initialized() {
                    timings.fetch_retry
                } else {
                    timings.features_refresh
                };
                next_fetch.as_mut().reset(Instant::now() + delay);
            }
            _ = push_interval.tick() => {
                if let Err(e) = inner.flush().await {
                    tracing::error!("Failed to flush events: {}", e);
                }
            }
        }
    }

    tracing::trace!("split client background task stopped");
}

#[async_trait]
impl SplitSdk for HttpSplitSdk {
    fn get_treatment(&self, flag: &str, attributes: Option<&Attributes>) -> String {
        if self.is_destroyed() {
            return CONTROL_TREATMENT.to_string();
        }
        let Some(definitions) = self.inner.definitions.get() else {
            return CONTROL_TREATMENT.to_string();
        };
        let Some(treatment) = definitions.treatment(flag, attributes) else {
            tracing::warn!(flag, "flag is not defined, serving control");
            return CONTROL_TREATMENT.to_string();
        };

        self.inner.record_impression(flag, treatment);
        treatment.to_string()
    }

    fn track(&self, traffic_type: &str, event: &Event) -> bool {
        if self.is_destroyed() || self.inner.consent() == UserConsent::Declined {
            return false;
        }
        if traffic_type.is_empty() {
            tracing::warn!(event_type = %event.event_type, "traffic type must not be empty");
            return false;
        }
        if !event.has_valid_type() {
            tracing::warn!(event_type = %event.event_type, "invalid event type");
            return false;
        }

        self.inner
            .events
            .push(event.record(&self.inner.key, traffic_type, now_millis()))
    }

    fn on(&self, event: SdkEvent, listener: EventListener) {
        self.inner.listeners.subscribe(event, listener);
    }

    fn set_user_consent(&self, consent: UserConsent) {
        self.inner.consent.store(consent.as_u8(), Ordering::Release);
        if consent == UserConsent::Declined {
            self.inner.events.clear();
            self.inner.impressions.clear();
        }
        tracing::debug!(?consent, "user consent changed");
    }

    async fn flush(&self) {
        if self.is_destroyed() {
            return;
        }
        if let Err(e) = self.inner.flush().await {
            tracing::error!("Failed to flush events: {}", e);
        }
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.listeners.close();

        let shutdown_tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let tasks: Vec<JoinHandle<()>> = self
            .background_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for mut task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                tracing::warn!("background task did not stop in time, aborting it");
                task.abort();
            }
        }

        if let Err(e) = self.inner.flush().await {
            tracing::warn!("Final flush failed: {}", e);
        }
        tracing::debug!(key = %self.inner.key, "split client destroyed");
    }
}

impl Drop for HttpSplitSdk {
    fn drop(&mut self) {
        if let Ok(mut shutdown_tx) = self.shutdown_tx.lock() {
            if let Some(tx) = shutdown_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}
