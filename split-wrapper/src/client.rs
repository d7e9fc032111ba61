//! The flag client: owns the SDK handle and tracks its readiness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use split_wrapper_core::{
    flag, flags, AttributeBuilder, Event, ReadinessSnapshot, ReadinessStateMachine, RuntimeFacts,
    SdkEvent, CONTROL_TREATMENT, DEFAULT_TRAFFIC_TYPE,
};

use crate::config::{ClientConfig, UserConsent, WrapperOptions};
use crate::error::{Error, Result};
use crate::http_sdk::HttpSplitSdk;
use crate::sdk::{EventListener, SplitSdk};
use crate::version::VERSION;

struct LiveClient {
    traffic_type: String,
    sdk: Arc<dyn SplitSdk>,
}

/// Entry point for evaluating flags and tracking events.
///
/// The primary SDK client is created once and destroyed by [`FlagClient::destroy`].
/// Further clients for other traffic types can be attached; they receive
/// broadcast events and are destroyed together with the primary one.
pub struct FlagClient {
    key: String,
    readiness: Arc<ReadinessStateMachine>,
    attributes: AttributeBuilder,
    clients: RwLock<Vec<LiveClient>>,
    // Cleared on destroy; lifecycle callbacks check it before touching state.
    delivering: Arc<AtomicBool>,
    destroyed: AtomicBool,
}

impl FlagClient {
    /// Create the SDK client for `user_key` and start fetching definitions.
    ///
    /// Returns immediately; readiness is reported through
    /// [`FlagClient::readiness`]. A random session key is used when
    /// `user_key` is `None`.
    pub fn initialize(
        api_key: &str,
        user_key: Option<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::MissingApiKey);
        }

        let key = user_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let app_version = config.app_version.clone().unwrap_or_else(|| VERSION.to_string());

        let sdk = HttpSplitSdk::start(api_key, key.clone(), &config)?;
        tracing::info!(key = %key, "flag client initialized");

        Ok(Self::with_sdk(key, Arc::new(sdk), RuntimeFacts::detect(app_version)))
    }

    /// Initialize from options, usually read from the environment.
    pub fn from_options(options: WrapperOptions) -> Result<Self> {
        let api_key = options.api_key.ok_or(Error::MissingApiKey)?;
        Self::initialize(&api_key, options.user_key, options.config)
    }

    /// Wrap an already constructed SDK client.
    pub fn with_sdk(key: impl Into<String>, sdk: Arc<dyn SplitSdk>, facts: RuntimeFacts) -> Self {
        let client = Self {
            key: key.into(),
            readiness: Arc::new(ReadinessStateMachine::new()),
            attributes: AttributeBuilder::new(facts),
            clients: RwLock::new(Vec::new()),
            delivering: Arc::new(AtomicBool::new(true)),
            destroyed: AtomicBool::new(false),
        };
        client.subscribe_lifecycle(&sdk);
        client.write_clients().push(LiveClient {
            traffic_type: DEFAULT_TRAFFIC_TYPE.to_string(),
            sdk,
        });
        client
    }

    fn subscribe_lifecycle(&self, sdk: &Arc<dyn SplitSdk>) {
        for event in [SdkEvent::Ready, SdkEvent::ReadyTimedOut, SdkEvent::Updated] {
            let readiness = Arc::clone(&self.readiness);
            let delivering = Arc::clone(&self.delivering);
            let listener: EventListener = Arc::new(move || {
                if delivering.load(Ordering::Acquire) {
                    readiness.apply(event);
                }
            });
            sdk.on(event, listener);
        }

        // Report the app version once definitions are available.
        let weak_sdk = Arc::downgrade(sdk);
        let delivering = Arc::clone(&self.delivering);
        let attributes = self.attributes.build(flag::APP_VERSION);
        sdk.on(
            SdkEvent::Ready,
            Arc::new(move || {
                if !delivering.load(Ordering::Acquire) {
                    return;
                }
                if let Some(sdk) = weak_sdk.upgrade() {
                    let treatment = sdk.get_treatment(flag::APP_VERSION, Some(&attributes));
                    tracing::debug!(
                        flag = flag::APP_VERSION,
                        treatment = %treatment,
                        "app version evaluated"
                    );
                }
            }),
        );
    }

    fn read_clients(&self) -> RwLockReadGuard<'_, Vec<LiveClient>> {
        self.clients
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_clients(&self) -> RwLockWriteGuard<'_, Vec<LiveClient>> {
        self.clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn primary(&self) -> Option<Arc<dyn SplitSdk>> {
        self.read_clients().first().map(|c| Arc::clone(&c.sdk))
    }

    fn live_clients(&self) -> Vec<(String, Arc<dyn SplitSdk>)> {
        self.read_clients()
            .iter()
            .map(|c| (c.traffic_type.clone(), Arc::clone(&c.sdk)))
            .collect()
    }

    /// Matching key the client evaluates for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Treatment for `flag` without attributes.
    ///
    /// Returns [`CONTROL_TREATMENT`] until definitions are available and
    /// after the client is destroyed.
    pub fn evaluate(&self, flag: &str) -> String {
        match self.primary() {
            Some(sdk) => sdk.get_treatment(flag, None),
            None => CONTROL_TREATMENT.to_string(),
        }
    }

    /// Treatment for `flag`, passing the attributes registered for it.
    pub fn evaluate_with_attributes(&self, flag: &str) -> String {
        let attributes = self.attributes.build(flag);
        match self.primary() {
            Some(sdk) => sdk.get_treatment(flag, Some(&attributes)),
            None => CONTROL_TREATMENT.to_string(),
        }
    }

    /// Whether `flag` evaluates to an "on" treatment.
    pub fn is_on(&self, flag: &str) -> bool {
        flags::is_on(&self.evaluate_with_attributes(flag))
    }

    /// Track `event` for the default traffic type.
    ///
    /// The returned text describes the outcome and is meant for logs.
    pub fn track_default_traffic(&self, event: impl Into<Event>) -> String {
        let event = event.into();
        match self.primary() {
            Some(sdk) => {
                let queued = sdk.track(DEFAULT_TRAFFIC_TYPE, &event);
                describe_track(&event, DEFAULT_TRAFFIC_TYPE, queued)
            }
            None => format!("event '{}' not tracked: client destroyed", event.event_type),
        }
    }

    /// Track `event` for the traffic type of every live client.
    pub fn track_all_traffic_types(&self, event: impl Into<Event>) -> String {
        let event = event.into();
        let clients = self.live_clients();
        if clients.is_empty() {
            return format!("event '{}' not tracked: client destroyed", event.event_type);
        }
        clients
            .iter()
            .map(|(traffic_type, sdk)| {
                describe_track(&event, traffic_type, sdk.track(traffic_type, &event))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Attach another SDK client, usually for a different traffic type.
    pub fn attach_client(&self, traffic_type: impl Into<String>, sdk: Arc<dyn SplitSdk>) {
        let traffic_type = traffic_type.into();
        // Checked under the lock destroy takes the clients with, so a client
        // attached concurrently is either destroyed with the rest or refused.
        let mut clients = self.write_clients();
        if self.destroyed.load(Ordering::Acquire) {
            drop(clients);
            tracing::warn!(traffic_type = %traffic_type, "client already destroyed, not attaching");
            return;
        }
        tracing::debug!(traffic_type = %traffic_type, "client attached");
        clients.push(LiveClient { traffic_type, sdk });
    }

    /// Change whether tracked data may leave the device, for every client.
    pub fn set_user_consent(&self, consent: UserConsent) {
        for (_, sdk) in self.live_clients() {
            sdk.set_user_consent(consent);
        }
    }

    /// Deliver queued impressions and events now. A no-op after destroy.
    pub async fn flush(&self) {
        for (_, sdk) in self.live_clients() {
            sdk.flush().await;
        }
    }

    /// Stop all clients, flushing what they still hold. Safe to call more
    /// than once; later calls do nothing.
    pub async fn destroy(&self) {
        let clients = {
            let mut clients = self.write_clients();
            if self.destroyed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.delivering.store(false, Ordering::Release);
            std::mem::take(&mut *clients)
        };
        for client in clients {
            client.sdk.destroy().await;
        }
        tracing::info!(key = %self.key, "flag client destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Current readiness.
    pub fn readiness(&self) -> ReadinessSnapshot {
        self.readiness.snapshot()
    }

    /// Receiver notified on every readiness change.
    pub fn subscribe_readiness(&self) -> watch::Receiver<ReadinessSnapshot> {
        self.readiness.subscribe()
    }
}

impl Drop for FlagClient {
    fn drop(&mut self) {
        if !self.destroyed.load(Ordering::Acquire) {
            self.delivering.store(false, Ordering::Release);
            tracing::warn!(
                key = %self.key,
                "flag client dropped without destroy, queued data may be lost"
            );
        }
    }
}

fn describe_track(event: &Event, traffic_type: &str, queued: bool) -> String {
    if queued {
        format!("event '{}' queued for traffic type '{traffic_type}'", event.event_type)
    } else {
        format!("event '{}' rejected for traffic type '{traffic_type}'", event.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockSdk;
    use split_wrapper_core::{attribute, ReadinessState};
    use tracing_test::traced_test;

    fn facts() -> RuntimeFacts {
        RuntimeFacts::new("3.1", "iOS", "17.4.1")
    }

    fn client_with(mock: MockSdk) -> (FlagClient, Arc<MockSdk>) {
        let mock = Arc::new(mock);
        let client = FlagClient::with_sdk("user-1", mock.clone(), facts());
        (client, mock)
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            FlagClient::initialize("", None, ClientConfig::new()),
            Err(Error::MissingApiKey)
        ));
        assert!(matches!(
            FlagClient::initialize("   ", Some("u".into()), ClientConfig::new()),
            Err(Error::MissingApiKey)
        ));
    }

    #[test]
    fn missing_api_key_option_is_rejected() {
        assert!(matches!(
            FlagClient::from_options(WrapperOptions::default()),
            Err(Error::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn generates_session_key_when_absent() {
        let server = httpmock::MockServer::start_async().await;
        let config = ClientConfig::new()
            .with_endpoints(server.base_url(), server.base_url())
            .with_ready_timeout(0);
        let first = FlagClient::initialize("key", None, config.clone()).unwrap();
        let second = FlagClient::initialize("key", None, config).unwrap();
        assert!(uuid::Uuid::parse_str(first.key()).is_ok());
        assert_ne!(first.key(), second.key());
        first.destroy().await;
        second.destroy().await;
    }

    #[test]
    fn evaluates_control_before_ready() {
        let (client, _mock) = client_with(MockSdk::new().with_treatment(flag::IS_ASYNC_ON, "on"));
        assert_eq!(client.evaluate(flag::IS_ASYNC_ON), CONTROL_TREATMENT);
        assert_eq!(client.evaluate("anything"), CONTROL_TREATMENT);
        assert_eq!(client.readiness().state(), ReadinessState::Uninitialized);
    }

    #[test]
    fn ready_event_updates_readiness() {
        let (client, mock) = client_with(MockSdk::new().with_treatment(flag::IS_ASYNC_ON, "on"));
        mock.deliver(SdkEvent::Ready);

        assert_eq!(client.readiness().state(), ReadinessState::Ready);
        assert_eq!(client.evaluate(flag::IS_ASYNC_ON), "on");
        assert!(client.is_on(flag::IS_ASYNC_ON));
    }

    #[test]
    fn timeout_then_ready_keeps_both_flags() {
        let (client, mock) = client_with(MockSdk::new());
        mock.deliver(SdkEvent::ReadyTimedOut);
        assert_eq!(client.readiness().state(), ReadinessState::ReadyTimedOut);

        mock.deliver(SdkEvent::Ready);
        let snapshot = client.readiness();
        assert!(snapshot.ready);
        assert!(snapshot.ready_timed_out);
        assert_eq!(snapshot.state(), ReadinessState::Ready);
    }

    #[test]
    fn updated_event_marks_ready() {
        let (client, mock) = client_with(MockSdk::new());
        mock.deliver(SdkEvent::Updated);
        assert!(client.readiness().ready);
    }

    #[test]
    fn ready_before_wiring_is_replayed() {
        let mock = MockSdk::new();
        mock.deliver(SdkEvent::Ready);
        let (client, _mock) = client_with(mock);
        assert!(client.readiness().ready);
    }

    #[test]
    fn first_ready_evaluates_app_version_with_attributes() {
        let (_client, mock) = client_with(MockSdk::new());
        mock.deliver(SdkEvent::Ready);

        let evaluations = mock.evaluations();
        assert_eq!(evaluations.len(), 1);
        let (flag_key, attrs) = &evaluations[0];
        assert_eq!(flag_key, flag::APP_VERSION);
        let attrs = attrs.as_ref().unwrap();
        assert_eq!(attrs.get(attribute::APP_VERSION), Some(&"3.1.0".into()));
    }

    #[test]
    fn evaluate_with_attributes_passes_flag_attributes() {
        let (client, mock) = client_with(MockSdk::new());
        client.evaluate_with_attributes(flag::IS_ASYNC_ON);
        client.evaluate(flag::IS_ASYNC_ON);

        let evaluations = mock.evaluations();
        let attrs = evaluations[0].1.as_ref().unwrap();
        assert_eq!(attrs.get(attribute::OS_NAME), Some(&"iOS".into()));
        assert_eq!(attrs.get(attribute::OS_VERSION), Some(&"17.4.1".into()));
        assert!(evaluations[1].1.is_none());
    }

    #[traced_test]
    #[test]
    fn unknown_flag_with_attributes_warns_and_evaluates() {
        let (client, mock) = client_with(MockSdk::new());
        mock.deliver(SdkEvent::Ready);

        assert_eq!(client.evaluate_with_attributes("unregistered"), CONTROL_TREATMENT);
        assert!(logs_contain("no attributes are defined for flag"));
        let (_, attrs) = mock.evaluations().pop().unwrap();
        assert_eq!(attrs, Some(Default::default()));
    }

    #[test]
    fn track_default_traffic_uses_user_type() {
        let (client, mock) = client_with(MockSdk::new());
        let outcome = client.track_default_traffic("coffee_added");

        assert!(outcome.contains("queued"));
        assert!(outcome.contains("'user'"));
        assert_eq!(mock.tracked(), vec![("user".to_string(), "coffee_added".to_string())]);
    }

    #[test]
    fn track_all_traffic_types_fans_out() {
        let (client, primary) = client_with(MockSdk::new());
        let account = Arc::new(MockSdk::new());
        client.attach_client("account", account.clone());

        let outcome = client.track_all_traffic_types(Event::new("order_placed").with_value(4.5));

        assert_eq!(primary.tracked(), vec![("user".to_string(), "order_placed".to_string())]);
        assert_eq!(
            account.tracked(),
            vec![("account".to_string(), "order_placed".to_string())]
        );
        assert!(outcome.contains("'user'"));
        assert!(outcome.contains("'account'"));
    }

    #[test]
    fn consent_reaches_every_client() {
        let (client, primary) = client_with(MockSdk::new());
        let account = Arc::new(MockSdk::new());
        client.attach_client("account", account.clone());

        client.set_user_consent(UserConsent::Declined);
        assert_eq!(primary.consent(), Some(UserConsent::Declined));
        assert_eq!(account.consent(), Some(UserConsent::Declined));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_stops_delivery() {
        let (client, mock) = client_with(MockSdk::new().with_treatment(flag::IS_ASYNC_ON, "on"));
        let account = Arc::new(MockSdk::new());
        client.attach_client("account", account.clone());

        client.flush().await;
        assert_eq!(mock.flushes(), 1);
        assert_eq!(account.flushes(), 1);

        client.destroy().await;
        client.destroy().await;
        assert_eq!(mock.destroys(), 1);
        assert_eq!(account.destroys(), 1);
        assert!(client.is_destroyed());

        client.flush().await;
        assert_eq!(mock.flushes(), 1);
        assert_eq!(client.evaluate(flag::IS_ASYNC_ON), CONTROL_TREATMENT);
        assert!(client.track_default_traffic("coffee_added").contains("destroyed"));

        client.attach_client("late", Arc::new(MockSdk::new()));
        assert!(client.track_all_traffic_types("x").contains("destroyed"));
    }

    #[tokio::test]
    async fn events_after_destroy_leave_state_untouched() {
        let (client, mock) = client_with(MockSdk::new().keeping_listeners_after_destroy());
        client.destroy().await;
        let evaluations = mock.evaluations().len();

        // The SDK still fires lifecycle events; the client no longer reacts.
        mock.deliver(SdkEvent::ReadyTimedOut);
        mock.deliver(SdkEvent::Ready);
        mock.deliver(SdkEvent::Updated);

        let snapshot = client.readiness();
        assert!(!snapshot.ready);
        assert!(!snapshot.ready_timed_out);
        assert_eq!(snapshot.state(), ReadinessState::Uninitialized);
        assert_eq!(mock.evaluations().len(), evaluations);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn attach_racing_destroy_never_leaks_a_client() {
        let (client, _mock) = client_with(MockSdk::new());
        let client = Arc::new(client);
        let attached: Vec<Arc<MockSdk>> = (0..64).map(|_| Arc::new(MockSdk::new())).collect();

        let attacher = {
            let client = Arc::clone(&client);
            let attached = attached.clone();
            std::thread::spawn(move || {
                for sdk in attached {
                    client.attach_client("account", sdk);
                }
            })
        };
        client.destroy().await;
        attacher.join().unwrap();

        // Each attached client was destroyed with the rest or refused; none
        // is left behind holding a live SDK.
        assert!(client.live_clients().is_empty());
        for sdk in &attached {
            assert!(sdk.destroys() <= 1);
            assert_eq!(Arc::strong_count(sdk), 1);
        }
    }

    #[tokio::test]
    async fn subscribers_see_ready() {
        let (client, mock) = client_with(MockSdk::new());
        let mut rx = client.subscribe_readiness();
        assert!(!rx.borrow().ready);

        tokio::spawn(async move { mock.deliver(SdkEvent::Ready) });
        rx.changed().await.unwrap();
        assert!(rx.borrow().ready);
    }
}
