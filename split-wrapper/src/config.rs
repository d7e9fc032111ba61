//! Client configuration and its environment bindings.

use std::str::FromStr;
use std::time::Duration;

use tracing::level_filters::LevelFilter;

use crate::error::{Error, Result};

/// Default time to wait for definitions before reporting a timeout.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 1_000;

/// Default interval for refreshing definitions once loaded (1 hour).
pub const DEFAULT_FEATURES_REFRESH_MS: u64 = 3_600_000;

/// Default delay between definition fetch attempts before the first success.
pub const DEFAULT_FETCH_RETRY_MS: u64 = 500;

/// Default interval for pushing queued events and impressions (1 minute).
pub const DEFAULT_EVENTS_PUSH_MS: u64 = 60_000;

/// Default capacity of each delivery queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

pub const DEFAULT_SDK_URL: &str = "https://sdk.split.io/api";
pub const DEFAULT_EVENTS_URL: &str = "https://events.split.io/api";

/// Environment variable names read by [`WrapperOptions::from_env`].
pub mod env {
    pub const API_KEY: &str = "SPLIT_SDK_API_KEY";
    /// Name used by earlier releases of the host app.
    pub const LEGACY_API_KEY: &str = "SplitSdkApiKey";
    pub const USER_KEY: &str = "SPLIT_USER_KEY";
    pub const READY_TIMEOUT_MS: &str = "SPLIT_READY_TIMEOUT_MS";
    pub const LOG_LEVEL: &str = "SPLIT_LOG_LEVEL";
    pub const USER_CONSENT: &str = "SPLIT_USER_CONSENT";
    pub const SDK_URL: &str = "SPLIT_SDK_URL";
    pub const EVENTS_URL: &str = "SPLIT_EVENTS_URL";
    pub const APP_VERSION: &str = "SPLIT_APP_VERSION";
}

/// SDK log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[default]
    None,
    Error,
    Warning,
    Info,
    Debug,
    Verbose,
}

impl LogLevel {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogLevel::None => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Verbose => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "verbose" | "trace" => Ok(LogLevel::Verbose),
            other => Err(Error::Configuration(format!("unknown log level: {other}"))),
        }
    }
}

/// Whether queued impressions and events may leave the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserConsent {
    /// Queue data but hold it until consent is granted.
    Unknown,
    #[default]
    Granted,
    /// Neither queue nor send.
    Declined,
}

impl UserConsent {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => UserConsent::Unknown,
            2 => UserConsent::Declined,
            _ => UserConsent::Granted,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            UserConsent::Unknown => 0,
            UserConsent::Granted => 1,
            UserConsent::Declined => 2,
        }
    }
}

impl FromStr for UserConsent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(UserConsent::Unknown),
            "granted" => Ok(UserConsent::Granted),
            "declined" => Ok(UserConsent::Declined),
            other => Err(Error::Configuration(format!("unknown user consent: {other}"))),
        }
    }
}

/// Configuration options for the SDK client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub log_level: LogLevel,
    /// Version of the host application, reported as an evaluation attribute.
    pub app_version: Option<String>,
    /// Ready timeout in milliseconds. `Some(0)` disables the timeout.
    pub ready_timeout_ms: Option<u64>,
    pub user_consent: UserConsent,
    /// Base URL for definitions.
    pub sdk_url: Option<String>,
    /// Base URL for events and impressions.
    pub events_url: Option<String>,
    pub features_refresh_ms: Option<u64>,
    pub fetch_retry_ms: Option<u64>,
    pub events_push_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    pub fn with_ready_timeout(mut self, timeout_ms: u64) -> Self {
        self.ready_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_user_consent(mut self, consent: UserConsent) -> Self {
        self.user_consent = consent;
        self
    }

    /// Point both the definitions and events endpoints somewhere else.
    pub fn with_endpoints(
        mut self,
        sdk_url: impl Into<String>,
        events_url: impl Into<String>,
    ) -> Self {
        self.sdk_url = Some(sdk_url.into());
        self.events_url = Some(events_url.into());
        self
    }

    pub fn with_features_refresh(mut self, interval_ms: u64) -> Self {
        self.features_refresh_ms = Some(interval_ms);
        self
    }

    pub fn with_fetch_retry(mut self, interval_ms: u64) -> Self {
        self.fetch_retry_ms = Some(interval_ms);
        self
    }

    pub fn with_events_push(mut self, interval_ms: u64) -> Self {
        self.events_push_ms = Some(interval_ms);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// `None` when the timeout is disabled.
    pub fn ready_timeout(&self) -> Option<Duration> {
        match self.ready_timeout_ms.unwrap_or(DEFAULT_READY_TIMEOUT_MS) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn sdk_url(&self) -> &str {
        self.sdk_url.as_deref().unwrap_or(DEFAULT_SDK_URL)
    }

    pub fn events_url(&self) -> &str {
        self.events_url.as_deref().unwrap_or(DEFAULT_EVENTS_URL)
    }

    pub fn features_refresh(&self) -> Duration {
        Duration::from_millis(
            self.features_refresh_ms
                .unwrap_or(DEFAULT_FEATURES_REFRESH_MS)
                .max(1),
        )
    }

    pub fn fetch_retry(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_ms.unwrap_or(DEFAULT_FETCH_RETRY_MS).max(1))
    }

    pub fn events_push(&self) -> Duration {
        Duration::from_millis(self.events_push_ms.unwrap_or(DEFAULT_EVENTS_PUSH_MS).max(1))
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Everything needed to initialize a client, usually read from the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct WrapperOptions {
    pub api_key: Option<String>,
    /// Matching key. A random session key is generated when absent.
    pub user_key: Option<String>,
    pub config: ClientConfig,
}

impl WrapperOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn with_user_key(mut self, key: impl Into<String>) -> Self {
        self.user_key = Some(key.into());
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Read options from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read options through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = ClientConfig::new();
        if let Some(raw) = non_empty(env::READY_TIMEOUT_MS) {
            let ms = raw.trim().parse().map_err(|e| {
                Error::Configuration(format!("invalid {}: {raw:?} ({e})", env::READY_TIMEOUT_MS))
            })?;
            config.ready_timeout_ms = Some(ms);
        }
        if let Some(raw) = non_empty(env::LOG_LEVEL) {
            config.log_level = raw.parse()?;
        }
        if let Some(raw) = non_empty(env::USER_CONSENT) {
            config.user_consent = raw.parse()?;
        }
        config.sdk_url = non_empty(env::SDK_URL);
        config.events_url = non_empty(env::EVENTS_URL);
        config.app_version = non_empty(env::APP_VERSION);

        Ok(Self {
            api_key: non_empty(env::API_KEY).or_else(|| non_empty(env::LEGACY_API_KEY)),
            user_key: non_empty(env::USER_KEY),
            config,
        })
    }
}
