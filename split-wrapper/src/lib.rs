pub mod client;
pub mod config;
pub mod definitions;
mod delivery;
pub mod error;
mod headers;
pub mod http_sdk;
pub mod logging;
pub mod sdk;
mod version;
pub mod wrapper;

#[cfg(test)]
pub mod test_utils;

pub use client::FlagClient;
pub use config::{ClientConfig, LogLevel, UserConsent, WrapperOptions};
pub use error::{Error, Result};
pub use http_sdk::HttpSplitSdk;
pub use sdk::{EventListener, ListenerRegistry, SplitSdk};
pub use version::VERSION;
pub use wrapper::{global, instance, WrapperContext};

// Re-export the building blocks callers need alongside the client
pub use split_wrapper_core::{
    attribute, flag, normalize, AttributeBuilder, AttributeValue, Attributes, Event,
    ReadinessSnapshot, ReadinessState, RuntimeFacts, SdkEvent, CONTROL_TREATMENT,
    DEFAULT_TRAFFIC_TYPE,
};
