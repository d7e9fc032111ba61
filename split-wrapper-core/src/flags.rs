//! Names shared with the remote flag console.
//!
//! These strings must match the console configuration exactly.

/// Treatment returned while flag definitions are unavailable.
///
/// A real treatment literally named `"CONTROL"` cannot be told apart from
/// this sentinel.
pub const CONTROL_TREATMENT: &str = "CONTROL";

/// Traffic type used for default-scoped event tracking.
pub const DEFAULT_TRAFFIC_TYPE: &str = "user";

/// Feature flag keys.
pub mod flag {
    /// Flag used to attribute monitoring data to app releases.
    pub const APP_VERSION: &str = "coffee_tracker_app_version";
    /// Flag gating the async feature set.
    pub const IS_ASYNC_ON: &str = "coffee_tracker_async_features";
}

/// Attribute names passed alongside flag evaluations.
pub mod attribute {
    pub const APP_VERSION: &str = "app_version";
    pub const OS_VERSION: &str = "os_version";
    pub const OS_NAME: &str = "os_name";
}

/// Whether a treatment switches a feature on.
///
/// Treatments are matched by prefix so variants like `"on_fast"` count as on.
pub fn is_on(treatment: &str) -> bool {
    treatment.starts_with("on")
}
