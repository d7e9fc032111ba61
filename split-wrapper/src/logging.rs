//! Log output for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Install a global fmt subscriber at the given verbosity.
///
/// `RUST_LOG` takes precedence when set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn try_init(level: LogLevel) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(level.level_filter().into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
