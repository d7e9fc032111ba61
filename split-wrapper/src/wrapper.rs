//! Process-wide access to a single [`FlagClient`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::client::FlagClient;
use crate::config::WrapperOptions;
use crate::error::Result;
use crate::logging;

/// Holds the one flag client of a process.
///
/// The client is constructed on first access, no matter how many callers
/// race for it, and torn down by [`WrapperContext::teardown`].
pub struct WrapperContext {
    client: OnceCell<Arc<FlagClient>>,
    torn_down: AtomicBool,
}

impl WrapperContext {
    pub const fn new() -> Self {
        Self {
            client: OnceCell::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// The client, constructing it with `init` if this is the first call.
    ///
    /// A failed `init` leaves the context empty so a later call may retry.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<FlagClient>>
    where
        F: FnOnce() -> Result<FlagClient>,
    {
        self.client
            .get_or_try_init(|| init().map(Arc::new))
            .map(Arc::clone)
    }

    /// The client, if it has been constructed.
    pub fn get(&self) -> Option<Arc<FlagClient>> {
        self.client.get().cloned()
    }

    /// Flush and destroy the client. Only the first call made after the
    /// client exists does anything.
    pub async fn teardown(&self) {
        let Some(client) = self.client.get() else {
            return;
        };
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        client.flush().await;
        client.destroy().await;
    }
}

impl Default for WrapperContext {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: WrapperContext = WrapperContext::new();

/// The process-wide context.
pub fn global() -> &'static WrapperContext {
    &GLOBAL
}

/// The process-wide client, configured from the environment on first use.
///
/// Also installs a log subscriber at the configured level if the host has
/// not installed one.
pub fn instance() -> Result<Arc<FlagClient>> {
    GLOBAL.get_or_try_init(|| {
        let options = WrapperOptions::from_env()?;
        logging::try_init(options.config.log_level);
        FlagClient::from_options(options)
    })
}
