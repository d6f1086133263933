//! Host transports.
//!
//! A transport moves [`Request`] envelopes to the PKI component and turns
//! the component's replies back into settled promises. Which transport a
//! client uses depends on what the host offers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  PkiClient      │       DocumentBridge         │  Browser        │
//! │                 │◄────────────────────────────►│  Extension      │
//! │  Transport      │   RequestEvent/ResponseEvent │                 │
//! │  → pending map  │                              │  → native app   │
//! │                 │         AddonHost            │                 │
//! │                 │◄────────────────────────────►│  Legacy Add-on  │
//! └─────────────────┘   SendCommand / polling      └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `extension` | Event-based transport for browser extensions |
//! | `addon` | Polling transport for the legacy add-on |
//! | `unsupported` | Transport for hosts with no component |
//! | `relay` | WebSocket [`DocumentBridge`] for out-of-process pages |
//! | `pending` | Request/response correlation table |

// ============================================================================
// Submodules
// ============================================================================

/// Polling transport for the legacy add-on.
pub mod addon;

/// Event-based transport for browser extensions.
pub mod extension;

/// Request/response correlation table.
pub mod pending;

/// WebSocket document bridge.
pub mod relay;

/// Transport for hosts that cannot run the component.
pub mod unsupported;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::trace;

use crate::error::Result;
use crate::install::InstallStatus;
use crate::promise::Promise;
use crate::protocol::{License, Request};

// ============================================================================
// Re-exports
// ============================================================================

pub use addon::{AddonHost, AddonSlot, AddonTransport};
pub use extension::{DocumentBridge, ExtensionTransport, REQUEST_EVENT, RESPONSE_EVENT};
pub use pending::{PendingTable, ResponseProcessor, SweepOutcome};
pub use relay::{RelayBridge, RelayServer};
pub use unsupported::UnsupportedTransport;

// ============================================================================
// Constants
// ============================================================================

/// Delay before the first install probe.
pub const DEFAULT_INSTALL_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Interval between install probes.
pub const DEFAULT_INSTALL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Number of install probes before giving up.
pub const DEFAULT_INSTALL_POLL_ATTEMPTS: u32 = 25;

/// Interval between add-on result polls.
pub const DEFAULT_RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result polls before an add-on request times out.
pub const DEFAULT_RESPONSE_MAX_POLLS: u64 = 120;

/// Per-request budget on event-based transports.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay before a send-path failure is reported.
pub const DEFAULT_FAILURE_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// TransportKind
// ============================================================================

/// Which host mechanism a transport uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Browser extension reached through DOM events.
    Extension,
    /// Legacy add-on reached through a scriptable object.
    Addon,
    /// No component can run on this host.
    Unsupported,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Extension => "extension",
            Self::Addon => "addon",
            Self::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Timings
// ============================================================================

/// Timing knobs shared by every transport.
///
/// The defaults reproduce the component's expectations; tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay before the first install probe.
    pub install_initial_delay: Duration,
    /// Interval between install probes.
    pub install_poll_interval: Duration,
    /// Number of install probes.
    pub install_poll_attempts: u32,
    /// Interval between add-on result polls.
    pub response_poll_interval: Duration,
    /// Polls before an add-on request times out.
    pub response_max_polls: u64,
    /// Per-request budget on the extension transport.
    pub command_timeout: Duration,
    /// Delay before a send-path failure is reported.
    pub failure_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            install_initial_delay: DEFAULT_INSTALL_INITIAL_DELAY,
            install_poll_interval: DEFAULT_INSTALL_POLL_INTERVAL,
            install_poll_attempts: DEFAULT_INSTALL_POLL_ATTEMPTS,
            response_poll_interval: DEFAULT_RESPONSE_POLL_INTERVAL,
            response_max_polls: DEFAULT_RESPONSE_MAX_POLLS,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            failure_delay: DEFAULT_FAILURE_DELAY,
        }
    }
}

impl Timings {
    /// Total wait of an add-on request, in milliseconds.
    #[inline]
    #[must_use]
    pub fn addon_timeout_ms(&self) -> u64 {
        let interval = u64::try_from(self.response_poll_interval.as_millis()).unwrap_or(u64::MAX);
        interval.saturating_mul(self.response_max_polls)
    }

    /// Extension request budget, in milliseconds.
    #[inline]
    #[must_use]
    pub fn command_timeout_ms(&self) -> u64 {
        u64::try_from(self.command_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// A way of reaching the PKI component.
///
/// Implementations are cheap to share behind an `Arc` and must be used
/// from inside a tokio runtime.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the host mechanism in use.
    fn kind(&self) -> TransportKind;

    /// Sends a request and returns a promise for its payload.
    ///
    /// `processor` runs on a successful payload before the promise settles;
    /// its error rejects the promise instead.
    fn send(&self, request: Request, processor: Option<ResponseProcessor>) -> Promise<Value>;

    /// Determines whether the component is present and usable.
    ///
    /// Missing or outdated components are reported through the returned
    /// status. `Err` means a command failed while checking.
    async fn check_installed(&self, license: Option<License>) -> Result<InstallStatus>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Waits for `probe` to return `true`.
///
/// Sleeps the initial delay, then probes up to `install_poll_attempts`
/// times, `install_poll_interval` apart. Returns `false` once the attempts
/// are used up.
pub(crate) async fn wait_for_component(timings: &Timings, probe: impl Fn() -> bool) -> bool {
    sleep(timings.install_initial_delay).await;

    let mut attempts_left = timings.install_poll_attempts;
    loop {
        if probe() {
            return true;
        }

        if attempts_left <= 1 {
            return false;
        }
        attempts_left -= 1;

        trace!(attempts_left, "Component not found, polling again");
        sleep(timings.install_poll_interval).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
