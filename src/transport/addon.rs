//! Polling transport for the legacy add-on.
//!
//! The add-on is a scriptable object the host page hosts. Commands are
//! handed over synchronously with `SendCommand`; results are collected by
//! polling `GetAvailableResults` on a fixed interval.
//!
//! # Poll Loop
//!
//! Each cycle advances a poll index. A request records the index at which
//! it was sent and times out once `max_polls` cycles passed without a
//! matching result. The index advances even while no add-on is attached,
//! so every request settles within the budget.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::install::{ADDON_LATEST_VERSION, InstallState, InstallStatus};
use crate::promise::Promise;
use crate::protocol::{Command, License, Request, Response};
use crate::version::is_older;

use super::pending::SweepOutcome;
use super::{PendingTable, ResponseProcessor, Timings, Transport, TransportKind};

// ============================================================================
// AddonHost
// ============================================================================

/// The legacy add-on's scriptable surface.
pub trait AddonHost: Send + Sync {
    /// Hands a serialized request to the add-on.
    ///
    /// `Ok(false)` means the add-on refused the command; `Err` carries the
    /// text of an exception it raised.
    fn send_command(&self, message: &str) -> std::result::Result<bool, String>;

    /// Returns the JSON array of results ready since the last call.
    ///
    /// `None` means the call itself failed.
    fn available_results(&self) -> Option<String>;
}

// ============================================================================
// AddonSlot
// ============================================================================

/// The place where the host page exposes its add-on.
///
/// Starts empty; the host attaches the add-on once its object is created.
/// Clones share the same slot.
#[derive(Clone, Default)]
pub struct AddonSlot {
    host: Arc<RwLock<Option<Arc<dyn AddonHost>>>>,
}

impl AddonSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the add-on, replacing any previous one.
    pub fn attach(&self, host: Arc<dyn AddonHost>) {
        *self.host.write() = Some(host);
        debug!("Add-on attached");
    }

    /// Detaches the add-on, returning it.
    pub fn detach(&self) -> Option<Arc<dyn AddonHost>> {
        let host = self.host.write().take();
        if host.is_some() {
            debug!("Add-on detached");
        }
        host
    }

    /// Returns the attached add-on.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn AddonHost>> {
        self.host.read().clone()
    }

    /// Returns `true` if an add-on is attached.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.host.read().is_some()
    }
}

impl std::fmt::Debug for AddonSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

// ============================================================================
// AddonTransport
// ============================================================================

/// Transport backed by the legacy add-on.
///
/// Cloning is cheap. The poll loop stops once every clone is dropped.
#[derive(Clone)]
pub struct AddonTransport {
    inner: Arc<AddonInner>,
}

struct AddonInner {
    slot: AddonSlot,
    pending: PendingTable,
    poll_index: AtomicU64,
    timings: Timings,
}

impl AddonTransport {
    /// Creates the transport and starts polling for results.
    ///
    /// The first poll runs immediately. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn new(slot: AddonSlot, timings: Timings) -> Self {
        let inner = Arc::new(AddonInner {
            slot,
            pending: PendingTable::new(),
            poll_index: AtomicU64::new(0),
            timings,
        });

        tokio::spawn(Self::run_poll_loop(
            Arc::downgrade(&inner),
            timings.response_poll_interval,
        ));

        Self { inner }
    }

    /// Returns the slot this transport reads the add-on from.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> &AddonSlot {
        &self.inner.slot
    }

    /// Returns the number of requests awaiting a result.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns the number of completed poll cycles.
    #[inline]
    #[must_use]
    pub fn poll_index(&self) -> u64 {
        self.inner.poll_index.load(Ordering::SeqCst)
    }

    /// Poll loop that collects results on a fixed interval.
    async fn run_poll_loop(inner: Weak<AddonInner>, period: std::time::Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.poll_once();
        }

        debug!("Add-on poll loop terminated");
    }
}

impl AddonInner {
    /// Runs one poll cycle.
    fn poll_once(&self) {
        let index = self.poll_index.load(Ordering::SeqCst);
        let results = self.collect_results();

        let timeout_ms = self.timings.addon_timeout_ms();
        let outcome = self.pending.sweep(
            results,
            index,
            self.timings.response_max_polls,
            |id| Error::request_timeout(id, timeout_ms),
        );

        if outcome != SweepOutcome::default() {
            trace!(
                index,
                settled = outcome.settled,
                timed_out = outcome.timed_out,
                discarded = outcome.discarded,
                "Poll cycle"
            );
        }

        self.poll_index.fetch_add(1, Ordering::SeqCst);
    }

    /// Fetches and parses the results ready on the add-on.
    fn collect_results(&self) -> Vec<Response> {
        let Some(host) = self.slot.get() else {
            return Vec::new();
        };

        let Some(raw) = host.available_results() else {
            warn!("Add-on method GetAvailableResults failed");
            return Vec::new();
        };

        match serde_json::from_str::<Vec<Response>>(&raw) {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Failed to parse add-on results");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Transport for AddonTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Addon
    }

    fn send(&self, request: Request, processor: Option<ResponseProcessor>) -> Promise<Value> {
        let (resolver, promise) = Promise::channel();
        let inner = &self.inner;
        let delay = inner.timings.failure_delay;

        let Some(host) = inner.slot.get() else {
            warn!(command = request.command.name(), "Add-on not detected");
            resolver.settle_after(delay, Err(Error::AddonNotDetected));
            return promise;
        };

        let id = request.id;
        let command = request.command.name();
        let message = match serde_json::to_string(&request) {
            Ok(message) => message,
            Err(e) => {
                resolver.reject(e.into());
                return promise;
            }
        };

        inner.pending.register(
            id,
            resolver,
            processor,
            inner.poll_index.load(Ordering::SeqCst),
        );

        let failure = match host.send_command(&message) {
            Ok(true) => None,
            Ok(false) => Some("Failed to send command to add-on".to_string()),
            Err(e) => Some(format!("Exception while sending command to add-on: {e}")),
        };

        match failure {
            Some(detail) => {
                warn!(%id, command, %detail, "Add-on rejected command");
                if let Some(resolver) = inner.pending.mark_send_failed(id) {
                    resolver.settle_after(delay, Err(Error::send_failed(detail)));
                }
            }
            None => trace!(%id, command, "Command handed to add-on"),
        }

        promise
    }

    async fn check_installed(&self, license: Option<License>) -> Result<InstallStatus> {
        let slot = self.inner.slot.clone();
        let found = super::wait_for_component(&self.inner.timings, || slot.is_attached()).await;

        if !found {
            debug!("Add-on not found");
            return Ok(InstallStatus::unavailable(
                InstallState::NotInstalled,
                "The Web PKI add-on is not installed",
            ));
        }

        let payload = self
            .send(Request::new(Command::GetVersion, license), None)
            .await?;
        let version: String = serde_json::from_value(payload)?;
        debug!(%version, "Add-on version");

        if is_older(&version, ADDON_LATEST_VERSION) {
            let message = format!(
                "The Web PKI add-on is outdated (installed version: {version}, latest version: {ADDON_LATEST_VERSION})"
            );
            return Ok(InstallStatus::unavailable(InstallState::Outdated, message));
        }

        Ok(InstallStatus::installed())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;
    use tokio::time::{Instant, sleep};

    use crate::protocol::Exception;
    use crate::testing::{MockAddon, SendMode};

    fn attached(addon: &Arc<MockAddon>) -> AddonTransport {
        let slot = AddonSlot::new();
        slot.attach(addon.clone());
        AddonTransport::new(slot, Timings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_delivered_on_next_poll() {
        let addon = MockAddon::new();
        addon.respond_with(|command, request| match command {
            "readCertificate" => {
                assert_eq!(request["certificateThumbprint"], "T");
                Some(Ok(json!("MIIB")))
            }
            _ => None,
        });
        let transport = attached(&addon);

        let started = Instant::now();
        let command = Command::ReadCertificate {
            certificate_thumbprint: "T".into(),
        };
        let payload = transport
            .send(Request::new(command, None), None)
            .await
            .expect("certificate");

        assert_eq!(payload, json!("MIIB"));
        assert!(started.elapsed() <= Duration::from_millis(500));
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(addon.sent()[0]["command"], "readCertificate");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exception_result_rejects() {
        let addon = MockAddon::new();
        addon.respond_with(|_, _| Some(Err(Exception::new("Access denied", "stack", "addon"))));

        let err = attached(&addon)
            .send(Request::new(Command::GetVersion, None), None)
            .await
            .expect_err("rejected");

        assert_eq!(err.message(), "Access denied");
        assert_eq!(err.origin(), "addon");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_addon_rejects_after_delay() {
        let transport = AddonTransport::new(AddonSlot::new(), Timings::default());

        let started = Instant::now();
        let err = transport
            .send(Request::new(Command::GetVersion, None), None)
            .await
            .expect_err("rejected");

        assert!(matches!(err, Error::AddonNotDetected));
        assert_eq!(started.elapsed(), Duration::from_millis(200));
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_command_is_send_failure() {
        let addon = MockAddon::new();
        addon.set_mode(SendMode::Refuse);
        let transport = attached(&addon);

        let started = Instant::now();
        let err = transport
            .send(Request::new(Command::GetVersion, None), None)
            .await
            .expect_err("rejected");

        assert!(matches!(err, Error::SendFailed { .. }));
        assert_eq!(err.message(), "Failed to send command to add-on");
        assert_eq!(started.elapsed(), Duration::from_millis(200));

        // The next poll discards the entry instead of timing it out.
        sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throwing_addon_reports_exception_text() {
        let addon = MockAddon::new();
        addon.set_mode(SendMode::Throw);

        let err = attached(&addon)
            .send(Request::new(Command::GetVersion, None), None)
            .await
            .expect_err("rejected");

        assert!(err.detail().contains("Automation server can't create object"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out_after_poll_budget() {
        let addon = MockAddon::new();
        let transport = attached(&addon);

        let started = Instant::now();
        let err = transport
            .send(Request::new(Command::GetVersion, None), None)
            .await
            .expect_err("timed out");

        assert!(err.is_timeout());
        assert_eq!(err.message(), "The operation has timed out");
        assert!(started.elapsed() >= Duration::from_secs(59));
        assert!(started.elapsed() <= Duration::from_secs(61));
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_enforced_when_addon_detaches() {
        let addon = MockAddon::new();
        let transport = attached(&addon);

        let promise = transport.send(Request::new(Command::GetVersion, None), None);
        transport.slot().detach();

        let err = promise.await.expect_err("timed out");
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_results_skip_cycle() {
        let addon = MockAddon::new();
        addon.break_results(true);
        let transport = attached(&addon);

        let promise = transport.send(Request::new(Command::GetVersion, None), None);
        let id: crate::identifiers::RequestId =
            serde_json::from_value(addon.sent()[0]["requestId"].clone()).expect("id");

        // The answer is ready, but every poll while broken yields nothing.
        addon.queue(json!({ "requestId": id, "success": true, "response": "1.6.1" }));
        sleep(Duration::from_millis(1500)).await;
        let broken_polls = addon.polls();
        assert!(broken_polls >= 3);
        assert_eq!(transport.pending_count(), 1);

        addon.break_results(false);

        assert_eq!(promise.await.expect("fulfilled"), json!("1.6.1"));
        assert!(addon.polls() > broken_polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_addon_reports_not_installed() {
        let transport = AddonTransport::new(AddonSlot::new(), Timings::default());

        let status = transport.check_installed(None).await.expect("status");

        assert_eq!(status.state, InstallState::NotInstalled);
        assert_eq!(
            status.message.as_deref(),
            Some("The Web PKI add-on is not installed")
        );
        assert_eq!(status.browser_specific_status, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_attach_is_detected() {
        let addon = MockAddon::new();
        addon.respond_with(|_, _| Some(Ok(json!("1.6.1"))));
        let slot = AddonSlot::new();
        let transport = AddonTransport::new(slot.clone(), Timings::default());

        let host: Arc<dyn AddonHost> = addon.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            slot.attach(host);
        });

        let status = transport.check_installed(None).await.expect("status");
        assert!(status.is_installed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outdated_addon() {
        let addon = MockAddon::new();
        addon.respond_with(|command, _| match command {
            "getVersion" => Some(Ok(json!("1.5.0"))),
            _ => None,
        });

        let status = attached(&addon).check_installed(None).await.expect("status");

        assert_eq!(status.state, InstallState::Outdated);
        let message = status.message.expect("message");
        assert!(message.contains("1.5.0"));
        assert!(message.contains("1.6.1"));
    }
}
