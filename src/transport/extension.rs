//! Event-based transport for browser extensions.
//!
//! Requests are dispatched as DOM events on the page document; the
//! extension answers with a response event carrying the same `requestId`.
//!
//! # Event Loop
//!
//! The transport spawns a tokio task that:
//!
//! - Receives response events from the document
//! - Correlates them with pending requests by UUID
//! - Fails everything still pending when the event stream ends
//!
//! Each request also gets a timer that rejects it after the command budget.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::install::{
    EXTENSION_FIRST_SELF_UPDATE_VERSION, EXTENSION_MARKER_ID, EXTENSION_REQUIRED_VERSION,
    ExtensionState, InstallState, InstallStatus, NATIVE_WIN_REQUIRED_VERSION,
    install_state_from_code,
};
use crate::promise::Promise;
use crate::protocol::{Command, License, Request, Response};
use crate::version::{is_older, satisfies};

use super::{PendingTable, ResponseProcessor, Timings, Transport, TransportKind};

// ============================================================================
// Constants
// ============================================================================

/// Event the page dispatches to reach the extension.
pub const REQUEST_EVENT: &str = "com.lacunasoftware.WebPKIBeta.RequestEvent";

/// Event the extension dispatches back to the page.
pub const RESPONSE_EVENT: &str = "com.lacunasoftware.WebPKIBeta.ResponseEvent";

/// Operating system name that requires a minimum native helper version.
const WINDOWS_OS: &str = "Windows";

// ============================================================================
// DocumentBridge
// ============================================================================

/// The page document, as seen by the extension transport.
pub trait DocumentBridge: Send + Sync {
    /// Returns `true` if an element with this ID exists.
    fn has_element(&self, id: &str) -> bool;

    /// Dispatches a custom event with a JSON detail.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be delivered to the page.
    fn dispatch_event(&self, name: &str, detail: Value) -> Result<()>;

    /// Subscribes to a custom event.
    ///
    /// Every event detail is pushed to the returned channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be set up.
    fn listen(&self, name: &str) -> Result<mpsc::UnboundedReceiver<Value>>;
}

// ============================================================================
// Initialize payload
// ============================================================================

/// Payload of the `initialize` command.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResponse {
    #[serde(default)]
    is_ready: bool,
    #[serde(default)]
    native_info: Option<NativeInfo>,
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Native helper details reported by `initialize`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeInfo {
    #[serde(default)]
    os: String,
    #[serde(default)]
    installed_version: String,
}

// ============================================================================
// ExtensionTransport
// ============================================================================

/// Transport backed by the browser extension.
///
/// Cloning is cheap; clones share the pending table and event loop.
#[derive(Clone)]
pub struct ExtensionTransport {
    inner: Arc<ExtensionInner>,
}

struct ExtensionInner {
    document: Arc<dyn DocumentBridge>,
    pending: PendingTable,
    timings: Timings,
}

impl ExtensionTransport {
    /// Subscribes to response events and starts the event loop.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the document's error if the subscription fails.
    pub fn new(document: Arc<dyn DocumentBridge>, timings: Timings) -> Result<Self> {
        let events = document.listen(RESPONSE_EVENT)?;
        let pending = PendingTable::new();

        tokio::spawn(Self::run_event_loop(events, pending.clone()));

        Ok(Self {
            inner: Arc::new(ExtensionInner {
                document,
                pending,
                timings,
            }),
        })
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Event loop that routes response events to pending requests.
    async fn run_event_loop(mut events: mpsc::UnboundedReceiver<Value>, pending: PendingTable) {
        while let Some(detail) = events.recv().await {
            match serde_json::from_value::<Response>(detail) {
                Ok(response) => {
                    let id = response.id;
                    if !pending.deliver(response) {
                        warn!(%id, "Response for unknown request");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse response event");
                }
            }
        }

        pending.fail_all(|| Error::ConnectionClosed);
        debug!("Extension event loop terminated");
    }

    /// Sends a command and waits for its payload.
    async fn call(&self, command: Command, license: Option<License>) -> Result<Value> {
        self.send(Request::new(command, license), None).await
    }

    /// Checks the extension version, then the native helper.
    async fn check_components(&self, license: Option<License>) -> Result<InstallStatus> {
        let payload = self.call(Command::GetExtensionVersion, license.clone()).await?;
        let version: String = serde_json::from_value(payload)?;
        debug!(%version, "Extension version");

        if is_older(&version, EXTENSION_REQUIRED_VERSION) {
            let message = format!(
                "The Web PKI extension is outdated (installed version: {version}, required version: {EXTENSION_REQUIRED_VERSION})"
            );
            return Ok(InstallStatus::unavailable(InstallState::Outdated, message)
                .with_browser_status(ExtensionState::ExtensionOutdated.code())
                .with_self_update(satisfies(&version, EXTENSION_FIRST_SELF_UPDATE_VERSION)));
        }

        let payload = self.call(Command::Initialize, license).await?;
        let init: InitializeResponse = serde_json::from_value(payload)?;

        if !init.is_ready {
            let code = init.status.unwrap_or(ExtensionState::ExtensionNotInstalled.code());
            debug!(code, "Extension reported not ready");
            return Ok(InstallStatus::unavailable(
                install_state_from_code(code),
                init.message.unwrap_or_default(),
            )
            .with_browser_status(code));
        }

        let native = init.native_info.unwrap_or_default();
        if native.os == WINDOWS_OS && !satisfies(&native.installed_version, NATIVE_WIN_REQUIRED_VERSION)
        {
            let message = format!(
                "The Web PKI native component is outdated (installed version: {}, required version: {NATIVE_WIN_REQUIRED_VERSION})",
                native.installed_version
            );
            return Ok(InstallStatus::unavailable(InstallState::Outdated, message)
                .with_browser_status(ExtensionState::NativeOutdated.code()));
        }

        Ok(InstallStatus::installed())
    }
}

#[async_trait]
impl Transport for ExtensionTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Extension
    }

    fn send(&self, request: Request, processor: Option<ResponseProcessor>) -> Promise<Value> {
        let (resolver, promise) = Promise::channel();
        let id = request.id;
        let command = request.command.name();

        let detail = match request.to_value() {
            Ok(detail) => detail,
            Err(e) => {
                resolver.reject(e);
                return promise;
            }
        };

        let inner = &self.inner;
        inner.pending.register(id, resolver, processor, 0);

        if let Err(e) = inner.document.dispatch_event(REQUEST_EVENT, detail) {
            warn!(%id, command, error = %e, "Failed to dispatch request event");
            if let Some(resolver) = inner.pending.take(id) {
                resolver.reject(e);
            }
            return promise;
        }

        trace!(%id, command, "Request dispatched");

        let pending = inner.pending.clone();
        let budget = inner.timings.command_timeout;
        let budget_ms = inner.timings.command_timeout_ms();
        tokio::spawn(async move {
            sleep(budget).await;
            if pending.fail(id, Error::request_timeout(id, budget_ms)) {
                debug!(%id, command, "Request timed out");
            }
        });

        promise
    }

    async fn check_installed(&self, license: Option<License>) -> Result<InstallStatus> {
        let document = Arc::clone(&self.inner.document);
        let found =
            super::wait_for_component(&self.inner.timings, || document.has_element(EXTENSION_MARKER_ID))
                .await;

        if !found {
            debug!("Extension marker not found");
            return Ok(InstallStatus::unavailable(
                InstallState::NotInstalled,
                "The Web PKI extension is not installed",
            )
            .with_browser_status(ExtensionState::ExtensionNotInstalled.code()));
        }

        self.check_components(license).await
    }
}

// ============================================================================
// Tests
// ============================================================================
