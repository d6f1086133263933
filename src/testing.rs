//! In-memory host doubles shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use crate::client::Navigator;
use crate::error::{Error, Result};
use crate::protocol::Exception;
use crate::transport::{AddonHost, DocumentBridge, RESPONSE_EVENT};

/// Produces the component's answer to `(command, request payload)`.
///
/// `None` leaves the request unanswered.
pub(crate) type Responder =
    Box<dyn Fn(&str, &Value) -> Option<std::result::Result<Value, Exception>> + Send + Sync>;

/// Builds the response envelope for a request envelope.
fn envelope(request: &Value, responder: &Responder) -> Option<Value> {
    let command = request["command"].as_str().unwrap_or_default();
    let reply = responder(command, &request["request"])?;
    let id = request["requestId"].clone();

    Some(match reply {
        Ok(response) => json!({ "requestId": id, "success": true, "response": response }),
        Err(exception) => json!({
            "requestId": id,
            "success": false,
            "exception": exception,
        }),
    })
}

// ============================================================================
// MockDocument
// ============================================================================

/// A page document whose extension answers through a [`Responder`].
#[derive(Default)]
pub(crate) struct MockDocument {
    markers: Mutex<FxHashSet<String>>,
    marker_checks: AtomicUsize,
    dispatched: Mutex<Vec<(String, Value)>>,
    listeners: Mutex<FxHashMap<String, mpsc::UnboundedSender<Value>>>,
    responder: Mutex<Option<Responder>>,
    fail_dispatch: AtomicBool,
}

impl MockDocument {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_marker(&self, id: &str) {
        self.markers.lock().insert(id.to_string());
    }

    pub(crate) fn respond_with(
        &self,
        responder: impl Fn(&str, &Value) -> Option<std::result::Result<Value, Exception>>
        + Send
        + Sync
        + 'static,
    ) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    pub(crate) fn fail_dispatch(&self, fail: bool) {
        self.fail_dispatch.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn emit(&self, name: &str, detail: Value) {
        if let Some(tx) = self.listeners.lock().get(name) {
            let _ = tx.send(detail);
        }
    }

    pub(crate) fn close_listeners(&self) {
        self.listeners.lock().clear();
    }

    pub(crate) fn marker_checks(&self) -> usize {
        self.marker_checks.load(Ordering::SeqCst)
    }

    pub(crate) fn dispatched(&self) -> Vec<(String, Value)> {
        self.dispatched.lock().clone()
    }

    /// Payloads of every dispatched command named `command`.
    pub(crate) fn requests(&self, command: &str) -> Vec<Value> {
        self.dispatched
            .lock()
            .iter()
            .filter(|(_, detail)| detail["command"] == command)
            .map(|(_, detail)| detail.clone())
            .collect()
    }
}

impl DocumentBridge for MockDocument {
    fn has_element(&self, id: &str) -> bool {
        self.marker_checks.fetch_add(1, Ordering::SeqCst);
        self.markers.lock().contains(id)
    }

    fn dispatch_event(&self, name: &str, detail: Value) -> Result<()> {
        if self.fail_dispatch.load(Ordering::SeqCst) {
            return Err(Error::connection("document detached"));
        }

        self.dispatched
            .lock()
            .push((name.to_string(), detail.clone()));

        let reply = self
            .responder
            .lock()
            .as_ref()
            .and_then(|responder| envelope(&detail, responder));
        if let Some(reply) = reply {
            self.emit(RESPONSE_EVENT, reply);
        }
        Ok(())
    }

    fn listen(&self, name: &str) -> Result<mpsc::UnboundedReceiver<Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().insert(name.to_string(), tx);
        Ok(rx)
    }
}

// ============================================================================
// MockAddon
// ============================================================================

/// How the add-on reacts to `SendCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SendMode {
    #[default]
    Accept,
    Refuse,
    Throw,
}

/// A legacy add-on that queues answers until the next results poll.
#[derive(Default)]
pub(crate) struct MockAddon {
    sent: Mutex<Vec<Value>>,
    queued: Mutex<Vec<Value>>,
    responder: Mutex<Option<Responder>>,
    mode: Mutex<SendMode>,
    results_broken: AtomicBool,
    polls: AtomicUsize,
}

impl MockAddon {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond_with(
        &self,
        responder: impl Fn(&str, &Value) -> Option<std::result::Result<Value, Exception>>
        + Send
        + Sync
        + 'static,
    ) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    pub(crate) fn set_mode(&self, mode: SendMode) {
        *self.mode.lock() = mode;
    }

    pub(crate) fn break_results(&self, broken: bool) {
        self.results_broken.store(broken, Ordering::SeqCst);
    }

    /// Queues a raw result for the next poll.
    pub(crate) fn queue(&self, result: Value) {
        self.queued.lock().push(result);
    }

    pub(crate) fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl AddonHost for MockAddon {
    fn send_command(&self, message: &str) -> std::result::Result<bool, String> {
        match *self.mode.lock() {
            SendMode::Accept => {}
            SendMode::Refuse => return Ok(false),
            SendMode::Throw => return Err("Automation server can't create object".to_string()),
        }

        let request: Value = serde_json::from_str(message).map_err(|e| e.to_string())?;
        self.sent.lock().push(request.clone());

        let reply = self
            .responder
            .lock()
            .as_ref()
            .and_then(|responder| envelope(&request, responder));
        if let Some(reply) = reply {
            self.queue(reply);
        }
        Ok(true)
    }

    fn available_results(&self) -> Option<String> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.results_broken.load(Ordering::SeqCst) {
            return None;
        }

        let results: Vec<Value> = self.queued.lock().drain(..).collect();
        Some(Value::Array(results).to_string())
    }
}

// ============================================================================
// MockNavigator
// ============================================================================

/// A page location that records navigations.
pub(crate) struct MockNavigator {
    current: Mutex<Url>,
    visited: Mutex<Vec<Url>>,
}

impl MockNavigator {
    pub(crate) fn new(current: &str) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Url::parse(current).expect("valid test URL")),
            visited: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn visited(&self) -> Vec<Url> {
        self.visited.lock().clone()
    }
}

impl Navigator for MockNavigator {
    fn current_url(&self) -> Result<Url> {
        Ok(self.current.lock().clone())
    }

    fn navigate(&self, url: &Url) -> Result<()> {
        self.visited.lock().push(url.clone());
        *self.current.lock() = url.clone();
        Ok(())
    }
}
