//! Request/response correlation table.
//!
//! Every in-flight request owns one entry keyed by its [`RequestId`]. An
//! entry is removed exactly once: when its response arrives, when it times
//! out, or when the transport shuts down.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::promise::Resolver;
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Post-processing applied to a successful payload before settling.
pub type ResponseProcessor = Box<dyn FnOnce(Value) -> Result<Value> + Send>;

/// Map of request IDs to pending entries.
type CorrelationMap = FxHashMap<RequestId, PendingEntry>;

// ============================================================================
// PendingEntry
// ============================================================================

/// One in-flight request.
struct PendingEntry {
    /// Settles the caller's promise. Taken when the send itself failed.
    resolver: Option<Resolver<Value>>,
    /// Optional payload post-processing.
    processor: Option<ResponseProcessor>,
    /// Poll index at registration (polling transports only).
    poll_start: u64,
    /// The command never reached the component.
    send_failed: bool,
}

impl PendingEntry {
    /// Settles the entry's promise with a response.
    fn settle(self, response: Response) {
        let Some(resolver) = self.resolver else {
            return;
        };

        let processor = self.processor;
        let result = response
            .into_result()
            .and_then(|value| match processor {
                Some(process) => process(value),
                None => Ok(value),
            });

        resolver.settle(result);
    }

    /// Rejects the entry's promise.
    fn reject(self, error: Error) {
        if let Some(resolver) = self.resolver {
            resolver.reject(error);
        }
    }
}

// ============================================================================
// SweepOutcome
// ============================================================================

/// Counts of what a polling sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Entries settled by a matching result.
    pub settled: usize,
    /// Entries rejected for timing out.
    pub timed_out: usize,
    /// Entries dropped because their send had failed.
    pub discarded: usize,
}

// ============================================================================
// PendingTable
// ============================================================================

/// Shared table of in-flight requests.
///
/// Clones share the same table.
#[derive(Clone, Default)]
pub struct PendingTable {
    entries: Arc<Mutex<CorrelationMap>>,
}

impl PendingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-flight request.
    pub fn register(
        &self,
        id: RequestId,
        resolver: Resolver<Value>,
        processor: Option<ResponseProcessor>,
        poll_start: u64,
    ) {
        let entry = PendingEntry {
            resolver: Some(resolver),
            processor,
            poll_start,
            send_failed: false,
        };
        self.entries.lock().insert(id, entry);
        trace!(%id, poll_start, "Request registered");
    }

    /// Removes an entry and hands back its resolver.
    pub fn take(&self, id: RequestId) -> Option<Resolver<Value>> {
        self.entries.lock().remove(&id).and_then(|entry| entry.resolver)
    }

    /// Flags an entry whose command never reached the component.
    ///
    /// The entry stays until the next sweep discards it; its resolver is
    /// handed back so the caller can report the failure.
    pub fn mark_send_failed(&self, id: RequestId) -> Option<Resolver<Value>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&id)?;
        entry.send_failed = true;
        entry.resolver.take()
    }

    /// Settles the entry matching `response`.
    ///
    /// Returns `false` if no entry matched.
    pub fn deliver(&self, response: Response) -> bool {
        let entry = self.entries.lock().remove(&response.id);

        match entry {
            Some(entry) => {
                trace!(id = %response.id, success = response.success, "Response delivered");
                entry.settle(response);
                true
            }
            None => false,
        }
    }

    /// Removes an entry and rejects it with `error`.
    ///
    /// Returns `false` if the entry was already gone.
    pub fn fail(&self, id: RequestId, error: Error) -> bool {
        let entry = self.entries.lock().remove(&id);

        match entry {
            Some(entry) => {
                entry.reject(error);
                true
            }
            None => false,
        }
    }

    /// Rejects every entry, building one error per entry.
    pub fn fail_all(&self, mut error: impl FnMut() -> Error) {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            entry.reject(error());
        }

        if count > 0 {
            debug!(count, "Failed all pending requests");
        }
    }

    /// Runs one polling cycle over the table.
    ///
    /// For each entry, in order of precedence:
    /// 1. send failed: discarded
    /// 2. a result with the same ID exists: settled
    /// 3. `poll_index >= poll_start + max_polls`: rejected with `timeout`
    ///
    /// Entries are settled after the lock is released.
    pub fn sweep(
        &self,
        results: Vec<Response>,
        poll_index: u64,
        max_polls: u64,
        mut timeout: impl FnMut(RequestId) -> Error,
    ) -> SweepOutcome {
        let mut by_id: FxHashMap<RequestId, Response> = FxHashMap::default();
        for response in results {
            by_id.entry(response.id).or_insert(response);
        }

        let mut outcome = SweepOutcome::default();
        let mut settled = Vec::new();
        let mut expired = Vec::new();

        {
            let mut entries = self.entries.lock();
            let finished: Vec<RequestId> = entries
                .iter()
                .filter(|(id, entry)| {
                    entry.send_failed
                        || by_id.contains_key(id)
                        || poll_index >= entry.poll_start.saturating_add(max_polls)
                })
                .map(|(id, _)| *id)
                .collect();

            for id in finished {
                let Some(entry) = entries.remove(&id) else {
                    continue;
                };

                if entry.send_failed {
                    outcome.discarded += 1;
                } else if let Some(response) = by_id.remove(&id) {
                    settled.push((entry, response));
                } else {
                    expired.push((id, entry));
                }
            }
        }

        outcome.settled = settled.len();
        outcome.timed_out = expired.len();

        for (entry, response) in settled {
            entry.settle(response);
        }
        for (id, entry) in expired {
            debug!(%id, "Request timed out");
            entry.reject(timeout(id));
        }

        outcome
    }

    /// Returns the number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::promise::Promise;
    use crate::protocol::Exception;

    fn register(table: &PendingTable, poll_start: u64) -> (RequestId, Promise<Value>) {
        let id = RequestId::generate();
        let (resolver, promise) = Promise::channel();
        table.register(id, resolver, None, poll_start);
        (id, promise)
    }

    fn timeout(id: RequestId) -> Error {
        Error::request_timeout(id, 60_000)
    }

    #[tokio::test]
    async fn test_deliver_settles_and_removes() {
        let table = PendingTable::new();
        let (id, promise) = register(&table, 0);

        assert!(table.deliver(Response::success(id, json!("ok"))));
        assert!(table.is_empty());
        assert_eq!(promise.await.expect("fulfilled"), json!("ok"));

        assert!(!table.deliver(Response::success(id, json!("again"))));
    }

    #[tokio::test]
    async fn test_deliver_failure_rejects_with_component_error() {
        let table = PendingTable::new();
        let (id, promise) = register(&table, 0);

        let exception = Exception::new("denied", "trace", "native");
        table.deliver(Response::failure(id, exception));

        let err = promise.await.expect_err("rejected");
        assert!(err.is_component_error());
        assert_eq!(err.origin(), "native");
    }

    #[tokio::test]
    async fn test_processor_runs_on_success_only() {
        let table = PendingTable::new();
        let id = RequestId::generate();
        let (resolver, promise) = Promise::channel();
        let processor: ResponseProcessor = Box::new(|value| Ok(json!([value])));
        table.register(id, resolver, Some(processor), 0);

        table.deliver(Response::success(id, json!(1)));
        assert_eq!(promise.await.expect("fulfilled"), json!([1]));
    }

    #[tokio::test]
    async fn test_processor_error_rejects() {
        let table = PendingTable::new();
        let id = RequestId::generate();
        let (resolver, promise) = Promise::channel();
        let processor: ResponseProcessor = Box::new(|_| Err(Error::protocol("bad payload")));
        table.register(id, resolver, Some(processor), 0);

        table.deliver(Response::success(id, json!(1)));
        assert!(matches!(promise.await, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_sweep_settles_matching_results() {
        let table = PendingTable::new();
        let (first, first_promise) = register(&table, 0);
        let (_second, _second_promise) = register(&table, 0);

        let outcome = table.sweep(
            vec![Response::success(first, json!("done"))],
            1,
            120,
            timeout,
        );

        assert_eq!(outcome.settled, 1);
        assert_eq!(outcome.timed_out, 0);
        assert_eq!(table.len(), 1);
        assert_eq!(first_promise.await.expect("fulfilled"), json!("done"));
    }

    #[tokio::test]
    async fn test_sweep_times_out_at_poll_budget() {
        let table = PendingTable::new();
        let (_id, promise) = register(&table, 10);

        assert_eq!(table.sweep(Vec::new(), 129, 120, timeout).timed_out, 0);
        assert_eq!(table.sweep(Vec::new(), 130, 120, timeout).timed_out, 1);
        assert!(table.is_empty());

        let err = promise.await.expect_err("timed out");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_send_failed_entry_is_discarded_not_timed_out() {
        let table = PendingTable::new();
        let (id, promise) = register(&table, 0);

        let resolver = table.mark_send_failed(id).expect("resolver handed back");
        resolver.reject(Error::send_failed("refused"));
        assert_eq!(table.len(), 1);

        let outcome = table.sweep(vec![Response::success(id, json!(1))], 500, 120, timeout);
        assert_eq!(outcome.discarded, 1);
        assert_eq!(outcome.settled, 0);
        assert_eq!(outcome.timed_out, 0);
        assert!(table.is_empty());

        assert!(matches!(promise.await, Err(Error::SendFailed { .. })));
    }

    #[tokio::test]
    async fn test_fail_all_rejects_everything() {
        let table = PendingTable::new();
        let (_a, first) = register(&table, 0);
        let (_b, second) = register(&table, 0);

        table.fail_all(|| Error::ConnectionClosed);

        assert!(table.is_empty());
        assert!(matches!(first.await, Err(Error::ConnectionClosed)));
        assert!(matches!(second.await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_fail_and_take() {
        let table = PendingTable::new();
        let (id, promise) = register(&table, 0);

        assert!(table.fail(id, timeout(id)));
        assert!(!table.fail(id, timeout(id)));
        assert!(promise.await.expect_err("rejected").is_timeout());

        let (other, _promise) = register(&table, 0);
        assert!(table.take(other).is_some());
        assert!(table.take(other).is_none());
    }
}
