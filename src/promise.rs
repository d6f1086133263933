//! Single-resolution asynchronous results.
//!
//! Every operation of the bridge returns a [`Promise`]. A promise can be
//! consumed in two ways:
//!
//! - **Awaited**: `Promise<T>` is a `Future<Output = Result<T>>`.
//! - **Detached with callbacks**: register [`Promise::on_success`] and
//!   [`Promise::on_error`], then call [`Promise::detach`]. The callbacks run
//!   on a spawned task once the promise settles.
//!
//! # Single-consumer contract
//!
//! A promise has one success slot and one error slot. Registering a second
//! handler replaces the first; handlers are not multicast.
//!
//! # Error fallback
//!
//! When a detached promise fails and no error handler is registered, the
//! client's default error handler runs. Without one the failure is logged
//! and returned from the detached task's `JoinHandle`.
//!
//! # Callback scope
//!
//! Hosts with a UI refresh cycle attach a [`CallbackScope`]. Callbacks then
//! run inside that cycle: directly when one is already in progress,
//! otherwise wrapped in [`CallbackScope::apply`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the value of a fulfilled promise.
pub type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;

/// Callback invoked with the error of a rejected promise.
pub type ErrorCallback = Box<dyn FnOnce(Error) + Send>;

/// Process-wide fallback for errors nobody handled.
pub type DefaultErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

// ============================================================================
// CallbackScope
// ============================================================================

/// A UI refresh scheduler that callbacks must run inside.
pub trait CallbackScope: Send + Sync {
    /// Returns `true` while an update cycle is in progress.
    fn is_updating(&self) -> bool;

    /// Runs `callback` inside a new update cycle.
    fn apply(&self, callback: Box<dyn FnOnce() + Send>);
}

// ============================================================================
// PromiseHooks
// ============================================================================

/// Client-wide settings every promise inherits.
#[derive(Clone, Default)]
pub struct PromiseHooks {
    /// Fallback for unhandled errors.
    pub default_error: Option<DefaultErrorHandler>,
    /// UI scope callbacks run in.
    pub scope: Option<Arc<dyn CallbackScope>>,
}

impl PromiseHooks {
    /// Runs a callback in the configured scope, if any.
    pub(crate) fn run(&self, callback: impl FnOnce() + Send + 'static) {
        match &self.scope {
            Some(scope) if !scope.is_updating() => scope.apply(Box::new(callback)),
            _ => callback(),
        }
    }
}

impl fmt::Debug for PromiseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseHooks")
            .field("default_error", &self.default_error.is_some())
            .field("scope", &self.scope.is_some())
            .finish()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// The settling half of a promise.
///
/// Consumed on use, so a promise settles at most once.
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T: Send + 'static> Resolver<T> {
    /// Fulfils the promise.
    ///
    /// Returns `false` if the promise was already dropped.
    #[inline]
    pub fn resolve(self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise.
    ///
    /// Returns `false` if the promise was already dropped.
    #[inline]
    pub fn reject(self, error: Error) -> bool {
        self.settle(Err(error))
    }

    /// Settles the promise with a result.
    #[inline]
    pub fn settle(self, result: Result<T>) -> bool {
        self.tx.send(result).is_ok()
    }

    /// Settles the promise after `delay`.
    ///
    /// A zero delay settles immediately. Must be called inside a tokio runtime
    /// otherwise.
    pub fn settle_after(self, delay: Duration, result: Result<T>) {
        if delay.is_zero() {
            self.settle(result);
            return;
        }

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            self.settle(result);
        });
    }

    /// Returns `true` if nobody is waiting on the promise anymore.
    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

// ============================================================================
// Promise
// ============================================================================

/// A result that becomes available later, exactly once.
#[must_use = "a promise does nothing with its result unless awaited or detached"]
pub struct Promise<T> {
    inner: BoxFuture<'static, Result<T>>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
    hooks: PromiseHooks,
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Promise - Constructors
// ============================================================================

impl<T: Send + 'static> Promise<T> {
    /// Creates an unsettled promise and its resolver.
    pub fn channel() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        let inner = async move { rx.await? }.boxed();
        (Resolver { tx }, Self::from_boxed(inner))
    }

    /// Creates an already settled promise.
    pub fn ready(result: Result<T>) -> Self {
        Self::from_boxed(future::ready(result).boxed())
    }

    /// Runs `fut` on a spawned task and settles with its output.
    ///
    /// The work starts immediately, whether or not the promise is consumed.
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (resolver, promise) = Self::channel();
        tokio::spawn(async move {
            resolver.settle(fut.await);
        });
        promise
    }

    fn from_boxed(inner: BoxFuture<'static, Result<T>>) -> Self {
        Self {
            inner,
            on_success: None,
            on_error: None,
            hooks: PromiseHooks::default(),
        }
    }
}

// ============================================================================
// Promise - Composition
// ============================================================================

impl<T: Send + 'static> Promise<T> {
    /// Attaches client-wide hooks.
    pub fn with_hooks(mut self, hooks: PromiseHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Registers the success callback, replacing any previous one.
    pub fn on_success(mut self, callback: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Registers the error callback, replacing any previous one.
    pub fn on_error(mut self, callback: impl FnOnce(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Transforms the fulfilled value.
    ///
    /// Hooks carry over; callbacks registered on `self` do not.
    pub fn map<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(f(value)))
    }

    /// Transforms the fulfilled value with a fallible function.
    ///
    /// Hooks carry over; callbacks registered on `self` do not.
    pub fn and_then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let inner = self.inner;
        Promise::from_boxed(async move { inner.await.and_then(f) }.boxed()).with_hooks(self.hooks)
    }

    /// Drives the promise on a spawned task and dispatches the callbacks.
    ///
    /// The handle yields `Err` only for an error that no callback handled.
    pub fn detach(self) -> JoinHandle<Result<()>> {
        let Self {
            inner,
            on_success,
            on_error,
            hooks,
        } = self;

        tokio::spawn(async move {
            match inner.await {
                Ok(value) => {
                    match on_success {
                        Some(callback) => hooks.run(move || callback(value)),
                        None => debug!("Success ignored (no callback registered)"),
                    }
                    Ok(())
                }
                Err(err) => {
                    if let Some(callback) = on_error {
                        hooks.run(move || callback(err));
                        Ok(())
                    } else if let Some(handler) = hooks.default_error.clone() {
                        hooks.run(move || handler(err));
                        Ok(())
                    } else {
                        error!(origin = err.origin(), error = %err, "Unhandled PKI error");
                        Err(err)
                    }
                }
            }
        })
    }
}

// ============================================================================
// Promise - Future
// ============================================================================

impl<T> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_await_resolved_value() {
        let (resolver, promise) = Promise::channel();
        assert!(resolver.resolve(42));
        assert_eq!(promise.await.expect("resolved"), 42);
    }

    #[tokio::test]
    async fn test_pending_until_settled() {
        let (resolver, promise) = Promise::<&str>::channel();
        let mut task = tokio_test::task::spawn(promise);

        assert_pending!(task.poll());
        resolver.resolve("done");
        assert!(task.is_woken());

        let result = assert_ready!(task.poll());
        assert_eq!(result.expect("resolved"), "done");
    }

    #[tokio::test]
    async fn test_dropped_resolver_closes_channel() {
        let (resolver, promise) = Promise::<u8>::channel();
        drop(resolver);
        assert!(matches!(promise.await, Err(Error::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn test_resolver_detects_abandoned_promise() {
        let (resolver, promise) = Promise::<u8>::channel();
        drop(promise);
        assert!(resolver.is_abandoned());
        assert!(!resolver.resolve(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_after_delay() {
        let (resolver, promise) = Promise::channel();
        resolver.settle_after(Duration::from_millis(200), Ok("late"));

        let mut task = tokio_test::task::spawn(promise);
        assert_pending!(task.poll());

        tokio::time::sleep(Duration::from_millis(199)).await;
        assert_pending!(task.poll());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let result = assert_ready!(task.poll());
        assert_eq!(result.expect("resolved"), "late");
    }

    #[tokio::test]
    async fn test_map_and_then() {
        let doubled = Promise::ready(Ok(21)).map(|v| v * 2);
        assert_eq!(doubled.await.expect("mapped"), 42);

        let failed = Promise::ready(Ok(1)).and_then(|_| Err::<u8, _>(Error::AddonNotDetected));
        assert!(matches!(failed.await, Err(Error::AddonNotDetected)));
    }

    #[tokio::test]
    async fn test_last_registered_success_callback_wins() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));

        let first_flag = Arc::clone(&first);
        let second_flag = Arc::clone(&second);
        Promise::ready(Ok(()))
            .on_success(move |()| first_flag.store(true, Ordering::SeqCst))
            .on_success(move |()| second_flag.store(true, Ordering::SeqCst))
            .detach()
            .await
            .expect("join")
            .expect("handled");

        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_callback_receives_error() {
        let origin = Arc::new(Mutex::new(String::new()));
        let captured = Arc::clone(&origin);

        Promise::<()>::ready(Err(Error::component("msg", "detail", "native")))
            .on_error(move |err| *captured.lock() = err.origin().to_string())
            .detach()
            .await
            .expect("join")
            .expect("handled");

        assert_eq!(*origin.lock(), "native");
    }

    #[tokio::test]
    async fn test_default_error_handler_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hooks = PromiseHooks {
            default_error: Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            scope: None,
        };

        Promise::<()>::ready(Err(Error::BrowserNotSupported))
            .with_hooks(hooks)
            .detach()
            .await
            .expect("join")
            .expect("handled by default");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unhandled_error_is_hard_failure() {
        let result = Promise::<()>::ready(Err(Error::BrowserNotSupported))
            .detach()
            .await
            .expect("join");

        assert!(matches!(result, Err(Error::BrowserNotSupported)));
    }

    struct RecordingScope {
        updating: AtomicBool,
        applied: AtomicUsize,
    }

    impl CallbackScope for RecordingScope {
        fn is_updating(&self) -> bool {
            self.updating.load(Ordering::SeqCst)
        }

        fn apply(&self, callback: Box<dyn FnOnce() + Send>) {
            self.applied.fetch_add(1, Ordering::SeqCst);
            callback();
        }
    }

    #[tokio::test]
    async fn test_callbacks_run_inside_scope() {
        let scope = Arc::new(RecordingScope {
            updating: AtomicBool::new(false),
            applied: AtomicUsize::new(0),
        });
        let hooks = PromiseHooks {
            default_error: None,
            scope: Some(scope.clone()),
        };

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        Promise::ready(Ok(()))
            .with_hooks(hooks.clone())
            .on_success(move |()| flag.store(true, Ordering::SeqCst))
            .detach()
            .await
            .expect("join")
            .expect("handled");

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(scope.applied.load(Ordering::SeqCst), 1);

        // Already inside a cycle: run directly.
        scope.updating.store(true, Ordering::SeqCst);
        Promise::ready(Ok(()))
            .with_hooks(hooks)
            .on_success(|()| {})
            .detach()
            .await
            .expect("join")
            .expect("handled");

        assert_eq!(scope.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_runs_eagerly() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let promise = Promise::spawn(async move {
            flag.store(true, Ordering::SeqCst);
            let _ = gate_tx.send(());
            Ok(7)
        });

        gate_rx.await.expect("task ran without being polled");
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(promise.await.expect("resolved"), 7);
    }
}
