//! PKI client entry point.
//!
//! The [`PkiClient`] owns the selected transport plus the client-wide
//! settings every command needs (license, install page brand, error
//! fallback).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pki_bridge::transport::DocumentBridge;
//! use pki_bridge::{InitOptions, PkiClient};
//!
//! # async fn example(document: Arc<dyn DocumentBridge>) -> pki_bridge::Result<()> {
//! let pki = PkiClient::builder().document(document).build()?;
//!
//! let status = pki.init(InitOptions::new()).await?;
//! if status.is_installed() {
//!     let version = pki.get_version().await?;
//!     println!("Component version: {version}");
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::promise::{Promise, PromiseHooks};
use crate::protocol::{Command, License, Request};
use crate::transport::{ResponseProcessor, Transport, TransportKind};

use super::builder::ClientBuilder;
use super::environment::Navigator;

// ============================================================================
// Types
// ============================================================================

/// Client-wide settings validated by the builder.
pub(crate) struct ClientConfig {
    /// License forwarded with every command.
    pub license: Option<License>,
    /// Install page brand suffix.
    pub brand: Option<String>,
    /// REST PKI endpoint for `signWithRestPki`.
    pub rest_pki_url: Option<String>,
    /// Page location.
    pub navigator: Option<Arc<dyn Navigator>>,
    /// Hooks attached to every returned promise.
    pub hooks: PromiseHooks,
}

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Selected transport.
    pub transport: Arc<dyn Transport>,
    /// Validated settings.
    pub config: ClientConfig,
}

// ============================================================================
// PkiClient
// ============================================================================

/// Entry point to the PKI component.
///
/// Cloning is cheap; clones share the transport and settings.
#[derive(Clone)]
pub struct PkiClient {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for PkiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkiClient")
            .field("transport", &self.transport_kind())
            .field("brand", &self.inner.config.brand)
            .field("hooks", &self.inner.config.hooks)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PkiClient - Public API
// ============================================================================

impl PkiClient {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns the transport selected for this host.
    #[inline]
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// Returns the configured license.
    #[inline]
    #[must_use]
    pub fn license(&self) -> Option<&License> {
        self.inner.config.license.as_ref()
    }

    /// Returns the install page brand.
    #[inline]
    #[must_use]
    pub fn brand(&self) -> Option<&str> {
        self.inner.config.brand.as_deref()
    }

    /// Returns the REST PKI endpoint.
    #[inline]
    #[must_use]
    pub fn rest_pki_url(&self) -> Option<&str> {
        self.inner.config.rest_pki_url.as_deref()
    }
}

// ============================================================================
// PkiClient - Internal
// ============================================================================

impl PkiClient {
    /// Wraps a transport and validated settings.
    pub(crate) fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner { transport, config }),
        }
    }

    /// Returns the hooks attached to every promise.
    #[inline]
    pub(crate) fn hooks(&self) -> PromiseHooks {
        self.inner.config.hooks.clone()
    }

    /// Returns the page location, if configured.
    #[inline]
    pub(crate) fn navigator(&self) -> Option<&Arc<dyn Navigator>> {
        self.inner.config.navigator.as_ref()
    }

    /// Sends a command and returns its raw payload.
    pub(crate) fn send_raw(
        &self,
        command: Command,
        processor: Option<ResponseProcessor>,
    ) -> Promise<Value> {
        let request = Request::new(command, self.inner.config.license.clone());
        self.inner
            .transport
            .send(request, processor)
            .with_hooks(self.hooks())
    }

    /// Sends a command and decodes its payload.
    pub(crate) fn send<T>(&self, command: Command) -> Promise<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.send_raw(command, None)
            .and_then(|value| Ok(serde_json::from_value(value)?))
    }
}
