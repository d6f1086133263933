//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`PkiClient`]
//! instances.
//!
//! # Transport selection
//!
//! The transport is chosen once, in [`ClientBuilder::build`]:
//!
//! 1. An explicit [`ClientBuilder::transport`] wins.
//! 2. Otherwise a detected browser picks it (`Chrome` → extension, `IE` →
//!    add-on, anything else → unsupported).
//! 3. Otherwise the host capabilities decide: a document bridge means the
//!    extension, an add-on slot means the add-on, neither means unsupported.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pki_bridge::PkiClient;
//! use pki_bridge::transport::DocumentBridge;
//!
//! # fn example(document: Arc<dyn DocumentBridge>) -> pki_bridge::Result<()> {
//! let pki = PkiClient::builder()
//!     .license("AxAAY2FmZ...")
//!     .brand("acme")
//!     .document(document)
//!     .build()?;
//! # let _ = pki;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::promise::{CallbackScope, DefaultErrorHandler, PromiseHooks};
use crate::protocol::License;
use crate::transport::{
    AddonSlot, AddonTransport, DocumentBridge, ExtensionTransport, Timings, Transport,
    TransportKind, UnsupportedTransport,
};

use super::core::{ClientConfig, PkiClient};
use super::environment::{DetectedBrowser, Navigator};

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`PkiClient`] instance.
///
/// Use [`PkiClient::builder()`] to create a new builder.
#[derive(Clone, Default)]
pub struct ClientBuilder {
    /// License forwarded with every command.
    license: Option<License>,
    /// Install page brand suffix.
    brand: Option<String>,
    /// REST PKI endpoint for `signWithRestPki`.
    rest_pki_url: Option<String>,
    /// Fallback for unhandled errors.
    default_error: Option<DefaultErrorHandler>,
    /// UI scope callbacks run in.
    scope: Option<Arc<dyn CallbackScope>>,
    /// Page location.
    navigator: Option<Arc<dyn Navigator>>,
    /// Transport timing knobs.
    timings: Timings,
    /// Explicit transport.
    transport: Option<Arc<dyn Transport>>,
    /// Page document, for the extension transport.
    document: Option<Arc<dyn DocumentBridge>>,
    /// Add-on slot, for the add-on transport.
    addon: Option<AddonSlot>,
    /// Browser the page runs in.
    browser: Option<DetectedBrowser>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("license", &self.license.is_some())
            .field("brand", &self.brand)
            .field("rest_pki_url", &self.rest_pki_url)
            .field("timings", &self.timings)
            .field("transport", &self.transport.as_ref().map(|t| t.kind()))
            .field("document", &self.document.is_some())
            .field("addon", &self.addon)
            .field("browser", &self.browser)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the license sent with every command.
    ///
    /// Accepts a Base64 binary license or a JSON license value.
    #[inline]
    #[must_use]
    pub fn license(mut self, license: impl Into<License>) -> Self {
        self.license = Some(license.into());
        self
    }

    /// Sets the brand appended to the install page URL.
    #[inline]
    #[must_use]
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Sets the REST PKI endpoint used by `sign_with_rest_pki`.
    #[inline]
    #[must_use]
    pub fn rest_pki_url(mut self, url: impl Into<String>) -> Self {
        self.rest_pki_url = Some(url.into());
        self
    }

    /// Sets the handler for errors no promise callback handled.
    #[inline]
    #[must_use]
    pub fn default_error(mut self, handler: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.default_error = Some(Arc::new(handler));
        self
    }

    /// Sets the UI scope callbacks run in.
    #[inline]
    #[must_use]
    pub fn callback_scope(mut self, scope: Arc<dyn CallbackScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Sets the page location.
    #[inline]
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Overrides the transport timings.
    #[inline]
    #[must_use]
    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Uses this transport instead of selecting one.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Provides the page document for the extension transport.
    #[inline]
    #[must_use]
    pub fn document(mut self, document: Arc<dyn DocumentBridge>) -> Self {
        self.document = Some(document);
        self
    }

    /// Provides the slot the host attaches its add-on to.
    #[inline]
    #[must_use]
    pub fn addon(mut self, slot: AddonSlot) -> Self {
        self.addon = Some(slot);
        self
    }

    /// Sets the browser the page runs in.
    #[inline]
    #[must_use]
    pub fn browser(mut self, browser: DetectedBrowser) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Detects the browser from a user-agent string.
    #[inline]
    #[must_use]
    pub fn user_agent(self, ua: &str) -> Self {
        self.browser(DetectedBrowser::from_user_agent(ua))
    }

    /// Builds the client with validation.
    ///
    /// Starts the transport's background task, so it must be called inside
    /// a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the brand or REST PKI URL is malformed
    /// - [`Error::Config`] if the selected transport lacks its host
    ///   capability
    pub fn build(self) -> Result<PkiClient> {
        let brand = self.validate_brand()?;
        let rest_pki_url = self.validate_rest_pki_url()?;
        let transport = self.select_transport()?;

        debug!(transport = %transport.kind(), "PKI client built");

        let config = ClientConfig {
            license: self.license,
            brand,
            rest_pki_url,
            navigator: self.navigator,
            hooks: PromiseHooks {
                default_error: self.default_error,
                scope: self.scope,
            },
        };

        Ok(PkiClient::new(transport, config))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the brand, which becomes a URL path segment.
    fn validate_brand(&self) -> Result<Option<String>> {
        let Some(brand) = &self.brand else {
            return Ok(None);
        };

        let valid = !brand.chars().all(|c| c == '.')
            && brand
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::config(format!(
                "Invalid brand: {brand:?}\n\
                 A brand may only contain letters, digits, '-', '_' and '.', \
                 and may not be made of dots alone."
            )));
        }

        Ok(Some(brand.clone()))
    }

    /// Validates the REST PKI endpoint.
    fn validate_rest_pki_url(&self) -> Result<Option<String>> {
        let Some(raw) = &self.rest_pki_url else {
            return Ok(None);
        };

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid REST PKI URL {raw:?}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "REST PKI URL must use http or https: {raw}"
            )));
        }

        Ok(Some(raw.clone()))
    }

    /// Picks and constructs the transport.
    fn select_transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }

        let kind = match &self.browser {
            Some(browser) => {
                debug!(%browser, "Selecting transport from detected browser");
                browser.transport_kind()
            }
            None if self.document.is_some() => TransportKind::Extension,
            None if self.addon.is_some() => TransportKind::Addon,
            None => TransportKind::Unsupported,
        };

        match kind {
            TransportKind::Extension => {
                let document = self.document.clone().ok_or_else(|| {
                    Error::config(
                        "The extension transport needs a document bridge. Use .document() to set it.",
                    )
                })?;
                Ok(Arc::new(ExtensionTransport::new(document, self.timings)?))
            }
            TransportKind::Addon => {
                let slot = self.addon.clone().ok_or_else(|| {
                    Error::config(
                        "The add-on transport needs an add-on slot. Use .addon() to set it.",
                    )
                })?;
                Ok(Arc::new(AddonTransport::new(slot, self.timings)))
            }
            TransportKind::Unsupported => Ok(Arc::new(UnsupportedTransport::new(self.timings))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
