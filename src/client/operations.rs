//! Component operations exposed by [`PkiClient`].
//!
//! Every operation sends one command and returns a [`Promise`] carrying the
//! client's hooks. The payload shapes follow the component's wire names.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::certificate::{Certificate, CertificateFilter, normalize_listing};
use crate::error::{Error, Result};
use crate::install::{INSTALL_URL, InstallStatus, NATIVE_WIN_REQUIRED_VERSION};
use crate::promise::Promise;
use crate::protocol::Command;
use crate::transport::ResponseProcessor;

use super::core::PkiClient;

// ============================================================================
// InitOptions
// ============================================================================

/// Callbacks for [`PkiClient::init`].
///
/// Without a not-installed callback, `init` sends the page to the install
/// page instead.
#[derive(Default)]
pub struct InitOptions {
    on_ready: Option<Box<dyn FnOnce() + Send>>,
    on_not_installed: Option<Box<dyn FnOnce(InstallStatus) + Send>>,
}

impl InitOptions {
    /// Creates options with no callbacks.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` once the component is ready.
    #[must_use]
    pub fn on_ready(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(callback));
        self
    }

    /// Runs `callback` with the status when the component cannot be used.
    #[must_use]
    pub fn on_not_installed(
        mut self,
        callback: impl FnOnce(InstallStatus) + Send + 'static,
    ) -> Self {
        self.on_not_installed = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOptions")
            .field("on_ready", &self.on_ready.is_some())
            .field("on_not_installed", &self.on_not_installed.is_some())
            .finish()
    }
}

// ============================================================================
// PkiClient - Lifecycle
// ============================================================================

impl PkiClient {
    /// Checks whether the component is installed and reacts to the result.
    ///
    /// - Installed: runs the ready callback.
    /// - Not installed: runs the not-installed callback, or redirects to the
    ///   install page when none is registered.
    ///
    /// The returned promise yields the install status either way.
    pub fn init(&self, options: InitOptions) -> Promise<InstallStatus> {
        let client = self.clone();

        Promise::spawn(async move {
            let license = client.license().cloned();
            let status = client.inner.transport.check_installed(license).await?;
            let hooks = client.hooks();

            debug!(
                transport = %client.transport_kind(),
                state = %status.state,
                "Install check finished"
            );

            if status.is_installed() {
                match options.on_ready {
                    Some(callback) => hooks.run(callback),
                    None => info!("PKI component ready (no callback registered)"),
                }
            } else if let Some(callback) = options.on_not_installed {
                let reported = status.clone();
                hooks.run(move || callback(reported));
            } else {
                match client.redirect_to_install_page() {
                    Ok(url) => info!(%url, "Redirected to install page"),
                    Err(e) => warn!(error = %e, "Cannot redirect to install page"),
                }
            }

            Ok(status)
        })
        .with_hooks(self.hooks())
    }

    /// Returns the component version.
    pub fn get_version(&self) -> Promise<String> {
        self.send(Command::GetVersion)
    }

    /// Asks the extension to poll its native helper.
    pub fn poll_native(&self) -> Promise<Value> {
        self.send(Command::PollNative {
            required_native_win_version: NATIVE_WIN_REQUIRED_VERSION.to_string(),
        })
    }

    /// Triggers the extension self-update.
    pub fn update_extension(&self) -> Promise<Value> {
        self.send(Command::UpdateExtension)
    }
}

// ============================================================================
// PkiClient - Certificates
// ============================================================================

impl PkiClient {
    /// Lists the user's certificates, optionally keeping only those that
    /// pass `filter`.
    ///
    /// Dates are converted before the filter runs.
    pub fn list_certificates(
        &self,
        filter: Option<CertificateFilter>,
    ) -> Promise<Vec<Certificate>> {
        let processor: ResponseProcessor = Box::new(normalize_listing);

        self.send_raw(Command::ListCertificates, Some(processor))
            .and_then(move |payload| {
                let mut certs: Vec<Certificate> = serde_json::from_value(payload)?;
                if let Some(filter) = filter {
                    certs.retain(|cert| filter.matches(cert));
                }
                Ok(certs)
            })
    }

    /// Returns the Base64 encoding of a certificate.
    pub fn read_certificate(&self, thumbprint: impl Into<String>) -> Promise<String> {
        self.send(Command::ReadCertificate {
            certificate_thumbprint: thumbprint.into(),
        })
    }
}

// ============================================================================
// PkiClient - Signing
// ============================================================================

impl PkiClient {
    /// Signs a Base64 digest computed with `digest_algorithm`.
    pub fn sign_hash(
        &self,
        thumbprint: impl Into<String>,
        hash: impl Into<String>,
        digest_algorithm: impl Into<String>,
    ) -> Promise<String> {
        self.send(Command::SignHash {
            certificate_thumbprint: thumbprint.into(),
            hash: hash.into(),
            digest_algorithm: digest_algorithm.into(),
        })
    }

    /// Hashes and signs Base64 data.
    pub fn sign_data(
        &self,
        thumbprint: impl Into<String>,
        data: impl Into<String>,
        digest_algorithm: impl Into<String>,
    ) -> Promise<String> {
        self.send(Command::SignData {
            certificate_thumbprint: thumbprint.into(),
            data: data.into(),
            digest_algorithm: digest_algorithm.into(),
        })
    }

    /// Hashes and signs raw bytes.
    pub fn sign_data_bytes(
        &self,
        thumbprint: impl Into<String>,
        data: &[u8],
        digest_algorithm: impl Into<String>,
    ) -> Promise<String> {
        self.sign_data(thumbprint, STANDARD.encode(data), digest_algorithm)
    }

    /// Completes a REST PKI signature session.
    ///
    /// Uses the client's REST PKI endpoint when one is configured.
    pub fn sign_with_rest_pki(
        &self,
        thumbprint: impl Into<String>,
        token: impl Into<String>,
    ) -> Promise<String> {
        self.send(Command::SignWithRestPki {
            certificate_thumbprint: thumbprint.into(),
            token: token.into(),
            rest_pki_url: self.rest_pki_url().map(str::to_string),
        })
    }

    /// Authorizes `signature_count` signatures with one user confirmation.
    pub fn preauthorize_signatures(
        &self,
        thumbprint: impl Into<String>,
        signature_count: u32,
    ) -> Promise<()> {
        self.send_raw(
            Command::PreauthorizeSignatures {
                certificate_thumbprint: thumbprint.into(),
                signature_count,
            },
            None,
        )
        .map(|_| ())
    }
}

// ============================================================================
// PkiClient - Folders
// ============================================================================

impl PkiClient {
    /// Lets the user pick a folder. Resolves with the folder descriptor.
    pub fn show_folder_browser(&self, message: Option<String>) -> Promise<Value> {
        self.send(Command::ShowFolderBrowser { message })
    }

    /// Downloads `url` into a folder chosen with the folder browser.
    ///
    /// A relative `url` is resolved against the current page, which needs a
    /// navigator.
    pub fn download_to_folder(
        &self,
        url: &str,
        folder_id: impl Into<String>,
        filename: Option<String>,
    ) -> Promise<Value> {
        let url = match self.resolve_url(url) {
            Ok(url) => url,
            Err(e) => return Promise::ready(Err(e)).with_hooks(self.hooks()),
        };

        self.send(Command::DownloadToFolder {
            url: url.into(),
            folder_id: folder_id.into(),
            filename,
        })
    }

    /// Opens a folder in the OS file manager.
    pub fn open_folder(&self, folder_id: impl Into<String>) -> Promise<Value> {
        self.send(Command::OpenFolder(folder_id.into()))
    }

    fn resolve_url(&self, url: &str) -> Result<Url> {
        if url.contains("://") {
            return Ok(Url::parse(url)?);
        }

        let navigator = self.navigator().ok_or_else(|| {
            Error::invalid_argument(format!("relative URL without a page location: {url}"))
        })?;
        Ok(navigator.current_url()?.join(url)?)
    }
}

// ============================================================================
// PkiClient - Install page
// ============================================================================

impl PkiClient {
    /// Returns the install page URL for the current page.
    ///
    /// The brand is appended to the path and the current page is passed as
    /// `returnUrl`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no navigator is configured.
    pub fn install_page_url(&self) -> Result<Url> {
        let current = self
            .navigator()
            .ok_or_else(|| Error::config("install page needs a navigator"))?
            .current_url()?;

        let raw = format!(
            "{INSTALL_URL}{}?returnUrl={}",
            self.brand().unwrap_or_default(),
            urlencoding::encode(current.as_str())
        );
        Ok(Url::parse(&raw)?)
    }

    /// Navigates the page to the install page and returns its URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no navigator is configured, or the
    /// navigator's error.
    pub fn redirect_to_install_page(&self) -> Result<Url> {
        let url = self.install_page_url()?;
        let navigator = self
            .navigator()
            .ok_or_else(|| Error::config("install page needs a navigator"))?;

        navigator.navigate(&url)?;
        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
