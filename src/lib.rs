//! PKI Bridge - Browser-side client for a local PKI signing component.
//!
//! This library lets a web page (or a process acting for one) list the
//! user's certificates and sign data through a locally installed PKI
//! component, whichever way the host can reach it.
//!
//! # Architecture
//!
//! The client follows a request/response model over a host transport:
//!
//! - **Client (Rust)**: Builds command envelopes, correlates replies by ID
//! - **Component (extension or add-on)**: Executes commands, answers once
//!
//! Key design principles:
//!
//! - One transport per client, chosen once from the host's capabilities
//! - Every operation returns a single-resolution [`Promise`]
//! - Responses are matched purely by request ID
//! - Fixed budgets: 5 s install detection, 60 s per command
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pki_bridge::transport::DocumentBridge;
//! use pki_bridge::{InitOptions, PkiClient, Result};
//!
//! # async fn example(document: Arc<dyn DocumentBridge>) -> Result<()> {
//! let pki = PkiClient::builder()
//!     .license("my-license")
//!     .document(document)
//!     .build()?;
//!
//! let status = pki.init(InitOptions::new()).await?;
//! if status.is_installed() {
//!     for cert in pki.list_certificates(None).await? {
//!         println!("{} ({})", cert.subject_name, cert.thumbprint);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`PkiClient`], its builder and host detection |
//! | [`certificate`] | Certificate model, date conversion and filters |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`install`] | Install status and version requirements |
//! | [`promise`] | Single-resolution asynchronous results |
//! | [`protocol`] | Command and response envelopes |
//! | [`transport`] | Extension, add-on and unsupported transports |
//! | [`version`] | Dotted version comparison |

// ============================================================================
// Modules
// ============================================================================

/// Certificate descriptors and filters.
pub mod certificate;

/// PKI client, builder and host environment.
///
/// Use [`PkiClient::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Install status and version requirements.
pub mod install;

/// Single-resolution promises with callback dispatch.
pub mod promise;

/// Command and response envelopes.
pub mod protocol;

/// Host transports.
pub mod transport;

/// Dotted version comparison.
pub mod version;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Certificate types
pub use certificate::{Certificate, CertificateFilter, PkiBrazil, PkiItaly};

// Client types
pub use client::{ClientBuilder, DetectedBrowser, InitOptions, Navigator, PkiClient};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::RequestId;

// Install types
pub use install::{ExtensionState, InstallState, InstallStatus};

// Promise types
pub use promise::{CallbackScope, Promise, Resolver};

// Transport types
pub use transport::{Timings, Transport, TransportKind};
