//! PKI client module.
//!
//! This module provides the main entry point to the PKI component.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PkiClient`] | Sends commands through the selected transport |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`InitOptions`] | Callbacks for the install check |
//! | [`DetectedBrowser`] | User-agent sniffing and transport selection |
//! | [`Navigator`] | Page location used for URLs and redirects |
//!
//! # Example
//!
//! ```no_run
//! use pki_bridge::{CertificateFilter, PkiClient, Result};
//!
//! # async fn example(pki: PkiClient) -> Result<()> {
//! let certs = pki
//!     .list_certificates(Some(CertificateFilter::IsWithinValidity))
//!     .await?;
//!
//! if let Some(cert) = certs.first() {
//!     let signature = pki
//!         .sign_data_bytes(&cert.thumbprint, b"hello", "SHA-256")
//!         .await?;
//!     println!("Signature: {signature}");
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Host environment detection.
pub mod environment;

/// Component operations.
pub mod operations;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::PkiClient;
pub use environment::{DetectedBrowser, Navigator};
pub use operations::InitOptions;
