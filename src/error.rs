//! Error types for the PKI bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use pki_bridge::{PkiClient, Result};
//!
//! async fn example(pki: &PkiClient) -> Result<()> {
//!     let certs = pki.list_certificates(None).await?;
//!     let signature = pki.sign_hash(&certs[0].thumbprint, "...", "SHA-256").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Component | [`Error::Component`] |
//! | Helper | [`Error::SendFailed`], [`Error::AddonNotDetected`], [`Error::BrowserNotSupported`], [`Error::RequestTimeout`] |
//! | Relay | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |
//!
//! # Message, detail, origin
//!
//! Every error answers the three questions the component's own errors
//! answer: a user-facing [`Error::message`], a diagnostic
//! [`Error::detail`] and an [`Error::origin`] label. Errors raised by this
//! crate rather than the component carry the [`HELPER_ORIGIN`] label.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Origin label for errors raised on this side of the bridge.
pub const HELPER_ORIGIN: &str = "helper";

/// User-facing message of a timed-out command.
const TIMEOUT_MESSAGE: &str = "The operation has timed out";

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Component Errors
    // ========================================================================
    /// Exception reported by the PKI component itself.
    ///
    /// The three fields are passed through verbatim.
    #[error("Component error from {origin}: {message}")]
    Component {
        /// User-friendly message.
        message: String,
        /// Complete diagnostic text (stack trace or similar).
        detail: String,
        /// Where inside the component the error originated.
        origin: String,
    },

    // ========================================================================
    // Helper Errors
    // ========================================================================
    /// The command could not be handed over to the add-on.
    #[error("Failed to send command to add-on: {detail}")]
    SendFailed {
        /// Why the hand-over failed.
        detail: String,
    },

    /// No add-on is attached to the host.
    #[error("Add-on not detected")]
    AddonNotDetected,

    /// The host offers no way to reach the component.
    #[error("Browser not supported")]
    BrowserNotSupported,

    /// No response arrived within the command budget.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Relay Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout waiting for the page shim.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection or event stream closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Malformed URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The resolver side of a promise was dropped without settling.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a component error from the three exception fields.
    #[inline]
    pub fn component(
        message: impl Into<String>,
        detail: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::Component {
            message: message.into(),
            detail: detail.into(),
            origin: origin.into(),
        }
    }

    /// Creates a send failed error.
    #[inline]
    pub fn send_failed(detail: impl Into<String>) -> Self {
        Self::SendFailed {
            detail: detail.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Accessors
// ============================================================================

impl Error {
    /// Returns a user-friendly message describing the error.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Component { message, .. } => message.clone(),
            Self::SendFailed { .. } => "Failed to send command to add-on".to_string(),
            Self::RequestTimeout { .. } => TIMEOUT_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Returns the most detailed description available.
    ///
    /// Meant for logs, not for end users.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Component { detail, .. } => detail.clone(),
            Self::SendFailed { detail } => detail.clone(),
            Self::RequestTimeout { .. } => TIMEOUT_MESSAGE.to_string(),
            Self::AddonNotDetected | Self::BrowserNotSupported => self.to_string(),
            other => format!("{other:?}"),
        }
    }

    /// Returns the label of the side where the error originated.
    #[must_use]
    pub fn origin(&self) -> &str {
        match self {
            Self::Component { origin, .. } => origin,
            _ => HELPER_ORIGIN,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the component itself reported this error.
    #[inline]
    #[must_use]
    pub fn is_component_error(&self) -> bool {
        matches!(self, Self::Component { .. })
    }

    /// Returns `true` if the command never reached the component.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::SendFailed { .. }
                | Self::AddonNotDetected
                | Self::BrowserNotSupported
                | Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
