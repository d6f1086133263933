//! Request and Response envelopes.
//!
//! Defines the message format exchanged with the PKI component, whatever
//! the transport carrying it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Command;

// ============================================================================
// License
// ============================================================================

/// License forwarded with every command.
///
/// The component validates it against the page's domain; the bridge only
/// passes it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum License {
    /// Binary license encoded in Base64.
    Binary(String),
    /// JSON license (`format`, `allowedDomains`, `expiration`, `signature`).
    Json(Value),
}

impl From<String> for License {
    fn from(value: String) -> Self {
        Self::Binary(value)
    }
}

impl From<&str> for License {
    fn from(value: &str) -> Self {
        Self::Binary(value.to_string())
    }
}

impl From<Value> for License {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Binary(s),
            other => Self::Json(other),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// A command envelope sent to the component.
///
/// # Format
///
/// ```json
/// {
///   "requestId": "uuid",
///   "license": "..." | { ... } | null,
///   "command": "signData",
///   "request": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    #[serde(rename = "requestId")]
    pub id: RequestId,

    /// License blob, `null` when none is configured.
    pub license: Option<License>,

    /// Command with name and payload.
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(command: Command, license: Option<License>) -> Self {
        Self {
            id: RequestId::generate(),
            license,
            command,
        }
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, command: Command, license: Option<License>) -> Self {
        Self {
            id,
            license,
            command,
        }
    }

    /// Serializes the envelope to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response envelope from the component.
///
/// # Format
///
/// Success:
/// ```json
/// { "requestId": "uuid", "success": true, "response": ... }
/// ```
///
/// Error:
/// ```json
/// {
///   "requestId": "uuid",
///   "success": false,
///   "exception": { "message": "...", "complete": "...", "origin": "..." }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request `requestId`.
    #[serde(rename = "requestId")]
    pub id: RequestId,

    /// Whether the command succeeded.
    pub success: bool,

    /// Result payload (if success).
    #[serde(default)]
    pub response: Option<Value>,

    /// Error details (if not success).
    #[serde(default)]
    pub exception: Option<Exception>,
}

impl Response {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: RequestId, response: Value) -> Self {
        Self {
            id,
            success: true,
            response: Some(response),
            exception: None,
        }
    }

    /// Builds a failure response.
    #[must_use]
    pub fn failure(id: RequestId, exception: Exception) -> Self {
        Self {
            id,
            success: false,
            response: None,
            exception: Some(exception),
        }
    }

    /// Extracts the payload, converting a failure into [`Error::Component`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Component`] if the component reported an exception.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.response.unwrap_or(Value::Null));
        }

        let exception = self.exception.unwrap_or_default();
        Err(Error::component(
            exception.message,
            exception.complete,
            exception.origin,
        ))
    }
}

// ============================================================================
// Exception
// ============================================================================

/// Structured error reported by the component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    /// User-friendly message.
    #[serde(default)]
    pub message: String,

    /// Complete diagnostic text.
    #[serde(default)]
    pub complete: String,

    /// Where the error originated.
    #[serde(default)]
    pub origin: String,
}

impl Exception {
    /// Creates an exception.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        complete: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            complete: complete.into(),
            origin: origin.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
