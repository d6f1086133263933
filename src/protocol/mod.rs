//! Component protocol message types.
//!
//! This module defines the envelopes exchanged between the bridge and the
//! PKI component. Both transports that reach a real component (extension
//! events and add-on polling) carry exactly these JSON documents.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Bridge → Component | Command with license and payload |
//! | `Response` | Component → Bridge | Result or exception, keyed by `requestId` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command names and payloads |
//! | `request` | Request and Response envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Command names and payloads.
pub mod command;

/// Request and Response envelopes.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use request::{Exception, License, Request, Response};
