//! Transport for hosts that cannot run the component.

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Error, Result};
use crate::install::{InstallState, InstallStatus};
use crate::promise::Promise;
use crate::protocol::{License, Request};

use super::{ResponseProcessor, Timings, Transport, TransportKind};

/// Transport that fails every command with [`Error::BrowserNotSupported`].
#[derive(Debug, Clone, Default)]
pub struct UnsupportedTransport {
    timings: Timings,
}

impl UnsupportedTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new(timings: Timings) -> Self {
        Self { timings }
    }
}

#[async_trait]
impl Transport for UnsupportedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Unsupported
    }

    fn send(&self, request: Request, _processor: Option<ResponseProcessor>) -> Promise<Value> {
        debug!(command = request.command.name(), "Browser not supported");

        let (resolver, promise) = Promise::channel();
        resolver.settle_after(self.timings.failure_delay, Err(Error::BrowserNotSupported));
        promise
    }

    async fn check_installed(&self, _license: Option<License>) -> Result<InstallStatus> {
        sleep(self.timings.failure_delay).await;
        Ok(InstallStatus::unavailable(
            InstallState::BrowserNotSupported,
            "Your browser is not supported",
        ))
    }
}
