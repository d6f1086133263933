//! Certificate listing through a page relay.
//!
//! Demonstrates:
//! - Binding a relay server that a page shim connects to
//! - Building a client on top of the relay document bridge
//! - Running the install check and listing valid certificates
//!
//! The page shim connects to the printed `ws://` URL, reports the marker
//! elements of the page, forwards `dispatch` frames as DOM events and sends
//! back the extension's response events.
//!
//! Usage:
//!   cargo run --example relay_demo
//!   cargo run --example relay_demo -- --debug
//!   cargo run --example relay_demo -- --port 9100

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use pki_bridge::transport::RelayServer;
use pki_bridge::{CertificateFilter, InitOptions, PkiClient};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let port = args
            .iter()
            .position(|a| a == "--port")
            .and_then(|i| args.get(i + 1))
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "pki_bridge=debug"
    } else {
        "pki_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let server = RelayServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), args.port).await?;
    println!("Waiting for page shim on {}", server.ws_url());

    let bridge = server.accept().await?;
    println!("Page connected, markers: {:?}", bridge.markers());

    let pki = PkiClient::builder()
        .document(Arc::new(bridge.clone()))
        .default_error(|err| eprintln!("[{}] {}", err.origin(), err.message()))
        .build()?;

    let status = pki
        .init(InitOptions::new().on_not_installed(|status| {
            println!(
                "Component unavailable: {}",
                status.message.unwrap_or_default()
            );
        }))
        .await?;

    if status.is_installed() {
        println!("Component version: {}", pki.get_version().await?);

        let certs = pki
            .list_certificates(Some(CertificateFilter::IsWithinValidity))
            .await?;
        for cert in &certs {
            println!(
                "{}  {}  (valid until {})",
                cert.thumbprint, cert.subject_name, cert.validity_end
            );
        }
        println!("{} valid certificate(s)", certs.len());
    }

    bridge.shutdown();
    Ok(())
}
