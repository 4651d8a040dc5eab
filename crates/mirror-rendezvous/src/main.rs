//! Remote Mirror rendezvous server entry point.
//!
//! # Usage
//!
//! ```text
//! mirror-rendezvous [OPTIONS]
//!
//! Options:
//!   --bind <IP>     Address to listen on [default: 0.0.0.0]
//!   --port <PORT>   Port to listen on [default: 8765, env: PORT]
//! ```
//!
//! `PORT` follows the convention of hosted platforms that assign the port
//! through the environment.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirror_rendezvous::infrastructure::RendezvousServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote Mirror rendezvous server.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-rendezvous",
    about = "Pairs Remote Mirror devices and viewers by session code",
    version
)]
struct Cli {
    /// IP address to bind.  `0.0.0.0` accepts connections on every interface.
    #[arg(long, default_value = "0.0.0.0", env = "MIRROR_BIND")]
    bind: String,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 8765, env = "PORT")]
    port: u16,
}

impl Cli {
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let addr = cli.bind_addr()?;

    let server = RendezvousServer::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(shutdown_rx).await;
    info!("rendezvous server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
