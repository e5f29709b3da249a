//! Entry point: `Config::load` -> `run_with_logger` -> bind the RPC
//! listener and (optionally) the discovery responder -> serve until
//! interrupted. Mirrors `maelstrom-run`'s `Config::new` -> `run_with_logger`
//! -> build service -> run shape, minus the client-side pieces that
//! binary doesn't need.

use anyhow::{Context, Result};
use remote_agent_core::{rpc_server, AgentContext, JobRegistry};
use remote_agent_core::discovery;
use remote_agent_core::plugin::PluginRegistry;
use remote_agent_util::log::run_with_logger;
use remote_agent_util::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info};

fn main() -> Result<()> {
    let config = Config::load()?;

    run_with_logger(config.log_level, || {
        let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
        runtime.block_on(run(config))
    })
}

async fn run(config: Config) -> Result<()> {
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", config.bind_addr))?;
    let bound_addr = listener.local_addr()?;
    info!(addr = %bound_addr, "listening for RPC connections");

    let ctx = Arc::new(AgentContext {
        registry: Arc::new(JobRegistry::new()),
        plugins: Arc::new(PluginRegistry::new()),
        network_timeout: Duration::from_millis(config.network_timeout_ms),
        transfer_accept_timeout: Duration::from_millis(config.transfer_accept_timeout_ms),
    });

    if config.discovery_enabled {
        match UdpSocket::bind(("0.0.0.0", bound_addr.port())).await {
            Ok(socket) => {
                let port = bound_addr.port();
                tokio::spawn(async move {
                    if let Err(err) = discovery::run_responder(socket, port).await {
                        error!(error = %err, "discovery responder exited");
                    }
                });
            }
            Err(err) => {
                error!(error = %err, "failed to bind discovery responder, continuing without it");
            }
        }
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted.context("failed to accept RPC connection")?;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = rpc_server::serve_connection(ctx, stream, peer_addr).await {
                        error!(%peer_addr, error = %err, "RPC connection ended with an error");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down on interrupt");
                return Ok(());
            }
        }
    }
}
