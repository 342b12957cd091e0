// Copyright (c) 2026 Tarjeta Contributors. MIT License.
// See LICENSE for details.

//! # Tarjeta Node
//!
//! Entry point for the `tarjeta-node` binary. Parses CLI arguments,
//! initializes logging, generates the node identity, wires the gossip
//! network into the orchestrator loop, and serves the REST surface and
//! the interactive terminal until interrupted.
//!
//! Startup sequence:
//!
//! 1. Parse CLI args
//! 2. Initialize logging
//! 3. Generate the creator keypair
//! 4. Start the transport (listen, dial initial peers)
//! 5. Start the orchestrator event loop (authors the root block)
//! 6. Start the REST/metrics server and the stdin terminal
//! 7. Await SIGINT/SIGTERM, then tear everything down

mod api;
mod cli;
mod logging;
mod metrics;
mod repl;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use tarjeta_protocol::config::VERSION_STRING;
use tarjeta_protocol::crypto::Keypair;
use tarjeta_protocol::network::{Network, Node, NodeConfig};

use cli::Cli;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = format!(
        "tarjeta_node={level},tarjeta_protocol={level}",
        level = cli.log_level
    );
    logging::init(&filter);

    // Identity is ephemeral: state lives in gossip, not on disk, so a
    // fresh key per run is the whole key-management story.
    let keypair = Keypair::generate();
    tracing::info!(
        public_key = %keypair.public_key(),
        version = VERSION_STRING,
        "starting tarjeta-node"
    );

    // --- Transport ---
    let (network, events) = Network::new();
    if cli.should_listen {
        let bound = network
            .listen(cli.port, cli.backlog)
            .with_context(|| format!("unable to listen on port {}", cli.port))?;
        tracing::info!(port = bound, "accepting peer connections");
    }

    let (peers, bad) = cli.initial_peers();
    for entry in bad {
        tracing::warn!(peer = entry, "ignoring unparsable --connect argument");
    }
    for addr in peers {
        network.connect(addr);
    }

    // --- Node ---
    let node = Arc::new(Node::new(
        keypair,
        NodeConfig {
            port: cli.port,
            version: VERSION_STRING.to_string(),
        },
        network,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = {
        let node = Arc::clone(&node);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { node.run(events, shutdown).await })
    };

    // --- REST / metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("metrics registry")?);
    let state = api::AppState {
        node: Arc::clone(&node),
        metrics: node_metrics,
    };
    let http_listener = tokio::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, cli.http_port))
        .await
        .with_context(|| format!("unable to bind HTTP listener on port {}", cli.http_port))?;
    tracing::info!(port = cli.http_port, "REST surface listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, api::router(state)).await {
            tracing::error!(error = %e, "HTTP server exited");
        }
    });

    // --- Interactive terminal ---
    tokio::spawn(repl::run(Arc::clone(&node), shutdown_rx));

    // --- Shutdown ---
    shutdown_signal().await;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), runner).await;

    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, whichever comes first. On
/// non-Unix platforms only Ctrl+C is wired.
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
