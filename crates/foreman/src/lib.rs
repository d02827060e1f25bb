// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Foreman: a supervisor for long-running AI coding-assistant sessions,
//! each running inside a persistent multiplexer pane, with Ralph-loop
//! respawn, structured progress parsing, and scheduled unattended runs.

pub mod bounded;
pub mod config;
pub mod error;
pub mod event;
pub mod multiplexer;
pub mod parsers;
pub mod progress;
pub mod respawn;
pub mod scheduled_run;
pub mod session;
pub mod supervisor;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use config::{Config, MultiplexerKind};
use multiplexer::native::NativeAdapter;
use multiplexer::tmux::TmuxAdapter;
use multiplexer::MultiplexerAdapter;
use supervisor::Supervisor;

/// Run the foreman server until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let adapter: Arc<dyn MultiplexerAdapter> = match config.multiplexer_kind()? {
        MultiplexerKind::Tmux => Arc::new(TmuxAdapter::new(config.tmux_bin.clone())),
        MultiplexerKind::Native => Arc::new(NativeAdapter::new()),
    };

    let supervisor = Arc::new(Supervisor::new(&config, adapter));
    supervisor.reconcile().await?;

    spawn_signal_handler(shutdown.clone());

    let router = transport::build_router(Arc::clone(&supervisor));
    let listener = TcpListener::bind(&addr).await?;
    info!("foreman listening on {addr}");

    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    info!("shutting down, stopping every session");
    supervisor.shutdown().await?;
    Ok(())
}

/// First SIGTERM/SIGINT triggers graceful shutdown; a second forces exit.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                error!("received signal again, forcing exit");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                error!("received signal again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}
