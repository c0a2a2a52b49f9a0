//! snapkv - A Small In-Memory Key-Value Server with RDB Snapshots
//!
//! This is the main entry point for the snapkv server.
//! It restores the last snapshot, sets up the TCP listener, and hands
//! incoming connections to their own tasks.

use clap::Parser;
use snapkv::commands::CommandHandler;
use snapkv::config::Config;
use snapkv::connection::{handle_connection, ConnectionStats};
use snapkv::snapshot::load_snapshot;
use snapkv::storage::{start_expiry_sweeper, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Arc::new(Config::parse());

    // Set up logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = snapkv::VERSION, "Starting snapkv");

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    let snapshot_path = config.snapshot_path();
    load_snapshot(&storage, &snapshot_path);

    // Start the background expiry sweeper
    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        address = %config.bind_address(),
        snapshot = %snapshot_path.display(),
        "Ready to accept connections"
    );

    // Main accept loop, until Ctrl+C
    tokio::select! {
        _ = accept_loop(listener, storage, Arc::clone(&config), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    config: Arc<Config>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                // Create a command handler for this connection
                let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
