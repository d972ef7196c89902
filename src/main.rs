//! linekv server entry point.
//!
//! Sets up logging, the shared storage engine, the expiry sweeper and the
//! TCP accept loop.

use bytes::Bytes;
use linekv::commands::CommandHandler;
use linekv::config::{CliAction, Config};
use linekv::connection::{handle_connection, ConnectionStats};
use linekv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
linekv - A small in-memory key-value server

USAGE:
    linekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>              Port to listen on (default: 6379)
        --sweep-interval-ms <MS>   Time between expiry sweeps (default: 10000)
        --prompt <TEXT>            Prompt written before each command (default: "linekv> ")
    -v, --version                  Print version information
        --help                     Print this help message

CONNECTING:
    Any line-based TCP client works:
    $ nc 127.0.0.1 6379
    linekv> SET name Ariz EX 60
    OK
    linekv> GET name
    Ariz
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args() {
        Ok(CliAction::Serve(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("linekv version {}", linekv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // One store for the whole process, shared by every session and the sweeper
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    let _sweeper = ExpirySweeper::start(
        Arc::clone(&storage),
        ExpiryConfig {
            interval: config.sweep_interval,
        },
    );

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        version = linekv::VERSION,
        "Listening on {}",
        config.bind_address()
    );

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    let prompt = Bytes::from(config.prompt.clone());

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats), prompt) => {}
        _ = shutdown => {}
    }

    let store = storage.stats();
    let conns = stats.snapshot();
    info!(
        keys = store.keys,
        get_ops = store.get_ops,
        set_ops = store.set_ops,
        expired = store.expired,
        connections = conns.connections_accepted,
        active = conns.active_connections,
        commands = conns.commands_processed,
        bytes_read = conns.bytes_read,
        bytes_written = conns.bytes_written,
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    prompt: Bytes,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);
                let prompt = prompt.clone();

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats, prompt).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
