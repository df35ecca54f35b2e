//! relkv server entry point.
//!
//! Parses flags, sets up logging, starts the expiry sweeper and serves
//! connections until Ctrl+C.

use relkv::connection::{handle_connection, Shared};
use relkv::storage::{start_expiry_sweeper, Db};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Log at debug level unless RUST_LOG says otherwise
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: relkv::DEFAULT_HOST.to_string(),
            port: relkv::DEFAULT_PORT,
            verbose: false,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--verbose" => {
                    config.verbose = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("relkv version {}", relkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn log_filter(&self) -> EnvFilter {
        let default = if self.verbose { "debug" } else { "info" };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    }
}

fn print_help() {
    println!(
        r#"
relkv - A Redis-compatible server over a transactional store

USAGE:
    relkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6379)
        --verbose        Log at debug level (RUST_LOG overrides)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    relkv                          # Start on 127.0.0.1:6379
    relkv --port 6380              # Start on port 6380
    RUST_LOG=relkv=trace relkv     # Trace every parsed command

CONNECTING:
    $ redis-cli -p 6379
    127.0.0.1:6379> ZADD board 10 bob 30 alice
    (integer) 2
    127.0.0.1:6379> ZRANGE board 0 -1 REV
    1) "alice"
    2) "bob"
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(version = relkv::VERSION, "Starting relkv");

    // Shared across all connections
    let db = Arc::new(Db::new());

    let _sweeper = start_expiry_sweeper(Arc::clone(&db));
    info!("Background expiry sweeper started");

    let shared = Shared::new(db);

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, shared.clone()) => {}
        _ = shutdown => {}
    }

    let stats = &shared.stats;
    info!(
        connections = stats.connections_accepted.load(std::sync::atomic::Ordering::Relaxed),
        commands = stats.commands_processed.load(std::sync::atomic::Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts connections forever, one task each.
async fn accept_loop(listener: TcpListener, shared: Shared) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, shared.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
