//! Host probe - one JSON-RPC call against a VDSM host
//!
//! Usage:
//!   host_probe --config-file config/vdsm.json
//!   host_probe --method Host.getStats --log-level debug

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vdsm_network::{generate_id, load_config, Client, Configuration};

#[derive(Parser, Debug)]
#[command(name = "host_probe")]
#[command(about = "Query a VDSM host over JSON-RPC")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config/vdsm.json")]
    config_file: String,

    /// JSON-RPC method to call
    #[arg(short, long, default_value = "Host.getCapabilities")]
    method: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let mut config = Configuration::default();
    load_config(&args.config_file, &mut config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let mut client = Client::new();
    if let Err(e) = client.connect(&config).await {
        if e.is_fatal() {
            error!(category = e.category(), "Unrecoverable error: {}", e);
            std::process::exit(2);
        }
        error!("Failed to connect: {}", e);
        return Err(e.into());
    }

    let reply_to = generate_id();
    client.subscribe(&reply_to).await?;

    let outcome = client.send(&reply_to, &args.method, &Vec::<String>::new()).await;

    if let Err(e) = client.unsubscribe(&reply_to).await {
        error!("Failed to unsubscribe: {}", e);
    }
    client.disconnect().await;

    let result = outcome?;
    info!(method = %args.method, keys = result.len(), "Call succeeded");
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

fn init_logging(args: &Args) {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    // RUST_LOG overrides --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    // Logs go to stderr so stdout carries only the reply
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
