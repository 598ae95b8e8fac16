// src/main.rs

//! The main entry point for the Pixelgate gateway.

use anyhow::Result;
use pixelgate::config::Config;
use pixelgate::server;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("Pixelgate version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path.
    // It can be provided via a --config flag; otherwise, it defaults to "pixelgate.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("pixelgate.toml");

    // Load the gateway configuration from the determined path. The gateway
    // cannot run without a valid configuration, so a load failure is fatal.
    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    // Override the listen address if provided as a command-line argument.
    if let Some(listen_index) = args.iter().position(|arg| arg == "--listen") {
        if let Some(listen_str) = args.get(listen_index + 1) {
            match listen_str.parse() {
                Ok(addr) => config.server.listen = addr,
                Err(_) => {
                    eprintln!("Invalid listen address: {listen_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--listen flag requires a value");
            std::process::exit(1);
        }
    }

    // Setup logging. The level comes from the config file, overridable
    // with the RUST_LOG environment variable.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(config).await {
        error!("Gateway runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
