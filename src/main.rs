//! aqi-dashboard: HTTP backend for the air-quality dashboard.
//!
//! Serves current weather and AQI through a tiered fallback chain, station
//! history from the durable store, and a live SSE relay of the mirror.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use aqi_dashboard::config::load_config;
use aqi_dashboard::{build_router, AppState};

#[derive(Parser)]
#[command(name = "aqi-dashboard", about = "Air-quality dashboard backend")]
struct Cli {
    /// TOML configuration file; missing means defaults plus environment.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Validate configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aqi_dashboard=info,aqi_scraper=info,store=info,weather_client=info,tower_http=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let cfg = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Config loaded: bind={} stations={} scraper={}",
        cfg.server.bind_addr,
        cfg.stations.len(),
        cfg.scraper.enabled
    );

    if cli.check_config {
        info!("Configuration OK");
        return;
    }

    let bind_addr = cfg.server.bind_addr.clone();
    let state = match AppState::from_config(cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialise services: {}", e);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", bind_addr);

    let app = build_router(state.clone());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await;

    if let Err(e) = served {
        error!("Server error: {}", e);
    }

    state.shutdown().await;
    info!("Shutdown complete");
}
