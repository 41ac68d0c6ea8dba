// RailCheck Exporter - HTTP and Prometheus exporter for inspection runs
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # RailCheck Exporter
//!
//! Serves the KPIs of a persisted inspection run as JSON and Prometheus
//! metrics.
//!
//! ## Usage
//!
//! ```bash
//! # Serve an existing run
//! railcheck-exporter --csv data/raw/mesures_ufm160.csv
//!
//! # Simulate a fresh one-hour run first, reproducibly
//! railcheck-exporter --generate --duration-hours 1.0 --seed 42 --port 9100
//! ```

mod api;
mod metrics;

use api::AppState;
use axum::{routing::get, Router};
use clap::Parser;
use railcheck::{generate_run, write_run, GeneratorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// RailCheck exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Run file to serve
    #[arg(short, long, default_value = "data/raw/mesures_ufm160.csv")]
    csv: PathBuf,

    /// Simulate a run and write it to --csv before serving
    #[arg(short, long)]
    generate: bool,

    /// Duration of the simulated run in hours
    #[arg(long, default_value = "0.1")]
    duration_hours: f64,

    /// Train speed of the simulated run in km/h
    #[arg(short, long, default_value = "140.0")]
    speed: f64,

    /// Probability of a defect on each simulated sample
    #[arg(long, default_value = "0.04")]
    anomaly_rate: f64,

    /// Seed for a reproducible simulated run
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn generator_config(&self) -> GeneratorConfig {
        let config = GeneratorConfig::new()
            .with_duration_hours(self.duration_hours)
            .with_speed_kmh(self.speed)
            .with_anomaly_rate(self.anomaly_rate);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::root_handler))
        .route("/stats", get(api::stats_handler))
        .route("/anomalies", get(api::anomalies_handler))
        .route("/anomalies/positions", get(api::positions_handler))
        .route("/hauteurs", get(api::heights_handler))
        .route("/hauteurs/apercu", get(api::preview_handler))
        .route("/metrics", get(api::metrics_handler))
        .route("/health", get(api::health_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("RailCheck Exporter v{}", env!("CARGO_PKG_VERSION"));

    if args.generate {
        let config = args.generator_config();
        let path = args.csv.clone();
        let written = tokio::task::spawn_blocking(move || {
            let records = generate_run(&config)?;
            write_run(&path, &records)
        })
        .await??;
        info!("Simulated run written: {} records to {}", written, args.csv.display());
    } else if !args.csv.exists() {
        warn!(
            "Run file {} does not exist yet, endpoints will answer 503",
            args.csv.display()
        );
    }

    let state = Arc::new(AppState::new(args.csv.clone()));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["railcheck-exporter"]);
        assert_eq!(args.port, 5000);
        assert!(!args.generate);
        assert_eq!(args.generator_config(), GeneratorConfig::new());
    }

    #[test]
    fn test_args_generator_config() {
        let args = Args::parse_from([
            "railcheck-exporter",
            "--generate",
            "--duration-hours",
            "0.5",
            "--speed",
            "160",
            "--anomaly-rate",
            "0.1",
            "--seed",
            "42",
        ]);
        let config = args.generator_config();
        assert_eq!(config.duration_hours, 0.5);
        assert_eq!(config.speed_kmh, 160.0);
        assert_eq!(config.anomaly_rate, 0.1);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_router_builds() {
        let _app = router(Arc::new(AppState::new("mesures.csv")));
    }
}
