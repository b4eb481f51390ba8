//! Chest X-ray Triage Inference Service - Main Entry Point
//!
//! Loads the classifier checkpoint once, then serves predictions over HTTP
//! until the process exits.

use anyhow::{Context, Result};
use cxr_triage::{config::LoggingConfig, server, AppConfig, ModelLoader, PredictionPipeline};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    info!("Starting CXR Triage Inference Service");

    // Load the model; any failure here aborts startup
    let loader = ModelLoader::from_config(&config.model)
        .context("Failed to initialize model loader")?;
    let model = loader.load().context("Failed to load model checkpoint")?;

    let pipeline = Arc::new(PredictionPipeline::new(Box::new(model)));
    let app = server::router(pipeline, config.server.body_limit_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, "Listening for prediction requests");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize the tracing subscriber from logging configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
