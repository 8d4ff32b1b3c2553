//! solar-web - web UI for the solar panel detector
//!
//! This daemon:
//! 1. Loads configuration and the detector model once
//! 2. Serves the UI and JSON API
//! 3. Stops on Ctrl-C

use anyhow::{anyhow, Context, Result};
use std::sync::mpsc;

use solar_detector::{
    api::{ApiConfig, ApiServer},
    config::AppConfig,
    load_backend, DetectionService,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    log::info!(
        "loading {} detector from {}",
        config.detector.backend,
        config.detector.model_path.display()
    );
    let backend = load_backend(&config.detector)?;
    backend.warm_up().context("detector warm-up failed")?;

    let service = DetectionService::from_config(&config, backend)?;
    if !service.has_default_api_key() {
        log::warn!(
            "no Google Maps API key configured (GOOGLE_MAPS_API_KEY or {}); address lookups need a key per request",
            config.secret_path.display()
        );
    }
    let api_config = ApiConfig {
        addr: config.server_addr.clone(),
        samples_dir: config.samples_dir.clone(),
    };
    let api_handle = ApiServer::new(api_config, service).spawn()?;
    log::info!("solar-web listening on http://{}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("solar-web waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping web server...");
    api_handle.stop()?;

    Ok(())
}
