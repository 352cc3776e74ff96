use anyhow::{Context, Result};
use facewatch_core::{FaceDetector, LbphTrainer, RecognitionService, ScrfdDetector};
use std::future::Future;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(?config, "facewatchd starting");

    // One detector session per engine thread; the first also scans the gallery.
    let mut detectors: Vec<Box<dyn FaceDetector>> = Vec::with_capacity(config.engine_workers);
    for _ in 0..config.engine_workers {
        let detector = ScrfdDetector::load_from_dir(&config.model_dir)
            .with_context(|| format!("loading face detector from {}", config.model_dir.display()))?;
        detectors.push(Box::new(detector));
    }

    let detector_name = detectors[0].name().to_string();
    let gallery = facewatch_core::build_gallery(&config.gallery_dir, detectors[0].as_mut())
        .context("building gallery")?;

    let service = RecognitionService::build(gallery, &LbphTrainer::default(), &detector_name)
        .context("training recognizer on the enrolled gallery; refusing to start without it")?;
    let service = Arc::new(service);

    let engine = engine::spawn_engine(detectors, Arc::clone(&service)).context("starting engine")?;
    tracing::info!(
        workers = engine.workers(),
        known_faces = service.known_faces(),
        model = %service.model_description(),
        "engine ready"
    );

    let app = http::create_router(http::AppState { engine, service }, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "facewatchd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(tokio::signal::ctrl_c()))
        .await
        .context("serving HTTP")?;

    tracing::info!("facewatchd shutting down");
    Ok(())
}

/// Resolves when `signal` fires, or as soon as it fails.
async fn wait_for_shutdown(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal; shutting down");
    }
}
