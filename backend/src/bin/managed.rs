//! Entry point for managed GPU platforms: the container is only marked ready
//! once it listens, so weights are loaded before binding.

use std::sync::Arc;
use vjepa_backend::model::{self, ModelHandle};
use vjepa_backend::{AnalysisService, Deployment, load_settings, logging, server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    let settings = load_settings();
    logging::init(settings.as_ref().map_or("info", |s| s.server.log_level.as_str()));

    let settings = Arc::new(settings.map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(format!("Invalid configuration: {}", e))
    })?);

    let model_settings = settings.clone();
    let loaded = tokio::task::spawn_blocking(move || model::load(&model_settings))
        .await
        .map_err(std::io::Error::other)?
        .map_err(|e| {
            log::error!("Failed to load models: {}", e);
            std::io::Error::other(e.to_string())
        })?;
    log::info!("Models loaded successfully");

    let service =
        AnalysisService::from_settings(&settings, ModelHandle::ready(loaded), Deployment::Managed)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;

    server::serve(settings, service).await
}
