use std::sync::Arc;
use vjepa_backend::model::{self, ModelHandle};
use vjepa_backend::{AnalysisService, Deployment, load_settings, logging, server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    let settings = load_settings();
    logging::init(settings.as_ref().map_or("info", |s| s.server.log_level.as_str()));

    let settings = match settings {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::other(format!("Invalid configuration: {}", e)));
        }
    };

    let handle = ModelHandle::new();
    let service = AnalysisService::from_settings(&settings, handle.clone(), Deployment::Container)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    // Weights load while the server already answers health probes.
    let model_settings = settings.clone();
    tokio::task::spawn_blocking(move || {
        log::info!("Loading V-JEPA-2 models...");
        match model::load(&model_settings) {
            Ok(loaded) => {
                handle.install(loaded);
                log::info!("Models loaded successfully");
            }
            Err(e) => {
                log::error!("Failed to load models: {}", e);
                log::warn!("Server will keep running but models are not available");
            }
        }
    });

    server::serve(settings, service).await
}
