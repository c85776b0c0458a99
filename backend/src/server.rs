use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use std::sync::Arc;

use crate::auth::{ApiAuth, AuthMiddleware};
use crate::config::{CorsPolicy, Settings};
use crate::routes::{configure_routes, json_config};
use crate::service::AnalysisService;

pub fn cors(policy: &CorsPolicy) -> Cors {
    let cors = match policy {
        CorsPolicy::AnyOrigin => Cors::default().allow_any_origin(),
        CorsPolicy::Origins(origins) => origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .supports_credentials(),
    };
    cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
            actix_web::http::header::HeaderName::from_static("x-api-key"),
        ])
        .max_age(3600)
}

/// Binds the API to the configured address and runs until shutdown.
pub async fn serve(settings: Arc<Settings>, service: AnalysisService) -> std::io::Result<()> {
    let bind_address = settings.bind_address();
    let auth = ApiAuth::from_settings(&settings);
    if auth.is_some() {
        log::info!("Request authentication enabled");
    }
    let service = web::Data::new(service);
    let server_settings = settings.clone();

    log::info!(
        "Starting {} server on {} with {} worker(s)",
        service.deployment().as_str(),
        bind_address,
        settings.server.workers
    );

    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(auth.clone()))
            .wrap(cors(&server_settings.server.cors))
            .wrap(Logger::default())
            .app_data(json_config(server_settings.server.max_request_bytes))
            .app_data(service.clone())
            .configure(configure_routes)
    })
    .workers(settings.server.workers)
    .client_request_timeout(settings.server.request_timeout)
    .bind(&bind_address)?
    .run()
    .await
}
