use actix_web::{Error, HttpRequest, HttpResponse, error, web};
use shared::AnalysisRequest;

use crate::error::ApiError;
use crate::service::AnalysisService;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/analyze").route(web::post().to(analyze)))
        .service(
            web::scope("/api/v1")
                .service(web::resource("/health").route(web::get().to(health)))
                .service(web::resource("/analyze").route(web::post().to(analyze)))
                .service(web::resource("/models/info").route(web::get().to(model_info))),
        );
}

/// JSON extractor settings for the analyze body: size limit plus structured errors.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(json_error_handler)
}

fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> Error {
    let api_error = match &err {
        error::JsonPayloadError::OverflowKnownLength { length, limit } => ApiError::PayloadTooLarge(
            format!("{} bytes exceeds limit of {} bytes", length, limit),
        ),
        error::JsonPayloadError::Overflow { limit } => {
            ApiError::PayloadTooLarge(format!("exceeds limit of {} bytes", limit))
        }
        error::JsonPayloadError::Deserialize(e) if e.is_data() => {
            ApiError::Validation(e.to_string())
        }
        error::JsonPayloadError::ContentType => {
            ApiError::InvalidRequest("expected Content-Type: application/json".to_string())
        }
        other => ApiError::InvalidRequest(other.to_string()),
    };
    log::info!("Rejected request body: {}", api_error);
    api_error.into()
}

async fn root(service: web::Data<AnalysisService>) -> HttpResponse {
    HttpResponse::Ok().json(service.root())
}

async fn health(service: web::Data<AnalysisService>) -> HttpResponse {
    HttpResponse::Ok().json(service.health())
}

async fn analyze(
    service: web::Data<AnalysisService>,
    body: web::Json<AnalysisRequest>,
) -> Result<HttpResponse, ApiError> {
    let response = service.analyze(body.into_inner()).await?;
    log::info!(
        "Predicted '{}' with confidence {:.3}",
        response.predicted_action,
        response.confidence
    );
    Ok(HttpResponse::Ok().json(response))
}

async fn model_info(service: web::Data<AnalysisService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.model_info()?))
}
