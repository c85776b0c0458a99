use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;
use std::time::Duration;

use crate::model::ModelError;
use crate::preprocess::PreprocessError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
    #[error("Request validation failed: {0}")]
    Validation(String),
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Models not loaded")]
    ModelNotLoaded,
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short, stable label for the error kind.
    pub fn title(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "Invalid request",
            ApiError::Validation(_) => "Validation error",
            ApiError::InvalidImage(_) => "Invalid image",
            ApiError::PayloadTooLarge(_) => "Payload too large",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::NotFound(_) => "Not found",
            ApiError::ModelNotLoaded => "Models not loaded",
            ApiError::Inference(_) => "Internal server error",
            ApiError::Timeout(_) => "Request timeout",
        }
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.title().to_string(),
            detail: Some(self.to_string()),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status()).json(self.body())
    }
}

impl From<PreprocessError> for ApiError {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            other => ApiError::InvalidImage(other.to_string()),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::BackendUnavailable => ApiError::ModelNotLoaded,
            other => ApiError::Inference(other.to_string()),
        }
    }
}
