//! Serverless adapter: translates API Gateway proxy events to the shared
//! analysis pipeline and back.

pub mod events;
pub mod runtime;

use serde_json::Value;
use shared::AnalysisRequest;

use crate::auth::ApiAuth;
use crate::auth::middleware::API_KEY_HEADER;
use crate::config::CorsPolicy;
use crate::error::ApiError;
use crate::service::AnalysisService;

pub use events::{ApiGatewayEvent, ApiGatewayResponse};
pub use runtime::RuntimeClient;

#[derive(Debug, thiserror::Error)]
pub enum LambdaError {
    #[error("AWS_LAMBDA_RUNTIME_API is not set")]
    MissingRuntimeApi,
    #[error("runtime API response has no request id")]
    MissingRequestId,
    #[error("runtime API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct LambdaHandler {
    service: AnalysisService,
    auth: Option<ApiAuth>,
    cors: CorsPolicy,
    max_request_bytes: usize,
}

impl LambdaHandler {
    pub fn new(
        service: AnalysisService,
        auth: Option<ApiAuth>,
        cors: CorsPolicy,
        max_request_bytes: usize,
    ) -> Self {
        Self {
            service,
            auth,
            cors,
            max_request_bytes,
        }
    }

    /// Never fails: every outcome, including unparseable events, becomes a response.
    pub async fn handle(&self, payload: Value) -> ApiGatewayResponse {
        let event: ApiGatewayEvent = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(e) => {
                log::error!("Unrecognized Lambda event: {}", e);
                let origin = self.cors.allow_origin(None);
                return error_response(
                    &ApiError::InvalidRequest(format!("unrecognized event: {}", e)),
                    origin.as_deref(),
                );
            }
        };
        let method = event.method();
        let route = event.route();
        let allow_origin = self.cors.allow_origin(event.header("Origin"));
        let origin = allow_origin.as_deref();
        log::info!("Lambda event: {} {}", method, route);

        let response = match self.dispatch(&method, &route, &event, origin).await {
            Ok(response) => response,
            Err(err) => error_response(&err, origin),
        };
        log::info!("Lambda response status: {}", response.status_code);
        response
    }

    async fn dispatch(
        &self,
        method: &str,
        route: &str,
        event: &ApiGatewayEvent,
        origin: Option<&str>,
    ) -> Result<ApiGatewayResponse, ApiError> {
        if method == "OPTIONS" {
            return Ok(ok(&serde_json::json!({}), origin));
        }
        if let Some(auth) = &self.auth {
            if !ApiAuth::is_public(route) {
                auth.authorize(event.header(API_KEY_HEADER), event.header("Authorization"))
                    .map_err(|e| e.into_api_error())?;
            }
        }

        match (method, route) {
            ("GET", "/") => Ok(ok(&self.service.root(), origin)),
            ("GET", "/health") | ("GET", "/api/v1/health") => {
                Ok(ok(&self.service.health(), origin))
            }
            ("GET", "/api/v1/models/info") => Ok(ok(&self.service.model_info()?, origin)),
            ("POST", "/analyze") | ("POST", "/api/v1/analyze") => {
                let request = self.parse_request(event)?;
                Ok(ok(&self.service.analyze(request).await?, origin))
            }
            _ => Err(ApiError::NotFound(format!("{} {}", method, route))),
        }
    }

    fn parse_request(&self, event: &ApiGatewayEvent) -> Result<AnalysisRequest, ApiError> {
        let body = event
            .body_bytes()
            .map_err(|e| ApiError::InvalidRequest(format!("body is not valid base64: {}", e)))?;
        if body.len() > self.max_request_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "{} bytes exceeds limit of {} bytes",
                body.len(),
                self.max_request_bytes
            )));
        }
        serde_json::from_slice(&body).map_err(|e| {
            if e.is_data() {
                ApiError::Validation(e.to_string())
            } else {
                ApiError::InvalidRequest(e.to_string())
            }
        })
    }
}

fn ok<T: serde::Serialize>(body: &T, origin: Option<&str>) -> ApiGatewayResponse {
    ApiGatewayResponse::json(200, body, origin)
}

fn error_response(err: &ApiError, origin: Option<&str>) -> ApiGatewayResponse {
    ApiGatewayResponse::json(err.status().as_u16(), &err.body(), origin)
}
