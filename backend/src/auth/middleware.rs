use super::jwt::JwtService;
use super::models::Caller;
use crate::config::Settings;
use crate::error::ApiError;
use actix_web::{
    Error, HttpMessage, ResponseError,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::future::{Ready, ok};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidHeaderFormat,
    WrongApiKey,
    VerificationFailed(String),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::MissingCredentials => format!("No credentials supplied for path: {}", path),
            AuthError::InvalidHeaderFormat => {
                format!("Invalid credential header format for path: {}", path)
            }
            AuthError::WrongApiKey => format!("Unknown API key for path: {}", path),
            AuthError::VerificationFailed(e) => {
                format!("Token verification failed for path {}: {}", path, e)
            }
        }
    }

    pub fn into_api_error(self) -> ApiError {
        let message = match self {
            AuthError::VerificationFailed(_) => "Token verification failed",
            AuthError::WrongApiKey => "Invalid API key",
            _ => "Missing or invalid credentials",
        };
        ApiError::Unauthorized(message.to_string())
    }
}

/// Accepts the configured API key (`X-API-Key` or `Bearer <key>`) or a bearer
/// token signed with the configured secret.
#[derive(Clone)]
pub struct ApiAuth {
    api_key: Option<String>,
    jwt: Option<JwtService>,
}

impl ApiAuth {
    pub fn new(api_key: Option<String>, api_secret: Option<&str>) -> Option<Self> {
        if api_key.is_none() && api_secret.is_none() {
            return None;
        }
        Some(Self {
            api_key,
            jwt: api_secret.map(JwtService::new),
        })
    }

    pub fn from_settings(settings: &Settings) -> Option<Self> {
        Self::new(settings.api_key.clone(), settings.api_secret.as_deref())
    }

    /// Probes and the root document stay reachable without credentials.
    pub fn is_public(path: &str) -> bool {
        matches!(path, "/" | "/health" | "/api/v1/health")
    }

    pub fn authorize(
        &self,
        api_key_header: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<Caller, AuthError> {
        // Without a configured key the header carries nothing to check.
        if let Some(key) = api_key_header.filter(|_| self.api_key.is_some()) {
            return if self.matches_key(key) {
                Ok(Caller::ApiKey)
            } else {
                Err(AuthError::WrongApiKey)
            };
        }

        let header = authorization.ok_or(AuthError::MissingCredentials)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidHeaderFormat)?
            .trim();

        if self.matches_key(token) {
            return Ok(Caller::ApiKey);
        }
        match &self.jwt {
            Some(jwt) => jwt
                .verify_token(token)
                .map(|claims| Caller::Token(claims.sub))
                .map_err(|e| AuthError::VerificationFailed(e.to_string())),
            None => Err(AuthError::WrongApiKey),
        }
    }

    fn matches_key(&self, candidate: &str) -> bool {
        match &self.api_key {
            Some(key) => key.as_bytes().ct_eq(candidate.as_bytes()).unwrap_u8() == 1,
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware {
    auth: Option<Arc<ApiAuth>>,
}

impl AuthMiddleware {
    pub fn new(auth: Option<ApiAuth>) -> Self {
        Self {
            auth: auth.map(Arc::new),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            auth: self.auth.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    auth: Option<Arc<ApiAuth>>,
}

fn header<'a>(req: &'a ServiceRequest, name: &str) -> Result<Option<&'a str>, AuthError> {
    req.headers()
        .get(name)
        .map(|value| value.to_str().map_err(|_| AuthError::InvalidHeaderFormat))
        .transpose()
}

fn validate_request(req: &ServiceRequest, auth: &ApiAuth) -> Result<Caller, AuthError> {
    let api_key = header(req, API_KEY_HEADER)?;
    let authorization = header(req, "Authorization")?;
    auth.authorize(api_key, authorization)
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let auth = self.auth.clone();

        Box::pin(async move {
            let auth = match auth {
                Some(auth) if !ApiAuth::is_public(req.path()) => auth,
                _ => {
                    let res = service.call(req).await?;
                    return Ok(res.map_into_left_body());
                }
            };

            match validate_request(&req, &auth) {
                Ok(caller) => {
                    log::debug!("Authorized {:?} for path: {}", caller, req.path());
                    req.extensions_mut().insert(caller);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(auth_error) => {
                    log::warn!("{}", auth_error.log_message(req.path()));
                    let response = auth_error
                        .into_api_error()
                        .error_response()
                        .map_into_right_body();
                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn disabled_without_key_or_secret() {
        assert!(ApiAuth::new(None, None).is_none());
    }

    #[test]
    fn api_key_in_either_header() {
        let auth = ApiAuth::new(Some("k1".into()), None).unwrap();
        assert_eq!(auth.authorize(Some("k1"), None).unwrap(), Caller::ApiKey);
        assert_eq!(auth.authorize(None, Some("Bearer k1")).unwrap(), Caller::ApiKey);
        assert!(matches!(
            auth.authorize(Some("k2"), None),
            Err(AuthError::WrongApiKey)
        ));
        assert!(matches!(
            auth.authorize(None, None),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            auth.authorize(None, Some("Basic abc")),
            Err(AuthError::InvalidHeaderFormat)
        ));
    }

    #[test]
    fn signed_tokens_need_the_secret() {
        let auth = ApiAuth::new(None, Some("s3cret")).unwrap();
        let token = JwtService::new("s3cret")
            .issue_token("dashboard", Duration::minutes(1))
            .unwrap();
        assert_eq!(
            auth.authorize(None, Some(&format!("Bearer {}", token))).unwrap(),
            Caller::Token("dashboard".into())
        );
        assert!(matches!(
            auth.authorize(None, Some("Bearer a.b.c")),
            Err(AuthError::VerificationFailed(_))
        ));
    }

    #[test]
    fn stray_api_key_header_does_not_mask_a_valid_token() {
        let auth = ApiAuth::new(None, Some("s3cret")).unwrap();
        let token = JwtService::new("s3cret")
            .issue_token("dashboard", Duration::minutes(1))
            .unwrap();
        let bearer = format!("Bearer {}", token);
        assert_eq!(
            auth.authorize(Some("leftover"), Some(&bearer)).unwrap(),
            Caller::Token("dashboard".into())
        );
        assert!(matches!(
            auth.authorize(Some("leftover"), None),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn keys_of_other_lengths_never_match() {
        let auth = ApiAuth::new(Some("k1".into()), None).unwrap();
        assert!(auth.matches_key("k1"));
        assert!(!auth.matches_key("k"));
        assert!(!auth.matches_key("k1k1"));
        assert!(!auth.matches_key(""));
    }

    #[test]
    fn probes_are_public() {
        assert!(ApiAuth::is_public("/health"));
        assert!(ApiAuth::is_public("/api/v1/health"));
        assert!(!ApiAuth::is_public("/api/v1/analyze"));
    }
}
