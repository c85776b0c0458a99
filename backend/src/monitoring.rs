//! Forwards server-side failures to a Sentry-compatible store endpoint.

use reqwest::Client;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("invalid DSN: {0}")]
    InvalidDsn(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dsn {
    pub public_key: String,
    pub store_url: Url,
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self, MonitoringError> {
        let url = Url::parse(raw).map_err(|e| MonitoringError::InvalidDsn(e.to_string()))?;
        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(MonitoringError::InvalidDsn("missing public key".into()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| MonitoringError::InvalidDsn("missing host".into()))?;
        let project = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| MonitoringError::InvalidDsn("missing project id".into()))?;

        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let store_url = Url::parse(&format!(
            "{}://{}/api/{}/store/",
            url.scheme(),
            authority,
            project
        ))
        .map_err(|e| MonitoringError::InvalidDsn(e.to_string()))?;

        Ok(Self {
            public_key,
            store_url,
        })
    }
}

#[derive(Clone)]
pub struct ErrorReporter {
    client: Client,
    dsn: Dsn,
    deployment: &'static str,
}

impl ErrorReporter {
    pub fn new(dsn: &str, deployment: &'static str) -> Result<Self, MonitoringError> {
        Ok(Self {
            client: Client::new(),
            dsn: Dsn::parse(dsn)?,
            deployment,
        })
    }

    pub fn event(&self, error: &ApiError, route: &str) -> serde_json::Value {
        json!({
            "event_id": Uuid::new_v4().simple().to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": "error",
            "platform": "other",
            "logger": "vjepa-backend",
            "message": error.to_string(),
            "tags": {
                "route": route,
                "status": error.status().as_u16(),
                "deployment": self.deployment,
            },
        })
    }

    /// Fire-and-forget; delivery failures are only logged.
    pub fn report(&self, error: &ApiError, route: &str) {
        let event = self.event(error, route);
        let request = self
            .client
            .post(self.dsn.store_url.clone())
            .header(
                "X-Sentry-Auth",
                format!(
                    "Sentry sentry_version=7, sentry_client=vjepa-backend/{}, sentry_key={}",
                    env!("CARGO_PKG_VERSION"),
                    self.dsn.public_key
                ),
            )
            .json(&event);
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    log::warn!("Monitoring sink rejected event: {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => log::warn!("Failed to deliver monitoring event: {}", e),
            }
        });
    }
}
