use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// API Gateway proxy event. Covers REST (v1) and HTTP API (v2) payloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayEvent {
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub http: Option<HttpContext>,
    #[serde(default)]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpContext {
    pub method: String,
    #[serde(default)]
    pub path: Option<String>,
}

impl ApiGatewayEvent {
    pub fn method(&self) -> String {
        self.http_method
            .clone()
            .or_else(|| {
                self.request_context
                    .as_ref()
                    .and_then(|ctx| ctx.http.as_ref())
                    .map(|http| http.method.clone())
            })
            .unwrap_or_else(|| "GET".to_string())
            .to_ascii_uppercase()
    }

    /// Request path with any stage prefix (`/prod/...`) removed.
    pub fn route(&self) -> String {
        let path = self
            .raw_path
            .clone()
            .or_else(|| self.path.clone())
            .or_else(|| {
                self.request_context
                    .as_ref()
                    .and_then(|ctx| ctx.http.as_ref())
                    .and_then(|http| http.path.clone())
            })
            .unwrap_or_else(|| "/".to_string());
        let stage = self
            .request_context
            .as_ref()
            .and_then(|ctx| ctx.stage.as_deref())
            .filter(|stage| *stage != "$default");
        let path = match stage {
            Some(stage) => path
                .strip_prefix(&format!("/{}", stage))
                .filter(|rest| rest.is_empty() || rest.starts_with('/'))
                .map(String::from)
                .unwrap_or(path),
            None => path,
        };
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match &self.body {
            None => Ok(Vec::new()),
            Some(body) if self.is_base64_encoded => STANDARD.decode(body),
            Some(body) => Ok(body.clone().into_bytes()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ApiGatewayResponse {
    /// `allow_origin` of `None` leaves out `Access-Control-Allow-Origin`.
    pub fn json<T: Serialize>(status_code: u16, body: &T, allow_origin: Option<&str>) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|e| {
            format!(r#"{{"error":"Internal server error","detail":"{}"}}"#, e)
        });
        let mut headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Access-Control-Allow-Headers".to_string(),
                "Content-Type,Authorization,X-API-Key".to_string(),
            ),
            (
                "Access-Control-Allow-Methods".to_string(),
                "GET,POST,OPTIONS".to_string(),
            ),
        ]);
        if let Some(origin) = allow_origin {
            headers.insert("Access-Control-Allow-Origin".to_string(), origin.to_string());
            if origin != "*" {
                headers.insert("Vary".to_string(), "Origin".to_string());
            }
        }
        Self {
            status_code,
            headers,
            body,
            is_base64_encoded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rest_api_event() {
        let event: ApiGatewayEvent = serde_json::from_value(json!({
            "httpMethod": "post",
            "path": "/prod/api/v1/analyze",
            "requestContext": {"stage": "prod"},
            "headers": {"content-type": "application/json"},
            "body": "{}",
            "isBase64Encoded": false
        }))
        .unwrap();
        assert_eq!(event.method(), "POST");
        assert_eq!(event.route(), "/api/v1/analyze");
        assert_eq!(event.header("Content-Type"), Some("application/json"));
        assert_eq!(event.body_bytes().unwrap(), b"{}");
    }

    #[test]
    fn http_api_event() {
        let event: ApiGatewayEvent = serde_json::from_value(json!({
            "version": "2.0",
            "rawPath": "/health/",
            "requestContext": {"http": {"method": "GET", "path": "/health"}, "stage": "$default"},
            "body": "e30=",
            "isBase64Encoded": true
        }))
        .unwrap();
        assert_eq!(event.method(), "GET");
        assert_eq!(event.route(), "/health");
        assert_eq!(event.body_bytes().unwrap(), b"{}");
    }

    #[test]
    fn stage_prefix_only_strips_whole_segments() {
        let event = ApiGatewayEvent {
            path: Some("/production/health".into()),
            request_context: Some(RequestContext {
                http: None,
                stage: Some("prod".into()),
            }),
            ..Default::default()
        };
        assert_eq!(event.route(), "/production/health");
    }

    #[test]
    fn responses_carry_cors_headers() {
        let resp = ApiGatewayResponse::json(200, &json!({"ok": true}), Some("*"));
        assert_eq!(resp.headers["Access-Control-Allow-Origin"], "*");
        assert!(!resp.headers.contains_key("Vary"));
        assert_eq!(resp.body, r#"{"ok":true}"#);
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["statusCode"], 200);
        assert_eq!(wire["isBase64Encoded"], false);
    }

    #[test]
    fn echoed_origin_varies_and_missing_origin_is_omitted() {
        let resp = ApiGatewayResponse::json(200, &json!({}), Some("https://a.example"));
        assert_eq!(resp.headers["Access-Control-Allow-Origin"], "https://a.example");
        assert_eq!(resp.headers["Vary"], "Origin");

        let resp = ApiGatewayResponse::json(403, &json!({}), None);
        assert!(!resp.headers.contains_key("Access-Control-Allow-Origin"));
        assert_eq!(resp.headers["Content-Type"], "application/json");
    }
}
