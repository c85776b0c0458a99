use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};

use super::LambdaError;

const API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";

/// Client for the Lambda Runtime API of a custom runtime.
#[derive(Clone)]
pub struct RuntimeClient {
    http: Client,
    base: String,
}

pub struct Invocation {
    pub request_id: String,
    pub payload: Value,
}

impl RuntimeClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: Client::new(),
            base: format!("http://{}/{}/runtime", endpoint, API_VERSION),
        }
    }

    pub fn from_env() -> Result<Self, LambdaError> {
        std::env::var("AWS_LAMBDA_RUNTIME_API")
            .map(|endpoint| Self::new(&endpoint))
            .map_err(|_| LambdaError::MissingRuntimeApi)
    }

    /// Long-polls for the next event.
    pub async fn next_invocation(&self) -> Result<Invocation, LambdaError> {
        let resp = self
            .http
            .get(format!("{}/invocation/next", self.base))
            .send()
            .await?
            .error_for_status()?;
        let request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or(LambdaError::MissingRequestId)?;
        let payload = resp.json().await?;
        Ok(Invocation {
            request_id,
            payload,
        })
    }

    pub async fn send_response<T: Serialize>(
        &self,
        request_id: &str,
        body: &T,
    ) -> Result<(), LambdaError> {
        self.http
            .post(format!("{}/invocation/{}/response", self.base, request_id))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn send_error(&self, request_id: &str, message: &str) -> Result<(), LambdaError> {
        self.post_error(&format!("{}/invocation/{}/error", self.base, request_id), message)
            .await
    }

    pub async fn send_init_error(&self, message: &str) -> Result<(), LambdaError> {
        self.post_error(&format!("{}/init/error", self.base), message)
            .await
    }

    async fn post_error(&self, url: &str, message: &str) -> Result<(), LambdaError> {
        self.http
            .post(url)
            .header("Lambda-Runtime-Function-Error-Type", "Runtime.HandlerError")
            .json(&json!({"errorMessage": message, "errorType": "HandlerError"}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_uses_runtime_api_version() {
        let client = RuntimeClient::new("127.0.0.1:9001");
        assert_eq!(client.base, "http://127.0.0.1:9001/2018-06-01/runtime");
    }
}
