//! Shared HTTP client for collaborator calls

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};

/// reqwest client with the configured timeout and optional bearer token
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    access_token: Option<String>,
}

impl HttpClient {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
        })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.authorize(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, classify failures, and return the successful response
    pub async fn send(&self, service: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::remote(service, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(service, status, &body));
        }
        Ok(response)
    }

    /// Send a request and decode the JSON body
    pub async fn send_json(&self, service: &str, request: RequestBuilder) -> Result<Value> {
        let response = self.send(service, request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| Error::remote(service, format!("failed to read body: {}", e)))?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!("Unexpected {} response body: {}", service, truncate(&text, 2000));
            Error::malformed(service, format!("body is not JSON: {}", e))
        })
    }
}

/// Map an unsuccessful HTTP status to an error class
///
/// 401/403 mean missing or bad credentials; 408, 429 and 5xx are worth
/// retrying; any other 4xx means the request itself was rejected.
pub fn status_error(service: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("HTTP {}: {}", status, truncate(body, 500));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::config(format!("{} rejected credentials: {}", service, message))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::remote(service, message)
        }
        s if s.is_server_error() => Error::remote(service, message),
        _ => Error::invalid_input(format!("{} rejected request: {}", service, message)),
    }
}

/// Require an endpoint setting or fail with a configuration error
pub fn require<'a>(value: &'a Option<String>, setting: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::config(format!("{} not configured", setting)))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect::<String>() + "..."
    }
}
