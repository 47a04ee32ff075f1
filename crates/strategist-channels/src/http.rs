use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Method};
use tracing::debug;

use strategist_core::config::HttpConfig;
use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::HttpFetcher;
use strategist_core::types::{FetchRequest, FetchResponse};

/// HttpFetcher backed by a shared reqwest client.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| StrategistError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

/// Body as JSON when it parses, otherwise as a JSON string.
pub(crate) fn decode_body(text: String) -> serde_json::Value {
    serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
}

impl HttpFetcher for ReqwestFetcher {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        Box::pin(async move {
            let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
                .map_err(|_| StrategistError::Transport(format!("Invalid HTTP method: {}", request.method)))?;

            let mut req = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                req = req.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                req = req.body(body);
            }

            let response = req
                .send()
                .await
                .map_err(|e| StrategistError::Transport(e.to_string()))?;

            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .map_err(|e| StrategistError::Transport(e.to_string()))?;

            debug!(url = %request.url, status, bytes = text.len(), "Fetched");
            Ok(FetchResponse {
                status,
                body: decode_body(text),
            })
        })
    }
}
