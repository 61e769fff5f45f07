//! HTTP client for the chat backend
//!
//! Opens the streaming chat request and sends out-of-band kill requests.
//! Both go to the same endpoint (`client.chat_url()`).

use crate::config::ClientConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::request::ChatRequestBody;
use crate::request_id::RequestId;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use std::time::Duration;

/// Response body of an accepted chat request
pub type ByteStream = std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Maximum number of characters of an error body kept in `HttpStatus`
const ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KillRequest {
    kill_switch: KillSwitch,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KillSwitch {
    request_id: RequestId,
    value: bool,
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    read_timeout: Duration,
    url: String,
    api_key: Option<String>,
    metrics: Option<Metrics>,
}

impl ChatClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the underlying HTTP client cannot be
    /// built (e.g. TLS backend initialization failure).
    pub fn new(config: &ClientConfig) -> AppResult<Self> {
        // No whole-request timeout: a reply may stream for as long as chunks
        // keep arriving.
        let read_timeout = Duration::from_secs(config.read_timeout_seconds);
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .read_timeout(read_timeout)
            .build()?;

        Ok(Self {
            http,
            read_timeout,
            url: config.chat_url(),
            api_key: config.api_key(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the chat request and return the response body as a byte stream
    ///
    /// # Errors
    ///
    /// - `AppError::Transport` if the request cannot be sent
    /// - `AppError::HttpStatus` for any non-2xx response, with the body text
    pub async fn open_stream(&self, body: &ChatRequestBody) -> AppResult<ByteStream> {
        let request_id = body.request_id();
        tracing::debug!(
            request_id = %request_id,
            url = %self.url,
            messages = body.messages.len(),
            "Opening chat stream"
        );

        let response = self
            .authorized(self.http.post(&self.url))
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            let body: String = text.chars().take(ERROR_BODY_CHARS).collect();
            tracing::warn!(
                request_id = %request_id,
                status = status.as_u16(),
                body = %body,
                "Chat endpoint rejected request"
            );
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(request_id = %request_id, status = %status, "Chat stream accepted");
        Ok(Box::pin(response.bytes_stream()))
    }

    /// Ask the backend to stop generating for `request_id`
    ///
    /// # Errors
    ///
    /// - `AppError::Transport` if the request cannot be sent
    /// - `AppError::KillRequestFailed` for any non-2xx response
    pub async fn kill_request(&self, request_id: RequestId) -> AppResult<()> {
        let payload = KillRequest {
            kill_switch: KillSwitch {
                request_id,
                value: true,
            },
        };

        // Kill replies carry no stream, so the whole request is bounded.
        let result = self
            .authorized(self.http.post(&self.url))
            .timeout(self.read_timeout)
            .json(&payload)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(AppError::KillRequestFailed {
                request_id: request_id.to_string(),
                status: response.status().as_u16(),
            }),
            Err(e) => Err(AppError::Transport(e)),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_kill_request(outcome.is_ok());
        }
        match &outcome {
            Ok(()) => tracing::info!(request_id = %request_id, "Kill request accepted"),
            Err(e) => tracing::warn!(request_id = %request_id, error = %e, "Kill request failed"),
        }
        outcome
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("url", &self.url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}
