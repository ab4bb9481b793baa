//! HTTP client for the answering service.
//!
//! The service exposes a streaming endpoint (newline-delimited JSON frames)
//! and a synchronous endpoint returning the whole answer at once.

use crate::config::ServiceConfig;
use crate::error::ResponseError;
use anyhow::Context;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Raw body chunks of an open streaming response
pub type ChunkStream = BoxStream<'static, Result<Bytes, ResponseError>>;

/// The two operations the chat needs from the answering service
pub(crate) trait AnswerService {
    /// Open the streaming request for a question
    async fn open_stream(&self, question: &str) -> Result<ChunkStream, ResponseError>;

    /// Ask for the complete answer in one response
    async fn ask(&self, question: &str) -> Result<String, ResponseError>;
}

/// Response from the synchronous endpoint.
#[derive(Debug, Deserialize)]
struct AnswerResponse {
    answer: String,
}

/// Response from the service status route.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub message: String,
    #[serde(default)]
    pub gemini_key_loaded: bool,
}

/// reqwest-backed client for the answering service
pub struct HttpAnswerClient {
    stream_url: String,
    fallback_url: String,
    health_url: String,
    fallback_timeout: Duration,
    client: reqwest::Client,
}

impl HttpAnswerClient {
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        // No total timeout here: it would also bound the time spent reading
        // a long streamed body. The fallback request sets its own.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .context("Failed to create HTTP client for HttpAnswerClient")?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            stream_url: format!("{base}{}", config.stream_path),
            fallback_url: format!("{base}{}", config.fallback_path),
            health_url: format!("{base}{}", config.health_path),
            fallback_timeout: config.fallback_timeout(),
            client,
        })
    }

    /// Query the service status route
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<HealthStatus, ResponseError> {
        let response = self
            .client
            .get(&self.health_url)
            .timeout(self.fallback_timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| ResponseError::InvalidResponse(format!("Failed to parse status: {e}")))
    }
}

impl AnswerService for HttpAnswerClient {
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    async fn open_stream(&self, question: &str) -> Result<ChunkStream, ResponseError> {
        let response = self
            .client
            .get(&self.stream_url)
            .query(&[("query", question)])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        debug!(status = response.status().as_u16(), "Stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ResponseError::Transport(e.to_string())))
            .boxed())
    }

    #[instrument(skip(self, question), fields(question_len = question.len()))]
    async fn ask(&self, question: &str) -> Result<String, ResponseError> {
        let response = self
            .client
            .get(&self.fallback_url)
            .query(&[("query", question)])
            .timeout(self.fallback_timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body: AnswerResponse = response.json().await.map_err(|e| {
            ResponseError::InvalidResponse(format!("Failed to parse answer response: {e}"))
        })?;
        Ok(body.answer)
    }
}

/// Turn a non-2xx response into `ResponseError::ServerError`
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ResponseError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(ResponseError::ServerError { status, message })
}
