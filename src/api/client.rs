use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::models::{ApiConfig, OEmbedResponse};
use super::TitleLookup;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// oEmbed client used to learn a video's title before downloading it.
#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    client: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Fetch the oEmbed document for a watch URL
    pub async fn oembed(&self, video_url: &str) -> Result<OEmbedResponse> {
        debug!(endpoint = %self.config.oembed_endpoint, "requesting oEmbed");

        let response = self
            .client
            .get(&self.config.oembed_endpoint)
            .query(&[("url", video_url), ("format", "json")])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("oEmbed request failed: {}", e)))?;

        let json: OEmbedResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        if json.title.trim().is_empty() {
            return Err(ApiError::InvalidResponse("empty title".to_string()));
        }

        Ok(json)
    }
}

#[async_trait]
impl TitleLookup for ApiClient {
    async fn lookup_title(&self, url: &str) -> Result<String> {
        self.oembed(url).await.map(|doc| doc.title)
    }
}
