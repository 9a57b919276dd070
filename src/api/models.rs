use serde::{Deserialize, Serialize};

/// Response from the oEmbed endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OEmbedResponse {
    pub title: String,
}

/// Configuration for the API client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub oembed_endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            oembed_endpoint: "https://www.youtube.com/oembed".to_string(),
            timeout_secs: 10,
        }
    }
}
