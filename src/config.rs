//! Downloader configuration, optionally loaded from a JSON file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::models::ApiConfig;
use crate::api::ytdlp::YtDlpOptions;
use crate::domain::CollisionPolicy;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "VIDEO_DL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Where finished files land (default: `~/Downloads`)
    pub destination_directory: Option<PathBuf>,

    /// Quality/format selection for the first attempt
    pub format: String,

    /// Degraded selection tried once after the host blocks the first attempt
    pub fallback_format: Option<String>,

    pub collision_policy: CollisionPolicy,

    /// oEmbed title lookup
    pub title_lookup: ApiConfig,

    pub ytdlp: YtDlpOptions,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            destination_directory: None,
            format: "bestvideo+bestaudio/best".to_string(),
            fallback_format: Some("best[ext=mp4]/best".to_string()),
            collision_policy: CollisionPolicy::default(),
            title_lookup: ApiConfig::default(),
            ytdlp: YtDlpOptions::default(),
        }
    }
}

impl DownloaderConfig {
    /// Load from the file named by [`CONFIG_ENV`], or defaults when unset or unreadable.
    pub fn load() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) else {
            return Self::default();
        };

        match Self::from_file(&path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(e) => {
                warn!(error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merged container extension of successful downloads.
    pub fn output_extension(&self) -> &str {
        &self.ytdlp.merge_output_format
    }

    pub fn destination(&self) -> PathBuf {
        self.destination_directory
            .clone()
            .or_else(dirs::download_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
