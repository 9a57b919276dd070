//! External collaborators: the media fetch capability and the title lookup.

pub mod client;
pub mod models;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{ClipSection, ProgressEvent};

pub use client::{ApiClient, ApiError};
pub use ytdlp::YtDlpFetcher;

/// Errors reported by a fetch capability.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The host refused the request (HTTP 403/429, sign-in challenge).
    #[error("request blocked by host: {0}")]
    Blocked(String),

    #[error("{0}")]
    Failed(String),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// What to fetch and where the capability may write.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchJob {
    pub url: String,
    pub output_dir: PathBuf,
    pub format: String,
    pub section: Option<ClipSection>,
}

/// What the capability says it did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    /// Files the capability reports having written, in order. Empty when unknown.
    pub files: Vec<PathBuf>,
    pub title: Option<String>,
}

/// Called zero or more times during one fetch.
pub type ProgressCallback<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

/// Resolves a source URL to media on disk.
#[async_trait]
pub trait FetchCapability: Send + Sync {
    async fn fetch(
        &self,
        job: &FetchJob,
        progress: ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, FetchError>;

    fn name(&self) -> &'static str;
}

/// Looks up a video title before anything is fetched.
#[async_trait]
pub trait TitleLookup: Send + Sync {
    async fn lookup_title(&self, url: &str) -> Result<String, ApiError>;
}
