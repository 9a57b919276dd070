use serde::Deserialize;
use std::path::PathBuf;

use super::AppError;

/// One user-triggered download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination_directory: PathBuf,
    /// Restrict the download to a segment of the video.
    pub section: Option<ClipSection>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_directory: destination_directory.into(),
            section: None,
        }
    }

    pub fn with_section(mut self, section: ClipSection) -> Self {
        self.section = Some(section);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSection {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ClipSection {
    pub fn is_valid(&self) -> bool {
        self.start_secs.is_finite()
            && self.end_secs.is_finite()
            && self.start_secs >= 0.0
            && self.end_secs > self.start_secs
    }
}

/// Final result of a request, owned by the caller for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub success: bool,
    pub file_path: Option<PathBuf>,
    pub message: String,
    pub bytes_downloaded: Option<u64>,
    pub error: Option<AppError>,
}

impl DownloadOutcome {
    pub fn saved(path: PathBuf, size: u64) -> Self {
        Self {
            success: true,
            message: format!("Saved: {}", path.display()),
            file_path: Some(path),
            bytes_downloaded: Some(size),
            error: None,
        }
    }

    pub fn already_present(path: PathBuf, size: u64) -> Self {
        Self {
            success: true,
            message: format!("Already downloaded: {}", path.display()),
            file_path: Some(path),
            bytes_downloaded: Some(size),
            error: None,
        }
    }

    pub fn failed(error: AppError) -> Self {
        Self {
            success: false,
            file_path: None,
            message: error.to_string(),
            bytes_downloaded: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Extracting,
    Downloading,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub bytes_downloaded: Option<u64>,
    pub bytes_total: Option<u64>,
}

impl ProgressEvent {
    pub fn extracting() -> Self {
        Self {
            phase: ProgressPhase::Extracting,
            bytes_downloaded: None,
            bytes_total: None,
        }
    }

    pub fn downloading(bytes_downloaded: Option<u64>, bytes_total: Option<u64>) -> Self {
        Self {
            phase: ProgressPhase::Downloading,
            bytes_downloaded,
            bytes_total,
        }
    }

    pub fn finished() -> Self {
        Self {
            phase: ProgressPhase::Finished,
            bytes_downloaded: None,
            bytes_total: None,
        }
    }

    /// Completion ratio in `0.0..=1.0`, or `None` when progress is indeterminate.
    pub fn fraction(&self) -> Option<f32> {
        if self.phase == ProgressPhase::Finished {
            return Some(1.0);
        }
        let downloaded = self.bytes_downloaded?;
        let total = self.bytes_total.filter(|t| *t > 0)?;
        let ratio = downloaded as f64 / total as f64;
        ratio.is_finite().then(|| ratio.clamp(0.0, 1.0) as f32)
    }
}

/// Per-request state machine. Terminal states are `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Validating,
    Fetching,
    Verifying,
    Done,
    Failed,
}

impl DownloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadPhase::Done | DownloadPhase::Failed)
    }

    pub fn can_advance_to(self, next: DownloadPhase) -> bool {
        use DownloadPhase::*;
        match (self, next) {
            (Idle, Validating) => true,
            (Validating, Fetching) => true,
            (Fetching, Verifying) => true,
            // An existing file satisfies the request without fetching.
            (Validating, Done) => true,
            (Verifying, Done) => true,
            (from, Failed) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

/// What to do when the destination already holds a file with the target name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Report the existing file as the result without fetching again.
    #[default]
    Skip,
    /// Write alongside it as `name (1).ext`, `name (2).ext`, ...
    Suffix,
}
