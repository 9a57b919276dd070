use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::{stream::BoxStream, FutureExt, StreamExt};
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::{
    forward_progress, ChannelSink, DownloadEvent, PhaseTracker, ProgressSink,
};
use super::resolve::{self, Placement};
use crate::api::ytdlp::cleanup_part_files;
use crate::api::{
    ApiClient, FetchCapability, FetchError, FetchJob, FetchReport, TitleLookup, YtDlpFetcher,
};
use crate::config::DownloaderConfig;
use crate::domain::{
    AppError, ClipSection, CollisionPolicy, DownloadOutcome, DownloadPhase, DownloadRequest,
    ProgressEvent,
};
use crate::utils::{canonical_watch_url, extract_video_id, sanitize_filename};

const WORK_DIR_PREFIX: &str = ".video-dl-";

/// Per-orchestrator knobs, independent of the fetch tool.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub format: String,
    pub fallback_format: Option<String>,
    /// Extension the merged output is expected to carry.
    pub extension: String,
    pub collision_policy: CollisionPolicy,
}

impl OrchestratorSettings {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            format: config.format.clone(),
            fallback_format: config.fallback_format.clone(),
            extension: config.output_extension().to_string(),
            collision_policy: config.collision_policy,
        }
    }
}

/// Drives one download from URL to a verified file in the destination.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    fetcher: Arc<dyn FetchCapability>,
    title_lookup: Option<Arc<dyn TitleLookup>>,
    settings: OrchestratorSettings,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: Arc<dyn FetchCapability>, settings: OrchestratorSettings) -> Self {
        Self {
            fetcher,
            title_lookup: None,
            settings,
        }
    }

    pub fn with_title_lookup(mut self, lookup: Arc<dyn TitleLookup>) -> Self {
        self.title_lookup = Some(lookup);
        self
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        let fetcher = Arc::new(YtDlpFetcher::new(config.ytdlp.clone()));
        let orchestrator = Self::new(fetcher, OrchestratorSettings::from_config(config));
        if config.title_lookup.enabled {
            orchestrator.with_title_lookup(Arc::new(ApiClient::new(config.title_lookup.clone())))
        } else {
            orchestrator
        }
    }

    /// Run one request to completion. Always produces exactly one outcome.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let mut tracker = PhaseTracker::new(sink);
        tracker.advance(DownloadPhase::Validating);

        let result = AssertUnwindSafe(self.run(request, &mut tracker, sink, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(AppError::Unexpected(panic_message(panic))));

        match result {
            Ok(outcome) => {
                tracker.advance(DownloadPhase::Done);
                info!(path = ?outcome.file_path, bytes = ?outcome.bytes_downloaded, "download finished");
                outcome
            }
            Err(error) => {
                warn!(phase = ?tracker.phase(), kind = error.kind(), %error, "download failed");
                tracker.advance(DownloadPhase::Failed);
                DownloadOutcome::failed(error)
            }
        }
    }

    async fn run(
        &self,
        request: &DownloadRequest,
        tracker: &mut PhaseTracker<'_>,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, AppError> {
        let video_id = validate(request)?;
        let source_url = canonical_watch_url(&video_id);
        info!(
            url = %source_url,
            dest = %request.destination_directory.display(),
            fetcher = self.fetcher.name(),
            "starting download"
        );

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let dest = request.destination_directory.as_path();
        tokio::fs::create_dir_all(dest).await.map_err(|e| {
            AppError::FileSystem(format!("cannot create {}: {}", dest.display(), e))
        })?;

        let known_title = self.lookup_title(&source_url).await;
        if let Some(existing) = self
            .existing_download(dest, known_title.as_deref(), request.section)
            .await
        {
            return Ok(existing);
        }

        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(dest)
            .map_err(|e| {
                AppError::FileSystem(format!(
                    "cannot create a working directory in {}: {}",
                    dest.display(),
                    e
                ))
            })?;

        let job = FetchJob {
            url: source_url,
            output_dir: work_dir.path().to_path_buf(),
            format: self.settings.format.clone(),
            section: request.section,
        };

        let result = self
            .fetch_and_place(job, &video_id, known_title, dest, tracker, sink, cancel)
            .await;
        remove_work_dir(work_dir);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_and_place(
        &self,
        job: FetchJob,
        video_id: &str,
        known_title: Option<String>,
        dest: &Path,
        tracker: &mut PhaseTracker<'_>,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, AppError> {
        tracker.advance(DownloadPhase::Fetching);
        let report = self.fetch_with_fallback(job.clone(), sink, cancel).await?;

        tracker.advance(DownloadPhase::Verifying);
        let title = report.title.clone().or(known_title);
        let produced = resolve::resolve_output(
            &job.output_dir,
            &report,
            title.as_deref(),
            &self.settings.extension,
        )
        .await?;
        resolve::verify_file(&produced).await?;

        let stem = title
            .as_deref()
            .map(sanitize_filename)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                produced
                    .file_stem()
                    .map(|s| sanitize_filename(&s.to_string_lossy()))
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| sanitize_filename(video_id));
        let stem = resolve::section_stem(&stem, job.section);
        let extension = produced
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.settings.extension.clone());

        match resolve::place(&produced, dest, &stem, &extension, self.settings.collision_policy)
            .await?
        {
            Placement::Moved(path) => {
                let size = resolve::verify_file(&path).await?;
                Ok(DownloadOutcome::saved(path, size))
            }
            Placement::Existing(path) => {
                let size = resolve::verify_file(&path).await?;
                Ok(DownloadOutcome::already_present(path, size))
            }
        }
    }

    /// Fetch once; if the host blocks it, retry once with the degraded format.
    async fn fetch_with_fallback(
        &self,
        mut job: FetchJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, AppError> {
        let progress = |event: ProgressEvent| forward_progress(sink, cancel, event);

        let blocked = match self.fetcher.fetch(&job, &progress, cancel).await {
            Ok(report) => return Ok(report),
            Err(FetchError::Blocked(reason)) => reason,
            Err(e) => return Err(fetch_error(e)),
        };

        let fallback = match &self.settings.fallback_format {
            Some(fallback) if *fallback != job.format => fallback.clone(),
            _ => return Err(fetch_error(FetchError::Blocked(blocked))),
        };

        warn!(reason = %blocked, format = %fallback, "request blocked, retrying with fallback format");
        cleanup_part_files(&job.output_dir).await;
        job.format = fallback;

        self.fetcher
            .fetch(&job, &progress, cancel)
            .await
            .map_err(fetch_error)
    }

    async fn lookup_title(&self, url: &str) -> Option<String> {
        let lookup = self.title_lookup.as_ref()?;
        match lookup.lookup_title(url).await {
            Ok(title) => {
                debug!(%title, "title lookup");
                Some(title)
            }
            Err(e) => {
                debug!(error = %e, "title lookup failed, continuing without it");
                None
            }
        }
    }

    /// Under the skip policy, an existing non-empty target satisfies the request.
    async fn existing_download(
        &self,
        dest: &Path,
        title: Option<&str>,
        section: Option<ClipSection>,
    ) -> Option<DownloadOutcome> {
        if self.settings.collision_policy != CollisionPolicy::Skip {
            return None;
        }
        let stem = sanitize_filename(title?);
        if stem.is_empty() {
            return None;
        }
        let stem = resolve::section_stem(&stem, section);
        let path = dest.join(resolve::target_file_name(&stem, &self.settings.extension));
        let size = resolve::non_empty_file(&path).await?;
        info!(path = %path.display(), "file already present, skipping fetch");
        Some(DownloadOutcome::already_present(path, size))
    }

    /// Run the request on the runtime and stream its events for the UI.
    pub fn download_stream(
        &self,
        request: DownloadRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, DownloadEvent> {
        futures::stream::unfold(
            StreamState::Start {
                orchestrator: self.clone(),
                request,
                cancel,
            },
            |state| async move {
                match state {
                    StreamState::Start {
                        orchestrator,
                        request,
                        cancel,
                    } => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        tokio::spawn(async move {
                            let sink = ChannelSink(tx.clone());
                            let outcome = orchestrator.download(&request, &sink, &cancel).await;
                            let _ = tx.send(DownloadEvent::Completed(outcome));
                        });
                        next_event(rx).await
                    }
                    StreamState::Running(rx) => next_event(rx).await,
                    StreamState::Finished => None,
                }
            },
        )
        .boxed()
    }
}

enum StreamState {
    Start {
        orchestrator: DownloadOrchestrator,
        request: DownloadRequest,
        cancel: CancellationToken,
    },
    Running(UnboundedReceiver<DownloadEvent>),
    Finished,
}

async fn next_event(
    mut rx: UnboundedReceiver<DownloadEvent>,
) -> Option<(DownloadEvent, StreamState)> {
    match rx.recv().await {
        Some(event @ DownloadEvent::Completed(_)) => Some((event, StreamState::Finished)),
        Some(event) => Some((event, StreamState::Running(rx))),
        None => Some((
            DownloadEvent::Completed(DownloadOutcome::failed(AppError::Unexpected(
                "download task ended without a result".to_string(),
            ))),
            StreamState::Finished,
        )),
    }
}

fn validate(request: &DownloadRequest) -> Result<String, AppError> {
    let video_id = extract_video_id(&request.url)
        .ok_or_else(|| AppError::InvalidInput(request.url.trim().to_string()))?;

    if let Some(section) = request.section {
        if !section.is_valid() {
            return Err(AppError::InvalidInput(format!(
                "clip end ({}) must be after start ({})",
                section.end_secs, section.start_secs
            )));
        }
    }

    Ok(video_id)
}

fn fetch_error(error: FetchError) -> AppError {
    match error {
        FetchError::Cancelled => AppError::Cancelled,
        other => AppError::FetchFailed(other.to_string()),
    }
}

/// Best-effort: a leftover working directory is logged, never escalated.
fn remove_work_dir(work_dir: TempDir) {
    let path = work_dir.path().to_path_buf();
    if let Err(e) = work_dir.close() {
        warn!(path = %path.display(), error = %e, "failed to remove working directory");
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic during download".to_string())
}
