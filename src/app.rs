use crate::application::{DownloadEvent, DownloadOrchestrator};
use crate::config::DownloaderConfig;
use crate::domain::{AppError, DownloadPhase, DownloadRequest, ProgressPhase};
use crate::ui::{DownloadMessage, DownloadView};
use crate::utils::mime_for_extension;
use futures::StreamExt;
use iced::Task;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct DownloadApp {
    view: DownloadView,
    orchestrator: DownloadOrchestrator,
    // Cancels the running download, if any
    active_download: Option<CancellationToken>,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new(DownloaderConfig::load())
    }
}

impl DownloadApp {
    pub fn new(config: DownloaderConfig) -> Self {
        let orchestrator = DownloadOrchestrator::from_config(&config);
        let view = DownloadView {
            destination: config.destination(),
            ..DownloadView::default()
        };

        Self {
            view,
            orchestrator,
            active_download: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    DestinationSelected(Option<PathBuf>),
    Download(DownloadEvent),
    /// (Source file, chosen copy target)
    CopyTargetSelected(PathBuf, Option<PathBuf>),
    CopyCompleted(Result<PathBuf, String>),
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                DownloadMessage::DownloadPressed if !app.view.is_downloading => {
                    return start_download(app);
                }
                DownloadMessage::CancelPressed => {
                    if let Some(token) = &app.active_download {
                        token.cancel();
                        app.view.status_message = "Cancelling...".to_string();
                    }
                }
                DownloadMessage::ChooseFolderPressed => {
                    return Task::perform(
                        async {
                            rfd::AsyncFileDialog::new()
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::DestinationSelected,
                    );
                }
                DownloadMessage::SaveCopyPressed => {
                    if let Some(source) = app.view.saved_file.clone() {
                        return offer_copy(source);
                    }
                }
                _ => {}
            }
        }
        Message::DestinationSelected(Some(dir)) => {
            app.view.destination = dir;
        }
        Message::DestinationSelected(None) => {}
        Message::Download(event) => apply_download_event(app, event),
        Message::CopyTargetSelected(source, Some(target)) => {
            app.view.status_message = format!("Copying to: {}", target.display());
            return Task::perform(
                async move {
                    tokio::fs::copy(&source, &target)
                        .await
                        .map(|_| target)
                        .map_err(|e| e.to_string())
                },
                Message::CopyCompleted,
            );
        }
        Message::CopyTargetSelected(_, None) => {
            app.view.status_message = "Copy cancelled".to_string();
        }
        Message::CopyCompleted(result) => match result {
            Ok(path) => {
                app.view.status_message = format!("Copied to: {}", path.display());
            }
            Err(e) => {
                warn!(error = %e, "copy failed");
                app.view.status_message = format!("Copy failed: {}", e);
            }
        },
    }
    Task::none()
}

fn start_download(app: &mut DownloadApp) -> Task<Message> {
    let url = app.view.youtube_url.trim().to_string();
    if url.is_empty() {
        app.view.status_message = "Please enter a valid YouTube URL.".to_string();
        return Task::none();
    }

    let section = match app.view.clip_section() {
        Ok(section) => section,
        Err(e) => {
            app.view.status_message = e;
            return Task::none();
        }
    };

    let mut request = DownloadRequest::new(url, app.view.destination.clone());
    if let Some(section) = section {
        request = request.with_section(section);
    }

    let cancel = CancellationToken::new();
    app.active_download = Some(cancel.clone());
    app.view.is_downloading = true;
    app.view.download_progress = None;
    app.view.saved_file = None;
    app.view.status_message = "Starting download...".to_string();

    Task::stream(
        app.orchestrator
            .download_stream(request, cancel)
            .map(Message::Download),
    )
}

fn apply_download_event(app: &mut DownloadApp, event: DownloadEvent) {
    match event {
        DownloadEvent::Phase(phase) => {
            let status = match phase {
                DownloadPhase::Validating => Some("Checking URL..."),
                DownloadPhase::Fetching => Some("Fetching video info..."),
                DownloadPhase::Verifying => Some("Verifying downloaded file..."),
                _ => None,
            };
            if let Some(status) = status {
                app.view.status_message = status.to_string();
            }
        }
        DownloadEvent::Progress { event, fraction } => {
            app.view.download_progress = fraction;
            app.view.status_message = match (event.phase, fraction) {
                (ProgressPhase::Extracting, _) => "Extracting video info...".to_string(),
                (ProgressPhase::Finished, _) => "Download complete, finalizing...".to_string(),
                (ProgressPhase::Downloading, Some(f)) => format!("Downloading: {:.1}%", f * 100.0),
                (ProgressPhase::Downloading, None) => match event.bytes_downloaded {
                    Some(bytes) => format!("Downloading: {:.1} MB", bytes as f64 / 1_048_576.0),
                    None => "Downloading...".to_string(),
                },
            };
        }
        DownloadEvent::Completed(outcome) => {
            app.view.is_downloading = false;
            app.active_download = None;
            app.view.download_progress = None;
            app.view.status_message = outcome.message.clone();
            if outcome.success {
                info!(path = ?outcome.file_path, "download ready");
                app.view.saved_file = outcome.file_path;
            } else if outcome.error == Some(AppError::Cancelled) {
                app.view.status_message = "Download cancelled; partial files were removed.".to_string();
            }
        }
    }
}

/// Let the user keep a copy of the finished file wherever they like.
fn offer_copy(source: PathBuf) -> Task<Message> {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    let filter_name = format!("{} ({})", extension.to_uppercase(), mime_for_extension(&extension));

    Task::perform(
        async move {
            let target = rfd::AsyncFileDialog::new()
                .set_file_name(&file_name)
                .add_filter(&filter_name, &[extension.as_str()])
                .save_file()
                .await
                .map(|handle| handle.path().to_path_buf());
            (source, target)
        },
        |(source, target)| Message::CopyTargetSelected(source, target),
    )
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}
