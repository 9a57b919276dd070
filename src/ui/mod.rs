use iced::{
    widget::{button, column, progress_bar, row, text, text_input, Space},
    Element, Length,
};
use std::path::PathBuf;

use crate::domain::ClipSection;

/// Main view state
pub struct DownloadView {
    pub youtube_url: String,
    pub clip_start: String,
    pub clip_end: String,
    pub destination: PathBuf,
    pub status_message: String,
    pub is_downloading: bool,
    /// `None` while the total size is unknown.
    pub download_progress: Option<f32>,
    pub saved_file: Option<PathBuf>,
}

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            youtube_url: String::new(),
            clip_start: String::new(),
            clip_end: String::new(),
            destination: PathBuf::from("."),
            status_message: "Enter a YouTube URL to download".to_string(),
            is_downloading: false,
            download_progress: None,
            saved_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    ClipStartChanged(String),
    ClipEndChanged(String),
    ChooseFolderPressed,
    DownloadPressed,
    CancelPressed,
    SaveCopyPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => {
                self.youtube_url = url;
            }
            DownloadMessage::ClipStartChanged(value) => {
                self.clip_start = value;
            }
            DownloadMessage::ClipEndChanged(value) => {
                self.clip_end = value;
            }
            DownloadMessage::ChooseFolderPressed
            | DownloadMessage::DownloadPressed
            | DownloadMessage::CancelPressed
            | DownloadMessage::SaveCopyPressed => {
                // Will be handled by the app
            }
        }
    }

    /// Optional clip bounds from the two seconds fields.
    pub fn clip_section(&self) -> Result<Option<ClipSection>, String> {
        let start = self.clip_start.trim();
        let end = self.clip_end.trim();
        if start.is_empty() && end.is_empty() {
            return Ok(None);
        }
        if start.is_empty() || end.is_empty() {
            return Err("Enter both a clip start and end, or neither".to_string());
        }

        let parse = |value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| format!("Not a number of seconds: {}", value))
        };
        Ok(Some(ClipSection {
            start_secs: parse(start)?,
            end_secs: parse(end)?,
        }))
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let idle = !self.is_downloading;

        let progress: Element<'_, DownloadMessage> = match (self.is_downloading, self.download_progress) {
            (true, Some(fraction)) => progress_bar(0.0..=1.0, fraction).into(),
            (true, None) => text("Working...").size(14).into(),
            (false, _) => Space::new().height(Length::Fixed(0.0)).into(),
        };

        column![
            text("Video Downloader").size(32),
            Space::new().height(Length::Fixed(20.0)),
            text("YouTube URL:").size(16),
            text_input("https://www.youtube.com/watch?v=...", &self.youtube_url)
                .on_input(DownloadMessage::UrlChanged)
                .on_submit(DownloadMessage::DownloadPressed)
                .padding(10),
            row![
                text_input("Clip start (s)", &self.clip_start)
                    .on_input(DownloadMessage::ClipStartChanged)
                    .padding(10),
                text_input("Clip end (s)", &self.clip_end)
                    .on_input(DownloadMessage::ClipEndChanged)
                    .padding(10),
            ]
            .spacing(10),
            row![
                text(format!("Save to: {}", self.destination.display())).size(14),
                button("Choose folder")
                    .on_press_maybe(idle.then_some(DownloadMessage::ChooseFolderPressed))
                    .padding([6, 12]),
            ]
            .spacing(10),
            Space::new().height(Length::Fixed(10.0)),
            progress,
            text(&self.status_message).size(14),
            Space::new().height(Length::Fixed(20.0)),
            row![
                button("Download Video")
                    .on_press_maybe(idle.then_some(DownloadMessage::DownloadPressed))
                    .padding([10, 20]),
                button("Cancel")
                    .on_press_maybe(self.is_downloading.then_some(DownloadMessage::CancelPressed))
                    .padding([10, 20]),
                button("Save a copy...")
                    .on_press_maybe(
                        (idle && self.saved_file.is_some()).then_some(DownloadMessage::SaveCopyPressed)
                    )
                    .padding([10, 20]),
            ]
            .spacing(10),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}
