//! Fetch capability backed by the `yt-dlp` command line tool.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{FetchCapability, FetchError, FetchJob, FetchReport, ProgressCallback};
use crate::domain::ProgressEvent;
use crate::utils::MAX_FILENAME_CHARS;

const PROGRESS_MARKER: &str = "[vdl-progress]";
const TITLE_MARKER: &str = "[vdl-title]";
const FILE_MARKER: &str = "[vdl-file]";
const STDERR_TAIL_LINES: usize = 40;

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Optional replacement for yt-dlp's native downloader.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalDownloader {
    pub name: String,
    #[serde(default)]
    pub args: String,
}

/// Tool-level options passed to every yt-dlp invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct YtDlpOptions {
    /// yt-dlp executable; looked up on `PATH` when unset.
    pub binary: Option<PathBuf>,
    pub merge_output_format: String,
    pub output_template: String,
    pub retries: u32,
    pub fragment_retries: u32,
    pub concurrent_fragments: u32,
    /// Client identity headers sent with every request.
    pub http_headers: BTreeMap<String, String>,
    /// Arguments for the remux/transcode post-step, in yt-dlp's `NAME:ARGS` form.
    pub postprocessor_args: Option<String>,
    pub ffmpeg_location: Option<PathBuf>,
    pub external_downloader: Option<ExternalDownloader>,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        let mut http_headers = BTreeMap::new();
        http_headers.insert("User-Agent".to_string(), CHROME_UA.to_string());
        http_headers.insert(
            "Accept-Language".to_string(),
            "en-US,en;q=0.9".to_string(),
        );

        Self {
            binary: None,
            merge_output_format: "mp4".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
            retries: 3,
            fragment_retries: 5,
            concurrent_fragments: 5,
            http_headers,
            postprocessor_args: Some("Merger+ffmpeg_o:-c:v copy -c:a aac".to_string()),
            ffmpeg_location: None,
            external_downloader: Some(ExternalDownloader {
                name: "aria2c".to_string(),
                args: "-x 16 -s 16 -k 1M".to_string(),
            }),
        }
    }
}

pub struct YtDlpFetcher {
    binary: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    external_downloader: Option<(PathBuf, String)>,
    options: YtDlpOptions,
}

impl YtDlpFetcher {
    /// Resolve the tool binaries and build a fetcher.
    ///
    /// Missing optional tools are logged and left out of the invocation.
    pub fn new(options: YtDlpOptions) -> Self {
        let binary = options
            .binary
            .clone()
            .or_else(|| which::which("yt-dlp").ok())
            .unwrap_or_else(|| {
                warn!("yt-dlp not found in PATH, relying on the bare command name");
                PathBuf::from("yt-dlp")
            });

        let ffmpeg_location = options
            .ffmpeg_location
            .clone()
            .or_else(|| which::which("ffmpeg").ok());
        if ffmpeg_location.is_none() {
            warn!("ffmpeg not found; separate audio/video streams cannot be merged");
        }

        let external_downloader = options.external_downloader.as_ref().and_then(|ext| {
            match which::which(&ext.name) {
                Ok(path) => Some((path, ext.args.clone())),
                Err(_) => {
                    warn!(
                        downloader = %ext.name,
                        "external downloader not found, using the native downloader"
                    );
                    None
                }
            }
        });

        info!(binary = %binary.display(), "using yt-dlp");

        Self {
            binary,
            ffmpeg_location,
            external_downloader,
            options,
        }
    }

    fn build_args(&self, job: &FetchJob) -> Vec<String> {
        let opts = &self.options;
        let output_template = job.output_dir.join(&opts.output_template);

        let mut args = vec![
            "-f".to_string(),
            job.format.clone(),
            "--merge-output-format".to_string(),
            opts.merge_output_format.clone(),
            "-o".to_string(),
            output_template.to_string_lossy().into_owned(),
            "--retries".to_string(),
            opts.retries.to_string(),
            "--fragment-retries".to_string(),
            opts.fragment_retries.to_string(),
            "--concurrent-fragments".to_string(),
            opts.concurrent_fragments.max(1).to_string(),
            "--trim-filenames".to_string(),
            MAX_FILENAME_CHARS.to_string(),
            "--no-playlist".to_string(),
            "--no-mtime".to_string(),
            "--no-warnings".to_string(),
        ];

        for (name, value) in &opts.http_headers {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        if let Some(pp_args) = &opts.postprocessor_args {
            args.push("--postprocessor-args".to_string());
            args.push(pp_args.clone());
        }

        if let Some(ffmpeg) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        if let Some((downloader, downloader_args)) = &self.external_downloader {
            args.push("--downloader".to_string());
            args.push(downloader.to_string_lossy().into_owned());
            if !downloader_args.is_empty() {
                let name = downloader
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                args.push("--downloader-args".to_string());
                args.push(format!("{}:{}", name, downloader_args));
            }
        }

        if let Some(section) = job.section {
            args.push("--download-sections".to_string());
            args.push(format!("*{}-{}", section.start_secs, section.end_secs));
            args.push("--force-keyframes-at-cuts".to_string());
        }

        // --print implies --quiet; --progress keeps the progress lines coming.
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-simulate".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                PROGRESS_MARKER
            ),
            "--print".to_string(),
            format!("before_dl:{} %(title)s", TITLE_MARKER),
            "--print".to_string(),
            format!("after_move:{} %(filepath)s", FILE_MARKER),
        ]);

        args.push(job.url.clone());
        args
    }
}

#[async_trait]
impl FetchCapability for YtDlpFetcher {
    async fn fetch(
        &self,
        job: &FetchJob,
        progress: ProgressCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let args = self.build_args(job);
        debug!(?args, "spawning yt-dlp");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                tool: self.binary.display().to_string(),
                source,
            })?;

        progress(ProgressEvent::extracting());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Failed("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Failed("yt-dlp stderr unavailable".to_string()))?;

        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let mut report = FetchReport::default();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        // read_until keeps partial bytes in the buffer when another branch wins,
        // so the buffers live across iterations and are only cleared per line.
        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    kill_child(&mut child).await;
                    return Err(FetchError::Cancelled);
                }
                read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => {
                    stdout_open = read_continues(read, "stdout");
                    if let Some(line) = take_line(&mut stdout_buf, stdout_open) {
                        apply_line(&line, &mut report, progress);
                    }
                }
                read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => {
                    stderr_open = read_continues(read, "stderr");
                    if let Some(line) = take_line(&mut stderr_buf, stderr_open) {
                        if !apply_line(&line, &mut report, progress) {
                            if stderr_tail.len() == STDERR_TAIL_LINES {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(line);
                        }
                    }
                }
            }
        }

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let status = match exited {
            Some(status) => status
                .map_err(|e| FetchError::Failed(format!("yt-dlp process failed: {}", e)))?,
            None => {
                kill_child(&mut child).await;
                return Err(FetchError::Cancelled);
            }
        };

        if status.success() {
            progress(ProgressEvent::finished());
            debug!(files = ?report.files, title = ?report.title, "yt-dlp finished");
            return Ok(report);
        }

        let stderr_text = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
        Err(classify_failure(&stderr_text))
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

async fn kill_child(child: &mut Child) {
    match child.kill().await {
        Ok(()) => info!("yt-dlp killed after cancellation"),
        Err(e) => warn!(error = %e, "failed to kill yt-dlp after cancellation"),
    }
}

/// False once the stream has ended or failed.
fn read_continues(read: std::io::Result<usize>, stream: &str) -> bool {
    match read {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            warn!(stream, error = %e, "stopped reading yt-dlp output");
            false
        }
    }
}

/// Take a finished line out of `buf`, decoding lossily.
///
/// A trailing fragment without a newline is only returned once the stream closed.
fn take_line(buf: &mut Vec<u8>, open: bool) -> Option<String> {
    if buf.is_empty() || (open && buf.last() != Some(&b'\n')) {
        return None;
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    Some(line)
}

/// A line of yt-dlp output we understand.
#[derive(Debug, PartialEq)]
enum ToolLine {
    Progress {
        downloaded: Option<u64>,
        total: Option<u64>,
    },
    Title(String),
    File(PathBuf),
}

/// Feed one output line into the report. Returns false for lines we don't recognize.
fn apply_line(line: &str, report: &mut FetchReport, progress: ProgressCallback<'_>) -> bool {
    match parse_line(line) {
        Some(ToolLine::Progress { downloaded, total }) => {
            trace!(?downloaded, ?total, "progress");
            progress(ProgressEvent::downloading(downloaded, total));
            true
        }
        Some(ToolLine::Title(title)) => {
            report.title = Some(title);
            true
        }
        Some(ToolLine::File(path)) => {
            report.files.push(path);
            true
        }
        None => false,
    }
}

fn parse_line(line: &str) -> Option<ToolLine> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.trim_start().strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.split_whitespace().map(parse_byte_count);
        let downloaded = fields.next().flatten();
        let total = fields.next().flatten();
        let estimate = fields.next().flatten();
        return Some(ToolLine::Progress {
            downloaded,
            total: total.or(estimate),
        });
    }

    if let Some(rest) = line.strip_prefix(TITLE_MARKER) {
        let title = rest.trim();
        return (!title.is_empty()).then(|| ToolLine::Title(title.to_string()));
    }

    if let Some(rest) = line.strip_prefix(FILE_MARKER) {
        let path = rest.trim();
        return (!path.is_empty()).then(|| ToolLine::File(PathBuf::from(path)));
    }

    None
}

/// yt-dlp prints `NA` for unknown fields and floats for estimates.
fn parse_byte_count(field: &str) -> Option<u64> {
    let value: f64 = field.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

fn classify_failure(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    let blocked = lower.contains("http error 403")
        || lower.contains("http error 429")
        || lower.contains("forbidden")
        || lower.contains("too many requests")
        || lower.contains("sign in to confirm");

    let message = last_error_line(stderr);
    if blocked {
        FetchError::Blocked(message)
    } else {
        FetchError::Failed(message)
    }
}

fn last_error_line(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.to_ascii_lowercase().starts_with("error"))
        .map(|l| {
            l.strip_prefix("ERROR:")
                .or_else(|| l.strip_prefix("error:"))
                .unwrap_or(l)
                .trim()
                .to_string()
        });

    match line {
        Some(line) if !line.is_empty() => line,
        _ => {
            let trimmed = stderr.trim();
            if trimmed.is_empty() {
                "yt-dlp exited with an error".to_string()
            } else {
                trimmed.chars().take(300).collect()
            }
        }
    }
}

/// Remove partial files left by an aborted attempt.
pub async fn cleanup_part_files(dir: &Path) {
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_partial_name(&name) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(file = %name, error = %e, "failed to remove partial file");
                }
            }
        }
    }
}

pub fn is_partial_name(name: &str) -> bool {
    name.ends_with(".part")
        || name.ends_with(".ytdl")
        || name.ends_with(".temp")
        || name.contains(".part-Frag")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClipSection;

    fn fetcher() -> YtDlpFetcher {
        YtDlpFetcher {
            binary: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            external_downloader: None,
            options: YtDlpOptions::default(),
        }
    }

    fn job() -> FetchJob {
        FetchJob {
            url: "https://www.youtube.com/watch?v=3c-iBn73dDE".to_string(),
            output_dir: PathBuf::from("/tmp/work"),
            format: "bestvideo+bestaudio/best".to_string(),
            section: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_build_args_core_options() {
        let args = fetcher().build_args(&job());
        assert_eq!(value_after(&args, "-f"), Some("bestvideo+bestaudio/best"));
        assert_eq!(value_after(&args, "--merge-output-format"), Some("mp4"));
        assert_eq!(value_after(&args, "--retries"), Some("3"));
        assert_eq!(value_after(&args, "--fragment-retries"), Some("5"));
        assert_eq!(value_after(&args, "--trim-filenames"), Some("200"));
        assert_eq!(
            value_after(&args, "-o"),
            Some("/tmp/work/%(title)s.%(ext)s")
        );
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=3c-iBn73dDE")
        );
        assert!(args.iter().any(|a| a.starts_with("User-Agent:Mozilla")));
        assert!(!args.contains(&"--download-sections".to_string()));
    }

    #[test]
    fn test_build_args_section_and_downloader() {
        let mut fetcher = fetcher();
        fetcher.external_downloader =
            Some((PathBuf::from("/usr/bin/aria2c"), "-x 16 -s 16 -k 1M".to_string()));
        let mut job = job();
        job.section = Some(ClipSection {
            start_secs: 30.0,
            end_secs: 45.0,
        });

        let args = fetcher.build_args(&job);
        assert_eq!(value_after(&args, "--download-sections"), Some("*30-45"));
        assert!(args.contains(&"--force-keyframes-at-cuts".to_string()));
        assert_eq!(value_after(&args, "--downloader"), Some("/usr/bin/aria2c"));
        assert_eq!(
            value_after(&args, "--downloader-args"),
            Some("aria2c:-x 16 -s 16 -k 1M")
        );
    }

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(
            parse_line("[vdl-progress] 1024 4096 NA"),
            Some(ToolLine::Progress {
                downloaded: Some(1024),
                total: Some(4096)
            })
        );
        assert_eq!(
            parse_line("[vdl-progress] 1024 NA 8000.5"),
            Some(ToolLine::Progress {
                downloaded: Some(1024),
                total: Some(8000)
            })
        );
        assert_eq!(
            parse_line("[vdl-progress] NA NA NA"),
            Some(ToolLine::Progress {
                downloaded: None,
                total: None
            })
        );
    }

    #[test]
    fn test_parse_manifest_lines() {
        assert_eq!(
            parse_line("[vdl-title] My Clip: Part 1"),
            Some(ToolLine::Title("My Clip: Part 1".to_string()))
        );
        assert_eq!(
            parse_line("[vdl-file] /tmp/work/My Clip_ Part 1.mp4"),
            Some(ToolLine::File(PathBuf::from("/tmp/work/My Clip_ Part 1.mp4")))
        );
        assert_eq!(parse_line("[vdl-file]   "), None);
        assert_eq!(parse_line("[youtube] 3c-iBn73dDE: Downloading webpage"), None);
    }

    #[test]
    fn test_apply_line_forwards_progress() {
        use std::sync::Mutex;

        let seen = Mutex::new(Vec::new());
        let callback = |event: ProgressEvent| seen.lock().unwrap().push(event);
        let mut report = FetchReport::default();

        assert!(apply_line("[vdl-progress] 10 100 NA", &mut report, &callback));
        assert!(apply_line("[vdl-file] /tmp/a.mp4", &mut report, &callback));
        assert!(!apply_line("random noise", &mut report, &callback));

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![ProgressEvent::downloading(Some(10), Some(100))]);
        assert_eq!(report.files, vec![PathBuf::from("/tmp/a.mp4")]);
    }

    #[test]
    fn test_classify_failure() {
        let blocked = classify_failure(
            "[youtube] abc: Downloading webpage\nERROR: unable to download video data: HTTP Error 403: Forbidden",
        );
        assert!(matches!(
            blocked,
            FetchError::Blocked(ref msg) if msg == "unable to download video data: HTTP Error 403: Forbidden"
        ));

        let failed = classify_failure("ERROR: [youtube] abc: Video unavailable");
        assert!(matches!(failed, FetchError::Failed(ref msg) if msg == "[youtube] abc: Video unavailable"));

        assert!(matches!(
            classify_failure(""),
            FetchError::Failed(ref msg) if msg == "yt-dlp exited with an error"
        ));
    }

    #[test]
    fn test_take_line_decodes_lossily() {
        let mut buf = b"WARNING: caf\xe9 title\r\n".to_vec();
        assert_eq!(
            take_line(&mut buf, true).as_deref(),
            Some("WARNING: caf\u{FFFD} title")
        );
        assert!(buf.is_empty());

        let mut partial = b"no newline yet".to_vec();
        assert_eq!(take_line(&mut partial, true), None);
        assert_eq!(take_line(&mut partial, false).as_deref(), Some("no newline yet"));
    }

    #[test]
    fn test_default_external_downloader() {
        assert_eq!(
            YtDlpOptions::default().external_downloader,
            Some(ExternalDownloader {
                name: "aria2c".to_string(),
                args: "-x 16 -s 16 -k 1M".to_string(),
            })
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;
        use std::time::Duration;
        use tempfile::TempDir;

        /// A stand-in yt-dlp that runs `body` and ignores its arguments.
        fn script_fetcher(dir: &TempDir, body: &str) -> YtDlpFetcher {
            let path = dir.path().join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            YtDlpFetcher {
                binary: path,
                ffmpeg_location: None,
                external_downloader: None,
                options: YtDlpOptions::default(),
            }
        }

        fn job_in(dir: &TempDir) -> FetchJob {
            FetchJob {
                output_dir: dir.path().to_path_buf(),
                ..job()
            }
        }

        #[tokio::test]
        async fn test_fetch_reports_files_and_progress() {
            let dir = TempDir::new().unwrap();
            let fetcher = script_fetcher(
                &dir,
                r#"echo "[vdl-title] My Clip"
echo "[youtube] 3c-iBn73dDE: Downloading webpage" >&2
echo "[vdl-progress] 512 1024 NA"
echo "[vdl-progress] 1024 1024 NA"
echo "[vdl-file] /tmp/work/My Clip.mp4"
exit 0"#,
            );

            let seen = Mutex::new(Vec::new());
            let callback = |event: ProgressEvent| seen.lock().unwrap().push(event);
            let report = fetcher
                .fetch(&job_in(&dir), &callback, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(report.title.as_deref(), Some("My Clip"));
            assert_eq!(report.files, vec![PathBuf::from("/tmp/work/My Clip.mp4")]);
            assert_eq!(
                seen.into_inner().unwrap(),
                vec![
                    ProgressEvent::extracting(),
                    ProgressEvent::downloading(Some(512), Some(1024)),
                    ProgressEvent::downloading(Some(1024), Some(1024)),
                    ProgressEvent::finished(),
                ]
            );
        }

        #[tokio::test]
        async fn test_fetch_nonzero_exit_is_blocked() {
            let dir = TempDir::new().unwrap();
            let fetcher = script_fetcher(
                &dir,
                r#"echo "ERROR: unable to download video data: HTTP Error 403: Forbidden" >&2
exit 1"#,
            );

            let result = fetcher
                .fetch(&job_in(&dir), &|_: ProgressEvent| {}, &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(FetchError::Blocked(ref msg)) if msg.contains("403")));
        }

        #[tokio::test]
        async fn test_fetch_survives_invalid_utf8() {
            let dir = TempDir::new().unwrap();
            let fetcher = script_fetcher(
                &dir,
                r#"printf 'WARNING: café title
' >&2
echo "ERROR: unable to download video data: HTTP Error 403: Forbidden" >&2
exit 1"#,
            );

            let result = fetcher
                .fetch(&job_in(&dir), &|_: ProgressEvent| {}, &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(FetchError::Blocked(ref msg)) if msg.contains("403")));
        }

        #[tokio::test]
        async fn test_fetch_failure_without_block_signal() {
            let dir = TempDir::new().unwrap();
            let fetcher = script_fetcher(
                &dir,
                r#"echo "ERROR: [youtube] abc: Video unavailable" >&2
exit 1"#,
            );

            let result = fetcher
                .fetch(&job_in(&dir), &|_: ProgressEvent| {}, &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(FetchError::Failed(ref msg)) if msg == "[youtube] abc: Video unavailable"));
        }

        #[tokio::test]
        async fn test_fetch_cancel_kills_process() {
            let dir = TempDir::new().unwrap();
            let fetcher = script_fetcher(&dir, "exec sleep 30");
            let cancel = CancellationToken::new();

            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let result = tokio::time::timeout(
                Duration::from_secs(5),
                fetcher.fetch(&job_in(&dir), &|_: ProgressEvent| {}, &cancel),
            )
            .await
            .expect("fetch should stop promptly after cancellation");
            assert!(matches!(result, Err(FetchError::Cancelled)));
        }

        #[tokio::test]
        async fn test_fetch_missing_binary() {
            let dir = TempDir::new().unwrap();
            let fetcher = YtDlpFetcher {
                binary: dir.path().join("does-not-exist"),
                ffmpeg_location: None,
                external_downloader: None,
                options: YtDlpOptions::default(),
            };

            let result = fetcher
                .fetch(&job_in(&dir), &|_: ProgressEvent| {}, &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(FetchError::Spawn { .. })));
        }
    }

    #[test]
    fn test_is_partial_name() {
        assert!(is_partial_name("video.mp4.part"));
        assert!(is_partial_name("video.f137.mp4.part-Frag12"));
        assert!(is_partial_name("video.mp4.ytdl"));
        assert!(!is_partial_name("video.mp4"));
    }
}
