use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Longest file name stem we hand to the file system, in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

/// Byte ceiling for a stem, leaving room for a ` (n)` suffix and extension
/// under the common 255-byte file name limit.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Host markers that identify a supported video host.
const HOST_MARKERS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid video id pattern"));

/// Sanitize filename to remove invalid characters
///
/// Illegal characters become `_`, surrounding whitespace and dots are
/// trimmed, and the result is capped at [`MAX_FILENAME_CHARS`] characters
/// and [`MAX_FILENAME_BYTES`] bytes. Applying it twice yields the same string.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();

    cap_name(trim_name(&cleaned), MAX_FILENAME_CHARS, MAX_FILENAME_BYTES)
}

/// Cut `name` to at most `max_chars` characters and `max_bytes` UTF-8 bytes,
/// on a character boundary, then trim the cut end again.
pub fn cap_name(name: &str, max_chars: usize, max_bytes: usize) -> String {
    let mut end = 0;
    for (count, (idx, c)) in name.char_indices().enumerate() {
        if count == max_chars || idx + c.len_utf8() > max_bytes {
            break;
        }
        end = idx + c.len_utf8();
    }
    trim_name(&name[..end]).to_string()
}

fn trim_name(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

/// True when the URL's host contains one of the recognized video host markers.
pub fn is_recognized_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| {
            let host = host.to_ascii_lowercase();
            HOST_MARKERS.iter().any(|marker| host.contains(marker))
        })
        .unwrap_or(false)
}

/// Extract the video ID from the usual YouTube URL shapes.
pub fn extract_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || !is_recognized_host(&url) {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host.contains("youtu.be") {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
            _ => None,
        }
    }?;

    VIDEO_ID_RE.is_match(&candidate).then_some(candidate)
}

/// Canonical watch URL for a video ID, without timestamps or playlist context.
pub fn canonical_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// MIME type offered alongside a finished file.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test/file.mp3"), "test_file.mp3");
        assert_eq!(sanitize_filename("normal-name.mp3"), "normal-name.mp3");
        assert_eq!(sanitize_filename(r#"a<b>c:d"e\f|g?h*i"#), "a_b_c_d_e_f_g_h_i");
    }

    #[test]
    fn test_sanitize_trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  ..My Video.. "), "My Video");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_FILENAME_CHARS);

        // Cut lands on a space: the trailing space must not survive.
        let tricky = format!("{} tail", "y".repeat(MAX_FILENAME_CHARS - 1));
        let once = sanitize_filename(&tricky);
        assert!(!once.ends_with(' '));
        assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn test_sanitize_caps_bytes_for_wide_titles() {
        let cjk = "日本語のタイトル".repeat(30);
        let once = sanitize_filename(&cjk);
        assert!(once.len() <= MAX_FILENAME_BYTES);
        assert!(once.chars().count() <= MAX_FILENAME_CHARS);
        // Three bytes per character: 66 characters fit in 200 bytes.
        assert_eq!(once.chars().count(), 66);
        assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn test_cap_name() {
        assert_eq!(cap_name("abcdef", 3, 100), "abc");
        assert_eq!(cap_name("héllo", 10, 2), "h");
        assert_eq!(cap_name("ab  cd", 4, 100), "ab");
        assert_eq!(cap_name("short", 10, 100), "short");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let titles = [
            "Rick Astley - Never Gonna Give You Up (Official Music Video)",
            "what? / why: <now>",
            " . weird .. ",
            "tab\there",
            "日本語のタイトル | 公式",
            "",
        ];
        for title in titles {
            let once = sanitize_filename(title);
            assert_eq!(sanitize_filename(&once), once, "title: {title:?}");
            assert!(once.chars().count() <= MAX_FILENAME_CHARS);
            assert!(!once.contains(['<', '>', ':', '"', '/', '\\', '|', '?', '*']));
        }
    }

    #[test]
    fn test_extract_video_id_shapes() {
        assert_eq!(
            extract_video_id("https://youtu.be/abc123XYZ_").as_deref(),
            Some("abc123XYZ_")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=3c-iBn73dDE&t=30s").as_deref(),
            Some("3c-iBn73dDE")
        );
        assert_eq!(
            extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://m.youtube.com/embed/dQw4w9WgXcQ?start=3").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_extract_video_id_rejects() {
        assert_eq!(extract_video_id("not-a-url"), None);
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
        assert_eq!(extract_video_id("ftp://youtube.com/watch?v=abc"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/channel/UC123"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=bad%20id"), None);
    }

    #[test]
    fn test_canonical_watch_url() {
        assert_eq!(
            canonical_watch_url("3c-iBn73dDE"),
            "https://www.youtube.com/watch?v=3c-iBn73dDE"
        );
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("mp4"), "video/mp4");
        assert_eq!(mime_for_extension("MP4"), "video/mp4");
        assert_eq!(mime_for_extension("webm"), "video/webm");
        assert_eq!(mime_for_extension("bin"), "application/octet-stream");
    }
}
