//! Builders for yt-dlp argument vectors.
//!
//! Everything in this module is pure construction: no process is spawned
//! and no path is touched. The [`executor`](crate::executor) runs whatever
//! is built here.

use std::path::{Path, PathBuf};

/// The user agent sent when no browser cookies are available.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// The alternate-client negotiation hint paired with the user agent.
const EXTRACTOR_CLIENT_HINT: &str = "youtube:player_client=android,web";

/// Assembles the argument vector for one download invocation.
///
/// The builder always requests a merged mp4 container, filesystem-safe
/// filenames and line-buffered progress output. Authentication is either a
/// named browser's stored cookies or the anti-bot header set, never both.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    url: String,
    output_dir: PathBuf,
    format_expression: String,
    cookies_browser: Option<String>,
    ffmpeg_location: Option<PathBuf>,
    index: Option<u32>,
}

impl CommandBuilder {
    /// Creates a builder for the given video URL, output directory and
    /// resolved format expression.
    pub fn new(
        url: impl Into<String>,
        output_dir: impl AsRef<Path>,
        format_expression: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.as_ref().to_path_buf(),
            format_expression: format_expression.into(),
            cookies_browser: None,
            ffmpeg_location: None,
            index: None,
        }
    }

    /// Authenticates with the named browser's stored cookies instead of the
    /// anti-bot header set.
    pub fn with_cookies_browser(mut self, browser: Option<String>) -> Self {
        self.cookies_browser = browser;
        self
    }

    /// Points yt-dlp at a specific ffmpeg binary for the merge step.
    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    /// Prefixes the output filename with a zero-padded index so parallel
    /// batch downloads sort into playlist order on disk.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Builds the ordered argument vector.
    pub fn build(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format_expression.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            self.output_template(),
            "--restrict-filenames".to_string(),
            "--newline".to_string(),
            "--no-warnings".to_string(),
        ];

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().to_string());
        }

        append_auth_args(&mut args, self.cookies_browser.as_deref());
        args.push(self.url.clone());
        args
    }

    /// The output path template handed to `-o`.
    ///
    /// Batch items embed the video id so two identically-titled videos in
    /// one playlist cannot overwrite each other.
    fn output_template(&self) -> String {
        let filename = match self.index {
            Some(index) => format!("{:03} - %(title)s [%(id)s].%(ext)s", index),
            None => "%(title)s.%(ext)s".to_string(),
        };

        self.output_dir.join(filename).to_string_lossy().to_string()
    }
}

/// The argument vector for the format availability probe.
pub fn list_formats_args(url: &str, cookies_browser: Option<&str>) -> Vec<String> {
    let mut args = vec!["--list-formats".to_string(), "--no-warnings".to_string()];
    append_auth_args(&mut args, cookies_browser);
    args.push(url.to_string());
    args
}

/// The argument vector for flat/metadata-only playlist enumeration, one
/// JSON object per output line.
pub fn flat_playlist_args(url: &str) -> Vec<String> {
    vec![
        "--flat-playlist".to_string(),
        "--dump-json".to_string(),
        url.to_string(),
    ]
}

/// The argument vector for a playlist-level metadata probe.
///
/// `field` is a playlist attribute such as `title` or `uploader`; the value
/// is printed once instead of once per member.
pub fn playlist_field_args(url: &str, field: &str) -> Vec<String> {
    vec![
        "--flat-playlist".to_string(),
        "--no-warnings".to_string(),
        "--print".to_string(),
        format!("playlist:{}", field),
        url.to_string(),
    ]
}

fn append_auth_args(args: &mut Vec<String>, cookies_browser: Option<&str>) {
    match cookies_browser {
        Some(browser) => {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.to_string());
        }
        None => {
            args.push("--user-agent".to_string());
            args.push(DESKTOP_USER_AGENT.to_string());
            args.push("--extractor-args".to_string());
            args.push(EXTRACTOR_CLIENT_HINT.to_string());
            args.push("--no-check-certificate".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CommandBuilder {
        CommandBuilder::new(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "/tmp/out",
            "bestvideo+bestaudio/best",
        )
    }

    #[test]
    fn download_args_request_merged_mp4_and_safe_filenames() {
        let args = builder().build();

        assert_eq!(args[0], "-f");
        assert_eq!(args[1], "bestvideo+bestaudio/best");
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"mp4".to_string()));
        assert!(args.contains(&"--restrict-filenames".to_string()));
        assert_eq!(
            args.last().unwrap(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }

    #[test]
    fn index_prefix_is_zero_padded_and_carries_id() {
        let args = builder().with_index(7).build();
        let template = args
            .iter()
            .position(|a| a == "-o")
            .map(|i| &args[i + 1])
            .unwrap();

        assert!(template.contains("007 - "));
        assert!(template.contains("[%(id)s]"));
    }

    #[test]
    fn single_downloads_have_no_prefix() {
        let args = builder().build();
        let template = args
            .iter()
            .position(|a| a == "-o")
            .map(|i| &args[i + 1])
            .unwrap();

        assert!(template.ends_with("%(title)s.%(ext)s"));
        assert!(!template.contains(" - "));
    }

    #[test]
    fn cookie_auth_excludes_anti_bot_headers() {
        let args = builder()
            .with_cookies_browser(Some("firefox".to_string()))
            .build();

        assert!(args.contains(&"--cookies-from-browser".to_string()));
        assert!(args.contains(&"firefox".to_string()));
        assert!(!args.contains(&"--user-agent".to_string()));
        assert!(!args.contains(&"--no-check-certificate".to_string()));
    }

    #[test]
    fn default_auth_is_the_anti_bot_header_set() {
        let args = builder().build();

        assert!(!args.contains(&"--cookies-from-browser".to_string()));
        assert!(args.contains(&"--user-agent".to_string()));
        assert!(args.contains(&DESKTOP_USER_AGENT.to_string()));
        assert!(args.contains(&"--extractor-args".to_string()));
        assert!(args.contains(&"--no-check-certificate".to_string()));
    }

    #[test]
    fn ffmpeg_location_is_forwarded() {
        let args = builder()
            .with_ffmpeg_location(Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")))
            .build();
        let location = args
            .iter()
            .position(|a| a == "--ffmpeg-location")
            .map(|i| &args[i + 1])
            .unwrap();

        assert_eq!(location, "/opt/ffmpeg/bin/ffmpeg");
    }

    #[test]
    fn probe_args_are_metadata_only() {
        let args = list_formats_args("https://youtu.be/x", None);
        assert_eq!(args[0], "--list-formats");

        let args = flat_playlist_args("https://example.com/list");
        assert_eq!(args[0], "--flat-playlist");
        assert_eq!(args[1], "--dump-json");

        let args = playlist_field_args("https://example.com/list", "uploader");
        assert!(args.contains(&"playlist:uploader".to_string()));
    }
}
