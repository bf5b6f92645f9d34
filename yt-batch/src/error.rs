//! The errors that can occur, and the failure taxonomy driving retries.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The possible errors that can occur.
#[derive(Debug, Error)]
pub enum Error {
    /// An error occurred while running the runtime.
    #[error("An error occurred while running the runtime: {0}")]
    Runtime(#[from] tokio::task::JoinError),
    /// An error occurred while interacting with the file system.
    #[error("An IO error occurred: {0}")]
    IO(#[from] std::io::Error),
    /// An error occurred while parsing JSON.
    #[error("An error occurred while parsing JSON: {0}")]
    Serde(#[from] serde_json::Error),

    /// An error occurred while running a command.
    #[error("Failed to execute command: {0}")]
    Command(String),
    /// A required executable was not found on the path.
    #[error("Executable not found: {0}")]
    MissingExecutable(String),
    /// An error occurred due to a timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    /// The operation was abandoned after a cancellation signal.
    #[error("Operation was cancelled")]
    Cancelled,
    /// An error occurred manipulating a path.
    #[error("An invalid path was provided: {0}")]
    Path(String),

    /// The playlist could not be enumerated because the service was unreachable.
    #[error("Failed to reach the remote service: {0}")]
    PlaylistNetwork(String),
    /// The playlist exists but cannot be accessed.
    #[error("Playlist is private or unavailable: {0}")]
    PlaylistUnavailable(String),
    /// The playlist was enumerated but contained no usable entries.
    #[error("No videos found in playlist")]
    EmptyPlaylist,
}

/// The taxonomy bucket a download failure is sorted into.
///
/// Categories drive the retry limits and backoff parameters of the
/// [`retry`](crate::retry) module, and carry a remediation hint that a
/// presentation layer can show next to a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The remote service challenged the request as automated access.
    BotDetection,
    /// HTTP 429 or equivalent throttling.
    RateLimit,
    /// Connection, timeout or DNS failure while talking to the service.
    NetworkError,
    /// The video is private, deleted or region-blocked. Never retried.
    VideoUnavailable,
    /// Post-download muxing failed, usually because ffmpeg is missing.
    MergeFailed,
    /// The local watchdog expired before the process finished.
    Timeout,
    /// The caller aborted the attempt.
    Cancelled,
    /// Everything that did not match a known pattern.
    Generic,
}

impl ErrorCategory {
    /// Sorts a failure's diagnostic text into a category.
    ///
    /// Matching is case-insensitive and checked in priority order, first
    /// match wins. Unrecognized text falls through to [`Self::Generic`].
    pub fn classify(diagnostic: &str) -> Self {
        let text = diagnostic.to_lowercase();

        if text.contains("sign in") || text.contains("bot") || text.contains("verification") {
            return Self::BotDetection;
        }
        if text.contains("429") || text.contains("too many requests") {
            return Self::RateLimit;
        }
        if text.contains("connection refused")
            || text.contains("timed out")
            || text.contains("timeout")
            || text.contains("unreachable")
            || text.contains("connection reset")
        {
            return Self::NetworkError;
        }
        if text.contains("merge") || text.contains("ffmpeg") {
            return Self::MergeFailed;
        }
        if text.contains("video unavailable")
            || text.contains("private video")
            || text.contains("not available in your country")
            || text.contains("removed by the uploader")
        {
            return Self::VideoUnavailable;
        }

        Self::Generic
    }

    /// Whether the condition behind this category cannot change between
    /// attempts, making a retry pointless.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::VideoUnavailable | Self::Cancelled)
    }

    /// A short remediation hint suitable for display next to a failure.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::BotDetection => "Authenticate with --cookies-from-browser and try again",
            Self::RateLimit => "Wait a few minutes or reduce the number of workers",
            Self::NetworkError => "Check your internet connection",
            Self::VideoUnavailable => "The video is private, deleted or region-blocked",
            Self::MergeFailed => "Install ffmpeg and make sure it is on your PATH",
            Self::Timeout => "The download exceeded its time limit, try a lower quality",
            Self::Cancelled => "The download was interrupted",
            Self::Generic => "Re-run with --verbosity debug for the full yt-dlp output",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BotDetection => "bot_detection",
            Self::RateLimit => "rate_limit",
            Self::NetworkError => "network_error",
            Self::VideoUnavailable => "video_unavailable",
            Self::MergeFailed => "merge_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Generic => "generic",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bot_detection_first() {
        let text = "ERROR: Sign in to confirm you're not a bot";
        assert_eq!(ErrorCategory::classify(text), ErrorCategory::BotDetection);
    }

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(
            ErrorCategory::classify("HTTP Error 429: Too Many Requests"),
            ErrorCategory::RateLimit
        );
    }

    #[test]
    fn classifies_network_errors() {
        for text in [
            "Connection refused by remote host",
            "read operation timed out",
            "network is unreachable",
        ] {
            assert_eq!(ErrorCategory::classify(text), ErrorCategory::NetworkError);
        }
    }

    #[test]
    fn classifies_merge_failures() {
        assert_eq!(
            ErrorCategory::classify("ERROR: ffmpeg not found, cannot merge formats"),
            ErrorCategory::MergeFailed
        );
    }

    #[test]
    fn classifies_unavailable_videos_as_permanent() {
        let category = ErrorCategory::classify("ERROR: Video unavailable");
        assert_eq!(category, ErrorCategory::VideoUnavailable);
        assert!(category.is_permanent());
    }

    #[test]
    fn unknown_text_is_generic() {
        let category = ErrorCategory::classify("something completely different");
        assert_eq!(category, ErrorCategory::Generic);
        assert!(!category.is_permanent());
    }

    #[test]
    fn priority_order_picks_rate_limit_over_network() {
        // "429 ... timed out" matches both tables, rate_limit is checked first.
        let text = "HTTP 429 after request timed out";
        assert_eq!(ErrorCategory::classify(text), ErrorCategory::RateLimit);
    }
}
