//! The data model for download batches.

use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The lifecycle state of one unit of work.
///
/// Only the scheduler and the process runner mutate this, never a
/// presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Not yet handed to a worker.
    #[default]
    Pending,
    /// An attempt is currently in flight.
    Downloading,
    /// A terminal successful download.
    Succeeded,
    /// A terminal failure, after retries were exhausted or skipped.
    Failed,
}

/// One unit of work, a single video to be downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoItem {
    /// The opaque service identifier, unique per service.
    pub id: String,
    /// The canonical fetchable URL, derived from the identifier.
    pub url: String,
    /// The display name. May contain characters unsafe for paths.
    pub title: String,
    /// The duration in seconds, `0` when unknown.
    #[serde(default)]
    pub duration_seconds: u64,
    /// The 1-based position within the list the item came from.
    /// Absent for single-video downloads.
    #[serde(default)]
    pub index: Option<u32>,
    /// The current lifecycle state.
    #[serde(default)]
    pub status: VideoStatus,
}

impl VideoItem {
    /// Creates a standalone item for a single-video download.
    pub fn single(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            duration_seconds: 0,
            index: None,
            status: VideoStatus::Pending,
        }
    }
}

/// The immutable result of driving one item to a terminal state.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// The item the outcome refers to, carrying its terminal status.
    pub item: VideoItem,
    /// Whether the download completed.
    pub success: bool,
    /// The failure category, `None` on success.
    pub category: Option<ErrorCategory>,
    /// Captured process output relevant to the failure, empty on success.
    pub diagnostic: String,
    /// How many attempts were consumed.
    pub attempts_used: u32,
}

impl DownloadOutcome {
    /// Records a successful download.
    pub fn succeeded(mut item: VideoItem, attempts_used: u32) -> Self {
        item.status = VideoStatus::Succeeded;
        Self {
            item,
            success: true,
            category: None,
            diagnostic: String::new(),
            attempts_used,
        }
    }

    /// Records a terminal failure.
    pub fn failed(
        mut item: VideoItem,
        category: ErrorCategory,
        diagnostic: impl Into<String>,
        attempts_used: u32,
    ) -> Self {
        item.status = VideoStatus::Failed;
        Self {
            item,
            success: false,
            category: Some(category),
            diagnostic: diagnostic.into(),
            attempts_used,
        }
    }
}

/// Playlist-level metadata plus the ordered member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    /// The playlist title, `"Unknown Playlist"` when it could not be resolved.
    pub title: String,
    /// The playlist creator, `"Unknown Creator"` when it could not be resolved.
    pub creator: String,
    /// The summed duration of all members, in seconds.
    pub total_duration_seconds: u64,
    /// The members in playlist order, with `index` fields `1..=N`.
    pub videos: Vec<VideoItem>,
}

/// An event emitted while a batch is progressing.
///
/// Consumed by whichever presentation layer is attached; the orchestration
/// core never renders anything itself.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An item was handed to a worker and its first attempt started.
    Started {
        /// The stable display index, `None` for single downloads.
        index: Option<u32>,
        /// The item title.
        title: String,
    },
    /// The external tool reported a download percentage.
    ///
    /// Percentages are monotonically non-decreasing per item.
    Percent {
        /// The stable display index, `None` for single downloads.
        index: Option<u32>,
        /// The clamped percentage, `0.0..=100.0`.
        percent: f64,
    },
    /// An attempt failed and the item will be retried after a delay.
    Retrying {
        /// The stable display index, `None` for single downloads.
        index: Option<u32>,
        /// The attempt number that just failed, 1-based.
        attempt: u32,
        /// The category the failure was sorted into.
        category: ErrorCategory,
        /// How long the worker will wait before the next attempt.
        delay: Duration,
    },
    /// An item reached a terminal state.
    Finished {
        /// The stable display index, `None` for single downloads.
        index: Option<u32>,
        /// Whether the item succeeded.
        success: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_items_start_pending() {
        let item = VideoItem::single("abc123def45", "https://example.com", "A Title");
        assert_eq!(item.status, VideoStatus::Pending);
        assert!(item.index.is_none());
    }

    #[test]
    fn outcomes_carry_terminal_status() {
        let item = VideoItem::single("abc123def45", "https://example.com", "A Title");

        let ok = DownloadOutcome::succeeded(item.clone(), 2);
        assert!(ok.success);
        assert_eq!(ok.item.status, VideoStatus::Succeeded);
        assert_eq!(ok.attempts_used, 2);
        assert!(ok.diagnostic.is_empty());

        let bad = DownloadOutcome::failed(item, ErrorCategory::Generic, "boom", 3);
        assert!(!bad.success);
        assert_eq!(bad.item.status, VideoStatus::Failed);
        assert_eq!(bad.category, Some(ErrorCategory::Generic));
    }
}
