//! Playlist enumeration in flat/metadata-only mode.
//!
//! The external tool is asked for one JSON object per member line; nothing
//! is downloaded. Malformed lines are tolerated and skipped so one broken
//! record never loses the rest of the playlist.

use crate::command;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::model::{PlaylistInfo, VideoItem, VideoStatus};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How long the flat enumeration may take.
const ENUMERATE_TIMEOUT: Duration = Duration::from_secs(120);
/// How long each playlist-level metadata probe may take.
const METADATA_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One line of the flat dump. Only the fields we consume are declared;
/// everything else in the record is ignored.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    playlist_title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
}

/// Enumerates a playlist without downloading anything.
///
/// Members come back in playlist order with `index` fields `1..=N`.
/// Playlist title and creator are resolved through separate metadata
/// probes, falling back to the first member record's playlist fields.
///
/// # Errors
///
/// Returns [`Error::PlaylistNetwork`] when the service was unreachable
/// (plausibly transient) and [`Error::PlaylistUnavailable`] when the
/// playlist itself is private or gone (permanent); other process failures
/// surface as [`Error::Command`].
pub async fn enumerate(yt_dlp: &Path, url: &str) -> Result<PlaylistInfo> {
    let executor = Executor {
        executable_path: yt_dlp.to_path_buf(),
        timeout: ENUMERATE_TIMEOUT,
        args: command::flat_playlist_args(url),
    };

    let output = match executor.execute().await {
        Ok(output) => output,
        Err(Error::Command(text)) => return Err(classify_enumeration_failure(&text)),
        Err(e) => return Err(e),
    };

    let parsed = parse_flat_dump(&output.stdout);
    log::info!("Found {} videos in playlist", parsed.videos.len());

    let title = match probe_playlist_field(yt_dlp, url, "title").await {
        Some(title) => title,
        None => parsed
            .playlist_title
            .unwrap_or_else(|| "Unknown Playlist".to_string()),
    };
    let creator = match probe_playlist_field(yt_dlp, url, "uploader").await {
        Some(creator) => creator,
        None => parsed
            .uploader
            .unwrap_or_else(|| "Unknown Creator".to_string()),
    };

    Ok(PlaylistInfo {
        title,
        creator,
        total_duration_seconds: parsed.total_duration_seconds,
        videos: parsed.videos,
    })
}

struct ParsedDump {
    videos: Vec<VideoItem>,
    total_duration_seconds: u64,
    playlist_title: Option<String>,
    uploader: Option<String>,
}

/// Parses the JSON-lines dump into ordered [`VideoItem`]s.
///
/// Malformed lines are skipped; well-formed lines keep their relative
/// order and receive indices `1..=N`.
fn parse_flat_dump(stdout: &str) -> ParsedDump {
    let mut videos = Vec::new();
    let mut total_duration_seconds = 0u64;
    let mut playlist_title = None;
    let mut uploader = None;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: FlatEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping malformed playlist line: {}", e);
                continue;
            }
        };

        if videos.is_empty() {
            playlist_title = entry.playlist_title.clone();
            uploader = entry.uploader.clone();
        }

        let duration = entry.duration.unwrap_or(0.0).max(0.0) as u64;
        total_duration_seconds += duration;

        let index = videos.len() as u32 + 1;
        videos.push(VideoItem {
            url: format!("https://www.youtube.com/watch?v={}", entry.id),
            title: entry.title.unwrap_or_else(|| "Unknown".to_string()),
            id: entry.id,
            duration_seconds: duration,
            index: Some(index),
            status: VideoStatus::Pending,
        });
    }

    ParsedDump {
        videos,
        total_duration_seconds,
        playlist_title,
        uploader,
    }
}

/// Sorts an enumeration failure into transient versus permanent.
fn classify_enumeration_failure(text: &str) -> Error {
    let lowered = text.to_lowercase();

    if lowered.contains("network")
        || lowered.contains("connection")
        || lowered.contains("timed out")
        || lowered.contains("unreachable")
        || lowered.contains("resolve")
    {
        return Error::PlaylistNetwork(text.to_string());
    }
    if lowered.contains("private")
        || lowered.contains("unavailable")
        || lowered.contains("does not exist")
    {
        return Error::PlaylistUnavailable(text.to_string());
    }

    Error::Command(text.to_string())
}

/// Resolves one playlist-level field through a metadata-only probe.
/// Returns `None` when the probe fails or prints nothing useful.
async fn probe_playlist_field(yt_dlp: &Path, url: &str, field: &str) -> Option<String> {
    let executor = Executor {
        executable_path: yt_dlp.to_path_buf(),
        timeout: METADATA_PROBE_TIMEOUT,
        args: command::playlist_field_args(url, field),
    };

    match executor.execute().await {
        Ok(output) => {
            let value = output.stdout.lines().next().unwrap_or("").trim();
            if value.is_empty() || value == "NA" {
                None
            } else {
                Some(value.to_string())
            }
        }
        Err(e) => {
            log::debug!("Playlist {} probe failed: {}", field, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = concat!(
        r#"{"id": "aaa11122233", "title": "First", "duration": 120.0, "playlist_title": "My Mix", "uploader": "Creator"}"#,
        "\n",
        "this line is not json\n",
        r#"{"id": "bbb11122233", "title": "Second", "duration": 60.5}"#,
        "\n",
        r#"{"broken": true}"#,
        "\n",
        r#"{"id": "ccc11122233", "duration": null}"#,
        "\n",
    );

    #[test]
    fn well_formed_lines_become_indexed_items() {
        let parsed = parse_flat_dump(DUMP);

        assert_eq!(parsed.videos.len(), 3);
        let indices: Vec<u32> = parsed.videos.iter().filter_map(|v| v.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(parsed.videos[0].title, "First");
        assert_eq!(parsed.videos[1].title, "Second");
        assert_eq!(parsed.videos[2].title, "Unknown");
        assert_eq!(
            parsed.videos[0].url,
            "https://www.youtube.com/watch?v=aaa11122233"
        );
    }

    #[test]
    fn malformed_lines_do_not_shift_order_or_count() {
        let parsed = parse_flat_dump(DUMP);
        let ids: Vec<&str> = parsed.videos.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa11122233", "bbb11122233", "ccc11122233"]);
    }

    #[test]
    fn durations_are_summed_with_unknowns_as_zero() {
        let parsed = parse_flat_dump(DUMP);
        assert_eq!(parsed.total_duration_seconds, 120 + 60);
    }

    #[test]
    fn playlist_fields_come_from_the_first_record() {
        let parsed = parse_flat_dump(DUMP);
        assert_eq!(parsed.playlist_title.as_deref(), Some("My Mix"));
        assert_eq!(parsed.uploader.as_deref(), Some("Creator"));
    }

    #[test]
    fn empty_dump_yields_no_items() {
        let parsed = parse_flat_dump("");
        assert!(parsed.videos.is_empty());
        assert_eq!(parsed.total_duration_seconds, 0);
    }

    #[test]
    fn network_failures_are_transient() {
        let error = classify_enumeration_failure("curl: connection timed out");
        assert!(matches!(error, Error::PlaylistNetwork(_)));

        let error = classify_enumeration_failure("Could not resolve host");
        assert!(matches!(error, Error::PlaylistNetwork(_)));
    }

    #[test]
    fn private_playlists_are_permanent() {
        let error = classify_enumeration_failure("ERROR: This playlist is private");
        assert!(matches!(error, Error::PlaylistUnavailable(_)));

        let error = classify_enumeration_failure("ERROR: Playlist unavailable");
        assert!(matches!(error, Error::PlaylistUnavailable(_)));
    }

    #[test]
    fn other_failures_stay_generic() {
        let error = classify_enumeration_failure("ERROR: Unsupported URL");
        assert!(matches!(error, Error::Command(_)));
    }
}
