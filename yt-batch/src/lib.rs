//! Batch download orchestration around the external yt-dlp and ffmpeg
//! executables.
//!
//! The crate never fetches media itself: yt-dlp does the retrieval and
//! format negotiation, ffmpeg the muxing. What lives here is everything
//! around those processes: argument construction, a bounded worker pool,
//! progress parsing, failure classification and categorized backoff.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use yt_batch::{Downloader, Libraries, PoolConfig, Quality};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let libraries = Libraries::from_path().verify().await?;
//! let downloader = Downloader::new(libraries, "downloads")?;
//!
//! let playlist = downloader
//!     .fetch_playlist("https://www.youtube.com/playlist?list=PLx")
//!     .await?;
//! let (folder, report) = downloader
//!     .download_playlist(&playlist, Quality::P1080, PoolConfig::default())
//!     .await?;
//!
//! println!("{}/{} into {:?}", report.succeeded, playlist.videos.len(), folder);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub mod command;
pub mod error;
pub mod executor;
pub mod model;
pub mod playlist;
pub mod pool;
pub mod quality;
pub mod retry;
pub mod utils;

// Re-export of the common types to facilitate their use
pub use command::CommandBuilder;
pub use error::{Error, ErrorCategory, Result};
pub use executor::{Executor, ProcessOutput};
pub use model::{DownloadOutcome, PlaylistInfo, ProgressEvent, VideoItem, VideoStatus};
pub use pool::{AttemptOutcome, BatchReport, PoolConfig};
pub use quality::{Quality, ResolvedFormat};

/// The hard ceiling on a single video download.
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);
/// The ceiling on the format availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// The ceiling on `--version` checks.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// The required external executables.
///
/// yt-dlp is mandatory; ffmpeg is optional and its absence only degrades
/// merged output, it never blocks a download.
#[derive(Debug, Clone)]
pub struct Libraries {
    /// The path to the yt-dlp binary.
    pub youtube: PathBuf,
    /// The path to the ffmpeg binary, `None` when unavailable.
    pub ffmpeg: Option<PathBuf>,
}

impl Libraries {
    /// Creates a set from explicit paths.
    pub fn new(youtube: impl Into<PathBuf>, ffmpeg: Option<PathBuf>) -> Self {
        Self {
            youtube: youtube.into(),
            ffmpeg,
        }
    }

    /// Resolves both executables through the system path.
    pub fn from_path() -> Self {
        Self {
            youtube: PathBuf::from("yt-dlp"),
            ffmpeg: Some(PathBuf::from("ffmpeg")),
        }
    }

    /// Checks that the executables actually run.
    ///
    /// # Errors
    ///
    /// Returns an error when yt-dlp cannot be executed. An unusable ffmpeg
    /// is downgraded to `None` with a warning instead: downloads still
    /// work, video and audio may just be left as separate files.
    pub async fn verify(mut self) -> Result<Self> {
        let executor = Executor {
            executable_path: self.youtube.clone(),
            timeout: VERSION_PROBE_TIMEOUT,
            args: vec!["--version".to_string()],
        };
        let output = executor.execute().await?;
        log::debug!("yt-dlp version {}", output.stdout.trim());

        if let Some(ffmpeg) = &self.ffmpeg {
            let executor = Executor {
                executable_path: ffmpeg.clone(),
                timeout: VERSION_PROBE_TIMEOUT,
                args: vec!["-version".to_string()],
            };
            if let Err(e) = executor.execute().await {
                log::warn!(
                    "ffmpeg is not usable ({}), downloads may leave video and audio unmerged",
                    e
                );
                self.ffmpeg = None;
            }
        }

        Ok(self)
    }
}

/// A video and playlist downloader driving yt-dlp invocations.
#[derive(Debug, Clone)]
pub struct Downloader {
    /// The required external executables.
    pub libraries: Libraries,
    /// The directory downloads are written into.
    pub output_dir: PathBuf,
    /// The hard ceiling on a single video download.
    pub download_timeout: Duration,
    /// The browser whose cookies authenticate requests, if any.
    pub cookies_browser: Option<String>,
    cancel: broadcast::Sender<()>,
    events: Option<mpsc::Sender<ProgressEvent>>,
}

impl Downloader {
    /// Creates a downloader writing into `output_dir`, creating it as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created.
    pub fn new(libraries: Libraries, output_dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(output_dir.as_ref())?;
        let (cancel, _) = broadcast::channel(8);

        Ok(Self {
            libraries,
            output_dir: output_dir.as_ref().to_path_buf(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            cookies_browser: None,
            cancel,
            events: None,
        })
    }

    /// Authenticates downloads with the named browser's stored cookies.
    pub fn with_cookies_browser(mut self, browser: Option<String>) -> Self {
        self.cookies_browser = browser;
        self
    }

    /// Attaches a channel that receives progress and completion events.
    pub fn with_progress_channel(mut self, events: mpsc::Sender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Overrides the per-download timeout.
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// A handle that cancels everything in flight when sent to.
    ///
    /// Already-succeeded items stay succeeded; in-flight and unscheduled
    /// items are recorded as failed with the `cancelled` category.
    pub fn cancel_handle(&self) -> broadcast::Sender<()> {
        self.cancel.clone()
    }

    /// Enumerates a playlist without downloading anything.
    ///
    /// # Errors
    ///
    /// See [`playlist::enumerate`].
    pub async fn fetch_playlist(&self, url: &str) -> Result<PlaylistInfo> {
        playlist::enumerate(&self.libraries.youtube, url).await
    }

    /// Downloads a single video into the output directory, retrying under
    /// the categorized policy up to `max_attempts` times.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures error; a download that merely failed
    /// is reported through the returned [`DownloadOutcome`].
    pub async fn download_video(
        &self,
        item: VideoItem,
        quality: Quality,
        max_attempts: u32,
    ) -> Result<DownloadOutcome> {
        let context = self.attempt_context(self.output_dir.clone(), quality, false);
        let attempt = move |item: VideoItem, attempt_no: u32| {
            run_attempt(Arc::clone(&context), item, attempt_no)
        };

        let report = pool::run(
            vec![item],
            PoolConfig {
                concurrency: 1,
                max_attempts,
            },
            self.cancel.clone(),
            self.events.clone(),
            attempt,
        )
        .await;

        report
            .outcomes
            .into_iter()
            .next()
            .ok_or_else(|| Error::Command("Scheduler returned no outcome".to_string()))
    }

    /// Downloads a whole playlist into a subdirectory named after its
    /// sanitized title, with filenames prefixed by playlist position.
    ///
    /// Returns the target directory and the aggregate report, sorted by
    /// original playlist index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPlaylist`] when there is nothing to download,
    /// or an IO error if the target directory cannot be created.
    pub async fn download_playlist(
        &self,
        playlist: &PlaylistInfo,
        quality: Quality,
        config: PoolConfig,
    ) -> Result<(PathBuf, BatchReport)> {
        if playlist.videos.is_empty() {
            return Err(Error::EmptyPlaylist);
        }

        let folder = self
            .output_dir
            .join(utils::sanitize_filename(&playlist.title));
        std::fs::create_dir_all(&folder)?;
        log::info!(
            "Starting download of {} videos into {:?}",
            playlist.videos.len(),
            folder
        );

        let context = self.attempt_context(folder.clone(), quality, true);
        let attempt = move |item: VideoItem, attempt_no: u32| {
            run_attempt(Arc::clone(&context), item, attempt_no)
        };

        let report = pool::run(
            playlist.videos.clone(),
            config,
            self.cancel.clone(),
            self.events.clone(),
            attempt,
        )
        .await;

        Ok((folder, report))
    }

    fn attempt_context(
        &self,
        target_dir: PathBuf,
        quality: Quality,
        indexed: bool,
    ) -> Arc<AttemptContext> {
        Arc::new(AttemptContext {
            yt_dlp: self.libraries.youtube.clone(),
            ffmpeg: self.libraries.ffmpeg.clone(),
            target_dir,
            quality,
            cookies_browser: self.cookies_browser.clone(),
            download_timeout: self.download_timeout,
            cancel: self.cancel.clone(),
            events: self.events.clone(),
            indexed,
        })
    }
}

/// Everything one attempt needs, shared across the pool's workers.
struct AttemptContext {
    yt_dlp: PathBuf,
    ffmpeg: Option<PathBuf>,
    target_dir: PathBuf,
    quality: Quality,
    cookies_browser: Option<String>,
    download_timeout: Duration,
    cancel: broadcast::Sender<()>,
    events: Option<mpsc::Sender<ProgressEvent>>,
    indexed: bool,
}

/// One download attempt: resolve the format, build the invocation, run it.
async fn run_attempt(
    context: Arc<AttemptContext>,
    item: VideoItem,
    attempt_no: u32,
) -> AttemptOutcome {
    let resolved = resolve_format(&context, &item.url).await;
    if resolved.downgraded && attempt_no == 1 {
        log::warn!(
            "Quality adjusted for '{}': {} -> {}",
            item.title,
            context.quality,
            resolved.tier
        );
    }

    let mut builder = CommandBuilder::new(&item.url, &context.target_dir, &resolved.expression)
        .with_cookies_browser(context.cookies_browser.clone())
        .with_ffmpeg_location(context.ffmpeg.clone());
    if context.indexed {
        if let Some(index) = item.index {
            builder = builder.with_index(index);
        }
    }

    let executor = Executor {
        executable_path: context.yt_dlp.clone(),
        timeout: context.download_timeout,
        args: builder.build(),
    };

    let (percent_tx, percent_rx) = match &context.events {
        Some(_) => {
            let (tx, rx) = mpsc::channel(32);
            (Some(tx), Some(rx))
        }
        None => (None, None),
    };

    let (result, _) = tokio::join!(
        executor.execute_streaming(percent_tx, context.cancel.subscribe()),
        forward_percents(percent_rx, context.events.clone(), item.index),
    );

    match result {
        Ok(()) => AttemptOutcome::Completed,
        Err(Error::Cancelled) => AttemptOutcome::Cancelled,
        Err(Error::Timeout(timeout)) => AttemptOutcome::Failed {
            diagnostic: format!("Download timed out after {:?}", timeout),
            category: Some(ErrorCategory::Timeout),
        },
        Err(Error::MissingExecutable(path)) => AttemptOutcome::Failed {
            diagnostic: format!("Executable not found: {}", path),
            category: Some(ErrorCategory::Generic),
        },
        Err(Error::Command(diagnostic)) => AttemptOutcome::Failed {
            diagnostic,
            category: None,
        },
        Err(e) => AttemptOutcome::Failed {
            diagnostic: e.to_string(),
            category: None,
        },
    }
}

/// Probes the formats available for one video.
///
/// A failed or timed-out probe defers to the download invocation's own
/// negotiation instead of failing the attempt.
async fn resolve_format(context: &AttemptContext, url: &str) -> ResolvedFormat {
    let executor = Executor {
        executable_path: context.yt_dlp.clone(),
        timeout: PROBE_TIMEOUT,
        args: command::list_formats_args(url, context.cookies_browser.as_deref()),
    };

    match executor.execute().await {
        Ok(output) => quality::resolve(context.quality, Some(&output.stdout)),
        Err(e) => {
            log::debug!("Format probe failed ({}), attempting {}", e, context.quality);
            quality::resolve(context.quality, None)
        }
    }
}

async fn forward_percents(
    percents: Option<mpsc::Receiver<f64>>,
    events: Option<mpsc::Sender<ProgressEvent>>,
    index: Option<u32>,
) {
    let (Some(mut percents), Some(events)) = (percents, events) else {
        return;
    };

    while let Some(percent) = percents.recv().await {
        let _ = events.send(ProgressEvent::Percent { index, percent }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn missing_binary_yields_a_failed_outcome_not_a_panic() {
        let libraries = Libraries::new("/definitely/not/here/yt-dlp", None);
        let downloader =
            Downloader::new(libraries, std::env::temp_dir().join("yt-batch-test")).unwrap();

        let item = VideoItem::single(
            "dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "Video",
        );
        let outcome = downloader
            .download_video(item, Quality::Best, 1)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.category, Some(ErrorCategory::Generic));
        assert_eq!(outcome.attempts_used, 1);
        assert!(outcome.diagnostic.contains("yt-dlp"));
    }

    #[tokio::test]
    async fn empty_playlists_are_rejected() {
        let libraries = Libraries::new("yt-dlp", None);
        let downloader =
            Downloader::new(libraries, std::env::temp_dir().join("yt-batch-test")).unwrap();

        let playlist = PlaylistInfo {
            title: "Empty".to_string(),
            creator: "Nobody".to_string(),
            total_duration_seconds: 0,
            videos: Vec::new(),
        };

        let result = downloader
            .download_playlist(&playlist, Quality::Best, PoolConfig::default())
            .await;
        assert!(matches!(result, Err(Error::EmptyPlaylist)));
    }
}
