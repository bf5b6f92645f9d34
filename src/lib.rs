use {
    crate::progress::ProgressRenderer,
    indicatif::MultiProgress,
    regex::Regex,
    yt_batch::{
        BatchReport, Downloader, Libraries, PlaylistInfo, PoolConfig, Quality, VideoItem,
    },
};

pub mod config;
pub mod progress;

/// Everything one invocation needs, resolved from config and CLI flags.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub url: String,
    pub output_dir: String,
    pub quality: Quality,
    pub workers: usize,
    pub max_retries: u32,
    pub cookies_from_browser: Option<String>,
    pub items: Option<ItemSelection>,
}

const VIDEO_PATTERNS: [&str; 3] = [
    r"^https?://(?:www\.)?youtube\.com/watch\?v=[\w-]+",
    r"^https?://youtu\.be/[\w-]+",
    r"^https?://(?:www\.)?youtube\.com/embed/[\w-]+",
];

const PLAYLIST_PATTERNS: [&str; 2] = [
    r"^https?://(?:www\.)?youtube\.com/playlist\?list=[\w-]+",
    r"^https?://(?:www\.)?youtube\.com/watch\?v=[\w-]+&list=[\w-]+",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Video,
    Playlist,
}

/// Sorts a URL into video versus playlist; `None` when it is neither.
/// A watch URL carrying a `list` parameter counts as a playlist.
pub fn classify_url(url: &str) -> Option<UrlKind> {
    let url = url.trim();

    for pattern in PLAYLIST_PATTERNS.iter() {
        if Regex::new(pattern).unwrap().is_match(url) {
            return Some(UrlKind::Playlist);
        }
    }
    for pattern in VIDEO_PATTERNS.iter() {
        if Regex::new(pattern).unwrap().is_match(url) {
            return Some(UrlKind::Video);
        }
    }
    None
}

/// Rewrites short and embed URLs to the canonical watch form.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();

    if url.contains("youtu.be/") || url.contains("/embed/") {
        if let Some(id) = extract_video_id(url) {
            return format!("https://www.youtube.com/watch?v={}", id);
        }
    }

    let mut url = url.to_string();
    if url.starts_with("http://") {
        url = url.replacen("http://", "https://", 1);
    }
    if url.starts_with("https://youtube.com") {
        url = url.replacen("https://youtube.com", "https://www.youtube.com", 1);
    }
    url
}

/// Pulls the video identifier out of any supported URL form.
pub fn extract_video_id(url: &str) -> Option<String> {
    if let Some(rest) = url.split("youtu.be/").nth(1) {
        let id = rest.split(['?', '&', '/']).next()?;
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    if let Some(rest) = url.split("/embed/").nth(1) {
        let id = rest.split(['?', '&', '/']).next()?;
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    let captures = Regex::new(r"[?&]v=([\w-]+)").unwrap().captures(url)?;
    Some(captures.get(1)?.as_str().to_string())
}

/// A subset of playlist members picked on the command line, either an
/// inclusive 1-based range (`3-7`) or an explicit list (`1,4,9`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSelection {
    Range(u32, u32),
    List(Vec<u32>),
}

impl ItemSelection {
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();

        if let Some((start, end)) = spec.split_once('-') {
            let start: u32 = start.trim().parse().ok()?;
            let end: u32 = end.trim().parse().ok()?;
            if start == 0 || end < start {
                return None;
            }
            return Some(Self::Range(start, end));
        }

        let mut picks = Vec::new();
        for part in spec.split(',') {
            let value: u32 = part.trim().parse().ok()?;
            if value == 0 {
                return None;
            }
            picks.push(value);
        }
        if picks.is_empty() {
            None
        } else {
            Some(Self::List(picks))
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        match self {
            Self::Range(start, end) => (*start..=*end).contains(&index),
            Self::List(picks) => picks.contains(&index),
        }
    }

    /// Keeps only the selected members. Playlist indices are preserved so
    /// output filenames still reflect original playlist positions.
    pub fn filter(&self, videos: Vec<VideoItem>) -> Vec<VideoItem> {
        videos
            .into_iter()
            .filter(|video| video.index.is_some_and(|index| self.contains(index)))
            .collect()
    }
}

/// Downloads whatever the URL points at and returns the aggregate report.
pub async fn download_url(
    options: DownloadOptions,
    multi: MultiProgress,
) -> Result<BatchReport, Box<dyn std::error::Error + Send + Sync>> {
    let kind =
        classify_url(&options.url).ok_or("Not a recognized YouTube video or playlist URL")?;

    let libraries = Libraries::from_path().verify().await?;

    match kind {
        UrlKind::Video => download_single_video(options, libraries, multi).await,
        UrlKind::Playlist => download_whole_playlist(options, libraries, multi).await,
    }
}

async fn download_single_video(
    options: DownloadOptions,
    libraries: Libraries,
    multi: MultiProgress,
) -> Result<BatchReport, Box<dyn std::error::Error + Send + Sync>> {
    let url = normalize_url(&options.url);
    let id = extract_video_id(&url).unwrap_or_else(|| "video".to_string());
    let item = VideoItem::single(id.clone(), url, id);

    let (events, renderer) = ProgressRenderer::spawn(multi, 1);
    let downloader = Downloader::new(libraries, &options.output_dir)?
        .with_cookies_browser(options.cookies_from_browser.clone())
        .with_progress_channel(events);
    spawn_interrupt_handler(downloader.cancel_handle());

    let outcome = downloader
        .download_video(item, options.quality, options.max_retries)
        .await?;

    drop(downloader);
    renderer.await?;

    let succeeded = outcome.success as usize;
    Ok(BatchReport {
        outcomes: vec![outcome],
        succeeded,
        failed: 1 - succeeded,
    })
}

async fn download_whole_playlist(
    options: DownloadOptions,
    libraries: Libraries,
    multi: MultiProgress,
) -> Result<BatchReport, Box<dyn std::error::Error + Send + Sync>> {
    let downloader = Downloader::new(libraries, &options.output_dir)?
        .with_cookies_browser(options.cookies_from_browser.clone());

    log::info!("Fetching playlist information...");
    let playlist = downloader.fetch_playlist(&options.url).await?;

    let videos = match &options.items {
        Some(selection) => selection.filter(playlist.videos.clone()),
        None => playlist.videos.clone(),
    };
    if videos.is_empty() {
        return Err("The selection matched no videos in the playlist".into());
    }

    log::info!(
        "Playlist '{}' by {}: downloading {} of {} videos ({})",
        playlist.title,
        playlist.creator,
        videos.len(),
        playlist.videos.len(),
        yt_batch::utils::format_duration(playlist.total_duration_seconds),
    );

    let (events, renderer) = ProgressRenderer::spawn(multi, videos.len() as u64);
    let downloader = downloader.with_progress_channel(events);
    spawn_interrupt_handler(downloader.cancel_handle());

    let selected = PlaylistInfo {
        title: playlist.title,
        creator: playlist.creator,
        total_duration_seconds: playlist.total_duration_seconds,
        videos,
    };
    let (folder, report) = downloader
        .download_playlist(
            &selected,
            options.quality,
            PoolConfig {
                concurrency: options.workers,
                max_attempts: options.max_retries,
            },
        )
        .await?;

    drop(downloader);
    renderer.await?;

    log::info!("Saved to: {}", folder.display());
    Ok(report)
}

fn spawn_interrupt_handler(cancel: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping downloads");
            let _ = cancel.send(());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_urls_are_videos() {
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(UrlKind::Video)
        );
        assert_eq!(
            classify_url("https://youtu.be/dQw4w9WgXcQ"),
            Some(UrlKind::Video)
        );
        assert_eq!(
            classify_url("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some(UrlKind::Video)
        );
    }

    #[test]
    fn list_urls_are_playlists() {
        assert_eq!(
            classify_url("https://www.youtube.com/playlist?list=PLabc-123"),
            Some(UrlKind::Playlist)
        );
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLabc"),
            Some(UrlKind::Playlist)
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(classify_url("https://example.com/watch?v=x"), None);
        assert_eq!(classify_url("not a url"), None);
        assert_eq!(classify_url(""), None);
    }

    #[test]
    fn short_urls_normalize_to_watch_form() {
        assert_eq!(
            normalize_url("https://youtu.be/dQw4w9WgXcQ?t=42"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            normalize_url("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert_eq!(
            normalize_url("http://youtube.com/watch?v=abc"),
            "https://www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn video_ids_come_out_of_every_form() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?rel=0",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
        ] {
            assert_eq!(
                extract_video_id(url).as_deref(),
                Some("dQw4w9WgXcQ"),
                "{}",
                url
            );
        }
    }

    #[test]
    fn selections_parse_ranges_and_lists() {
        assert_eq!(
            ItemSelection::parse("3-7"),
            Some(ItemSelection::Range(3, 7))
        );
        assert_eq!(
            ItemSelection::parse("1, 4, 9"),
            Some(ItemSelection::List(vec![1, 4, 9]))
        );
        assert_eq!(
            ItemSelection::parse("5"),
            Some(ItemSelection::List(vec![5]))
        );

        assert_eq!(ItemSelection::parse("7-3"), None);
        assert_eq!(ItemSelection::parse("0-3"), None);
        assert_eq!(ItemSelection::parse("a-b"), None);
        assert_eq!(ItemSelection::parse(""), None);
    }

    #[test]
    fn selection_filter_keeps_playlist_indices() {
        let mut videos: Vec<VideoItem> = (1..=5)
            .map(|i| {
                VideoItem::single(
                    format!("id{}", i),
                    format!("https://u/{}", i),
                    format!("V{}", i),
                )
            })
            .collect();
        for (i, video) in videos.iter_mut().enumerate() {
            video.index = Some(i as u32 + 1);
        }

        let selected = ItemSelection::Range(2, 4).filter(videos);
        let indices: Vec<u32> = selected.iter().filter_map(|v| v.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
    }
}
