use clap::Parser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::LevelFilter;
use tubefydl::config::Settings;
use tubefydl::{DownloadOptions, ItemSelection};
use yt_batch::Quality;

#[derive(Parser, Clone)]
#[command(
    name = "tubefydl",
    version,
    about = "A fast, no-fuss YouTube video and playlist downloader built in Rust."
)]
pub struct Cli {
    /// A YouTube video or playlist URL.
    pub url: String,

    #[arg(long = "output-dir", short)]
    pub output_dir: Option<String>,

    #[arg(
        long = "quality",
        short,
        value_parser = clap::builder::PossibleValuesParser::new([
            "best", "1080p", "720p", "480p", "worst"
        ])
    )]
    pub quality: Option<String>,

    /// Parallel download workers (1-10).
    #[arg(long = "workers", short)]
    pub workers: Option<usize>,

    #[arg(long = "max-retries", short = 'r')]
    pub max_retries: Option<u32>,

    /// Authenticate with this browser's stored cookies (e.g. firefox, chrome).
    #[arg(long = "cookies-from-browser")]
    pub cookies_from_browser: Option<String>,

    /// Playlist subset, an inclusive range "3-7" or a list "1,4,9".
    #[arg(long = "items")]
    pub items: Option<String>,

    /// Persist the effective choices to the user config file.
    #[arg(long = "save-config", action = clap::ArgAction::SetTrue)]
    pub save_config: bool,

    #[arg(
        long = "verbosity",
        short,
        default_value = "info",
        value_parser = clap::builder::PossibleValuesParser::new([
            "info", "debug", "error", "none", "full"
        ])
    )]
    pub verbosity: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Cli::parse();

    let logger = env_logger::Builder::new()
        .filter_level(level_filter(&args.verbosity))
        .build();
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), logger).try_init()?;

    let mut settings = Settings::load();
    if let Some(output_dir) = &args.output_dir {
        settings.output_dir = output_dir.clone();
    }
    if let Some(quality) = &args.quality {
        settings.quality = quality.clone();
    }
    if let Some(workers) = args.workers {
        settings.parallel_workers = workers;
    }
    if let Some(max_retries) = args.max_retries {
        settings.max_retries = max_retries;
    }
    if let Some(browser) = &args.cookies_from_browser {
        settings.cookies_from_browser = Some(browser.clone());
    }

    if args.save_config {
        let path = settings.save_user()?;
        log::info!("Configuration saved to: {}", path.display());
    }

    let quality = Quality::parse(&settings.quality)
        .ok_or_else(|| format!("Unknown quality tier in config: {}", settings.quality))?;
    let items = match &args.items {
        Some(spec) => Some(
            ItemSelection::parse(spec)
                .ok_or_else(|| format!("Invalid --items selection: {}", spec))?,
        ),
        None => None,
    };
    let workers = if settings.use_parallel {
        settings.parallel_workers
    } else {
        1
    };

    let options = DownloadOptions {
        url: args.url,
        output_dir: settings.output_dir.clone(),
        quality,
        workers,
        max_retries: settings.max_retries,
        cookies_from_browser: settings.cookies_from_browser.clone(),
        items,
    };

    let report = tubefydl::download_url(options, multi).await?;

    for outcome in report.outcomes.iter().filter(|o| !o.success) {
        let position = match outcome.item.index {
            Some(index) => format!("[{:03}] ", index),
            None => String::new(),
        };
        let category = outcome
            .category
            .map(|c| c.to_string())
            .unwrap_or_else(|| "generic".to_string());

        eprintln!("✗ {}{} ({})", position, outcome.item.title, category);
        if let Some(category) = outcome.category {
            eprintln!("    hint: {}", category.hint());
        }
        if !outcome.diagnostic.is_empty() {
            log::debug!("Diagnostic output:\n{}", outcome.diagnostic);
        }
    }

    println!(
        "Done: {} succeeded, {} failed",
        report.succeeded, report.failed
    );

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn level_filter(verbosity: &str) -> LevelFilter {
    match verbosity {
        "none" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "debug" => LevelFilter::Debug,
        "full" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
