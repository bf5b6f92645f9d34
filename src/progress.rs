use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use yt_batch::ProgressEvent;

const EVENT_BUFFER: usize = 256;
const TITLE_WIDTH: usize = 40;

/// Renders download events into indicatif bars.
///
/// One percentage bar per in-flight video, plus an overall counter when
/// more than one item is expected. The renderer owns nothing about the
/// downloads themselves; it only consumes the event channel.
pub struct ProgressRenderer;

impl ProgressRenderer {
    /// Spawns the consumer task and returns the sender to attach to a
    /// downloader, plus the handle to await once the batch is done.
    pub fn spawn(multi: MultiProgress, total: u64) -> (mpsc::Sender<ProgressEvent>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

        let handle = tokio::spawn(async move {
            let overall = if total > 1 {
                let bar = multi.add(ProgressBar::new(total));
                bar.set_style(
                    ProgressStyle::with_template(
                        "{prefix:>8} [{bar:30.green/white}] {pos}/{len} videos",
                    )
                    .unwrap()
                    .progress_chars("=>-"),
                );
                bar.set_prefix("Overall");
                Some(bar)
            } else {
                None
            };

            let mut bars: HashMap<u32, ProgressBar> = HashMap::new();

            while let Some(event) = rx.recv().await {
                match event {
                    ProgressEvent::Started { index, title } => {
                        let bar = multi.add(ProgressBar::new(100));
                        bar.set_style(
                            ProgressStyle::with_template(
                                "{prefix:>8} [{bar:30.cyan/blue}] {percent:>3}% {msg}",
                            )
                            .unwrap()
                            .progress_chars("=>-"),
                        );
                        bar.set_prefix(match index {
                            Some(index) => format!("{:03}", index),
                            None => "video".to_string(),
                        });
                        bar.set_message(truncate_title(&title));
                        bars.insert(bar_key(index), bar);
                    }
                    ProgressEvent::Percent { index, percent } => {
                        if let Some(bar) = bars.get(&bar_key(index)) {
                            bar.set_position(percent.round() as u64);
                        }
                    }
                    ProgressEvent::Retrying {
                        index,
                        attempt,
                        category,
                        delay,
                    } => {
                        if let Some(bar) = bars.get(&bar_key(index)) {
                            bar.set_position(0);
                            bar.set_message(format!(
                                "retry {} in {:.0}s ({})",
                                attempt + 1,
                                delay.as_secs_f64(),
                                category
                            ));
                        }
                    }
                    ProgressEvent::Finished { index, success } => {
                        if let Some(bar) = bars.remove(&bar_key(index)) {
                            if success {
                                bar.set_position(100);
                            }
                            bar.finish_and_clear();
                            multi.remove(&bar);
                        }
                        if let Some(overall) = &overall {
                            overall.inc(1);
                        }
                    }
                }
            }

            if let Some(overall) = overall {
                overall.finish_and_clear();
            }
        });

        (tx, handle)
    }
}

fn bar_key(index: Option<u32>) -> u32 {
    index.unwrap_or(0)
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= TITLE_WIDTH {
        return title.to_string();
    }

    let mut truncated: String = title.chars().take(TITLE_WIDTH - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_pass_through() {
        assert_eq!(truncate_title("A Short Title"), "A Short Title");
    }

    #[test]
    fn long_titles_are_truncated_on_char_boundaries() {
        let long = "x".repeat(100);
        let truncated = truncate_title(&long);
        assert_eq!(truncated.chars().count(), TITLE_WIDTH);
        assert!(truncated.ends_with('…'));
    }
}
