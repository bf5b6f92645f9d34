//! Bounded-concurrency scheduling of download attempts.
//!
//! The scheduler drives every item of an ordered list to a terminal
//! outcome: up to `concurrency` attempts are in flight at once, failed
//! attempts are re-tried under the [`RetryPolicy`](crate::retry::RetryPolicy),
//! and one item's permanent failure never aborts its siblings. Retry
//! delays sleep inside the owning worker, so a backed-off item does not
//! block the rest of the pool.
//!
//! Completion order is unconstrained; the final report is sorted by each
//! item's stable display index, which is assigned from original list
//! position before anything is scheduled.

use crate::error::ErrorCategory;
use crate::executor::wait_for_cancel;
use crate::model::{DownloadOutcome, ProgressEvent, VideoItem, VideoStatus};
use crate::retry::RetryPolicy;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, broadcast, mpsc};

/// The widest pool the scheduler will run, regardless of configuration.
pub const MAX_CONCURRENCY: usize = 10;

/// Tunables for one batch run.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How many attempts may be in flight at once, clamped to
    /// `1..=MAX_CONCURRENCY`.
    pub concurrency: usize,
    /// Total attempts allowed per item, on top of the per-category limits.
    pub max_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
        }
    }
}

/// What a single attempt reported back to the scheduler.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The download finished.
    Completed,
    /// The attempt failed. When `category` is `None` the scheduler
    /// classifies the diagnostic text itself.
    Failed {
        /// Captured process output relevant to the failure.
        diagnostic: String,
        /// A category already known to the runner, e.g. a local timeout.
        category: Option<ErrorCategory>,
    },
    /// The attempt was abandoned after a cancellation signal.
    Cancelled,
}

/// The aggregate result of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Per-item outcomes, sorted by stable display index.
    pub outcomes: Vec<DownloadOutcome>,
    /// How many items succeeded.
    pub succeeded: usize,
    /// How many items failed, including cancelled ones.
    pub failed: usize,
}

impl BatchReport {
    /// `true` when every item succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Drives every item to a terminal outcome under a bounded worker pool.
///
/// `attempt` runs one download attempt for one item; it receives the item
/// and the 1-based attempt number. The seam is generic so tests can
/// script latency, failures and cancellation without spawning processes.
///
/// Items keep an already-assigned `index` (playlist position); items
/// without one get their 1-based position in `items`. A cancellation
/// signal sent through `cancel` kills in-flight attempts via the runner,
/// and items still waiting for a worker are recorded as failed with the
/// `cancelled` category rather than left pending.
pub async fn run<F, Fut>(
    mut items: Vec<VideoItem>,
    config: PoolConfig,
    cancel: broadcast::Sender<()>,
    events: Option<mpsc::Sender<ProgressEvent>>,
    attempt: F,
) -> BatchReport
where
    F: Fn(VideoItem, u32) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = AttemptOutcome> + Send + 'static,
{
    for (position, item) in items.iter_mut().enumerate() {
        if item.index.is_none() {
            item.index = Some(position as u32 + 1);
        }
        item.status = VideoStatus::Pending;
    }

    let total = items.len();
    let concurrency = config.concurrency.clamp(1, MAX_CONCURRENCY);
    let max_attempts = config.max_attempts.max(1);

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let outcomes: Arc<Mutex<Vec<DownloadOutcome>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let mut handles = Vec::with_capacity(total);

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let outcomes = Arc::clone(&outcomes);
        let attempt = attempt.clone();
        let events = events.clone();
        let mut cancel_rx = cancel.subscribe();

        handles.push(tokio::spawn(async move {
            // Cancellation wins over a permit that frees up at the same
            // moment, so nothing new starts after the signal.
            let permit = tokio::select! {
                biased;
                _ = wait_for_cancel(&mut cancel_rx) => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };

            let outcome = match permit {
                Some(_permit) => {
                    drive_item(item, max_attempts, attempt, &mut cancel_rx, events.as_ref()).await
                }
                None => DownloadOutcome::failed(item, ErrorCategory::Cancelled, "", 0),
            };

            outcomes.lock().await.push(outcome);
        }));
    }

    join_all(handles).await;

    let mut outcomes = match Arc::try_unwrap(outcomes) {
        Ok(mutex) => mutex.into_inner(),
        Err(shared) => shared.lock().await.clone(),
    };
    outcomes.sort_by_key(|outcome| outcome.item.index.unwrap_or(u32::MAX));

    let succeeded = outcomes.iter().filter(|o| o.success).count();
    let failed = outcomes.len() - succeeded;

    BatchReport {
        outcomes,
        succeeded,
        failed,
    }
}

async fn drive_item<F, Fut>(
    mut item: VideoItem,
    max_attempts: u32,
    attempt: F,
    cancel_rx: &mut broadcast::Receiver<()>,
    events: Option<&mpsc::Sender<ProgressEvent>>,
) -> DownloadOutcome
where
    F: Fn(VideoItem, u32) -> Fut,
    Fut: Future<Output = AttemptOutcome>,
{
    item.status = VideoStatus::Downloading;
    emit(
        events,
        ProgressEvent::Started {
            index: item.index,
            title: item.title.clone(),
        },
    )
    .await;

    let mut attempt_no = 0u32;
    loop {
        attempt_no += 1;

        match attempt(item.clone(), attempt_no).await {
            AttemptOutcome::Completed => {
                log::info!("Downloaded: {}", item.title);
                emit(
                    events,
                    ProgressEvent::Finished {
                        index: item.index,
                        success: true,
                    },
                )
                .await;
                return DownloadOutcome::succeeded(item, attempt_no);
            }
            AttemptOutcome::Cancelled => {
                emit(
                    events,
                    ProgressEvent::Finished {
                        index: item.index,
                        success: false,
                    },
                )
                .await;
                return DownloadOutcome::failed(item, ErrorCategory::Cancelled, "", attempt_no);
            }
            AttemptOutcome::Failed {
                diagnostic,
                category,
            } => {
                let category =
                    category.unwrap_or_else(|| ErrorCategory::classify(&diagnostic));
                let decision = RetryPolicy::decide(category, attempt_no);

                if decision.should_retry && attempt_no < max_attempts {
                    log::warn!(
                        "Attempt {} for '{}' failed ({}), retrying in {:.1}s",
                        attempt_no,
                        item.title,
                        category,
                        decision.delay.as_secs_f64()
                    );
                    emit(
                        events,
                        ProgressEvent::Retrying {
                            index: item.index,
                            attempt: attempt_no,
                            category,
                            delay: decision.delay,
                        },
                    )
                    .await;

                    tokio::select! {
                        biased;
                        _ = wait_for_cancel(cancel_rx) => {
                            emit(
                                events,
                                ProgressEvent::Finished {
                                    index: item.index,
                                    success: false,
                                },
                            )
                            .await;
                            return DownloadOutcome::failed(
                                item,
                                ErrorCategory::Cancelled,
                                diagnostic,
                                attempt_no,
                            );
                        }
                        _ = tokio::time::sleep(decision.delay) => {}
                    }
                    continue;
                }

                log::error!("Failed to download: {} ({})", item.title, category);
                emit(
                    events,
                    ProgressEvent::Finished {
                        index: item.index,
                        success: false,
                    },
                )
                .await;
                return DownloadOutcome::failed(item, category, diagnostic, attempt_no);
            }
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event).await;
    }
}
