//! A tool for executing external-process invocations.
//!
//! Two execution paths are provided: [`Executor::execute`] captures both
//! pipes whole, for probes and metadata dumps, and
//! [`Executor::execute_streaming`] scans output line by line to surface
//! download progress while the process runs. Both paths always drain
//! stdout and stderr completely so the child can never block on a full
//! pipe, and both enforce a hard timeout by killing the child.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

/// How many trailing output lines are kept as diagnostic text.
const DIAGNOSTIC_TAIL_LINES: usize = 30;

/// Represents one external-process invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Executor {
    /// The path to the command executable.
    pub executable_path: PathBuf,
    /// The hard ceiling on process runtime.
    pub timeout: Duration,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
}

/// Represents the output of a finished process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// The stdout of the process.
    pub stdout: String,
    /// The stderr of the process.
    pub stderr: String,
    /// The exit code of the process.
    pub code: i32,
}

impl Executor {
    /// Executes the command and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns an error if the executable is missing, the process exits
    /// non-zero (carrying its stderr), or the timeout expires.
    pub async fn execute(&self) -> Result<ProcessOutput> {
        log::debug!("Executing {:?} {:?}", self.executable_path, self.args);

        let mut command = tokio::process::Command::new(&self.executable_path);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| self.map_spawn_error(e))?;

        // wait_with_output drains both pipes; dropping it on timeout kills
        // the child through kill_on_drop.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!(
                    "Process timed out after {:?}: {:?}",
                    self.timeout,
                    self.executable_path
                );
                return Err(Error::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(Error::Command(format!(
                "Process failed with code {}: {}",
                code, stderr
            )));
        }

        Ok(ProcessOutput {
            stdout,
            stderr,
            code,
        })
    }

    /// Executes the command while scanning its output for `[download]`
    /// progress markers, reporting each percentage through `progress`.
    ///
    /// Reported percentages are monotonically non-decreasing: a reissued
    /// equal or smaller value is clamped to the last one reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] as soon as `cancel` fires,
    /// [`Error::Timeout`] when the watchdog expires, and
    /// [`Error::Command`] with the trailing output lines when the process
    /// exits non-zero. The child is killed in all three cases.
    pub async fn execute_streaming(
        &self,
        progress: Option<mpsc::Sender<f64>>,
        mut cancel: broadcast::Receiver<()>,
    ) -> Result<()> {
        log::debug!("Streaming {:?} {:?}", self.executable_path, self.args);

        let mut command = tokio::process::Command::new(&self.executable_path);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| self.map_spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Command("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Command("Failed to capture stderr".to_string()))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;

        let percent_re = progress_regex();
        let mut last_percent = 0.0f64;
        let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        while !(stdout_done && stderr_done) {
            tokio::select! {
                _ = wait_for_cancel(&mut cancel) => {
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(Error::Timeout(self.timeout));
                }
                line = stdout_lines.next_line(), if !stdout_done => {
                    match line? {
                        Some(line) => {
                            last_percent = scan_line(
                                &line,
                                &percent_re,
                                last_percent,
                                progress.as_ref(),
                                &mut tail,
                            )
                            .await;
                        }
                        None => stdout_done = true,
                    }
                }
                line = stderr_lines.next_line(), if !stderr_done => {
                    match line? {
                        Some(line) => {
                            push_tail(&mut tail, line);
                        }
                        None => stderr_done = true,
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = wait_for_cancel(&mut cancel) => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
            _ = &mut deadline => {
                let _ = child.kill().await;
                return Err(Error::Timeout(self.timeout));
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let diagnostic: Vec<String> = tail.into_iter().collect();
            return Err(Error::Command(diagnostic.join("\n")));
        }

        Ok(())
    }

    fn map_spawn_error(&self, error: std::io::Error) -> Error {
        if error.kind() == std::io::ErrorKind::NotFound {
            Error::MissingExecutable(self.executable_path.display().to_string())
        } else {
            Error::IO(error)
        }
    }
}

/// Resolves once a cancellation signal arrives. Never resolves while the
/// channel is open and silent.
pub(crate) async fn wait_for_cancel(cancel: &mut broadcast::Receiver<()>) {
    loop {
        match cancel.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}

fn progress_regex() -> Regex {
    Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap()
}

/// Extracts the percentage from a `[download]` progress line.
fn parse_percent(line: &str, re: &Regex) -> Option<f64> {
    let captures = re.captures(line)?;
    let percent: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(percent.min(100.0))
}

async fn scan_line(
    line: &str,
    re: &Regex,
    last_percent: f64,
    progress: Option<&mpsc::Sender<f64>>,
    tail: &mut VecDeque<String>,
) -> f64 {
    push_tail(tail, line.to_string());

    let Some(percent) = parse_percent(line, re) else {
        return last_percent;
    };

    let clamped = percent.max(last_percent);
    if let Some(sender) = progress {
        let _ = sender.send(clamped).await;
    }
    clamped
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == DIAGNOSTIC_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_progress_lines() {
        let re = progress_regex();
        assert_eq!(
            parse_percent("[download]  45.2% of ~150.00MiB at 5.50MiB/s ETA 00:15", &re),
            Some(45.2)
        );
        assert_eq!(parse_percent("[download] 100% of 10.00MiB", &re), Some(100.0));
        assert_eq!(parse_percent("[download]   0.0% of 10.00MiB", &re), Some(0.0));
    }

    #[test]
    fn ignores_non_progress_lines() {
        let re = progress_regex();
        assert_eq!(
            parse_percent("[download] Destination: video.mp4", &re),
            None
        );
        assert_eq!(parse_percent("[Merger] Merging formats", &re), None);
        assert_eq!(parse_percent("45.2% without marker", &re), None);
    }

    #[test]
    fn percent_above_hundred_is_capped() {
        let re = progress_regex();
        assert_eq!(parse_percent("[download] 104.5% of ~1.00MiB", &re), Some(100.0));
    }

    #[tokio::test]
    async fn progress_is_clamped_monotonic() {
        let re = progress_regex();
        let (tx, mut rx) = mpsc::channel(16);
        let mut tail = VecDeque::new();

        let mut last = 0.0;
        for line in [
            "[download]  10.0% of 1.00MiB",
            "[download]  50.0% of 1.00MiB",
            "[download]  30.0% of 1.00MiB",
            "[download]  50.0% of 1.00MiB",
            "[download]  75.0% of 1.00MiB",
        ] {
            last = scan_line(line, &re, last, Some(&tx), &mut tail).await;
        }
        drop(tx);

        let mut reported = Vec::new();
        while let Some(percent) = rx.recv().await {
            reported.push(percent);
        }

        assert_eq!(reported, vec![10.0, 50.0, 50.0, 50.0, 75.0]);
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn tail_keeps_only_the_last_lines() {
        let mut tail = VecDeque::new();
        for i in 0..(DIAGNOSTIC_TAIL_LINES + 10) {
            push_tail(&mut tail, format!("line {}", i));
        }

        assert_eq!(tail.len(), DIAGNOSTIC_TAIL_LINES);
        assert_eq!(tail.front().unwrap(), "line 10");
    }

    #[tokio::test]
    async fn missing_executable_is_reported_as_such() {
        let executor = Executor {
            executable_path: PathBuf::from("/definitely/not/here/yt-dlp"),
            timeout: Duration::from_secs(1),
            args: vec!["--version".to_string()],
        };

        match executor.execute().await {
            Err(Error::MissingExecutable(path)) => assert!(path.contains("yt-dlp")),
            other => panic!("expected MissingExecutable, got {:?}", other.map(|_| ())),
        }
    }
}
