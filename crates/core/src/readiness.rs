//! Database readiness polling.
//!
//! Runs a check command at a fixed interval until it reports success or
//! the optional deadline passes.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::OrchestratorError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// A command whose success means the database accepts work.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub command: CommandSpec,
    /// When set, stdout must also contain this text.
    pub expect_stdout: Option<String>,
}

impl ReadinessProbe {
    pub fn is_ready(&self, output: &CommandOutput) -> bool {
        output.success()
            && self
                .expect_stdout
                .as_deref()
                .is_none_or(|expected| output.stdout.lines().any(|l| l.trim() == expected))
    }

    fn describe_failure(&self, output: &CommandOutput) -> String {
        if !output.success() {
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                format!("exit code {}", output.exit_code)
            } else {
                format!("exit code {}: {stderr}", output.exit_code)
            }
        } else {
            format!(
                "'{}' not listed by `{}`",
                self.expect_stdout.as_deref().unwrap_or_default(),
                self.command
            )
        }
    }
}

/// Poll `probe` every `interval` until it succeeds.
///
/// Returns the number of attempts it took. With `timeout = None` this
/// polls forever; otherwise an attempt still running at the deadline is
/// abandoned, which kills a real child process. A probe that cannot even
/// be spawned counts as "not ready" so a briefly unavailable tool does not
/// abort the run.
pub async fn wait_until_ready<R: CommandRunner>(
    runner: &R,
    probe: &ReadinessProbe,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<u32, OrchestratorError> {
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        // A hung check must not outlive the deadline.
        let attempt = runner.execute(&probe.command);
        let result = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                tokio::time::timeout(remaining, attempt).await.ok()
            }
            None => Some(attempt.await),
        };

        let last_failure = match result {
            Some(Ok(output)) if probe.is_ready(&output) => {
                tracing::info!(
                    attempts,
                    waited_ms = start.elapsed().as_millis() as u64,
                    "The database is ready",
                );
                return Ok(attempts);
            }
            Some(Ok(output)) => probe.describe_failure(&output),
            Some(Err(e)) => e.to_string(),
            None => format!(
                "`{}` did not finish before the readiness deadline",
                probe.command
            ),
        };

        tracing::info!(
            attempts,
            reason = %last_failure,
            "The database is not ready yet, waiting",
        );

        let mut delay = interval;
        if let Some(limit) = timeout {
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Err(OrchestratorError::ReadinessTimeout {
                    attempts,
                    waited_ms: elapsed.as_millis() as u64,
                    last_failure: Some(last_failure),
                });
            }
            delay = delay.min(limit - elapsed);
        }

        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
