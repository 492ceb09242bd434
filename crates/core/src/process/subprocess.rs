//! Real subprocess execution on top of `tokio::process`.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::CommandError;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Build tools can be extremely verbose; anything beyond this is dropped.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// [`CommandRunner`] that spawns real child processes.
///
/// Children are spawned with `kill_on_drop(true)`, so dropping the future
/// returned by [`CommandRunner::execute`] (on timeout or interrupt) kills
/// the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &spec.env_vars {
            cmd.env(key, value);
        }

        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }

        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            command: spec.display(),
            source,
        })?;

        // Read both pipes concurrently so a chatty child can't block on a
        // full stderr buffer while we drain stdout.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        let wait_result = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    // `child` is dropped on return, which kills it.
                    return Err(CommandError::Timeout {
                        command: spec.display(),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
            },
            None => child.wait().await,
        };

        let status = wait_result.map_err(|source| CommandError::Io {
            command: spec.display(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms,
        })
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
