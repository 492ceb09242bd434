//! External command execution.
//!
//! Defines [`CommandRunner`], the seam between the orchestrator and real
//! processes, along with [`CommandSpec`] and [`CommandOutput`]. The real
//! implementation lives in [`subprocess::ProcessRunner`]; tests substitute
//! scripted runners.

pub mod subprocess;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

pub use subprocess::ProcessRunner;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child (inherits the caller's if `None`).
    pub working_directory: Option<PathBuf>,
    /// Additional environment variables set for the child process.
    pub env_vars: Vec<(String, String)>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            env_vars: Vec::new(),
            timeout: None,
        }
    }

    /// Build a spec from a program followed by its leading arguments,
    /// e.g. `["docker", "compose"]`. Returns `None` for an empty slice.
    pub fn from_parts(parts: &[String]) -> Option<Self> {
        let (program, args) = parts.split_first()?;
        Some(Self::new(program.clone()).args(args))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render the command line as it would be typed in a shell.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    if word.is_empty() || word.chars().any(char::is_whitespace) {
        format!("'{word}'")
    } else {
        word.to_string()
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands.
///
/// A non-zero exit status is *not* an error at this layer; callers decide
/// what a failed exit means (see [`run_checked`]). Errors are reserved for
/// processes that could not be spawned, waited on, or that timed out.
pub trait CommandRunner: Send + Sync {
    fn execute(
        &self,
        spec: &CommandSpec,
    ) -> impl std::future::Future<Output = Result<CommandOutput, CommandError>> + Send;
}

impl<R: CommandRunner> CommandRunner for &R {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        (**self).execute(spec).await
    }
}

/// Run `spec` and treat a non-zero exit status as [`CommandError::Failed`].
///
/// The captured stderr is logged before the error is returned so that the
/// failure is visible even if the caller only reports the summary.
pub async fn run_checked<R: CommandRunner>(
    runner: &R,
    spec: &CommandSpec,
) -> Result<CommandOutput, CommandError> {
    let command = spec.display();
    tracing::debug!(command = %command, "Running command");

    let output = runner.execute(spec).await?;

    if !output.success() {
        tracing::error!(
            command = %command,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            stderr = %output.stderr.trim(),
            "Command failed",
        );
        return Err(CommandError::Failed {
            command,
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    tracing::debug!(
        command = %command,
        duration_ms = output.duration_ms,
        "Command succeeded",
    );
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
