//! Error types shared across the orchestrator.

/// Failure of a single external command invocation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The program could not be started (missing binary, bad working dir, ...).
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process was killed after exceeding its configured timeout.
    #[error("`{command}` timed out after {elapsed_ms}ms")]
    Timeout { command: String, elapsed_ms: u64 },

    /// The process ran but exited with a non-zero status.
    #[error("Command failed: {command} (exit code {exit_code}): {stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// Waiting on the child process failed.
    #[error("I/O error while waiting for `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// The command line the error refers to.
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Timeout { command, .. }
            | Self::Failed { command, .. }
            | Self::Io { command, .. } => command,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Failure of one orchestration step.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Database start failed: {0}")]
    Start(#[source] CommandError),

    #[error("Database not ready after {attempts} attempts ({waited_ms}ms){}", last_failure_suffix(.last_failure))]
    ReadinessTimeout {
        attempts: u32,
        waited_ms: u64,
        last_failure: Option<String>,
    },

    #[error("Test command could not be run: {0}")]
    Tests(#[source] CommandError),

    #[error("Database teardown failed: {0}")]
    Teardown(#[source] CommandError),
}

fn last_failure_suffix(last_failure: &Option<String>) -> String {
    match last_failure {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
