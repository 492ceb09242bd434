//! Run outcome and console reporting.
//!
//! [`RunReport`] records what happened to each step of a run and derives
//! the process exit status. [`Reporter`] writes the human-facing banners
//! (colored with ANSI escapes unless disabled) to stdout or to an
//! in-memory buffer for tests.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Exit status when every step succeeded.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status when the tests failed but the database lifecycle was fine.
pub const EXIT_TESTS_FAILED: u8 = 1;
/// Exit status when starting, waiting for, or stopping the database failed.
pub const EXIT_INFRASTRUCTURE_FAILED: u8 = 2;
/// Exit status after SIGINT/SIGTERM (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

// Plain SGR codes; `Reporter::color` is off when NO_COLOR is set.
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const RESET: &str = "\x1b[0m";

/// Outcome of one orchestration step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// Not reached yet.
    #[default]
    Pending,
    Succeeded,
    Failed { message: String },
    /// Not run because an earlier step failed or the step is disabled.
    Skipped,
    /// Cut short by a termination signal.
    Interrupted,
}

impl StepStatus {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed {
            message: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Everything that happened during one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub start: StepStatus,
    pub readiness: StepStatus,
    pub tests: StepStatus,
    pub teardown: StepStatus,
    pub interrupted: bool,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            start: StepStatus::Pending,
            readiness: StepStatus::Pending,
            tests: StepStatus::Pending,
            teardown: StepStatus::Pending,
            interrupted: false,
        }
    }

    /// Close out the steps before teardown once the body has stopped.
    ///
    /// After an interrupt the step that was running becomes
    /// [`StepStatus::Interrupted`]; anything not reached becomes
    /// [`StepStatus::Skipped`].
    pub fn settle_body(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
        let mut interrupt_pending = interrupted;
        for step in [&mut self.start, &mut self.readiness, &mut self.tests] {
            if *step == StepStatus::Pending {
                *step = if interrupt_pending {
                    interrupt_pending = false;
                    StepStatus::Interrupted
                } else {
                    StepStatus::Skipped
                };
            }
        }
    }

    /// Process exit status for this run.
    ///
    /// Interrupts win, then database lifecycle failures, then test failures.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.start.is_failed() || self.readiness.is_failed() || self.teardown.is_failed()
        {
            EXIT_INFRASTRUCTURE_FAILED
        } else if self.tests != StepStatus::Succeeded {
            EXIT_TESTS_FAILED
        } else {
            EXIT_SUCCESS
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code() == EXIT_SUCCESS
    }
}

#[derive(Clone)]
enum Sink {
    Stdout,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Console output for the person running the tests.
#[derive(Clone)]
pub struct Reporter {
    color: bool,
    sink: Sink,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Reporter writing to stdout.
    pub fn stdout(color: bool) -> Self {
        Self {
            color,
            sink: Sink::Stdout,
        }
    }

    /// Reporter writing to an in-memory buffer, read back with [`Reporter::captured`].
    pub fn capture() -> Self {
        Self {
            color: false,
            sink: Sink::Buffer(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Everything written so far (empty for stdout reporters).
    pub fn captured(&self) -> String {
        match &self.sink {
            Sink::Stdout => String::new(),
            Sink::Buffer(buf) => match buf.lock() {
                Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
                Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
            },
        }
    }

    /// Plain progress line, e.g. "Starting the database container...".
    pub fn step(&self, message: &str) {
        self.write_line(message);
    }

    pub fn tests_passed(&self) {
        let line = self.paint(GREEN, "Tests passed successfully!");
        self.write_line(&line);
    }

    pub fn tests_failed(&self, excerpt: &str) {
        let line = self.paint(RED, "Tests did not pass. Here are the failed tests:");
        self.write_line(&line);
        if !excerpt.is_empty() {
            self.write_line(excerpt);
        }
    }

    pub fn error(&self, message: &str) {
        let line = self.paint(RED, &format!("Error: {message}"));
        self.write_line(&line);
    }

    /// Final line summarising the run.
    pub fn summary(&self, report: &RunReport) {
        let line = match report.exit_code() {
            EXIT_SUCCESS => self.paint(GREEN, "Test run finished successfully."),
            EXIT_TESTS_FAILED => self.paint(RED, "Test run finished with failing tests."),
            EXIT_INTERRUPTED => self.paint(RED, "Test run interrupted; containers were stopped."),
            _ => self.paint(RED, "Test run failed; see errors above."),
        };
        self.write_line(&line);
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn write_line(&self, line: &str) {
        match &self.sink {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{line}");
                let _ = out.flush();
            }
            Sink::Buffer(buf) => {
                if let Ok(mut buf) = buf.lock() {
                    let _ = writeln!(buf, "{line}");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
