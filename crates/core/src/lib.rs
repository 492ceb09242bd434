//! `testrig-core`: orchestration of a database-backed backend test run.
//!
//! Brings the database up through compose, optionally waits for it to
//! report ready, runs the build tool's check task in the backend
//! directory, and always tears the containers down afterwards.
//!
//! All subprocess management goes through [`process::CommandRunner`] so
//! the orchestration logic can be exercised without Docker or Gradle.

pub mod build_tool;
pub mod compose;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod readiness;
pub mod report;

pub use config::OrchestratorConfig;
pub use error::{CommandError, ConfigError, OrchestratorError};
pub use orchestrator::Orchestrator;
pub use report::{Reporter, RunReport, StepStatus};
