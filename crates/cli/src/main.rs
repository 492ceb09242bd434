//! `testrig` -- run the backend test suite against a throwaway database.
//!
//! Starts the database compose profile, waits for it to report ready,
//! runs `gradlew check` in `<project root>/backend`, and always stops the
//! containers afterwards, including after Ctrl-C.
//!
//! # Exit status
//!
//! | Status | Meaning                                              |
//! |--------|------------------------------------------------------|
//! | `0`    | all steps succeeded                                  |
//! | `1`    | tests failed                                         |
//! | `2`    | database start/readiness/teardown failed, bad config |
//! | `130`  | interrupted                                          |
//!
//! Configuration comes from environment variables (and `.env`); see
//! `OrchestratorConfig::from_lookup` for the full table.

use std::process::ExitCode;

use anyhow::Context;

use testrig::logging::{self, LogFormat};
use testrig::{root, signal};
use testrig_core::process::ProcessRunner;
use testrig_core::report::EXIT_INFRASTRUCTURE_FAILED;
use testrig_core::{Orchestrator, OrchestratorConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    logging::init_tracing(LogFormat::from_env());

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "testrig could not start");
            // Also on stderr: a restrictive RUST_LOG would otherwise hide it.
            eprintln!("testrig: {e:#}");
            ExitCode::from(EXIT_INFRASTRUCTURE_FAILED)
        }
    }
}

async fn run() -> anyhow::Result<u8> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let default_root = root::locate_project_root(&exe);

    let config = OrchestratorConfig::from_env(&default_root).context("Invalid configuration")?;

    tracing::info!(
        project_root = %config.project_root.display(),
        backend_directory = %config.backend_directory().display(),
        compose_profile = %config.compose_profile,
        detached_start = config.detached_start,
        poll_readiness = config.poll_readiness,
        continue_on_test_failure = config.continue_on_test_failure,
        remove_volumes_on_teardown = config.remove_volumes_on_teardown,
        "Starting testrig",
    );

    let orchestrator = Orchestrator::new(ProcessRunner, config);
    let report = orchestrator.run_until(signal::shutdown_signal()).await;

    let summary = serde_json::to_string(&report).context("Failed to serialize run report")?;
    tracing::debug!(report = %summary, "Run summary");

    Ok(report.exit_code())
}
