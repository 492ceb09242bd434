//! Compose command construction for the database profile.
//!
//! Every command runs from the project root so compose picks up the
//! project's compose file regardless of the caller's directory.

use crate::config::OrchestratorConfig;
use crate::process::CommandSpec;
use crate::readiness::ReadinessProbe;

/// `<compose> --profile <profile>` in the project root.
fn base(config: &OrchestratorConfig) -> CommandSpec {
    let spec = CommandSpec::from_parts(&config.compose_command)
        .unwrap_or_else(|| CommandSpec::new("docker-compose"));
    spec.args(["--profile", config.compose_profile.as_str()])
        .current_dir(&config.project_root)
}

/// `up [--build] [-d]`.
pub fn up(config: &OrchestratorConfig) -> CommandSpec {
    let mut spec = base(config).arg("up");
    if config.build_on_start {
        spec = spec.arg("--build");
    }
    if config.detached_start {
        spec = spec.arg("-d");
    }
    spec.timeout(config.command_timeout)
}

/// `down [-v]`.
pub fn down(config: &OrchestratorConfig) -> CommandSpec {
    let mut spec = base(config).arg("down");
    if config.remove_volumes_on_teardown {
        spec = spec.arg("-v");
    }
    spec.timeout(config.command_timeout)
}

/// The readiness check: the configured command, or a status query that
/// succeeds once the database service is listed as running.
pub fn readiness_probe(config: &OrchestratorConfig) -> ReadinessProbe {
    match config
        .readiness_command
        .as_deref()
        .and_then(CommandSpec::from_parts)
    {
        Some(command) => ReadinessProbe {
            command: command
                .current_dir(&config.project_root)
                .timeout(config.command_timeout),
            expect_stdout: config.readiness_expect.clone(),
        },
        None => ReadinessProbe {
            command: base(config)
                .args(["ps", "--status", "running", "--services"])
                .timeout(config.command_timeout),
            expect_stdout: Some(
                config
                    .readiness_expect
                    .clone()
                    .unwrap_or_else(|| config.db_service.clone()),
            ),
        },
    }
}
