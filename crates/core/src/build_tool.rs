//! Build tool (Gradle wrapper) invocation.

use std::path::{Path, PathBuf};

use crate::config::OrchestratorConfig;
use crate::process::CommandSpec;

/// Number of trailing stdout lines shown when a failing build wrote
/// nothing to stderr.
const STDOUT_TAIL_LINES: usize = 40;

/// `<test_command> <task> [--continue]` with the backend directory as its
/// working directory.
///
/// A relative program path such as `./gradlew` is resolved against the
/// backend directory; how a relative program interacts with
/// `current_dir` is platform dependent otherwise.
pub fn check_command(config: &OrchestratorConfig) -> CommandSpec {
    let backend = config.backend_directory();

    let (program, leading) = match config.test_command.split_first() {
        Some((program, rest)) => (program.as_str(), rest),
        None => ("./gradlew", &[][..]),
    };

    let mut spec = CommandSpec::new(resolve_program(program, &backend))
        .args(leading)
        .arg(config.test_task.as_str());
    if config.continue_on_test_failure {
        spec = spec.arg("--continue");
    }
    spec.current_dir(backend).timeout(config.command_timeout)
}

fn resolve_program(program: &str, backend: &Path) -> String {
    let path = Path::new(program);
    let has_separator = program.contains('/') || program.contains(std::path::MAIN_SEPARATOR);
    if path.is_relative() && has_separator {
        let joined: PathBuf = backend.join(path);
        joined.to_string_lossy().into_owned()
    } else {
        program.to_string()
    }
}

/// Text worth showing for a failed build: stderr if present, otherwise the
/// tail of stdout (Gradle prints task failures on stdout).
pub fn failure_excerpt(stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let lines: Vec<&str> = stdout.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDOUT_TAIL_LINES);
    lines[start..].join("\n")
}
