//! Orchestrator configuration loaded from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Default compose profile that contains only the database service.
pub const DEFAULT_COMPOSE_PROFILE: &str = "db_test";

/// Default database service name inside the compose profile.
pub const DEFAULT_DB_SERVICE: &str = "db";

/// Default delay between readiness attempts.
pub const DEFAULT_READINESS_INTERVAL_SECS: u64 = 2;

/// Default upper bound on readiness polling.
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 120;

/// Default backend directory, relative to the project root.
pub const DEFAULT_BACKEND_DIR: &str = "backend";

#[cfg(windows)]
const DEFAULT_TEST_COMMAND: &str = "gradlew.bat";
#[cfg(not(windows))]
const DEFAULT_TEST_COMMAND: &str = "./gradlew";

/// Everything the orchestrator needs to know about one run.
///
/// [`OrchestratorConfig::new`] gives the defaults; [`OrchestratorConfig::from_env`]
/// overrides them from the environment.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory holding the compose file and the backend directory.
    pub project_root: PathBuf,
    /// Compose program followed by leading arguments, e.g. `["docker", "compose"]`.
    pub compose_command: Vec<String>,
    pub compose_profile: String,
    pub db_service: String,
    /// Pass `-d` to `up` instead of blocking until compose returns.
    pub detached_start: bool,
    /// Pass `--build` to `up`.
    pub build_on_start: bool,
    /// Poll the readiness check before running tests.
    pub poll_readiness: bool,
    /// Explicit readiness check; `None` uses `compose ps --status running`.
    pub readiness_command: Option<Vec<String>>,
    /// Text the readiness check's stdout must contain.
    pub readiness_expect: Option<String>,
    pub readiness_interval: Duration,
    /// `None` polls forever.
    pub readiness_timeout: Option<Duration>,
    /// Build tool program followed by leading arguments.
    pub test_command: Vec<String>,
    pub test_task: String,
    /// Test working directory, relative to `project_root`.
    pub backend_dir: PathBuf,
    /// Pass `--continue` so every failing task is reported.
    pub continue_on_test_failure: bool,
    /// Pass `-v` to `down`.
    pub remove_volumes_on_teardown: bool,
    /// Per-command timeout for start, tests and teardown.
    pub command_timeout: Option<Duration>,
    /// Emit ANSI colors in console banners.
    pub color: bool,
}

impl OrchestratorConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            compose_command: vec!["docker-compose".to_string()],
            compose_profile: DEFAULT_COMPOSE_PROFILE.to_string(),
            db_service: DEFAULT_DB_SERVICE.to_string(),
            detached_start: true,
            build_on_start: true,
            poll_readiness: true,
            readiness_command: None,
            readiness_expect: None,
            readiness_interval: Duration::from_secs(DEFAULT_READINESS_INTERVAL_SECS),
            readiness_timeout: Some(Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS)),
            test_command: vec![DEFAULT_TEST_COMMAND.to_string()],
            test_task: "check".to_string(),
            backend_dir: PathBuf::from(DEFAULT_BACKEND_DIR),
            continue_on_test_failure: true,
            remove_volumes_on_teardown: true,
            command_timeout: None,
            color: true,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// `default_root` is used when `PROJECT_ROOT` is not set.
    pub fn from_env(default_root: &Path) -> Result<Self, ConfigError> {
        Self::from_lookup(default_root, |key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// | Env Var                      | Default                          |
    /// |------------------------------|----------------------------------|
    /// | `PROJECT_ROOT`               | `default_root`                   |
    /// | `COMPOSE_COMMAND`            | `docker-compose`                 |
    /// | `COMPOSE_PROFILE`            | `db_test`                        |
    /// | `DB_SERVICE`                 | `db`                             |
    /// | `DETACHED_START`             | `true`                           |
    /// | `BUILD_ON_START`             | `true`                           |
    /// | `POLL_READINESS`             | `true`                           |
    /// | `READINESS_COMMAND`          | unset (compose status check)     |
    /// | `READINESS_EXPECT`           | unset                            |
    /// | `READINESS_INTERVAL_SECS`    | `2`                              |
    /// | `READINESS_TIMEOUT_SECS`     | `120` (`0` = unbounded)          |
    /// | `TEST_COMMAND`               | `./gradlew`                      |
    /// | `TEST_TASK`                  | `check`                          |
    /// | `BACKEND_DIR`                | `backend`                        |
    /// | `CONTINUE_ON_TEST_FAILURE`   | `true`                           |
    /// | `REMOVE_VOLUMES_ON_TEARDOWN` | `true`                           |
    /// | `COMMAND_TIMEOUT_SECS`       | `0` (no timeout)                 |
    /// | `NO_COLOR`                   | unset (colors on)                |
    pub fn from_lookup<F>(default_root: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let root = var("PROJECT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_root.to_path_buf());
        let project_root = std::path::absolute(&root).map_err(|e| ConfigError::Invalid {
            key: "PROJECT_ROOT",
            value: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config = Self::new(project_root);

        if let Some(v) = var("COMPOSE_COMMAND") {
            config.compose_command = split_command("COMPOSE_COMMAND", &v)?;
        }
        if let Some(v) = var("COMPOSE_PROFILE") {
            config.compose_profile = v.trim().to_string();
        }
        if let Some(v) = var("DB_SERVICE") {
            config.db_service = v.trim().to_string();
        }
        if let Some(v) = var("DETACHED_START") {
            config.detached_start = parse_bool("DETACHED_START", &v)?;
        }
        if let Some(v) = var("BUILD_ON_START") {
            config.build_on_start = parse_bool("BUILD_ON_START", &v)?;
        }
        if let Some(v) = var("POLL_READINESS") {
            config.poll_readiness = parse_bool("POLL_READINESS", &v)?;
        }
        if let Some(v) = var("READINESS_COMMAND") {
            config.readiness_command = Some(split_command("READINESS_COMMAND", &v)?);
        }
        config.readiness_expect = var("READINESS_EXPECT");
        if let Some(v) = var("READINESS_INTERVAL_SECS") {
            config.readiness_interval =
                Duration::from_secs(parse_secs("READINESS_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = var("READINESS_TIMEOUT_SECS") {
            config.readiness_timeout =
                optional_secs(parse_secs("READINESS_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("TEST_COMMAND") {
            config.test_command = split_command("TEST_COMMAND", &v)?;
        }
        if let Some(v) = var("TEST_TASK") {
            config.test_task = v.trim().to_string();
        }
        if let Some(v) = var("BACKEND_DIR") {
            config.backend_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = var("CONTINUE_ON_TEST_FAILURE") {
            config.continue_on_test_failure = parse_bool("CONTINUE_ON_TEST_FAILURE", &v)?;
        }
        if let Some(v) = var("REMOVE_VOLUMES_ON_TEARDOWN") {
            config.remove_volumes_on_teardown = parse_bool("REMOVE_VOLUMES_ON_TEARDOWN", &v)?;
        }
        if let Some(v) = var("COMMAND_TIMEOUT_SECS") {
            config.command_timeout = optional_secs(parse_secs("COMMAND_TIMEOUT_SECS", &v)?);
        }
        // https://no-color.org: any non-empty value disables color.
        config.color = var("NO_COLOR").is_none();

        Ok(config)
    }

    /// Absolute directory the test command runs in.
    pub fn backend_directory(&self) -> PathBuf {
        self.project_root.join(&self.backend_dir)
    }
}

/// Parse a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean (true/false, yes/no, on/off, 1/0)".to_string(),
        }),
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: "expected a whole number of seconds".to_string(),
    })
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn split_command(key: &'static str, value: &str) -> Result<Vec<String>, ConfigError> {
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(ConfigError::Empty(key));
    }
    Ok(parts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
