//! The test run: start database, wait, run tests, stop database.
//!
//! [`Orchestrator::run_until`] treats the database as a scoped resource:
//! the body (start, readiness, tests) runs until it finishes, fails, or the
//! shutdown future resolves, and teardown is attempted exactly once
//! afterwards on every one of those paths.

use std::future::Future;

use chrono::Utc;

use crate::build_tool;
use crate::compose;
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::process::{run_checked, CommandRunner};
use crate::readiness;
use crate::report::{Reporter, RunReport, StepStatus};

pub struct Orchestrator<R> {
    runner: R,
    config: OrchestratorConfig,
    reporter: Reporter,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(runner: R, config: OrchestratorConfig) -> Self {
        let reporter = Reporter::stdout(config.color);
        Self {
            runner,
            config,
            reporter,
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Run to completion without an external shutdown signal.
    pub async fn run(&self) -> RunReport {
        self.run_until(std::future::pending()).await
    }

    /// Run, abandoning the body if `shutdown` resolves first.
    ///
    /// Abandoning the body drops any in-flight child process, which kills
    /// it. Teardown runs in both cases.
    pub async fn run_until<F>(&self, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let mut report = RunReport::new(Utc::now());

        let interrupted = {
            let body = self.body(&mut report);
            tokio::pin!(body);
            tokio::select! {
                () = &mut body => false,
                () = shutdown => true,
            }
        };

        if interrupted {
            tracing::warn!("Interrupted, stopping the database before exiting");
        }
        report.settle_body(interrupted);

        report.teardown = match self.stop_database().await {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => {
                self.reporter.error(&e.to_string());
                StepStatus::failed(e)
            }
        };

        report.finished_at = Some(Utc::now());
        tracing::info!(exit_code = report.exit_code(), "Test run finished");
        self.reporter.summary(&report);
        report
    }

    /// Start, readiness, tests. Records each step as it completes so the
    /// report is accurate even if this future is dropped midway.
    async fn body(&self, report: &mut RunReport) {
        if let Err(e) = self.start_database().await {
            self.reporter.error(&e.to_string());
            report.start = StepStatus::failed(e);
            return;
        }
        report.start = StepStatus::Succeeded;

        if self.config.poll_readiness {
            if let Err(e) = self.wait_for_database().await {
                self.reporter.error(&e.to_string());
                report.readiness = StepStatus::failed(e);
                return;
            }
            report.readiness = StepStatus::Succeeded;
        } else {
            tracing::warn!(
                "Readiness polling disabled; tests may start before the database accepts connections"
            );
            report.readiness = StepStatus::Skipped;
        }

        report.tests = self.run_tests().await;
    }

    async fn start_database(&self) -> Result<(), OrchestratorError> {
        self.reporter.step("Starting the database container...");
        let spec = compose::up(&self.config);
        tracing::info!(command = %spec, detached = self.config.detached_start, "Starting database");
        run_checked(&self.runner, &spec)
            .await
            .map_err(OrchestratorError::Start)?;
        Ok(())
    }

    async fn wait_for_database(&self) -> Result<u32, OrchestratorError> {
        self.reporter.step("Waiting for the database to become available...");
        let probe = compose::readiness_probe(&self.config);
        tracing::info!(
            command = %probe.command,
            interval_ms = self.config.readiness_interval.as_millis() as u64,
            timeout_ms = self.config.readiness_timeout.map(|t| t.as_millis() as u64),
            "Polling database readiness",
        );
        readiness::wait_until_ready(
            &self.runner,
            &probe,
            self.config.readiness_interval,
            self.config.readiness_timeout,
        )
        .await
    }

    /// A failing test command is reported and recorded, never raised.
    async fn run_tests(&self) -> StepStatus {
        self.reporter.step("Running backend tests...");
        let spec = build_tool::check_command(&self.config);
        tracing::info!(
            command = %spec,
            working_directory = %self.config.backend_directory().display(),
            "Running tests",
        );

        let output = match self.runner.execute(&spec).await {
            Ok(output) => output,
            Err(e) => {
                let err = OrchestratorError::Tests(e);
                tracing::error!(error = %err, "Test command could not be run");
                self.reporter.error(&err.to_string());
                return StepStatus::failed(err);
            }
        };

        if output.success() {
            tracing::info!(duration_ms = output.duration_ms, "Tests passed");
            self.reporter.tests_passed();
            StepStatus::Succeeded
        } else {
            let excerpt = build_tool::failure_excerpt(&output.stdout, &output.stderr);
            tracing::error!(
                exit_code = output.exit_code,
                duration_ms = output.duration_ms,
                "Tests failed",
            );
            self.reporter.tests_failed(&excerpt);
            StepStatus::Failed {
                message: if excerpt.is_empty() {
                    format!("{spec} exited with code {}", output.exit_code)
                } else {
                    excerpt
                },
            }
        }
    }

    async fn stop_database(&self) -> Result<(), OrchestratorError> {
        self.reporter.step("Stopping Docker containers...");
        let spec = compose::down(&self.config);
        tracing::info!(command = %spec, "Stopping database");
        run_checked(&self.runner, &spec)
            .await
            .map_err(OrchestratorError::Teardown)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::error::CommandError;
    use crate::process::{CommandOutput, CommandSpec};
    use crate::report::{
        EXIT_INFRASTRUCTURE_FAILED, EXIT_INTERRUPTED, EXIT_SUCCESS, EXIT_TESTS_FAILED,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Up,
        Probe,
        Tests,
        Down,
    }

    fn classify(spec: &CommandSpec) -> Kind {
        if spec.args.iter().any(|a| a == "up") {
            Kind::Up
        } else if spec.args.iter().any(|a| a == "down") {
            Kind::Down
        } else if spec.args.iter().any(|a| a == "ps") {
            Kind::Probe
        } else {
            Kind::Tests
        }
    }

    enum Scripted {
        Exit { code: i32, stdout: &'static str, stderr: &'static str },
        SpawnError,
        Hang,
    }

    fn ok() -> Scripted {
        Scripted::Exit { code: 0, stdout: "", stderr: "" }
    }

    fn exit(code: i32, stderr: &'static str) -> Scripted {
        Scripted::Exit { code, stdout: "", stderr }
    }

    /// Records every invocation and answers from per-kind scripts.
    /// Kinds without a script succeed; probes list the `db` service.
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<CommandSpec>>,
        scripts: Mutex<Vec<(Kind, VecDeque<Scripted>)>>,
    }

    impl FakeRunner {
        fn script(self, kind: Kind, responses: Vec<Scripted>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .push((kind, responses.into_iter().collect()));
            self
        }

        fn kinds(&self) -> Vec<Kind> {
            self.calls.lock().unwrap().iter().map(classify).collect()
        }

        fn count(&self, kind: Kind) -> usize {
            self.kinds().into_iter().filter(|k| *k == kind).count()
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        fn next(&self, kind: Kind) -> Scripted {
            let mut scripts = self.scripts.lock().unwrap();
            let scripted = scripts
                .iter_mut()
                .find(|(k, _)| *k == kind)
                .and_then(|(_, queue)| queue.pop_front());
            match (scripted, kind) {
                (Some(s), _) => s,
                (None, Kind::Probe) => Scripted::Exit { code: 0, stdout: "db\n", stderr: "" },
                (None, _) => ok(),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
            self.calls.lock().unwrap().push(spec.clone());
            match self.next(classify(spec)) {
                Scripted::Exit { code, stdout, stderr } => Ok(CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code: code,
                    duration_ms: 1,
                }),
                Scripted::SpawnError => Err(CommandError::Spawn {
                    command: spec.display(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }),
                Scripted::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::new("/srv/project");
        config.readiness_interval = Duration::from_millis(1);
        config.readiness_timeout = Some(Duration::from_millis(200));
        config
    }

    fn orchestrator(runner: &FakeRunner, config: OrchestratorConfig) -> Orchestrator<&FakeRunner> {
        Orchestrator::new(runner, config).with_reporter(Reporter::capture())
    }

    #[tokio::test]
    async fn all_steps_succeed() {
        let runner = FakeRunner::default();
        let orch = orchestrator(&runner, config());
        let report = orch.run().await;

        assert_eq!(runner.kinds(), vec![Kind::Up, Kind::Probe, Kind::Tests, Kind::Down]);
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
        assert!(report.finished_at.is_some());
        let out = orch.reporter().captured();
        assert!(out.contains("Tests passed successfully!"));
        assert!(out.contains("Test run finished successfully."));
    }

    #[tokio::test]
    async fn failing_tests_are_reported_and_teardown_still_runs() {
        let runner = FakeRunner::default().script(Kind::Tests, vec![exit(1, "1 test failed")]);
        let orch = orchestrator(&runner, config());
        let report = orch.run().await;

        assert_eq!(runner.count(Kind::Down), 1);
        assert_eq!(report.teardown, StepStatus::Succeeded);
        assert_eq!(report.exit_code(), EXIT_TESTS_FAILED);
        assert_matches!(
            report.tests,
            StepStatus::Failed { ref message } if message == "1 test failed"
        );
        assert!(orch.reporter().captured().contains("1 test failed"));
    }

    #[tokio::test]
    async fn start_failure_skips_tests_but_tears_down() {
        let runner = FakeRunner::default().script(Kind::Up, vec![exit(1, "pull access denied")]);
        let orch = orchestrator(&runner, config());
        let report = orch.run().await;

        assert_eq!(runner.kinds(), vec![Kind::Up, Kind::Down]);
        assert_eq!(report.readiness, StepStatus::Skipped);
        assert_eq!(report.tests, StepStatus::Skipped);
        assert_eq!(report.exit_code(), EXIT_INFRASTRUCTURE_FAILED);
        assert_matches!(
            report.start,
            StepStatus::Failed { ref message } if message.contains("pull access denied")
        );
    }

    #[tokio::test]
    async fn start_spawn_error_still_tears_down() {
        let runner = FakeRunner::default().script(Kind::Up, vec![Scripted::SpawnError]);
        let report = orchestrator(&runner, config()).run().await;

        assert_eq!(runner.count(Kind::Tests), 0);
        assert_eq!(runner.count(Kind::Down), 1);
        assert_eq!(report.exit_code(), EXIT_INFRASTRUCTURE_FAILED);
    }

    #[tokio::test]
    async fn readiness_polls_until_service_is_running() {
        let runner = FakeRunner::default().script(
            Kind::Probe,
            vec![
                exit(1, "no such service"),
                Scripted::Exit { code: 0, stdout: "", stderr: "" },
                Scripted::Exit { code: 0, stdout: "db\n", stderr: "" },
            ],
        );
        let report = orchestrator(&runner, config()).run().await;

        assert_eq!(runner.count(Kind::Probe), 3);
        assert_eq!(report.readiness, StepStatus::Succeeded);
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn readiness_timeout_skips_tests_but_tears_down() {
        let runner = FakeRunner::default().script(
            Kind::Probe,
            (0..1000).map(|_| exit(1, "starting")).collect(),
        );
        let mut config = config();
        config.readiness_timeout = Some(Duration::from_millis(20));
        let report = orchestrator(&runner, config).run().await;

        assert_eq!(runner.count(Kind::Tests), 0);
        assert_eq!(runner.count(Kind::Down), 1);
        assert_matches!(
            report.readiness,
            StepStatus::Failed { ref message } if message.contains("not ready")
        );
        assert_eq!(report.exit_code(), EXIT_INFRASTRUCTURE_FAILED);
    }

    #[tokio::test]
    async fn hanging_readiness_check_is_bounded_by_deadline() {
        let runner = FakeRunner::default().script(Kind::Probe, vec![Scripted::Hang]);
        let mut config = config();
        config.readiness_timeout = Some(Duration::from_millis(100));
        config.command_timeout = Some(Duration::from_millis(100));
        let orch = orchestrator(&runner, config);

        let report = tokio::time::timeout(Duration::from_secs(3), orch.run())
            .await
            .expect("run finishes once the readiness deadline passes");

        assert!(report.readiness.is_failed());
        assert_eq!(runner.count(Kind::Tests), 0);
        assert_eq!(runner.count(Kind::Down), 1);
        assert_eq!(report.exit_code(), EXIT_INFRASTRUCTURE_FAILED);
    }

    #[tokio::test]
    async fn readiness_can_be_disabled() {
        let runner = FakeRunner::default();
        let mut config = config();
        config.poll_readiness = false;
        let report = orchestrator(&runner, config).run().await;

        assert_eq!(runner.kinds(), vec![Kind::Up, Kind::Tests, Kind::Down]);
        assert_eq!(report.readiness, StepStatus::Skipped);
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn teardown_failure_fails_the_run() {
        let runner = FakeRunner::default().script(Kind::Down, vec![exit(1, "network in use")]);
        let orch = orchestrator(&runner, config());
        let report = orch.run().await;

        assert_eq!(report.tests, StepStatus::Succeeded);
        assert!(report.teardown.is_failed());
        assert_eq!(report.exit_code(), EXIT_INFRASTRUCTURE_FAILED);
        assert!(orch.reporter().captured().contains("network in use"));
    }

    #[tokio::test]
    async fn test_command_spawn_error_counts_as_test_failure() {
        let runner = FakeRunner::default().script(Kind::Tests, vec![Scripted::SpawnError]);
        let report = orchestrator(&runner, config()).run().await;

        assert_matches!(
            report.tests,
            StepStatus::Failed { ref message } if message.contains("could not be run")
        );
        assert_eq!(runner.count(Kind::Down), 1);
        assert_eq!(report.exit_code(), EXIT_TESTS_FAILED);
    }

    #[tokio::test]
    async fn interrupt_during_tests_tears_down_once() {
        let runner = FakeRunner::default().script(Kind::Tests, vec![Scripted::Hang]);
        let orch = orchestrator(&runner, config());
        let report = orch
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert_eq!(runner.kinds(), vec![Kind::Up, Kind::Probe, Kind::Tests, Kind::Down]);
        assert_eq!(report.start, StepStatus::Succeeded);
        assert_eq!(report.tests, StepStatus::Interrupted);
        assert_eq!(report.teardown, StepStatus::Succeeded);
        assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
    }

    #[tokio::test]
    async fn variant_flags_shape_the_commands() {
        let runner = FakeRunner::default();
        let mut config = config();
        config.detached_start = false;
        config.poll_readiness = false;
        config.continue_on_test_failure = false;
        config.remove_volumes_on_teardown = false;
        orchestrator(&runner, config).run().await;

        let lines: Vec<String> = runner.calls().iter().map(CommandSpec::display).collect();
        assert_eq!(
            lines,
            vec![
                "docker-compose --profile db_test up --build".to_string(),
                "/srv/project/backend/./gradlew check".to_string(),
                "docker-compose --profile db_test down".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn tests_run_in_backend_directory() {
        let runner = FakeRunner::default();
        orchestrator(&runner, config()).run().await;

        let calls = runner.calls();
        let tests = calls
            .iter()
            .find(|c| classify(c) == Kind::Tests)
            .expect("tests invoked");
        assert_eq!(
            tests.working_directory,
            Some(PathBuf::from("/srv/project/backend"))
        );
    }
}
