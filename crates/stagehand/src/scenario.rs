//! Scenario Execution Lifecycle
//!
//! One [`ScenarioExecution`] per run. It owns everything the run mutates
//! (topology, workaround ledger, dependency outcomes, session) so concurrent
//! runs in one process never share state.
//!
//! Per test method:
//!
//! ```text
//! Pending ──gate──► Skipped
//!    │
//!    └──► Running ──body──► Passed
//!                     └───► Failed ──► known-issue triage
//! ```
//!
//! Pacing (`step_delay`) happens once after every body that ran, whatever its
//! outcome. Skipped tests are neither paced nor triaged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{RunConfig, TimeoutCategory};
use crate::dependency::{DependencyGraph, DependencySkip, TestId, TestStatus};
use crate::known_issues::KnownIssues;
use crate::result::{StagehandError, StagehandResult};
use crate::session::{DriverFactory, Session};
use crate::topology::Topology;
use crate::wait::BusyIndicator;
use crate::workaround::{WorkaroundLedger, WorkaroundRecord};

// =============================================================================
// TEST PHASE
// =============================================================================

/// Lifecycle phase of one test method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    /// Not started
    Pending,
    /// Gated out by an unmet dependency
    Skipped,
    /// Body executing
    Running,
    /// Body returned successfully
    Passed,
    /// Body failed or panicked
    Failed,
}

impl TestPhase {
    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(self, next: Self) -> StagehandResult<Self> {
        match (self, next) {
            (Self::Pending, Self::Skipped | Self::Running)
            | (Self::Running, Self::Passed | Self::Failed) => Ok(next),
            _ => Err(StagehandError::invalid_argument(format!(
                "illegal test phase transition {self:?} -> {next:?}"
            ))),
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Passed | Self::Failed)
    }

    /// Final status, once terminal
    #[must_use]
    pub const fn status(self) -> Option<TestStatus> {
        match self {
            Self::Skipped => Some(TestStatus::Skipped),
            Self::Passed => Some(TestStatus::Passed),
            Self::Failed => Some(TestStatus::Failed),
            Self::Pending | Self::Running => None,
        }
    }
}

/// Non-failing result of [`ScenarioExecution::run_test`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Body ran and succeeded
    Passed,
    /// Body never ran
    Skipped(DependencySkip),
}

impl TestOutcome {
    /// Whether the body was skipped
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

// =============================================================================
// RECORDS & REPORT
// =============================================================================

/// Reported result of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    /// Test identity
    pub id: TestId,
    /// Final status
    pub status: TestStatus,
    /// Body duration in milliseconds (zero when skipped)
    pub duration_ms: u64,
    /// Unsatisfied dependency, for skipped tests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Failure text, including any known-issue note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tracking id when the failure is a known issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

/// Summary produced when a run is torn down
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Unique run id
    pub run_id: String,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Run duration in milliseconds
    pub duration_ms: u64,
    /// Per-test records in execution order
    pub records: Vec<TestRecord>,
    /// Workarounds taken during the run
    pub workarounds: Vec<WorkaroundRecord>,
}

impl ScenarioReport {
    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Count skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Total tests recorded
    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing failed (skips do not count as failures)
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }

    /// Failed test records
    #[must_use]
    pub fn failures(&self) -> Vec<&TestRecord> {
        self.records
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
            .collect()
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> StagehandResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

/// Per-run state handed to every test body
pub struct RunState {
    config: RunConfig,
    topology: Topology,
    ledger: WorkaroundLedger,
    session: Option<Session>,
    factory: Option<DriverFactory>,
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("config", &self.config)
            .field("topology", &self.topology)
            .field("ledger", &self.ledger)
            .field("session", &self.session)
            .field("has_driver_factory", &self.factory.is_some())
            .finish()
    }
}

impl RunState {
    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Scenario data from the configuration
    #[must_use]
    pub const fn data(&self) -> &serde_json::Value {
        &self.config.data
    }

    /// Timeout for a category, scaled by the performance multiplier
    #[must_use]
    pub fn timeout(&self, category: TimeoutCategory) -> Duration {
        self.config.timeouts.timeout(category)
    }

    /// Applications and their login state
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable topology, for login/logout
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Workarounds applied so far
    #[must_use]
    pub const fn ledger(&self) -> &WorkaroundLedger {
        &self.ledger
    }

    /// Mutable ledger, for applying workarounds
    pub fn ledger_mut(&mut self) -> &mut WorkaroundLedger {
        &mut self.ledger
    }

    /// Active session
    pub fn session(&mut self) -> StagehandResult<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| StagehandError::driver("no session has been acquired for this run"))
    }

    /// Whether a session is active
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Log every application out and replace the session with a fresh one
    pub fn new_session(&mut self) -> StagehandResult<&mut Session> {
        self.topology.logout_all();
        if let Some(mut old) = self.session.take() {
            old.release();
        }
        self.acquire_session()
    }

    fn acquire_session(&mut self) -> StagehandResult<&mut Session> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| StagehandError::driver("no driver factory configured"))?;
        let session = Session::acquire(factory()?)?
            .with_timeouts(self.config.timeouts.clone())
            .with_poll_interval(self.config.poll_interval())
            .with_busy_indicator(BusyIndicator::from_classes(
                &self.config.busy_indicator_classes,
            ));
        Ok(self.session.insert(session))
    }

    fn release_session(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.release();
        }
    }
}

// =============================================================================
// SCENARIO EXECUTION
// =============================================================================

/// One scenario run
#[derive(Debug)]
pub struct ScenarioExecution {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    known_issues: KnownIssues,
    graph: DependencyGraph,
    records: Vec<TestRecord>,
    state: RunState,
}

impl ScenarioExecution {
    /// Start a run: validate the configuration, load the known-issues file
    /// and build the topology.
    pub fn start(config: RunConfig) -> StagehandResult<Self> {
        config.validate()?;
        let known_issues = match &config.known_issues_file {
            Some(path) => KnownIssues::load(path)?,
            None => KnownIssues::empty(),
        };
        let topology = Topology::from_config(&config.applications)?;
        let run_id = Uuid::new_v4();
        info!(
            run = %run_id,
            applications = topology.applications().len(),
            known_issues = known_issues.len(),
            "scenario started"
        );
        Ok(Self {
            run_id,
            started_at: Utc::now(),
            started: Instant::now(),
            known_issues,
            graph: DependencyGraph::new(),
            records: Vec::new(),
            state: RunState {
                config,
                topology,
                ledger: WorkaroundLedger::new(),
                session: None,
                factory: None,
            },
        })
    }

    /// Replace the known-issues registry
    #[must_use]
    pub fn with_known_issues(mut self, known_issues: KnownIssues) -> Self {
        self.known_issues = known_issues;
        self
    }

    /// Attach a driver factory and acquire the run's session
    pub fn with_driver(mut self, factory: DriverFactory) -> StagehandResult<Self> {
        self.state.factory = Some(factory);
        let _ = self.state.acquire_session()?;
        Ok(self)
    }

    /// Unique run id
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Per-run state
    #[must_use]
    pub const fn state(&self) -> &RunState {
        &self.state
    }

    /// Mutable per-run state
    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    /// Loaded known-issues registry
    #[must_use]
    pub const fn known_issues(&self) -> &KnownIssues {
        &self.known_issues
    }

    /// Last recorded status of a test
    #[must_use]
    pub fn status(&self, id: &TestId) -> Option<TestStatus> {
        self.graph.status(id)
    }

    /// Records so far, in execution order
    #[must_use]
    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Run one test method.
    ///
    /// Returns `Ok(TestOutcome::Skipped)` without calling `body` when a
    /// declared dependency did not pass. A failing body is reported as `Err`
    /// after triage against the known-issues registry.
    pub fn run_test<S, F>(
        &mut self,
        id: TestId,
        dependencies: &[S],
        body: F,
    ) -> StagehandResult<TestOutcome>
    where
        S: AsRef<str>,
        F: FnOnce(&mut RunState) -> StagehandResult<()>,
    {
        let phase = TestPhase::Pending;

        if let Some(skip) = self.graph.first_unsatisfied(&id, dependencies) {
            let phase = phase.advance(TestPhase::Skipped)?;
            warn!(test = %id, reason = %skip, "test skipped");
            self.finish_test(id, phase, Duration::ZERO, Some(skip.to_string()), None);
            return Ok(TestOutcome::Skipped(skip));
        }

        let phase = phase.advance(TestPhase::Running)?;
        debug!(test = %id, ?phase, "test started");
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut self.state)))
            .unwrap_or_else(|payload| {
                Err(StagehandError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });
        let duration = started.elapsed();
        self.pace();

        match result {
            Ok(()) => {
                let phase = phase.advance(TestPhase::Passed)?;
                info!(test = %id, duration_ms = millis(duration), "test passed");
                self.finish_test(id, phase, duration, None, None);
                Ok(TestOutcome::Passed)
            }
            Err(failure) => {
                let phase = phase.advance(TestPhase::Failed)?;
                let failure = self.known_issues.triage(&id.full_path(), failure);
                error!(test = %id, error = %failure, "test failed");
                self.finish_test(id, phase, duration, None, Some(&failure));
                Err(failure)
            }
        }
    }

    /// Tear the run down and produce its report
    #[must_use]
    pub fn finish(mut self) -> ScenarioReport {
        self.state.release_session();
        let report = ScenarioReport {
            run_id: self.run_id.to_string(),
            started_at: self.started_at,
            duration_ms: millis(self.started.elapsed()),
            records: self.records,
            workarounds: self.state.ledger.history().to_vec(),
        };
        info!(
            run = %report.run_id,
            passed = report.passed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "scenario finished"
        );
        report
    }

    fn pace(&self) {
        let delay = self.state.config.step_delay();
        if !delay.is_zero() {
            debug!(delay_ms = millis(delay), "pacing");
            std::thread::sleep(delay);
        }
    }

    fn finish_test(
        &mut self,
        id: TestId,
        phase: TestPhase,
        duration: Duration,
        skip_reason: Option<String>,
        failure: Option<&StagehandError>,
    ) {
        let Some(status) = phase.status() else {
            return;
        };
        self.graph.record(id.clone(), status);
        self.records.push(TestRecord {
            id,
            status,
            duration_ms: millis(duration),
            skip_reason,
            error: failure.map(ToString::to_string),
            tracking_id: failure.and_then(|f| f.tracking_id().map(str::to_string)),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ApplicationConfig;
    use crate::driver::Driver;
    use crate::mock::MockDriver;
    use crate::topology::User;
    use std::sync::Arc;

    fn test_id(name: &str) -> TestId {
        TestId::new("com.acme", "Orders", name)
    }

    fn scenario() -> ScenarioExecution {
        ScenarioExecution::start(RunConfig::new()).unwrap()
    }

    const NO_DEPS: [&str; 0] = [];

    mod phase_tests {
        use super::*;

        #[test]
        fn test_allowed_transitions() {
            assert_eq!(
                TestPhase::Pending.advance(TestPhase::Running).unwrap(),
                TestPhase::Running
            );
            assert!(TestPhase::Pending.advance(TestPhase::Skipped).is_ok());
            assert!(TestPhase::Running.advance(TestPhase::Passed).is_ok());
            assert!(TestPhase::Running.advance(TestPhase::Failed).is_ok());
        }

        #[test]
        fn test_illegal_transitions() {
            assert!(TestPhase::Pending.advance(TestPhase::Passed).is_err());
            assert!(TestPhase::Running.advance(TestPhase::Skipped).is_err());
            assert!(TestPhase::Passed.advance(TestPhase::Failed).is_err());
            assert!(TestPhase::Skipped.advance(TestPhase::Running).is_err());
        }

        #[test]
        fn test_terminal_status() {
            assert!(TestPhase::Failed.is_terminal());
            assert!(!TestPhase::Running.is_terminal());
            assert_eq!(TestPhase::Skipped.status(), Some(TestStatus::Skipped));
            assert_eq!(TestPhase::Pending.status(), None);
        }
    }

    mod gating_tests {
        use super::*;

        #[test]
        fn test_failed_dependency_skips_without_running_body() {
            let mut run = scenario();
            let _ = run.run_test(test_id("test01"), &NO_DEPS, |_| {
                Err(StagehandError::assertion("broken"))
            });

            let mut calls = 0;
            let outcome = run
                .run_test(test_id("test02"), &["this.test01"], |_| {
                    calls += 1;
                    Ok(())
                })
                .unwrap();

            assert_eq!(calls, 0);
            let TestOutcome::Skipped(skip) = outcome else {
                panic!("expected skip");
            };
            assert_eq!(skip.dependency, Some(test_id("test01")));
            assert_eq!(run.status(&test_id("test02")), Some(TestStatus::Skipped));
        }

        #[test]
        fn test_skip_cascades() {
            let mut run = scenario();
            let _ = run.run_test(test_id("test01"), &["this.test00"], |_| Ok(()));
            let outcome = run
                .run_test(test_id("test02"), &["this.test01"], |_| Ok(()))
                .unwrap();
            assert!(outcome.is_skipped());
        }

        #[test]
        fn test_passed_dependency_runs_body() {
            let mut run = scenario();
            run.run_test(test_id("test01"), &NO_DEPS, |_| Ok(())).unwrap();
            let outcome = run
                .run_test(test_id("test02"), &["Orders.test01"], |_| Ok(()))
                .unwrap();
            assert_eq!(outcome, TestOutcome::Passed);
        }

        #[test]
        fn test_skip_is_not_triaged() {
            let mut run = scenario().with_known_issues(KnownIssues::from_pairs([(
                "com.acme.Orders.test02",
                "TICKET-2",
            )]));
            let outcome = run
                .run_test(test_id("test02"), &["this.missing"], |_| Ok(()))
                .unwrap();
            assert!(outcome.is_skipped());
            assert!(run.records()[0].tracking_id.is_none());
            assert!(run.records()[0]
                .skip_reason
                .as_deref()
                .unwrap()
                .contains("com.acme.Orders.missing"));
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn test_unknown_failure_passes_through() {
            let mut run = scenario();
            let err = run
                .run_test(test_id("test01"), &NO_DEPS, |_| {
                    Err(StagehandError::assertion("total was 3"))
                })
                .unwrap_err();
            assert_eq!(err.to_string(), "Assertion failed: total was 3");
            assert_eq!(run.status(&test_id("test01")), Some(TestStatus::Failed));
        }

        #[test]
        fn test_known_issue_is_reclassified() {
            let mut run = scenario().with_known_issues(KnownIssues::from_pairs([(
                "com.acme.Orders.test01",
                "TICKET-1",
            )]));
            let err = run
                .run_test(test_id("test01"), &NO_DEPS, |_| {
                    Err(StagehandError::assertion("total was 3"))
                })
                .unwrap_err();
            let text = err.to_string();
            assert!(text.contains("total was 3"));
            assert!(text.contains("TICKET-1"));
            assert_eq!(run.records()[0].tracking_id.as_deref(), Some("TICKET-1"));
        }

        #[test]
        fn test_panic_becomes_failure() {
            let mut run = scenario();
            let err = run
                .run_test(test_id("test01"), &NO_DEPS, |_| panic!("lost the grid"))
                .unwrap_err();
            match err {
                StagehandError::Panicked { message } => assert_eq!(message, "lost the grid"),
                other => panic!("expected Panicked, got {other:?}"),
            }
        }
    }

    mod pacing_tests {
        use super::*;

        fn paced() -> ScenarioExecution {
            ScenarioExecution::start(RunConfig::new().with_step_delay(0.05)).unwrap()
        }

        #[test]
        fn test_paces_after_success_and_failure() {
            let mut run = paced();
            let start = Instant::now();
            run.run_test(test_id("test01"), &NO_DEPS, |_| Ok(())).unwrap();
            assert!(start.elapsed() >= Duration::from_millis(50));

            let start = Instant::now();
            let _ = run.run_test(test_id("test02"), &NO_DEPS, |_| {
                Err(StagehandError::assertion("x"))
            });
            assert!(start.elapsed() >= Duration::from_millis(50));
        }

        #[test]
        fn test_skipped_test_is_not_paced() {
            let mut run = paced();
            let start = Instant::now();
            let _ = run.run_test(test_id("test02"), &["this.test01"], |_| Ok(()));
            assert!(start.elapsed() < Duration::from_millis(50));
        }
    }

    mod state_tests {
        use super::*;

        fn config() -> RunConfig {
            RunConfig::new()
                .with_application(ApplicationConfig::new("shop", "https://host1:1/shop"))
                .with_application(ApplicationConfig::new("admin", "https://host1:1/admin"))
        }

        #[test]
        fn test_body_mutates_topology() {
            let mut run = ScenarioExecution::start(config()).unwrap();
            run.run_test(test_id("test01"), &NO_DEPS, |state| {
                let changed = state
                    .topology_mut()
                    .login("https://host1:1/shop/cart", &User::new("alice"))?;
                assert!(changed);
                Ok(())
            })
            .unwrap();
            let admin = run.state().topology().application("admin").unwrap();
            assert_eq!(admin.current_user().map(|u| u.username.as_str()), Some("alice"));
        }

        #[test]
        fn test_session_required() {
            let mut run = scenario();
            assert!(!run.state().has_session());
            assert!(run.state_mut().session().is_err());
            assert!(run.state_mut().new_session().is_err());
        }

        #[test]
        fn test_new_session_logs_out_and_resets_frames() {
            let driver = MockDriver::new();
            let shared = driver.clone();
            let factory: DriverFactory = Box::new(move || {
                let driver: Arc<dyn Driver> = Arc::new(shared.clone());
                Ok(driver)
            });
            let mut run = ScenarioExecution::start(config())
                .unwrap()
                .with_driver(factory)
                .unwrap();

            let state = run.state_mut();
            let first = state.session().unwrap().id().to_string();
            state
                .topology_mut()
                .login("https://host1:1/shop", &User::new("alice"))
                .unwrap();
            state
                .session()
                .unwrap()
                .enter_frame(&crate::frame::Frame::named("editor"))
                .unwrap();

            let session = state.new_session().unwrap();
            assert_ne!(session.id(), first);
            assert!(session.frames().is_top_level());
            assert!(driver.active_frames().is_empty());
            assert!(state
                .topology()
                .applications()
                .iter()
                .all(|app| app.current_user().is_none()));
        }
    }

    mod report_tests {
        use super::*;

        #[test]
        fn test_report_counts_and_json() {
            let mut run = scenario();
            run.run_test(test_id("test01"), &NO_DEPS, |_| Ok(())).unwrap();
            let _ = run.run_test(test_id("test02"), &NO_DEPS, |_| {
                Err(StagehandError::assertion("x"))
            });
            let _ = run.run_test(test_id("test03"), &["this.test02"], |_| Ok(()));

            let report = run.finish();
            assert_eq!(report.total(), 3);
            assert_eq!(report.passed_count(), 1);
            assert_eq!(report.failed_count(), 1);
            assert_eq!(report.skipped_count(), 1);
            assert!(!report.all_passed());
            assert_eq!(report.failures()[0].id, test_id("test02"));

            let json: serde_json::Value =
                serde_json::from_str(&report.to_json().unwrap()).unwrap();
            assert_eq!(json["records"][2]["status"], "skipped");
            assert_eq!(json["records"][0]["id"]["name"], "test01");
            assert!(json["records"][0].get("error").is_none());
        }

        #[test]
        fn test_report_includes_workarounds() {
            let mut run = scenario();
            let page = crate::mock::MockPage::new("https://h/x");
            run.run_test(test_id("test01"), &NO_DEPS, |state| {
                state.ledger_mut().apply_page_action(&page, "stale grid", true)?;
                Ok(())
            })
            .unwrap();
            let report = run.finish();
            assert_eq!(report.workarounds.len(), 1);
            assert_eq!(report.workarounds[0].message, "stale grid");
        }
    }
}
