//! Stagehand: Test Execution & Synchronization Core for UI Automation
//!
//! Stagehand sits between page objects and an automation driver. It tracks
//! which user is logged into which application, runs test methods with
//! dependency gating and known-issue triage, stops transient-defect
//! workarounds from masking the same failure twice, and synchronizes with an
//! asynchronously rendering UI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ScenarioExecution                          │
//! │   DependencyGraph ─► run body ─► pacing ─► KnownIssues triage    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                           RunState                               │
//! │   Topology (login/logout)   WorkaroundLedger   Session           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        ElementWaiter            FrameSwitcher                    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      Driver (trait)                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use stagehand::{RunConfig, ScenarioExecution, StagehandError, TestId, TestOutcome};
//!
//! let mut run = ScenarioExecution::start(RunConfig::new())?;
//! let create = TestId::new("shop", "Orders", "test01_create");
//! let _ = run.run_test(create, &[] as &[&str], |_| Err(StagehandError::assertion("no row")));
//!
//! let outcome = run.run_test(
//!     TestId::new("shop", "Orders", "test02_edit"),
//!     &["this.test01_create"],
//!     |_| Ok(()),
//! )?;
//! assert!(matches!(outcome, TestOutcome::Skipped(_)));
//! assert_eq!(run.finish().skipped_count(), 1);
//! # Ok::<(), StagehandError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod config;
pub mod dependency;
mod driver;
mod frame;
pub mod known_issues;
mod locator;
pub mod logging;
/// In-memory driver and page doubles for tests
pub mod mock;
mod page;
mod result;
pub mod scenario;
mod session;
pub mod topology;
pub mod wait;
pub mod workaround;

pub use config::{ApplicationConfig, RunConfig, TimeoutCategory, TimeoutPolicy};
pub use dependency::{DependencyGraph, DependencySkip, TestId, TestStatus, Unsatisfied};
pub use driver::{Driver, ElementHandle};
pub use frame::{Frame, FrameId, FrameSwitcher};
pub use known_issues::KnownIssues;
pub use locator::{Locator, Scope};
pub use logging::{init_logging, LogFormat};
pub use page::Page;
pub use result::{StagehandError, StagehandResult};
pub use scenario::{
    RunState, ScenarioExecution, ScenarioReport, TestOutcome, TestPhase, TestRecord,
};
pub use session::{DriverFactory, Session, SessionState};
pub use topology::{Application, Topology, User};
pub use wait::{BusyIndicator, ElementWaiter, MatchSet, WaitRequest};
pub use workaround::{location_key, WorkaroundLedger, WorkaroundRecord};
