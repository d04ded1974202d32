//! Test identities, outcomes and dependency gating.
//!
//! A test may declare prerequisites as `<classIndicator>.<method>` tokens.
//! The indicator `this` names the running test's own step; a bare step name
//! resolves within the running test's suite; anything longer is a fully
//! qualified `suite.Step`. A test runs only if every prerequisite already
//! ran in this scenario and passed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::result::{StagehandError, StagehandResult};

/// Class indicator that refers to the running test's own step
pub const CLASS_SELF_MARKER: &str = "this";

/// Identity of one test method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestId {
    /// Package / suite name (may itself contain dots)
    pub suite: String,
    /// Step (test class) name
    pub step: String,
    /// Test method name
    pub name: String,
}

impl TestId {
    /// Create a test id
    #[must_use]
    pub fn new(suite: impl Into<String>, step: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            step: step.into(),
            name: name.into(),
        }
    }

    /// `suite.step.name`, the key used by the known-issues registry
    #[must_use]
    pub fn full_path(&self) -> String {
        format!("{}.{}.{}", self.suite, self.step, self.name)
    }

    /// Sibling test in the same step
    #[must_use]
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(&self.suite, &self.step, name)
    }

    /// Resolve a dependency token against this (running) test
    pub fn resolve_dependency(&self, token: &str) -> StagehandResult<TestId> {
        let malformed = || {
            StagehandError::invalid_argument(format!(
                "dependency {token:?} is not of the form <class>.<method>"
            ))
        };
        let (indicator, method) = token.trim().rsplit_once('.').ok_or_else(malformed)?;
        if indicator.is_empty() || method.is_empty() {
            return Err(malformed());
        }

        if indicator == CLASS_SELF_MARKER {
            return Ok(self.sibling(method));
        }
        match indicator.rsplit_once('.') {
            Some((suite, step)) if !suite.is_empty() && !step.is_empty() => {
                Ok(TestId::new(suite, step, method))
            }
            Some(_) => Err(malformed()),
            None => Ok(TestId::new(&self.suite, indicator, method)),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.suite, self.step, self.name)
    }
}

/// Final status of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Body ran and returned successfully
    Passed,
    /// Body ran and failed
    Failed,
    /// Body never ran
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// Why a dependency does not allow the dependent test to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unsatisfied {
    /// The prerequisite failed
    Failed,
    /// The prerequisite was itself skipped
    Skipped,
    /// The prerequisite has not run in this scenario
    NeverRan,
    /// The declaration could not be resolved
    Malformed {
        /// Resolution error
        message: String,
    },
}

/// Control-flow outcome: the test is skipped because a dependency is unmet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySkip {
    /// First unsatisfied declaration, as written
    pub token: String,
    /// Resolved prerequisite, when resolution succeeded
    pub dependency: Option<TestId>,
    /// Why it is unsatisfied
    pub reason: Unsatisfied,
}

impl fmt::Display for DependencySkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self
            .dependency
            .as_ref()
            .map_or_else(|| self.token.clone(), ToString::to_string);
        match &self.reason {
            Unsatisfied::Failed => write!(f, "dependency {target} failed"),
            Unsatisfied::Skipped => write!(f, "dependency {target} was skipped"),
            Unsatisfied::NeverRan => write!(f, "dependency {target} has not run"),
            Unsatisfied::Malformed { message } => write!(f, "dependency {target}: {message}"),
        }
    }
}

/// Outcomes recorded so far in a scenario, keyed by test identity
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    outcomes: HashMap<TestId, TestStatus>,
}

impl DependencyGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the outcome of a test
    pub fn record(&mut self, id: TestId, status: TestStatus) {
        let _ = self.outcomes.insert(id, status);
    }

    /// Last recorded outcome of a test
    #[must_use]
    pub fn status(&self, id: &TestId) -> Option<TestStatus> {
        self.outcomes.get(id).copied()
    }

    /// Number of tests with a recorded outcome
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// First declared dependency of `current` that blocks it, if any
    #[must_use]
    pub fn first_unsatisfied<S: AsRef<str>>(
        &self,
        current: &TestId,
        dependencies: &[S],
    ) -> Option<DependencySkip> {
        dependencies.iter().find_map(|token| {
            let token = token.as_ref();
            let dependency = match current.resolve_dependency(token) {
                Ok(id) => id,
                Err(e) => {
                    return Some(DependencySkip {
                        token: token.to_string(),
                        dependency: None,
                        reason: Unsatisfied::Malformed {
                            message: e.to_string(),
                        },
                    })
                }
            };
            let reason = match self.status(&dependency) {
                Some(TestStatus::Passed) => return None,
                Some(TestStatus::Failed) => Unsatisfied::Failed,
                Some(TestStatus::Skipped) => Unsatisfied::Skipped,
                None => Unsatisfied::NeverRan,
            };
            Some(DependencySkip {
                token: token.to_string(),
                dependency: Some(dependency),
                reason,
            })
        })
    }
}
