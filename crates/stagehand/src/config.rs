//! Run configuration and timeout policy.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::result::{StagehandError, StagehandResult};

/// Overrides [`RunConfig::step_delay_secs`]
pub const ENV_STEP_DELAY: &str = "STAGEHAND_STEP_DELAY";

/// Overrides [`TimeoutPolicy::performance_multiplier`]
pub const ENV_PERFORMANCE_MULTIPLIER: &str = "STAGEHAND_PERFORMANCE_MULTIPLIER";

/// Default polling interval for element waits (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Timeout categories used by page objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutCategory {
    /// Quick probes for optional elements
    Tiny,
    /// Elements expected almost immediately
    Short,
    /// Ordinary element waits
    Default,
    /// Opening or navigating to a page
    OpenPage,
    /// Waiting for a dialog to close
    CloseDialog,
}

impl TimeoutCategory {
    /// All categories
    pub const ALL: [Self; 5] = [
        Self::Tiny,
        Self::Short,
        Self::Default,
        Self::OpenPage,
        Self::CloseDialog,
    ];
}

/// Base timeouts per category, scaled by a performance multiplier.
///
/// Slow environments raise the multiplier instead of editing every timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    /// Tiny timeout in seconds
    pub tiny_secs: u64,
    /// Short timeout in seconds
    pub short_secs: u64,
    /// Default timeout in seconds
    pub default_secs: u64,
    /// Page-open timeout in seconds
    pub open_page_secs: u64,
    /// Dialog-close timeout in seconds
    pub close_dialog_secs: u64,
    /// Scale factor applied to every category
    pub performance_multiplier: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            tiny_secs: 1,
            short_secs: 5,
            default_secs: 30,
            open_page_secs: 60,
            close_dialog_secs: 10,
            performance_multiplier: 1.0,
        }
    }
}

impl TimeoutPolicy {
    /// Create a policy with default base timeouts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the performance multiplier
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.performance_multiplier = multiplier;
        self
    }

    /// Unscaled base timeout for a category
    #[must_use]
    pub const fn base_secs(&self, category: TimeoutCategory) -> u64 {
        match category {
            TimeoutCategory::Tiny => self.tiny_secs,
            TimeoutCategory::Short => self.short_secs,
            TimeoutCategory::Default => self.default_secs,
            TimeoutCategory::OpenPage => self.open_page_secs,
            TimeoutCategory::CloseDialog => self.close_dialog_secs,
        }
    }

    /// Scaled timeout for a category; saturates at [`Duration::MAX`]
    #[must_use]
    pub fn timeout(&self, category: TimeoutCategory) -> Duration {
        self.scaled(category).unwrap_or(Duration::MAX)
    }

    fn scaled(&self, category: TimeoutCategory) -> Option<Duration> {
        Duration::try_from_secs_f64(self.base_secs(category) as f64 * self.performance_multiplier)
            .ok()
    }

    /// Reject multipliers that would make every wait zero, and scaled
    /// timeouts that no [`Duration`] can hold
    pub fn validate(&self) -> StagehandResult<()> {
        let m = self.performance_multiplier;
        if !m.is_finite() || m <= 0.0 {
            return Err(StagehandError::Config {
                message: format!("performance multiplier must be positive, got {m}"),
            });
        }
        if let Some(category) = TimeoutCategory::ALL
            .into_iter()
            .find(|&c| self.scaled(c).is_none())
        {
            return Err(StagehandError::Config {
                message: format!(
                    "{category:?} timeout of {}s x {m} is out of range",
                    self.base_secs(category)
                ),
            });
        }
        Ok(())
    }
}

// =============================================================================
// RUN CONFIG
// =============================================================================

/// One deployed application in the topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Display name
    pub name: String,
    /// Base URL including context root
    pub location: String,
    /// Session-affinity address; derived from `location` when absent
    #[serde(default)]
    pub server: Option<String>,
}

impl ApplicationConfig {
    /// Create an application entry with a derived server
    #[must_use]
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            server: None,
        }
    }

    /// Pin the server address explicitly
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }
}

/// Configuration for one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Applications under test
    pub applications: Vec<ApplicationConfig>,
    /// Timeout policy
    pub timeouts: TimeoutPolicy,
    /// Pause after every test body, in seconds
    pub step_delay_secs: f64,
    /// Known-issues registry; absent file means no known issues
    pub known_issues_file: Option<PathBuf>,
    /// Polling interval for element waits
    pub poll_interval_ms: u64,
    /// CSS classes marking in-progress asynchronous work
    pub busy_indicator_classes: Vec<String>,
    /// Scenario data handed to test bodies
    pub data: serde_json::Value,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            applications: Vec::new(),
            timeouts: TimeoutPolicy::default(),
            step_delay_secs: 0.0,
            known_issues_file: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            busy_indicator_classes: vec!["busy".to_string(), "skeleton".to_string()],
            data: serde_json::Value::Null,
        }
    }
}

impl RunConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an application
    #[must_use]
    pub fn with_application(mut self, app: ApplicationConfig) -> Self {
        self.applications.push(app);
        self
    }

    /// Set the step delay
    #[must_use]
    pub fn with_step_delay(mut self, secs: f64) -> Self {
        self.step_delay_secs = secs;
        self
    }

    /// Set the known-issues file
    #[must_use]
    pub fn with_known_issues_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_issues_file = Some(path.into());
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Parse YAML configuration, then apply `STAGEHAND_*` environment overrides
    pub fn from_yaml_str(yaml: &str) -> StagehandResult<Self> {
        let mut config: Self = serde_yaml_ng::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a `.json` or YAML file, then apply
    /// `STAGEHAND_*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> StagehandResult<Self> {
        Self::load_with(path.as_ref(), |key| std::env::var(key).ok())
    }

    fn load_with<F>(path: &Path, lookup: F) -> StagehandResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml_ng::from_str(&content)?,
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Apply `STAGEHAND_*` environment overrides and re-validate
    pub fn apply_env_overrides(&mut self) -> StagehandResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> StagehandResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_STEP_DELAY) {
            self.step_delay_secs = parse_env_f64(ENV_STEP_DELAY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PERFORMANCE_MULTIPLIER) {
            self.timeouts.performance_multiplier = parse_env_f64(ENV_PERFORMANCE_MULTIPLIER, &raw)?;
        }
        self.validate()
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> StagehandResult<()> {
        self.timeouts.validate()?;
        if !self.step_delay_secs.is_finite() || self.step_delay_secs < 0.0 {
            return Err(StagehandError::Config {
                message: format!("step delay must be >= 0, got {}", self.step_delay_secs),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(StagehandError::Config {
                message: "poll interval must be at least 1ms".to_string(),
            });
        }
        Ok(())
    }

    /// Step delay as a duration
    #[must_use]
    pub fn step_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.step_delay_secs).unwrap_or(Duration::ZERO)
    }

    /// Poll interval as a duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_env_f64(key: &str, raw: &str) -> StagehandResult<f64> {
    raw.trim().parse().map_err(|_| StagehandError::Config {
        message: format!("{key} must be a number, got {raw:?}"),
    })
}
