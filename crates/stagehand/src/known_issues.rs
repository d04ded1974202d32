//! Known-issues registry and failure triage.
//!
//! The registry maps a test's full path (`suite.step.test`) to an external
//! tracking id. It is loaded once per run and never changes afterwards.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::result::{StagehandError, StagehandResult};

/// Immutable `full test path → tracking id` map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownIssues {
    entries: HashMap<String, String>,
}

impl KnownIssues {
    /// Registry with no entries
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from explicit pairs
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load a registry file.
    ///
    /// A missing file yields an empty registry. `.yaml`/`.yml` files hold a
    /// string map; anything else is read as `key=value` / `key: value` lines.
    pub fn load(path: impl AsRef<Path>) -> StagehandResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no known-issues file, registry is empty");
            return Ok(Self::empty());
        }
        let content = std::fs::read_to_string(path)?;
        let registry = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_properties_str(&content)?,
        };
        info!(path = %path.display(), entries = registry.len(), "loaded known issues");
        Ok(registry)
    }

    /// Parse a YAML string map
    pub fn from_yaml_str(yaml: &str) -> StagehandResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty());
        }
        let entries: HashMap<String, String> = serde_yaml_ng::from_str(yaml)?;
        Ok(Self { entries })
    }

    /// Parse properties-style `key=value` lines
    pub fn from_properties_str(text: &str) -> StagehandResult<Self> {
        let mut entries = HashMap::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(split) = line.find(|c: char| c == '=' || c == ':') else {
                return Err(StagehandError::Config {
                    message: format!("known-issues line {}: expected key=value", number + 1),
                });
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                return Err(StagehandError::Config {
                    message: format!("known-issues line {}: empty key", number + 1),
                });
            }
            let _ = entries.insert(key.to_string(), value.to_string());
        }
        Ok(Self { entries })
    }

    /// Tracking id registered for `full_path`
    #[must_use]
    pub fn lookup(&self, full_path: &str) -> Option<&str> {
        self.entries.get(full_path).map(String::as_str)
    }

    /// Number of registered issues
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reclassify a failure of the test at `full_path`.
    ///
    /// Unknown failures come back unchanged. Known ones are wrapped in
    /// [`StagehandError::KnownIssue`], which keeps the original error intact
    /// as its source.
    #[must_use]
    pub fn triage(&self, full_path: &str, failure: StagehandError) -> StagehandError {
        match self.lookup(full_path) {
            None => failure,
            Some(tracking_id) => {
                info!(test = full_path, tracking_id, "failure matches known issue");
                StagehandError::KnownIssue {
                    tracking_id: tracking_id.to_string(),
                    cause: Box::new(failure),
                }
            }
        }
    }
}
