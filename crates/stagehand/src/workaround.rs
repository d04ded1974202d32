//! Workaround Escalation Engine
//!
//! Known transient UI defects get one automatic corrective action per page
//! location. When the same location needs it again and the caller asked for
//! escalation, the defect is raised as a hard failure instead of masked a
//! second time.

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{error, warn};

use crate::driver::ElementHandle;
use crate::page::Page;
use crate::result::{StagehandError, StagehandResult};

/// Audit timestamp format (second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn run_specific_parts() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i);jsessionid=[^/?#]*|[?#].*$").ok())
        .as_ref()
}

/// Normalize a page location so run-specific parts do not defeat matching.
///
/// Drops path parameters such as `;jsessionid=...`, the query string, the
/// fragment and trailing slashes, and lowercases scheme and host.
#[must_use]
pub fn location_key(location: &str) -> String {
    let location = location.trim();
    let stripped = run_specific_parts()
        .map_or(Cow::Borrowed(location), |re| re.replace_all(location, ""));
    let trimmed = stripped.trim_end_matches('/');
    match trimmed.find("://") {
        Some(scheme_end) => {
            let authority_end = trimmed[scheme_end + 3..]
                .find('/')
                .map_or(trimmed.len(), |i| scheme_end + 3 + i);
            format!(
                "{}{}",
                trimmed[..authority_end].to_ascii_lowercase(),
                &trimmed[authority_end..]
            )
        }
        None => trimmed.to_string(),
    }
}

/// One automatic workaround taken during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkaroundRecord {
    /// Normalized page location
    pub location: String,
    /// Description of the defect
    pub message: String,
    /// When the corrective action was started, second precision
    pub timestamp: String,
}

/// Per-run set of locations that already received a workaround
#[derive(Debug, Clone, Default)]
pub struct WorkaroundLedger {
    locations: HashSet<String>,
    history: Vec<WorkaroundRecord>,
}

impl WorkaroundLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a workaround was already applied at `location`
    #[must_use]
    pub fn contains(&self, location: &str) -> bool {
        self.locations.contains(&location_key(location))
    }

    /// Every workaround taken so far, oldest first
    #[must_use]
    pub fn history(&self) -> &[WorkaroundRecord] {
        &self.history
    }

    /// Apply `corrective` for a defect seen on `page`.
    ///
    /// With `should_fail`, a location that already received a workaround
    /// raises [`StagehandError::WorkaroundEscalation`] and `corrective` is not
    /// run. Otherwise the location is recorded and `corrective` runs.
    pub fn apply<P, T, F>(
        &mut self,
        page: &P,
        message: &str,
        should_fail: bool,
        corrective: F,
    ) -> StagehandResult<T>
    where
        P: Page + ?Sized,
        F: FnOnce() -> StagehandResult<T>,
    {
        let key = location_key(&page.current_location());
        if should_fail && self.locations.contains(&key) {
            error!(location = %key, defect = message, "workaround recurred, escalating");
            return Err(StagehandError::WorkaroundEscalation {
                location: key,
                message: message.to_string(),
            });
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        warn!(
            location = %key,
            page = page.page_name(),
            at = %timestamp,
            defect = message,
            "applying workaround"
        );
        let _ = self.locations.insert(key.clone());
        self.history.push(WorkaroundRecord {
            location: key,
            message: message.to_string(),
            timestamp,
        });
        corrective()
    }

    /// [`apply`](Self::apply) with the page's own corrective action
    pub fn apply_page_action<P>(
        &mut self,
        page: &P,
        message: &str,
        should_fail: bool,
    ) -> StagehandResult<Option<ElementHandle>>
    where
        P: Page + ?Sized,
    {
        self.apply(page, message, should_fail, || page.perform_corrective_action())
    }
}

/// Parse a recorded timestamp back into local time
pub fn parse_timestamp(timestamp: &str) -> StagehandResult<DateTime<Local>> {
    chrono::NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .ok()
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .ok_or_else(|| {
            StagehandError::invalid_argument(format!("not a workaround timestamp: {timestamp}"))
        })
}
