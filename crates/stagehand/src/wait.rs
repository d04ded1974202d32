//! Element Wait / Synchronization Engine
//!
//! Polls the driver until a locator qualifies or the budget runs out.
//!
//! ## Rules
//!
//! - **Bounded**: `deadline = start + timeout` is fixed when the poll starts
//!   and re-checked every iteration; there is no other cancellation. A
//!   timeout too large to express as an instant has no deadline.
//! - **At least once**: a zero timeout still evaluates the locator once.
//! - **Strict**: a single-element lookup that finds more than one displayed
//!   match fails with [`StagehandError::MultipleVisibleElements`]. It never
//!   picks one of them.
//! - **Present vs. displayed**: `displayed = false` accepts elements that are
//!   in the DOM but hidden.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{TimeoutCategory, TimeoutPolicy, DEFAULT_POLL_INTERVAL_MS};
use crate::driver::{Driver, ElementHandle};
use crate::locator::{Locator, Scope};
use crate::result::{StagehandError, StagehandResult};

// =============================================================================
// WAIT REQUEST
// =============================================================================

/// Flags controlling a single-locator wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRequest {
    /// Polling budget
    pub timeout: Duration,
    /// Timeout is an error (`true`) or a negative result (`false`)
    pub fail: bool,
    /// Require visual display (`true`) or mere DOM presence (`false`)
    pub displayed: bool,
    /// Strict single-element lookup (`true`) or first of many (`false`)
    pub single: bool,
}

impl WaitRequest {
    /// Strict, failing, displayed lookup with the given budget
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            fail: true,
            displayed: true,
            single: true,
        }
    }

    /// Request using a policy category's timeout
    #[must_use]
    pub fn for_category(policy: &TimeoutPolicy, category: TimeoutCategory) -> Self {
        Self::new(policy.timeout(category))
    }

    /// Return `None` on timeout instead of failing
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.fail = false;
        self
    }

    /// Accept hidden elements that are present in the DOM
    #[must_use]
    pub const fn present(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Accept the first of several matches
    #[must_use]
    pub const fn first_of_many(mut self) -> Self {
        self.single = false;
        self
    }
}

// =============================================================================
// MATCH SET
// =============================================================================

/// Per-alternative result of [`ElementWaiter::wait_for_multiple_elements`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSet {
    slots: Vec<Option<ElementHandle>>,
}

impl MatchSet {
    /// Slots in the order the alternatives were given
    #[must_use]
    pub fn slots(&self) -> &[Option<ElementHandle>] {
        &self.slots
    }

    /// Match for alternative `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ElementHandle> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// First populated slot and its index
    #[must_use]
    pub fn first_match(&self) -> Option<(usize, &ElementHandle)> {
        self.slots
            .iter()
            .enumerate()
            .find_map(|(i, slot)| slot.as_ref().map(|el| (i, el)))
    }

    /// Indices of every populated slot
    #[must_use]
    pub fn matched_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    }

    /// Number of alternatives
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there were no alternatives
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Consume into the raw slots
    #[must_use]
    pub fn into_slots(self) -> Vec<Option<ElementHandle>> {
        self.slots
    }
}

// =============================================================================
// BUSY INDICATOR
// =============================================================================

/// Conventionally-classed elements shown while asynchronous work is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyIndicator {
    locators: Vec<Locator>,
}

impl BusyIndicator {
    /// Indicator matching any of the given CSS classes
    #[must_use]
    pub fn from_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locators: classes.into_iter().map(Locator::class_name).collect(),
        }
    }

    /// Indicator matching arbitrary locators
    #[must_use]
    pub fn from_locators(locators: Vec<Locator>) -> Self {
        Self { locators }
    }

    /// Locators that identify the indicator
    #[must_use]
    pub fn locators(&self) -> &[Locator] {
        &self.locators
    }
}

impl Default for BusyIndicator {
    fn default() -> Self {
        Self::from_classes(["busy", "skeleton"])
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Polls a [`Driver`] for elements
#[derive(Debug)]
pub struct ElementWaiter<'d, D: ?Sized> {
    driver: &'d D,
    poll_interval: Duration,
}

impl<'d, D: Driver + ?Sized> ElementWaiter<'d, D> {
    /// Create a waiter with the default polling interval
    #[must_use]
    pub const fn new(driver: &'d D) -> Self {
        Self {
            driver,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for `locator` to qualify within `scope`.
    ///
    /// Returns `Ok(None)` on timeout when `request.fail` is false.
    pub fn wait_for_element(
        &self,
        scope: &Scope,
        locator: &Locator,
        request: &WaitRequest,
    ) -> StagehandResult<Option<ElementHandle>> {
        let start = Instant::now();
        let deadline = start.checked_add(request.timeout);

        loop {
            if let Some(found) = self.poll(scope, locator, request.displayed, request.single)? {
                debug!(%locator, %scope, elapsed_ms = elapsed_ms(start), "element found");
                return Ok(Some(found));
            }
            if !self.pause_until(deadline) {
                break;
            }
        }

        let elapsed_ms = elapsed_ms(start);
        if request.fail {
            warn!(%locator, %scope, elapsed_ms, "element wait timed out");
            return Err(StagehandError::WaitElementTimeout {
                locator: locator.to_string(),
                elapsed_ms,
            });
        }
        debug!(%locator, elapsed_ms, "optional element not found");
        Ok(None)
    }

    /// Wait for whichever of several alternative locators appears first.
    ///
    /// All alternatives are evaluated in every iteration; every slot whose
    /// locator matched in the winning iteration is populated.
    pub fn wait_for_multiple_elements(
        &self,
        scope: &Scope,
        locators: &[Locator],
        displayed: &[bool],
        timeout: Duration,
        fail: bool,
    ) -> StagehandResult<Option<MatchSet>> {
        if locators.len() != displayed.len() {
            return Err(StagehandError::invalid_argument(format!(
                "{} locators but {} displayed flags",
                locators.len(),
                displayed.len()
            )));
        }
        if locators.is_empty() {
            return Err(StagehandError::invalid_argument(
                "at least one locator is required",
            ));
        }

        let start = Instant::now();
        let deadline = start.checked_add(timeout);

        loop {
            let mut slots = Vec::with_capacity(locators.len());
            for (locator, &shown) in locators.iter().zip(displayed) {
                slots.push(self.poll(scope, locator, shown, false)?);
            }
            if slots.iter().any(Option::is_some) {
                let set = MatchSet { slots };
                debug!(matched = ?set.matched_indices(), elapsed_ms = elapsed_ms(start), "alternative matched");
                return Ok(Some(set));
            }
            if !self.pause_until(deadline) {
                break;
            }
        }

        let elapsed_ms = elapsed_ms(start);
        let described = locators
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ");
        if fail {
            warn!(locators = %described, elapsed_ms, "no alternative appeared");
            return Err(StagehandError::WaitElementTimeout {
                locator: described,
                elapsed_ms,
            });
        }
        Ok(None)
    }

    /// Wait until no displayed element matches any of `locators`.
    ///
    /// Returns `Ok(false)` on timeout when `fail` is false.
    pub fn wait_for_absence(
        &self,
        scope: &Scope,
        locators: &[Locator],
        timeout: Duration,
        fail: bool,
    ) -> StagehandResult<bool> {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);

        loop {
            let mut still_shown = None;
            for locator in locators {
                if self.poll(scope, locator, true, false)?.is_some() {
                    still_shown = Some(locator);
                    break;
                }
            }
            let Some(blocking) = still_shown else {
                return Ok(true);
            };
            if !self.pause_until(deadline) {
                let elapsed_ms = elapsed_ms(start);
                if fail {
                    warn!(locator = %blocking, elapsed_ms, "element did not disappear");
                    return Err(StagehandError::WaitElementTimeout {
                        locator: format!("absence of {blocking}"),
                        elapsed_ms,
                    });
                }
                return Ok(false);
            }
        }
    }

    /// Wait for a busy indicator in `scope` to go away.
    ///
    /// The UI is expected to quiesce, so a timeout here is always an error.
    pub fn wait_while_busy(
        &self,
        scope: &Scope,
        indicator: &BusyIndicator,
        timeout: Duration,
    ) -> StagehandResult<()> {
        self.wait_for_absence(scope, indicator.locators(), timeout, true)
            .map(|_| ())
    }

    /// One evaluation of `locator`
    fn poll(
        &self,
        scope: &Scope,
        locator: &Locator,
        displayed: bool,
        single: bool,
    ) -> StagehandResult<Option<ElementHandle>> {
        let found = self.driver.find_elements(scope, locator)?;
        if !displayed {
            return Ok(found.into_iter().next());
        }

        let mut visible = Vec::new();
        for element in found {
            match self.driver.is_displayed(&element) {
                Ok(true) => visible.push(element),
                Ok(false) | Err(StagehandError::StaleElement { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if single && visible.len() > 1 {
            return Err(StagehandError::MultipleVisibleElements {
                locator: locator.to_string(),
                count: visible.len(),
            });
        }
        Ok(visible.into_iter().next())
    }

    /// Sleep one interval, clipped to the deadline; `false` once it has passed
    fn pause_until(&self, deadline: Option<Instant>) -> bool {
        let Some(deadline) = deadline else {
            std::thread::sleep(self.poll_interval);
            return true;
        };
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(self.poll_interval.min(deadline - now));
        true
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// =============================================================================
// TESTS
// =============================================================================
