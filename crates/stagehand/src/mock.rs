//! In-memory driver and page doubles.
//!
//! [`MockDriver`] keeps a flat element table that tests (or a helper thread)
//! mutate while the wait engine polls it, which is enough to exercise
//! timeouts, late-appearing elements, ambiguity and frame bookkeeping without
//! a browser.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::driver::{Driver, ElementHandle};
use crate::frame::FrameId;
use crate::locator::{Locator, Scope};
use crate::page::Page;
use crate::result::{StagehandError, StagehandResult};

/// Driver call recorded by [`MockDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    /// `find_elements` with the locator it was given
    FindElements(Locator),
    /// `switch_to_frame`
    SwitchToFrame(FrameId),
    /// `switch_to_default_content`
    SwitchToDefault,
}

#[derive(Debug, Clone)]
struct MockElement {
    handle: ElementHandle,
    locator: Locator,
    root: Option<String>,
    displayed: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    elements: Vec<MockElement>,
    calls: Vec<DriverCall>,
    active_frames: Vec<FrameId>,
    failing_frames: HashSet<FrameId>,
}

/// In-memory [`Driver`]; clones share the same document
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // the element table stays consistent even if a holder panicked
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn insert(
        &self,
        locator: Locator,
        tag: &str,
        displayed: bool,
        root: Option<String>,
    ) -> ElementHandle {
        let mut state = self.state();
        state.next_id += 1;
        let handle = ElementHandle::new(format!("el-{}", state.next_id), tag);
        state.elements.push(MockElement {
            handle: handle.clone(),
            locator,
            root,
            displayed,
        });
        handle
    }

    /// Attach an element matched by `locator`
    pub fn add_element(&self, locator: Locator, tag: &str, displayed: bool) -> ElementHandle {
        self.insert(locator, tag, displayed, None)
    }

    /// Attach an element under a page-object or dialog root
    pub fn add_element_within(
        &self,
        root: &ElementHandle,
        locator: Locator,
        tag: &str,
        displayed: bool,
    ) -> ElementHandle {
        self.insert(locator, tag, displayed, Some(root.id.clone()))
    }

    /// Change an element's visibility
    pub fn set_displayed(&self, element: &ElementHandle, displayed: bool) {
        let mut state = self.state();
        if let Some(el) = state
            .elements
            .iter_mut()
            .find(|el| el.handle.id == element.id)
        {
            el.displayed = displayed;
        }
    }

    /// Detach an element; later visibility checks report it as stale
    pub fn remove_element(&self, element: &ElementHandle) {
        self.state().elements.retain(|el| el.handle.id != element.id);
    }

    /// Detach every element matched by `locator`
    pub fn remove_matching(&self, locator: &Locator) {
        self.state().elements.retain(|el| &el.locator != locator);
    }

    /// Make entering `frame` fail
    pub fn fail_frame(&self, frame: FrameId) {
        let _ = self.state().failing_frames.insert(frame);
    }

    /// Every driver call so far, excluding visibility checks
    #[must_use]
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    /// Number of `find_elements` calls so far
    #[must_use]
    pub fn find_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, DriverCall::FindElements(_)))
            .count()
    }

    /// Frame path the mock believes is active
    #[must_use]
    pub fn active_frames(&self) -> Vec<FrameId> {
        self.state().active_frames.clone()
    }
}

impl Driver for MockDriver {
    fn find_elements(
        &self,
        scope: &Scope,
        locator: &Locator,
    ) -> StagehandResult<Vec<ElementHandle>> {
        let mut state = self.state();
        state.calls.push(DriverCall::FindElements(locator.clone()));
        let found = state
            .elements
            .iter()
            .filter(|el| &el.locator == locator)
            .filter(|el| match scope {
                Scope::Document => true,
                Scope::Within(root) => el.root.as_deref() == Some(root.id.as_str()),
            })
            .map(|el| el.handle.clone())
            .collect();
        Ok(found)
    }

    fn is_displayed(&self, element: &ElementHandle) -> StagehandResult<bool> {
        self.state()
            .elements
            .iter()
            .find(|el| el.handle.id == element.id)
            .map(|el| el.displayed)
            .ok_or_else(|| StagehandError::StaleElement {
                id: element.id.clone(),
            })
    }

    fn switch_to_frame(&self, frame: &FrameId) -> StagehandResult<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::SwitchToFrame(frame.clone()));
        if state.failing_frames.contains(frame) {
            return Err(StagehandError::FrameNotFound {
                frame: frame.to_string(),
            });
        }
        state.active_frames.push(frame.clone());
        Ok(())
    }

    fn switch_to_default_content(&self) -> StagehandResult<()> {
        let mut state = self.state();
        state.calls.push(DriverCall::SwitchToDefault);
        state.active_frames.clear();
        Ok(())
    }
}

/// Page double with a settable location and a counting corrective action
#[derive(Debug, Default)]
pub struct MockPage {
    location: Mutex<String>,
    corrective_result: Option<ElementHandle>,
    corrective_calls: AtomicUsize,
}

impl MockPage {
    /// Create a page at `location`
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(location.into()),
            ..Self::default()
        }
    }

    /// Element returned by the corrective action
    #[must_use]
    pub fn with_corrective_result(mut self, element: ElementHandle) -> Self {
        self.corrective_result = Some(element);
        self
    }

    /// Navigate the page
    pub fn set_location(&self, location: impl Into<String>) {
        *self
            .location
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = location.into();
    }

    /// How often the corrective action ran
    #[must_use]
    pub fn corrective_count(&self) -> usize {
        self.corrective_calls.load(Ordering::SeqCst)
    }
}

impl Page for MockPage {
    fn current_location(&self) -> String {
        self.location
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn perform_corrective_action(&self) -> StagehandResult<Option<ElementHandle>> {
        let _ = self.corrective_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.corrective_result.clone())
    }
}
