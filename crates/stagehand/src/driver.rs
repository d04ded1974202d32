//! Driver - Abstract Browser/Mobile Automation Trait
//!
//! The core never talks to a browser protocol directly. Everything it needs
//! from the automation backend goes through [`Driver`], so a WebDriver
//! client, a CDP client, or the in-memory [`MockDriver`](crate::mock::MockDriver)
//! can sit underneath the same orchestration code.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  ElementWaiter / FrameSwitcher / Session                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │  Driver (trait)                                                │
//! │    find_elements · is_displayed · switch_to_frame · default   │
//! ├───────────────────────────────────────────────────────────────┤
//! │  WebDriver client │ CDP client │ MockDriver (tests)            │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::frame::FrameId;
use crate::locator::{Locator, Scope};
use crate::result::StagehandResult;

/// Handle to an element in the live document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier, stable while the element is attached
    pub id: String,
    /// Element tag name
    pub tag_name: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into(),
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}>", self.tag_name, self.id)
    }
}

/// Capabilities the core needs from an automation backend.
///
/// Implementations return [`StagehandError::StaleElement`](crate::StagehandError::StaleElement)
/// from [`Driver::is_displayed`] when the handle has been detached; the wait
/// engine treats that as "not displayed" and keeps polling.
pub trait Driver: Send + Sync {
    /// Find every element matching `locator` within `scope`
    fn find_elements(&self, scope: &Scope, locator: &Locator)
        -> StagehandResult<Vec<ElementHandle>>;

    /// Whether the element is visually displayed
    fn is_displayed(&self, element: &ElementHandle) -> StagehandResult<bool>;

    /// Enter a frame relative to the currently active browsing context
    fn switch_to_frame(&self, frame: &FrameId) -> StagehandResult<()>;

    /// Return to the top-level document
    fn switch_to_default_content(&self) -> StagehandResult<()>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn find_elements(
        &self,
        scope: &Scope,
        locator: &Locator,
    ) -> StagehandResult<Vec<ElementHandle>> {
        (**self).find_elements(scope, locator)
    }

    fn is_displayed(&self, element: &ElementHandle) -> StagehandResult<bool> {
        (**self).is_displayed(element)
    }

    fn switch_to_frame(&self, frame: &FrameId) -> StagehandResult<()> {
        (**self).switch_to_frame(frame)
    }

    fn switch_to_default_content(&self) -> StagehandResult<()> {
        (**self).switch_to_default_content()
    }
}

impl<D: Driver + ?Sized> Driver for std::sync::Arc<D> {
    fn find_elements(
        &self,
        scope: &Scope,
        locator: &Locator,
    ) -> StagehandResult<Vec<ElementHandle>> {
        (**self).find_elements(scope, locator)
    }

    fn is_displayed(&self, element: &ElementHandle) -> StagehandResult<bool> {
        (**self).is_displayed(element)
    }

    fn switch_to_frame(&self, frame: &FrameId) -> StagehandResult<()> {
        (**self).switch_to_frame(frame)
    }

    fn switch_to_default_content(&self) -> StagehandResult<()> {
        (**self).switch_to_default_content()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use std::sync::Arc;

    #[test]
    fn test_element_handle_display() {
        let handle = ElementHandle::new("e-7", "button");
        assert_eq!(handle.to_string(), "<button #e-7>");
    }

    #[test]
    fn test_boxed_and_shared_drivers_delegate() {
        let mock = MockDriver::new();
        mock.add_element(Locator::css(".row"), "td", true);

        let boxed: Box<dyn Driver> = Box::new(mock.clone());
        let found = boxed
            .find_elements(&Scope::Document, &Locator::css(".row"))
            .unwrap();
        assert_eq!(found.len(), 1);

        let shared: Arc<dyn Driver> = Arc::new(mock);
        assert!(shared.is_displayed(&found[0]).unwrap());
        shared.switch_to_default_content().unwrap();
    }
}
