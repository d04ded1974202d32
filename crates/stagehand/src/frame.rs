//! Frame switching.
//!
//! Switching is always absolute: every [`Frame::switch_to`] starts from the
//! top-level document and descends through the declared parent chain, so a
//! previous, possibly failed, switch never leaves the session in a frame the
//! caller did not ask for.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::driver::{Driver, ElementHandle};
use crate::result::StagehandResult;

/// How a frame is identified within its parent document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FrameId {
    /// Position among the parent's frames
    Index(u32),
    /// `name` or `id` attribute of the frame element
    Name(String),
    /// The frame element itself
    Element(ElementHandle),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "frame[{i}]"),
            Self::Name(name) => write!(f, "frame[name={name}]"),
            Self::Element(el) => write!(f, "frame{el}"),
        }
    }
}

/// A frame handle, optionally embedded in a parent frame.
///
/// Equality compares the identification only: two index frames are equal
/// when their indices match, two name frames when their names match, two
/// element frames when they wrap the same element. Frames of different kinds
/// are never equal.
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    parent: Option<Box<Frame>>,
}

impl Frame {
    /// Top-level frame by index
    #[must_use]
    pub fn index(index: u32) -> Self {
        Self {
            id: FrameId::Index(index),
            parent: None,
        }
    }

    /// Top-level frame by name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: FrameId::Name(name.into()),
            parent: None,
        }
    }

    /// Top-level frame by element
    #[must_use]
    pub fn element(element: ElementHandle) -> Self {
        Self {
            id: FrameId::Element(element),
            parent: None,
        }
    }

    /// Declare this frame as embedded in `parent`
    #[must_use]
    pub fn inside(mut self, parent: Frame) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Frame identification
    #[must_use]
    pub const fn id(&self) -> &FrameId {
        &self.id
    }

    /// Declared parent frame
    #[must_use]
    pub fn parent(&self) -> Option<&Frame> {
        self.parent.as_deref()
    }

    /// Identifications from the outermost frame down to this one
    #[must_use]
    pub fn path(&self) -> Vec<FrameId> {
        let mut path = self.parent.as_ref().map(|p| p.path()).unwrap_or_default();
        path.push(self.id.clone());
        path
    }

    /// Switch the driver into this frame, starting from the top-level document
    pub fn switch_to<D: Driver + ?Sized>(&self, driver: &D) -> StagehandResult<()> {
        match &self.parent {
            Some(parent) => parent.switch_to(driver)?,
            None => driver.switch_to_default_content()?,
        }
        debug!(frame = %self.id, "switching into frame");
        driver.switch_to_frame(&self.id)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Frame {}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{parent} > {}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Tracks the frame path a session is currently in.
///
/// Entering and leaving are symmetric: leaving re-descends from the top-level
/// document to the parent path instead of relying on a relative
/// "parent frame" command.
#[derive(Debug, Clone, Default)]
pub struct FrameSwitcher {
    active: Vec<FrameId>,
}

impl FrameSwitcher {
    /// Create a switcher positioned at the top-level document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Active frame path, outermost first; empty at top level
    #[must_use]
    pub fn active_path(&self) -> &[FrameId] {
        &self.active
    }

    /// Nesting depth of the active frame
    #[must_use]
    pub fn depth(&self) -> usize {
        self.active.len()
    }

    /// Whether the session is at the top-level document
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.active.is_empty()
    }

    /// Enter `frame` (and its declared ancestors)
    pub fn enter<D: Driver + ?Sized>(&mut self, driver: &D, frame: &Frame) -> StagehandResult<()> {
        self.active.clear();
        frame.switch_to(driver)?;
        self.active = frame.path();
        Ok(())
    }

    /// Leave the innermost frame, returning to its parent
    pub fn leave<D: Driver + ?Sized>(&mut self, driver: &D) -> StagehandResult<()> {
        let mut target = std::mem::take(&mut self.active);
        target.pop();
        driver.switch_to_default_content()?;
        for id in &target {
            driver.switch_to_frame(id)?;
        }
        self.active = target;
        Ok(())
    }

    /// Return to the top-level document
    pub fn reset<D: Driver + ?Sized>(&mut self, driver: &D) -> StagehandResult<()> {
        self.active.clear();
        driver.switch_to_default_content()
    }
}
