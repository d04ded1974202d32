//! Browser/mobile session owned by a scenario run.
//!
//! A session pairs the automation driver with the frame bookkeeping that is
//! only meaningful for that driver. Acquiring a session always leaves it at
//! the top-level document.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{TimeoutCategory, TimeoutPolicy};
use crate::driver::{Driver, ElementHandle};
use crate::frame::{Frame, FrameSwitcher};
use crate::locator::{Locator, Scope};
use crate::result::{StagehandError, StagehandResult};
use crate::wait::{BusyIndicator, ElementWaiter, WaitRequest};

/// Produces a fresh driver each time a session is (re-)acquired
pub type DriverFactory = Box<dyn Fn() -> StagehandResult<Arc<dyn Driver>> + Send + Sync>;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Driver attached and usable
    Active,
    /// Released at teardown or replaced by a new session
    Released,
}

/// One automation session
pub struct Session {
    id: String,
    driver: Arc<dyn Driver>,
    frames: FrameSwitcher,
    timeouts: TimeoutPolicy,
    poll_interval: Duration,
    busy: BusyIndicator,
    state: SessionState,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("frames", &self.frames)
            .field("poll_interval", &self.poll_interval)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Attach to `driver` and reset it to the top-level document
    pub fn acquire(driver: Arc<dyn Driver>) -> StagehandResult<Self> {
        let mut frames = FrameSwitcher::new();
        frames.reset(driver.as_ref())?;
        let id = Uuid::new_v4().to_string();
        info!(session = %id, "session acquired");
        Ok(Self {
            id,
            driver,
            frames,
            timeouts: TimeoutPolicy::default(),
            poll_interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
            busy: BusyIndicator::default(),
            state: SessionState::Active,
        })
    }

    /// Use `timeouts` for category-based waits
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the polling interval for waits
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the busy indicator used by [`Session::wait_while_busy`]
    #[must_use]
    pub fn with_busy_indicator(mut self, busy: BusyIndicator) -> Self {
        self.busy = busy;
        self
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Underlying driver
    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Frame bookkeeping
    #[must_use]
    pub const fn frames(&self) -> &FrameSwitcher {
        &self.frames
    }

    /// Element waiter bound to this session's driver
    pub fn waiter(&self) -> StagehandResult<ElementWaiter<'_, dyn Driver>> {
        self.ensure_active()?;
        Ok(ElementWaiter::new(self.driver.as_ref()).with_poll_interval(self.poll_interval))
    }

    /// Strict wait using a timeout category
    pub fn find(
        &self,
        scope: &Scope,
        locator: &Locator,
        category: TimeoutCategory,
    ) -> StagehandResult<Option<ElementHandle>> {
        let request = WaitRequest::for_category(&self.timeouts, category);
        self.waiter()?.wait_for_element(scope, locator, &request)
    }

    /// Wait for the busy indicator in `scope` to disappear
    pub fn wait_while_busy(&self, scope: &Scope) -> StagehandResult<()> {
        let timeout = self.timeouts.timeout(TimeoutCategory::Default);
        self.waiter()?.wait_while_busy(scope, &self.busy, timeout)
    }

    /// Enter `frame` from the top-level document
    pub fn enter_frame(&mut self, frame: &Frame) -> StagehandResult<()> {
        self.ensure_active()?;
        debug!(session = %self.id, %frame, "entering frame");
        self.frames.enter(self.driver.as_ref(), frame)
    }

    /// Return to the parent of the active frame
    pub fn leave_frame(&mut self) -> StagehandResult<()> {
        self.ensure_active()?;
        self.frames.leave(self.driver.as_ref())
    }

    /// Return to the top-level document
    pub fn reset_frames(&mut self) -> StagehandResult<()> {
        self.ensure_active()?;
        self.frames.reset(self.driver.as_ref())
    }

    /// Release the session; waits and frame switches fail afterwards
    pub fn release(&mut self) {
        if self.state == SessionState::Active {
            info!(session = %self.id, "session released");
            self.state = SessionState::Released;
        }
    }

    fn ensure_active(&self) -> StagehandResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Released => Err(StagehandError::driver(format!(
                "session {} has been released",
                self.id
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::frame::FrameId;
    use crate::mock::{DriverCall, MockDriver};

    fn acquire(driver: &MockDriver) -> Session {
        Session::acquire(Arc::new(driver.clone()))
            .unwrap()
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_acquire_resets_to_top_level() {
        let driver = MockDriver::new();
        Frame::named("left-over").switch_to(&driver).unwrap();
        assert_eq!(driver.active_frames().len(), 1);

        let session = acquire(&driver);
        assert!(driver.active_frames().is_empty());
        assert!(session.frames().is_top_level());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(driver.calls().last(), Some(&DriverCall::SwitchToDefault));
    }

    #[test]
    fn test_frame_round_trip() {
        let driver = MockDriver::new();
        let mut session = acquire(&driver);
        let frame = Frame::named("editor").inside(Frame::index(0));

        session.enter_frame(&frame).unwrap();
        assert_eq!(session.frames().depth(), 2);
        session.leave_frame().unwrap();
        assert_eq!(driver.active_frames(), vec![FrameId::Index(0)]);
        session.reset_frames().unwrap();
        assert!(driver.active_frames().is_empty());
    }

    #[test]
    fn test_find_uses_category_timeout() {
        let driver = MockDriver::new();
        let save = driver.add_element(Locator::id("save"), "button", true);
        let session = acquire(&driver);
        let found = session
            .find(&Scope::Document, &Locator::id("save"), TimeoutCategory::Tiny)
            .unwrap();
        assert_eq!(found, Some(save));
    }

    #[test]
    fn test_wait_while_busy_returns_when_idle() {
        let driver = MockDriver::new();
        let session = acquire(&driver);
        session.wait_while_busy(&Scope::Document).unwrap();
    }

    #[test]
    fn test_release_is_idempotent() {
        let driver = MockDriver::new();
        let mut session = acquire(&driver);
        session.release();
        session.release();
        assert_eq!(session.state(), SessionState::Released);
    }

    #[test]
    fn test_released_session_rejects_use() {
        let driver = MockDriver::new();
        let _ = driver.add_element(Locator::id("save"), "button", true);
        let mut session = acquire(&driver);
        session.release();
        let finds_before = driver.find_count();

        let err = session
            .find(&Scope::Document, &Locator::id("save"), TimeoutCategory::Tiny)
            .unwrap_err();
        assert!(matches!(err, StagehandError::Driver { .. }));
        assert!(err.to_string().contains("released"));
        assert!(session.wait_while_busy(&Scope::Document).is_err());
        assert!(session.enter_frame(&Frame::index(0)).is_err());
        assert!(session.leave_frame().is_err());
        assert!(session.reset_frames().is_err());
        assert!(session.waiter().is_err());
        assert_eq!(driver.find_count(), finds_before);
        assert!(driver.active_frames().is_empty());
    }
}
