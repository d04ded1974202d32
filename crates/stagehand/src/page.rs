//! Page capability consumed by the core.
//!
//! Concrete page objects and dialogs live in the product test suites; the
//! core only needs to know where a page is, how to recover it, and which
//! element subtree scopes its lookups.

use crate::driver::ElementHandle;
use crate::locator::Scope;
use crate::result::StagehandResult;

/// Trait for page objects and dialogs driven by the core.
///
/// # Example
///
/// ```ignore
/// struct OrdersPage { driver: Arc<dyn Driver>, url: String }
///
/// impl Page for OrdersPage {
///     fn current_location(&self) -> String {
///         self.url.clone()
///     }
///
///     fn perform_corrective_action(&self) -> StagehandResult<Option<ElementHandle>> {
///         self.refresh()?;
///         Ok(None)
///     }
/// }
/// ```
pub trait Page {
    /// Location of the page as currently displayed
    fn current_location(&self) -> String;

    /// Recover from a known transient defect (refresh, re-click, ...)
    fn perform_corrective_action(&self) -> StagehandResult<Option<ElementHandle>>;

    /// Lookup scope of the page; dialogs return their root element
    fn scope(&self) -> Scope {
        Scope::Document
    }

    /// Get the page name for logging/debugging
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
