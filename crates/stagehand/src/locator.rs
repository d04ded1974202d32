//! Abstract locators and lookup scopes.
//!
//! A locator only describes *what* to look for; the [`Driver`](crate::Driver)
//! decides how to evaluate it against the live document.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::driver::ElementHandle;

/// Locator for elements in the current document or frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath expression
    XPath(String),
    /// `id` attribute
    Id(String),
    /// `name` attribute
    Name(String),
    /// Single CSS class name
    ClassName(String),
    /// Exact link text
    LinkText(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
}

impl Locator {
    /// Create a CSS locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath locator
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Create an id locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Create a name-attribute locator
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create a class-name locator
    #[must_use]
    pub fn class_name(class: impl Into<String>) -> Self {
        Self::ClassName(class.into())
    }

    /// Create a test ID locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Strategy prefix used in diagnostics
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
            Self::Id(_) => "id",
            Self::Name(_) => "name",
            Self::ClassName(_) => "class",
            Self::LinkText(_) => "link",
            Self::TestId(_) => "testid",
        }
    }

    /// Raw locator value
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(v)
            | Self::XPath(v)
            | Self::Id(v)
            | Self::Name(v)
            | Self::ClassName(v)
            | Self::LinkText(v)
            | Self::TestId(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

/// Where a lookup is evaluated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// Root of the active document (top level or the entered frame)
    #[default]
    Document,
    /// Descendants of a page-object or dialog root element
    Within(ElementHandle),
}

impl Scope {
    /// Scope rooted at an element
    #[must_use]
    pub fn within(root: ElementHandle) -> Self {
        Self::Within(root)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Within(root) => write!(f, "within #{}", root.id),
        }
    }
}
