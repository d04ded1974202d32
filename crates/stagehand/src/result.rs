//! Result and error types for Stagehand.

use thiserror::Error;

/// Result type for Stagehand operations
pub type StagehandResult<T> = Result<T, StagehandError>;

/// Errors that can occur while driving a scenario
#[derive(Debug, Error)]
pub enum StagehandError {
    /// No application in the topology owns the given location
    #[error("No application found for location {location}")]
    NoApplicationFound {
        /// Location that failed to resolve
        location: String,
    },

    /// Argument outside the operation's domain
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Element wait exceeded its budget
    #[error("Timed out after {elapsed_ms}ms waiting for element {locator}")]
    WaitElementTimeout {
        /// Locator that never qualified
        locator: String,
        /// Time spent polling
        elapsed_ms: u64,
    },

    /// A strict lookup matched more than one displayed element
    #[error("Locator {locator} matched {count} visible elements; narrow the locator")]
    MultipleVisibleElements {
        /// Ambiguous locator
        locator: String,
        /// Number of displayed matches
        count: usize,
    },

    /// A failure reclassified against the known-issues registry
    #[error("{cause} [known issue {tracking_id}]")]
    KnownIssue {
        /// Tracking id from the registry
        tracking_id: String,
        /// The original failure
        #[source]
        cause: Box<StagehandError>,
    },

    /// A workaround location recurred, so the defect is surfaced instead of masked
    #[error("Workaround already applied at {location}: {message}")]
    WorkaroundEscalation {
        /// Normalized page location
        location: String,
        /// Caller-supplied description of the defect
        message: String,
    },

    /// Assertion failed inside a test body
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Test body panicked
    #[error("Test panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text
        message: String,
    },

    /// Element handle no longer attached to the document
    #[error("Stale element reference: {id}")]
    StaleElement {
        /// Element id
        id: String,
    },

    /// Frame could not be entered
    #[error("Frame not found: {frame}")]
    FrameNotFound {
        /// Frame description
        frame: String,
    },

    /// Underlying driver failure
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl StagehandError {
    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Whether this is a timeout-class failure
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::WaitElementTimeout { .. } | Self::WorkaroundEscalation { .. } => true,
            Self::KnownIssue { cause, .. } => cause.is_timeout(),
            _ => false,
        }
    }

    /// Tracking id when this failure was reclassified as a known issue
    #[must_use]
    pub fn tracking_id(&self) -> Option<&str> {
        match self {
            Self::KnownIssue { tracking_id, .. } => Some(tracking_id),
            _ => None,
        }
    }

    /// The failure as originally raised, looking through known-issue wrapping
    #[must_use]
    pub fn original(&self) -> &Self {
        match self {
            Self::KnownIssue { cause, .. } => cause.original(),
            other => other,
        }
    }
}
