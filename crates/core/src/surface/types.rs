//! Types for the automation surface abstraction.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder substituted by [`Locator::fill`].
pub const CATEGORY_PLACEHOLDER: &str = "{category}";

/// Errors raised by an automation surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    /// No matching element became available before the deadline.
    #[error("timed out after {timeout_ms}ms waiting for {locator}")]
    Timeout { locator: String, timeout_ms: u64 },

    /// No element matches the locator right now.
    #[error("no such element: {0}")]
    NotFound(String),

    /// A previously fetched handle no longer refers to live content.
    #[error("stale element reference: {0}")]
    StaleElement(String),

    /// The element exists but cannot receive the interaction.
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// The driver answered with an error we do not classify further.
    #[error("driver error ({code}): {message}")]
    Protocol { code: String, message: String },

    /// The driver could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// Surface session could not be created or is gone.
    #[error("session error: {0}")]
    Session(String),
}

impl SurfaceError {
    /// Whether this is a wait that ran out of time or found nothing.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NotFound(_) | Self::NotInteractable(_)
        )
    }

    /// Whether the element handle went stale.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement(_))
    }
}

/// How to find an element on the storefront.
///
/// Serialized externally tagged, so TOML reads `{ id = "buttonContinue" }` or
/// `{ xpath = "//app-product-item" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// Element id attribute.
    Id(String),
    /// XPath expression.
    Xpath(String),
    /// CSS selector.
    Css(String),
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Self::Id(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::Xpath(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::Css(value.into())
    }

    /// The raw selector text.
    pub fn value(&self) -> &str {
        match self {
            Self::Id(v) | Self::Xpath(v) | Self::Css(v) => v,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value().trim().is_empty()
    }

    /// Substitute `{category}` with `value`, quoted for the locator's language.
    ///
    /// XPath templates receive an XPath string literal and CSS templates a CSS
    /// string literal, so the placeholder must appear unquoted in the template:
    /// `//button[@title={category}]`. Id templates are filled verbatim.
    pub fn fill(&self, value: &str) -> Locator {
        match self {
            Self::Id(t) => Self::Id(t.replace(CATEGORY_PLACEHOLDER, value)),
            Self::Xpath(t) => Self::Xpath(t.replace(CATEGORY_PLACEHOLDER, &xpath_literal(value))),
            Self::Css(t) => Self::Css(t.replace(CATEGORY_PLACEHOLDER, &css_literal(value))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(v) => write!(f, "id={}", v),
            Self::Xpath(v) => write!(f, "xpath={}", v),
            Self::Css(v) => write!(f, "css={}", v),
        }
    }
}

/// Quote `value` as an XPath 1.0 string literal.
///
/// XPath has no escape sequences; values containing both quote kinds are
/// split and rejoined with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Quote `value` as a CSS string literal.
pub fn css_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Opaque reference to an element found by a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Primitive operations against a remote interactive storefront.
///
/// Every wait takes its own timeout; implementations must return
/// [`SurfaceError::Timeout`] rather than block past it.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// Name of this surface implementation.
    fn name(&self) -> &str;

    /// Wait until an element is present, visible and enabled.
    async fn wait_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError>;

    /// Wait until an element is present in the document.
    async fn wait_present(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), SurfaceError>;

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), SurfaceError>;

    /// Submit the form owning the element.
    async fn submit(&self, element: &ElementHandle) -> Result<(), SurfaceError>;

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError>;

    /// Full page reload.
    async fn refresh(&self) -> Result<(), SurfaceError>;

    async fn current_location(&self) -> Result<String, SurfaceError>;

    /// All elements currently matching, without waiting.
    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, SurfaceError>;

    /// Visible text of an element.
    async fn text(&self, element: &ElementHandle) -> Result<String, SurfaceError>;

    /// Release the underlying session.
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// Creates one private surface per purchase run.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn AutomationSurface>, SurfaceError>;
}
