//! Browser driver seam
//!
//! Everything the runner does to a browser goes through [`BrowserDriver`].
//! Implementations poll internally and report an elapsed wait as
//! `ErrorKind::Timeout`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use dashprobe_common::StepError;

/// How to find an element on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// Any `tag` element whose normalised text contains `text`
    pub fn text(tag: &str, text: &str) -> Self {
        Locator::XPath(format!(
            "//{}[contains(normalize-space(.), '{}')]",
            tag, text
        ))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css={}", s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
        }
    }
}

/// Page state to wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// `document.readyState == "complete"`
    DocumentReady,
    Present(Locator),
    Absent(Locator),
    TitleContains(String),
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::DocumentReady => f.write_str("document ready"),
            WaitCondition::Present(l) => write!(f, "{} present", l),
            WaitCondition::Absent(l) => write!(f, "{} absent", l),
            WaitCondition::TitleContains(t) => write!(f, "title contains '{}'", t),
        }
    }
}

/// A single browser session
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Handle to a located element
    type Element: Send + Sync;

    /// Load `url` and remember it as the base for relative navigation
    async fn open(&self, url: &str) -> Result<(), StepError>;

    /// Load an absolute URL or a path relative to the opened base
    async fn navigate(&self, target: &str) -> Result<(), StepError>;

    /// Poll for the first match until `timeout`; `None` when nothing appeared
    async fn find(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<Self::Element>, StepError>;

    /// Number of current matches, without waiting
    async fn count(&self, locator: &Locator) -> Result<usize, StepError>;

    async fn click(&self, element: &Self::Element) -> Result<(), StepError>;

    async fn fill(&self, element: &Self::Element, text: &str) -> Result<(), StepError>;

    async fn wait_until(&self, condition: &WaitCondition, timeout: Duration)
        -> Result<(), StepError>;

    async fn title(&self) -> Result<String, StepError>;

    async fn page_source(&self) -> Result<String, StepError>;

    /// PNG of the current viewport
    async fn snapshot(&self) -> Result<Vec<u8>, StepError>;

    async fn close(&self) -> Result<(), StepError>;
}

/// Acquires a browser session
#[async_trait]
pub trait DriverFactory: Send + Sync {
    type Driver: BrowserDriver;

    async fn launch(&self) -> Result<Self::Driver, StepError>;
}

/// `find` that turns "nothing appeared" into `ElementNotFound`
pub async fn require<D>(
    driver: &D,
    locator: &Locator,
    timeout: Duration,
) -> Result<D::Element, StepError>
where
    D: BrowserDriver + ?Sized,
{
    driver.find(locator, timeout).await?.ok_or_else(|| {
        StepError::element_not_found(format!(
            "{} not found within {:.1}s",
            locator,
            timeout.as_secs_f64()
        ))
    })
}

/// Find with [`require`] and click
pub async fn click_locator<D>(
    driver: &D,
    locator: &Locator,
    timeout: Duration,
) -> Result<(), StepError>
where
    D: BrowserDriver + ?Sized,
{
    let element = require(driver, locator, timeout).await?;
    driver.click(&element).await
}

/// Join a navigation target onto a base URL
pub fn resolve_target(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") || target.starts_with("about:")
    {
        return target.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}
