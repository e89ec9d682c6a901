//! Browser automation used by the login flow.
//!
//! The login pages need a real rendering engine, so they are driven through a
//! headless Chrome/Chromium over the DevTools protocol. Everything else in the
//! crate talks to the portal over plain HTTP.

pub mod cdp;
pub mod launcher;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::core::session::StoredCookie;
use crate::error::AuthFailure;

pub use launcher::ChromeLauncher;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("no Chrome or Chromium executable found (set UFORA_BROWSER to its path)")]
    NotFound,

    #[error("failed to start browser: {0}")]
    Launch(String),

    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    #[error("browser connection closed")]
    Closed,
}

impl From<BrowserError> for AuthFailure {
    fn from(err: BrowserError) -> Self {
        AuthFailure::Browser(err.to_string())
    }
}

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Element to click
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// First element matching a CSS selector
    Css(String),
    /// First button or link whose visible text equals the string
    Text(String),
}

impl Target {
    pub fn css(selector: &str) -> Self {
        Target::Css(selector.to_string())
    }

    pub fn text(label: &str) -> Self {
        Target::Text(label.to_string())
    }
}

/// Render-and-extract capability: one page in one browser.
///
/// `fill` and `click` report `false` when nothing matched, so callers can try
/// an alternative instead of failing outright.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &Url) -> BrowserResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<bool>;

    async fn click(&mut self, target: &Target) -> BrowserResult<bool>;

    async fn current_url(&mut self) -> BrowserResult<String>;

    async fn exists(&mut self, selector: &str) -> BrowserResult<bool>;

    /// Trimmed visible text of every element matching `selector`
    async fn texts(&mut self, selector: &str) -> BrowserResult<Vec<String>>;

    /// Every cookie held by the browser
    async fn cookies(&mut self) -> BrowserResult<Vec<StoredCookie>>;

    /// Tear the browser down. Safe to call more than once.
    async fn close(&mut self);
}

/// Starts a fresh browser for one login attempt
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserDriver>>;
}
