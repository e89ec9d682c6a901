use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Terminal outcomes of the login flow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("second factor rejected: {0}")]
    SecondFactorRejected(String),

    #[error("session could not be validated after login")]
    SessionInvalid,

    #[error("browser automation failed: {0}")]
    Browser(String),

    #[error("login cancelled")]
    Cancelled,
}

impl AuthFailure {
    /// Short hint telling the user what to do next
    pub fn remediation(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => {
                "Check your email and password, then run 'ufora login' again."
            }
            AuthFailure::SecondFactorRejected(_) => {
                "Run 'ufora login' again. If the wrong challenge shows up, check 'ufora config set twofa <app|sms>'."
            }
            AuthFailure::SessionInvalid => "Run 'ufora login' to start a fresh session.",
            AuthFailure::Browser(_) => {
                "Make sure Chrome or Chromium is installed and can run headless."
            }
            AuthFailure::Cancelled => "Login was interrupted; run 'ufora login' when ready.",
        }
    }
}

/// Errors raised by authenticated network calls
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("authentication rejected while fetching {url}")]
    Unauthorized { url: String },

    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    #[error("failed to fetch {url}: {reason}")]
    Permanent { url: String, reason: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn transient<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        FetchError::Transient {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn permanent<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        FetchError::Permanent {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn unauthorized<U: Into<String>>(url: U) -> Self {
        FetchError::Unauthorized { url: url.into() }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// Whether the session was rejected by the portal
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. })
    }
}

/// Crate-level error type
#[derive(Error, Debug)]
pub enum UforaError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    #[error("Network error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Download incomplete: {failed} of {total} files failed")]
    PartialDownload { failed: usize, total: usize },

    #[error("Download failed: none of {total} files could be downloaded")]
    DownloadFailed { total: usize },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, UforaError>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const AUTH: i32 = 2;
    pub const NETWORK: i32 = 3;
    pub const PARTIAL_DOWNLOAD: i32 = 4;
    pub const DOWNLOAD_FAILED: i32 = 5;
}

impl UforaError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        UforaError::InvalidInput(msg.into())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            UforaError::Auth(_) => exit_code::AUTH,
            UforaError::Fetch(FetchError::Unauthorized { .. }) => exit_code::AUTH,
            UforaError::Fetch(FetchError::Io { .. }) => exit_code::GENERAL,
            UforaError::Fetch(_) => exit_code::NETWORK,
            UforaError::PartialDownload { .. } => exit_code::PARTIAL_DOWNLOAD,
            UforaError::DownloadFailed { .. } => exit_code::DOWNLOAD_FAILED,
            _ => exit_code::GENERAL,
        }
    }
}
