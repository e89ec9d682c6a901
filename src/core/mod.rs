// Core business logic module

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod auth;
pub mod browser;
pub mod client;
pub mod config;
pub mod courses;
pub mod discovery;
pub mod download;
pub mod listing;
pub mod material;
pub mod naming;
pub mod portal;
pub mod session;

/// Shared flag set from the Ctrl+C handler
pub type CancelFlag = Arc<AtomicBool>;

// Re-export commonly used items
pub use auth::{AuthOptions, AuthState, Authenticator, Credentials, Prompter};
pub use browser::{BrowserDriver, BrowserLauncher, ChromeLauncher, Target};
pub use client::{ContentFetcher, HttpProbe, PortalClient, SessionProbe};
pub use config::{Config, ConfigKey, TwoFactorMethod};
pub use courses::Course;
pub use discovery::{DiscoveryOptions, TreeDiscovery};
pub use download::{DownloadOptions, DownloadOrchestrator, DownloadOutcome, DownloadReport, TaskStatus};
pub use material::{MaterialNode, NodeKind};
pub use portal::Portal;
pub use session::{Session, SessionStore, StoredCookie};
