//! Authenticated session state and its on-disk persistence.
//!
//! A [`Session`] is created by the login flow and then shared read-only by
//! every fetcher of one command invocation. The only mutation allowed after
//! that is [`Session::invalidate`], which poisons the session for all holders
//! at once.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// One cookie as captured from the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix timestamp, `None` for session cookies
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires.map_or(false, |exp| exp <= now)
    }

    /// Whether the cookie would be sent to `host`
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        host == domain || host.ends_with(&format!(".{}", domain))
    }

    /// `Set-Cookie` style representation for seeding an HTTP cookie jar
    pub fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}; Domain={}; Path={}", self.name, self.value, self.domain, self.path);
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// Cookie jar plus a validity flag
#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    cookies: Vec<StoredCookie>,
    #[serde(skip, default = "valid_flag")]
    valid: AtomicBool,
}

fn valid_flag() -> AtomicBool {
    AtomicBool::new(true)
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            cookies: self.cookies.clone(),
            valid: AtomicBool::new(self.is_valid()),
        }
    }
}

impl Session {
    /// Build a session, keeping cookie order and dropping duplicates by (name, domain, path)
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        let mut ordered: Vec<StoredCookie> = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            if let Some(existing) = ordered.iter_mut().find(|c| {
                c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path
            }) {
                *existing = cookie;
            } else {
                ordered.push(cookie);
            }
        }

        Self {
            cookies: ordered,
            valid: valid_flag(),
        }
    }

    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    /// Cookies that are still usable for `host`
    pub fn cookies_for_host(&self, host: &str, now: i64) -> impl Iterator<Item = &StoredCookie> {
        let host = host.to_string();
        self.cookies
            .iter()
            .filter(move |c| c.matches_host(&host) && !c.is_expired(now))
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Poison the session. Every holder sees the change immediately.
    ///
    /// Returns `true` only for the call that flipped the flag.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::SeqCst)
    }
}

/// Persists the session blob on disk
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached session, or `None` when absent or unreadable
    pub fn load(&self) -> Option<Session> {
        let data = fs::read(&self.path).ok()?;
        match serde_json::from_slice::<Session>(&data) {
            Ok(session) if !session.is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                log::debug!("Discarding unreadable session blob {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec(session).context("Failed to serialize session")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).with_context(|| format!("Failed to write session file: {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move session file into place: {:?}", self.path))?;

        restrict_permissions(&self.path);
        Ok(())
    }

    /// Forget the cached session
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove session file: {:?}", self.path)),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        log::warn!("Could not restrict permissions on {:?}: {}", path, e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
