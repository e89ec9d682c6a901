// Authenticated HTTP access to the portal, independent of the browser

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::core::portal::Portal;
use crate::core::session::Session;
use crate::error::FetchError;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Authenticated fetch capability used by discovery and downloads
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    fn portal(&self) -> &Portal;

    /// Session the requests are made with
    fn session(&self) -> &Session;

    /// Fetch a page (HTML or JSON) as text
    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError>;

    /// Stream a document into `dest`, returning the number of bytes written
    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<u64, FetchError>;
}

/// Lightweight check that a session is still accepted by the portal
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn probe(&self, session: &Session) -> bool;
}

/// reqwest-backed fetcher carrying the session cookies
pub struct PortalClient {
    http: reqwest::Client,
    portal: Portal,
    session: Arc<Session>,
}

impl PortalClient {
    pub fn new(portal: Portal, session: Arc<Session>) -> Result<Self, FetchError> {
        let jar = Jar::default();
        let now = chrono::Utc::now().timestamp();
        for cookie in session.cookies_for_host(portal.host(), now) {
            jar.add_cookie_str(&cookie.to_set_cookie(), portal.base());
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::new(jar))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::permanent(portal.base().as_str(), e.to_string()))?;

        Ok(Self {
            http,
            portal,
            session,
        })
    }

    /// Ask the portal whether the session is still logged in
    pub async fn probe(&self) -> Result<bool, FetchError> {
        let url = self.portal.base().clone();
        let response = self
            .http
            .get(url.clone())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| classify_transport(&url, e))?;

        let logged_in =
            response.status().is_success() && !self.portal.is_identity_provider(response.url());
        log::debug!(
            "Session probe landed on {} ({}), logged in: {}",
            response.url(),
            response.status(),
            logged_in
        );
        Ok(logged_in)
    }

    async fn send(&self, url: &Url, timeout: Option<Duration>) -> Result<reqwest::Response, FetchError> {
        if !self.session.is_valid() {
            return Err(FetchError::unauthorized(url.as_str()));
        }

        let mut request = self.http.get(url.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify_transport(url, e))?;

        if self.portal.is_identity_provider(response.url()) {
            return Err(self.reject(url));
        }

        match classify_status(url, response.status()) {
            None => Ok(response),
            Some(err) if err.is_auth() => Err(self.reject(url)),
            Some(err) => Err(err),
        }
    }

    fn reject(&self, url: &Url) -> FetchError {
        if self.session.invalidate() {
            log::warn!("Portal rejected the session at {}; invalidating it", url);
        }
        FetchError::unauthorized(url.as_str())
    }
}

#[async_trait]
impl ContentFetcher for PortalClient {
    fn portal(&self) -> &Portal {
        &self.portal
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        log::debug!("GET {}", url);
        let response = self.send(url, Some(PAGE_TIMEOUT)).await?;
        response
            .text()
            .await
            .map_err(|e| classify_transport(url, e))
    }

    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        log::debug!("GET {} -> {:?}", url, dest);
        let response = self.send(url, None).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_transport(url, e))?;
            file.write_all(&chunk).await.map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        Ok(written)
    }
}

/// Probe implementation that builds a throw-away [`PortalClient`]
pub struct HttpProbe {
    portal: Portal,
}

impl HttpProbe {
    pub fn new(portal: Portal) -> Self {
        Self { portal }
    }
}

#[async_trait]
impl SessionProbe for HttpProbe {
    async fn probe(&self, session: &Session) -> bool {
        let client = match PortalClient::new(self.portal.clone(), Arc::new(session.clone())) {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Could not build HTTP client for session probe: {}", e);
                return false;
            }
        };

        match client.probe().await {
            Ok(logged_in) => logged_in,
            Err(e) => {
                log::warn!("Error checking authentication: {}", e);
                false
            }
        }
    }
}

/// Map an HTTP status onto the fetch error taxonomy. `None` means success.
///
/// Only 401 means the session is gone. The portal answers 403 for API
/// versions or org units the account may not use, with the session intact.
pub fn classify_status(url: &Url, status: StatusCode) -> Option<FetchError> {
    if status.is_success() || status.is_redirection() {
        return None;
    }

    let reason = status.to_string();
    match status {
        StatusCode::UNAUTHORIZED => Some(FetchError::unauthorized(url.as_str())),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Some(FetchError::transient(url.as_str(), reason))
        }
        s if s.is_server_error() => Some(FetchError::transient(url.as_str(), reason)),
        _ => Some(FetchError::permanent(url.as_str(), reason)),
    }
}

fn classify_transport(url: &Url, err: reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        if let Some(classified) = classify_status(url, status) {
            return classified;
        }
    }

    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::transient(url.as_str(), err.to_string())
    } else {
        FetchError::permanent(url.as_str(), err.to_string())
    }
}
