// Headless Chrome/Chromium launcher with a throwaway profile

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

use super::cdp::{self, CdpPage, CdpTarget};
use super::{BrowserDriver, BrowserError, BrowserLauncher, BrowserResult, Target};
use crate::core::session::StoredCookie;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const STARTUP_POLL: Duration = Duration::from_millis(200);

/// Environment override for the browser executable
pub const BROWSER_ENV: &str = "UFORA_BROWSER";

const CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

#[cfg(target_os = "macos")]
const APP_BUNDLES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(not(target_os = "macos"))]
const APP_BUNDLES: &[&str] = &[];

/// Locate a Chromium-family executable
pub fn find_browser() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(BROWSER_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        log::warn!("{} points to {:?}, which does not exist", BROWSER_ENV, path);
    }

    CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .or_else(|| {
            APP_BUNDLES
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
        })
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self { headless: true }
    }
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show the browser window (useful when the login page changes)
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    fn command(&self, executable: &Path, profile: &Path) -> Command {
        let mut command = Command::new(executable);
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-gpu");
        if self.headless {
            command.arg("--headless=new");
        }
        command
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    fn spawn(&self, executable: &Path, profile: &Path) -> BrowserResult<Child> {
        self.command(executable, profile)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{}: {}", executable.display(), e)))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserDriver>> {
        let executable = find_browser().ok_or(BrowserError::NotFound)?;
        let profile = TempDir::with_prefix("ufora-browser-")
            .map_err(|e| BrowserError::Launch(format!("cannot create browser profile: {}", e)))?;

        log::debug!("Launching {:?} (headless: {})", executable, self.headless);
        let child = self.spawn(&executable, profile.path())?;
        let mut process = ChromeProcess {
            child,
            profile,
        };

        let port = process.wait_for_port().await?;
        let ws_url = page_ws_url(port).await?;
        let page = CdpPage::connect(&ws_url).await?;
        log::debug!("Connected to DevTools on port {}", port);

        Ok(Box::new(ChromeBrowser {
            page,
            process: Some(process),
        }))
    }
}

async fn page_ws_url(port: u16) -> BrowserResult<String> {
    let targets: Vec<CdpTarget> = reqwest::get(format!("http://127.0.0.1:{}/json", port))
        .await
        .map_err(|e| BrowserError::Protocol(format!("DevTools endpoint unreachable: {}", e)))?
        .json()
        .await
        .map_err(|e| BrowserError::Protocol(format!("invalid DevTools target list: {}", e)))?;

    cdp::page_ws_url(targets)
        .ok_or_else(|| BrowserError::Protocol("no page target available".to_string()))
}

/// The spawned browser; killed when dropped
struct ChromeProcess {
    child: Child,
    profile: TempDir,
}

impl ChromeProcess {
    /// Chrome writes the chosen debugging port into `DevToolsActivePort`
    async fn wait_for_port(&mut self) -> BrowserResult<u16> {
        let port_file = self.profile.path().join("DevToolsActivePort");
        let start = tokio::time::Instant::now();

        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(BrowserError::Launch(format!("browser exited early ({})", status)));
            }

            if let Ok(contents) = tokio::fs::read_to_string(&port_file).await {
                if let Some(port) = contents.lines().next().and_then(|l| l.trim().parse().ok()) {
                    return Ok(port);
                }
            }

            if start.elapsed() > STARTUP_TIMEOUT {
                return Err(BrowserError::Launch(format!(
                    "DevTools did not come up within {} seconds",
                    STARTUP_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(STARTUP_POLL).await;
        }
    }
}

impl Drop for ChromeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// `BrowserDriver` over a DevTools page connection
pub struct ChromeBrowser {
    page: CdpPage,
    process: Option<ChromeProcess>,
}

impl ChromeBrowser {
    async fn eval_bool(&mut self, script: String) -> BrowserResult<bool> {
        Ok(self.page.evaluate(&script).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    async fn navigate(&mut self, url: &Url) -> BrowserResult<()> {
        self.page.navigate(url.as_str()).await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<bool> {
        self.eval_bool(cdp::fill_script(selector, value)).await
    }

    async fn click(&mut self, target: &Target) -> BrowserResult<bool> {
        self.eval_bool(cdp::click_script(target)).await
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        let value = self.page.evaluate("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn exists(&mut self, selector: &str) -> BrowserResult<bool> {
        self.eval_bool(cdp::exists_script(selector)).await
    }

    async fn texts(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        let value = self.page.evaluate(&cdp::texts_script(selector)).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<StoredCookie>> {
        let cookies = self.page.cookies().await?;
        Ok(cookies.into_iter().map(StoredCookie::from).collect())
    }

    async fn close(&mut self) {
        if let Some(process) = self.process.take() {
            self.page.close().await;
            drop(process);
            log::debug!("Browser closed");
        }
    }
}
