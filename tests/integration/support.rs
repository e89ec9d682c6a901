// Shared fakes for the integration tests: an in-memory portal, a scripted
// identity provider behind the browser traits, a probe and a prompter.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use ufora::core::auth::selectors::*;
use ufora::core::client::classify_status;
use ufora::core::browser::{BrowserDriver, BrowserError, BrowserLauncher, BrowserResult, Target};
use ufora::core::{ContentFetcher, Credentials, Portal, Prompter, Session, SessionProbe, StoredCookie};
use ufora::core::TwoFactorMethod;
use ufora::error::{AuthFailure, FetchError};

pub const COURSE: &str = "101";

// ---------------------------------------------------------------------------
// Listing markup
// ---------------------------------------------------------------------------

pub fn file_item(topic_id: &str, name: &str, label: &str) -> String {
    format!(
        r#"<li class="d2l-datalist-item">
             <a class="d2l-link" href="/d2l/le/content/{course}/viewContent/{topic}/View">{name}</a>
             <div class="d2l-body-small">{label}</div>
           </li>"#,
        course = COURSE,
        topic = topic_id,
        name = name,
        label = label
    )
}

pub fn folder_item(module_id: &str, name: &str) -> String {
    format!(
        r#"<li class="d2l-datalist-item" id="d2l_content_{course}_ContentObject.ModuleCO-{module}">
             <h2 class="d2l-heading">{name}</h2>
           </li>"#,
        course = COURSE,
        module = module_id,
        name = name
    )
}

pub fn listing(items: &[String]) -> String {
    format!(
        r#"<html><body><ul class="d2l-datalist">{}</ul></body></html>"#,
        items.concat()
    )
}

/// Wrap markup the way the portal answers partial-view requests
pub fn xhr(html: &str) -> String {
    format!(
        "while(1);{}",
        serde_json::json!({ "Payload": { "Html": html } })
    )
}

// ---------------------------------------------------------------------------
// Portal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum PageReply {
    Body(String),
    Transient,
    Permanent,
    Unauthorized,
    /// Bare HTTP status, classified the way the real client does
    Status(u16),
}

#[derive(Debug, Clone)]
pub enum FileReply {
    Content(Vec<u8>),
    /// Transient failures for the first `n` attempts, then the content
    FailFirst(usize, Vec<u8>),
    Unauthorized,
}

/// In-memory portal serving pages and files by URL
pub struct FakePortal {
    portal: Portal,
    session: Session,
    pages: Mutex<HashMap<String, PageReply>>,
    files: Mutex<HashMap<String, FileReply>>,
    page_requests: Mutex<Vec<String>>,
    file_requests: Mutex<HashMap<String, usize>>,
    latency: Mutex<Option<Duration>>,
    pub folder_gauge: Gauge,
    pub file_gauge: Gauge,
}

impl FakePortal {
    pub fn new() -> Self {
        Self {
            portal: Portal::default(),
            session: Session::new(vec![cookie("d2lSessionVal", "stale")]),
            pages: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            page_requests: Mutex::new(Vec::new()),
            file_requests: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            folder_gauge: Gauge::default(),
            file_gauge: Gauge::default(),
        }
    }

    /// Hold every folder listing and file transfer open for `delay`
    pub fn with_latency(self, delay: Duration) -> Self {
        *self.latency.lock() = Some(delay);
        self
    }

    async fn stall(&self) {
        let delay = *self.latency.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Course 101: `Syllabus.pdf` at the root, `lab1.zip` and `lab2.zip` in `Labs`
    pub fn course_101() -> Self {
        let fake = Self::new();
        fake.root_listing(&[
            file_item("9001", "Syllabus.pdf", "PDF document"),
            folder_item("777", "Labs"),
        ]);
        fake.module_listing(
            "777",
            &[
                file_item("9100", "lab1.zip", "ZIP archive"),
                file_item("9101", "lab2.zip", "ZIP archive"),
            ],
        );
        fake.file("9001", FileReply::Content(b"syllabus".to_vec()));
        fake.file("9100", FileReply::Content(b"lab one".to_vec()));
        fake.file("9101", FileReply::Content(b"lab two".to_vec()));
        fake
    }

    pub fn root_listing(&self, items: &[String]) {
        let url = self.portal.content_home(COURSE);
        self.page(&url, PageReply::Body(listing(items)));
    }

    pub fn module_listing(&self, module_id: &str, items: &[String]) {
        let url = self.portal.module_listing(COURSE, module_id);
        self.page(&url, PageReply::Body(xhr(&listing(items))));
    }

    pub fn module_reply(&self, module_id: &str, reply: PageReply) {
        let url = self.portal.module_listing(COURSE, module_id);
        self.page(&url, reply);
    }

    pub fn page(&self, url: &Url, reply: PageReply) {
        self.pages.lock().insert(url.to_string(), reply);
    }

    pub fn file(&self, topic_id: &str, reply: FileReply) {
        let url = self.portal.file_download(COURSE, topic_id);
        self.files.lock().insert(url.to_string(), reply);
    }

    pub fn file_url(&self, topic_id: &str) -> String {
        self.portal.file_download(COURSE, topic_id).to_string()
    }

    /// Requests for the course home or a module listing
    pub fn listing_requests(&self) -> usize {
        self.page_requests
            .lock()
            .iter()
            .filter(|url| url.contains("/Home") || url.contains("ModuleDetailsPartial"))
            .count()
    }

    pub fn module_requests(&self, module_id: &str) -> usize {
        let url = self.portal.module_listing(COURSE, module_id).to_string();
        self.page_requests.lock().iter().filter(|u| **u == url).count()
    }

    pub fn file_requests(&self, topic_id: &str) -> usize {
        let url = self.file_url(topic_id);
        self.file_requests.lock().get(&url).copied().unwrap_or(0)
    }

    pub fn total_file_requests(&self) -> usize {
        self.file_requests.lock().values().sum()
    }
}

#[async_trait]
impl ContentFetcher for FakePortal {
    fn portal(&self) -> &Portal {
        &self.portal
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let key = url.to_string();
        self.page_requests.lock().push(key.clone());

        // The TOC view switch is fire-and-forget
        if key.contains("PartialMainView") {
            return Ok(String::new());
        }

        if key.contains("ModuleDetailsPartial") {
            let _open = self.folder_gauge.enter();
            self.stall().await;
        }

        let reply = self.pages.lock().get(&key).cloned();
        match reply {
            Some(PageReply::Body(body)) => Ok(body),
            Some(PageReply::Transient) => Err(FetchError::transient(key, "connection reset")),
            Some(PageReply::Permanent) | None => Err(FetchError::permanent(key, "HTTP 404")),
            Some(PageReply::Unauthorized) => {
                self.session.invalidate();
                Err(FetchError::unauthorized(key))
            }
            Some(PageReply::Status(code)) => {
                let status = reqwest::StatusCode::from_u16(code).unwrap();
                match classify_status(url, status) {
                    None => Ok(String::new()),
                    Some(err) => {
                        if err.is_auth() {
                            self.session.invalidate();
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    async fn fetch_to_file(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        let key = url.to_string();
        if !self.session.is_valid() {
            return Err(FetchError::unauthorized(key));
        }

        let attempt = {
            let mut requests = self.file_requests.lock();
            let count = requests.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        {
            let _open = self.file_gauge.enter();
            self.stall().await;
        }

        let reply = self.files.lock().get(&key).cloned();
        let content = match reply {
            Some(FileReply::Content(content)) => content,
            Some(FileReply::FailFirst(n, content)) => {
                if attempt <= n {
                    // Leave a partial body behind, like a dropped connection would
                    let _ = std::fs::write(dest, b"par");
                    return Err(FetchError::transient(key, "connection reset"));
                }
                content
            }
            Some(FileReply::Unauthorized) => {
                self.session.invalidate();
                return Err(FetchError::unauthorized(key));
            }
            None => return Err(FetchError::permanent(key, "HTTP 404")),
        };

        std::fs::write(dest, &content)
            .map_err(|e| FetchError::permanent(url.as_str(), e.to_string()))?;
        Ok(content.len() as u64)
    }
}

/// Counts requests in flight and remembers the highest count seen
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn cookie(name: &str, value: &str) -> StoredCookie {
    StoredCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: "ufora.ugent.be".to_string(),
        path: "/".to_string(),
        expires: None,
        secure: true,
        http_only: true,
    }
}

// ---------------------------------------------------------------------------
// Identity provider behind the browser
// ---------------------------------------------------------------------------

pub const EMAIL: &str = "student@ugent.be";
pub const PASSWORD: &str = "correct horse";
pub const SMS_CODE: &str = "123456";
pub const APP_CODE: &str = "42";
pub const FRESH_COOKIE: &str = "fresh";

const LANDING_URL: &str = "https://ufora.ugent.be/d2l/home";
const IDP_URL: &str = "https://login.microsoftonline.com/common/oauth2/authorize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Blank,
    Email,
    UnknownUser,
    Password,
    WrongPassword,
    AppChallenge,
    SmsChoice,
    SmsCode { rejected: bool },
    Denied,
    Landing,
}

#[derive(Debug)]
pub struct IdpState {
    page: Page,
    email: String,
    password: String,
    otc: String,
    polls: usize,
    pub challenge: TwoFactorMethod,
    /// Polls of the app challenge before the user approves
    pub approve_after: usize,
    pub deny: bool,
    /// Polls the old page stays up after a code is submitted
    pub verify_lag: usize,
    pending: Option<(Page, usize)>,
    pub launches: usize,
    pub closed: bool,
}

/// Scripted sign-in pages shared between the launcher and the test
#[derive(Clone)]
pub struct FakeIdp {
    state: Arc<Mutex<IdpState>>,
}

impl FakeIdp {
    pub fn new(challenge: TwoFactorMethod) -> Self {
        Self {
            state: Arc::new(Mutex::new(IdpState {
                page: Page::Blank,
                email: String::new(),
                password: String::new(),
                otc: String::new(),
                polls: 0,
                challenge,
                approve_after: 3,
                deny: false,
                verify_lag: 0,
                pending: None,
                launches: 0,
                closed: false,
            })),
        }
    }

    pub fn approving_after(self, polls: usize) -> Self {
        self.state.lock().approve_after = polls;
        self
    }

    pub fn denying(self) -> Self {
        self.state.lock().deny = true;
        self
    }

    pub fn slow_to_verify(self, polls: usize) -> Self {
        self.state.lock().verify_lag = polls;
        self
    }

    pub fn launches(&self) -> usize {
        self.state.lock().launches
    }

    pub fn closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[async_trait]
impl BrowserLauncher for FakeIdp {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserDriver>> {
        let mut state = self.state.lock();
        state.launches += 1;
        state.closed = false;
        state.page = Page::Blank;
        Ok(Box::new(FakeBrowser {
            state: self.state.clone(),
        }))
    }
}

/// Launcher for machines without a browser
pub struct MissingBrowser;

#[async_trait]
impl BrowserLauncher for MissingBrowser {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserDriver>> {
        Err(BrowserError::NotFound)
    }
}

struct FakeBrowser {
    state: Arc<Mutex<IdpState>>,
}

impl FakeBrowser {
    fn present(page: Page, selector: &str) -> bool {
        let on_page: &[&str] = match page {
            Page::Blank | Page::Landing => &[],
            Page::Email => &[EMAIL_INPUT],
            Page::UnknownUser => &[EMAIL_INPUT, USERNAME_ERROR],
            Page::Password => &[PASSWORD_INPUT],
            Page::WrongPassword => &[PASSWORD_INPUT, PASSWORD_ERROR],
            Page::AppChallenge => &[APP_PROMPT, APP_NUMBER],
            Page::SmsChoice => &[SMS_OPTION],
            Page::SmsCode { rejected: false } => &[OTC_INPUT],
            Page::SmsCode { rejected: true } => &[OTC_INPUT, OTC_ERROR],
            Page::Denied => &[APPROVAL_DENIED],
        };
        on_page.contains(&selector)
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(&mut self, url: &Url) -> BrowserResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        state.page = if url.host_str() == Some("elosp.ugent.be") {
            Page::Email
        } else {
            Page::Blank
        };
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> BrowserResult<bool> {
        let mut state = self.state.lock();
        if !Self::present(state.page, selector) {
            return Ok(false);
        }
        match selector {
            EMAIL_INPUT => state.email = value.to_string(),
            PASSWORD_INPUT => state.password = value.to_string(),
            OTC_INPUT => state.otc = value.to_string(),
            _ => return Ok(false),
        }
        Ok(true)
    }

    async fn click(&mut self, target: &Target) -> BrowserResult<bool> {
        let mut state = self.state.lock();
        let next = match (state.page, target) {
            (Page::Email | Page::UnknownUser, Target::Text(label)) if label == NEXT_LABEL => {
                if state.email == EMAIL {
                    Page::Password
                } else {
                    Page::UnknownUser
                }
            }
            (Page::Password | Page::WrongPassword, Target::Text(label))
                if label == SIGN_IN_LABEL =>
            {
                if state.password != PASSWORD {
                    Page::WrongPassword
                } else {
                    match state.challenge {
                        TwoFactorMethod::App => Page::AppChallenge,
                        TwoFactorMethod::Sms => Page::SmsChoice,
                    }
                }
            }
            (Page::SmsChoice, Target::Css(css)) if css == SMS_OPTION => {
                Page::SmsCode { rejected: false }
            }
            (Page::SmsCode { .. }, Target::Text(label)) if label == VERIFY_LABEL => {
                let next = if state.otc == SMS_CODE {
                    Page::Landing
                } else {
                    Page::SmsCode { rejected: true }
                };
                if state.verify_lag > 0 {
                    state.pending = Some((next, state.verify_lag));
                    return Ok(true);
                }
                next
            }
            _ => return Ok(false),
        };
        state.page = next;
        Ok(true)
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        let mut state = self.state.lock();
        if let Some((next, polls)) = state.pending.take() {
            if polls > 0 {
                state.pending = Some((next, polls - 1));
            } else {
                state.page = next;
            }
        }
        if state.page == Page::AppChallenge {
            state.polls += 1;
            if state.polls >= state.approve_after {
                state.page = if state.deny { Page::Denied } else { Page::Landing };
            }
        }
        Ok(match state.page {
            Page::Landing => LANDING_URL.to_string(),
            Page::Blank => "about:blank".to_string(),
            _ => IDP_URL.to_string(),
        })
    }

    async fn exists(&mut self, selector: &str) -> BrowserResult<bool> {
        Ok(Self::present(self.state.lock().page, selector))
    }

    async fn texts(&mut self, selector: &str) -> BrowserResult<Vec<String>> {
        let state = self.state.lock();
        if state.page == Page::AppChallenge && selector == APP_NUMBER {
            return Ok(vec![APP_CODE.to_string()]);
        }
        if state.page == (Page::SmsCode { rejected: true }) && selector == OTC_ERROR {
            return Ok(vec!["That code didn't work. Check the code and try again.".to_string()]);
        }
        Ok(Vec::new())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<StoredCookie>> {
        let state = self.state.lock();
        if state.page == Page::Landing {
            Ok(vec![cookie("d2lSessionVal", FRESH_COOKIE)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

// ---------------------------------------------------------------------------
// Probe and prompter
// ---------------------------------------------------------------------------

/// Accepts only sessions carrying a cookie with the given value
pub struct FakeProbe {
    accepted: String,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn accepting(value: &str) -> Self {
        Self {
            accepted: value.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProbe for FakeProbe {
    async fn probe(&self, session: &Session) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        session.cookies().iter().any(|c| c.value == self.accepted)
    }
}

pub struct ScriptedPrompter {
    email: String,
    password: String,
    sms_codes: Mutex<VecDeque<String>>,
    pub credential_prompts: AtomicUsize,
    pub sms_prompts: AtomicUsize,
    pub shown_codes: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            sms_codes: Mutex::new(VecDeque::new()),
            credential_prompts: AtomicUsize::new(0),
            sms_prompts: AtomicUsize::new(0),
            shown_codes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sms_codes(self, codes: &[&str]) -> Self {
        *self.sms_codes.lock() = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn credential_prompts(&self) -> usize {
        self.credential_prompts.load(Ordering::SeqCst)
    }

    pub fn sms_prompts(&self) -> usize {
        self.sms_prompts.load(Ordering::SeqCst)
    }
}

impl Prompter for ScriptedPrompter {
    fn credentials(&self, _default_email: Option<&str>) -> Result<Credentials, AuthFailure> {
        self.credential_prompts.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }

    fn sms_code(&self, _attempt: u32) -> Result<String, AuthFailure> {
        self.sms_prompts.fetch_add(1, Ordering::SeqCst);
        self.sms_codes.lock().pop_front().ok_or(AuthFailure::Cancelled)
    }

    fn show_app_code(&self, code: &str) {
        self.shown_codes.lock().push(code.to_string());
    }

    fn status(&self, _message: &str) {}
}
