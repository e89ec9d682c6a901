//! Authentication Controller
//!
//! Drives the portal's single sign-on pages as an explicit state machine:
//!
//! ```text
//! CheckCache ──probe ok──────────────────────────────────────────▶ Authenticated
//!     │ no session / probe failed
//!     ▼
//! CredentialPrompt ─▶ SubmitCredentials ─▶ SecondFactor ─▶ SessionExtraction ─▶ Authenticated
//!                            │                  │                 │
//!                            └──────────────────┴─────────────────┴──────────────▶ Failed
//! ```
//!
//! Every wait on the remote side is bounded by a [`Deadline`]. The browser is
//! launched lazily and always closed before [`Authenticator::run`] returns.

pub mod wait;

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::core::browser::{BrowserDriver, BrowserLauncher, BrowserResult, Target};
use crate::core::client::SessionProbe;
use crate::core::config::TwoFactorMethod;
use crate::core::portal::Portal;
use crate::core::session::{Session, SessionStore};
use crate::core::CancelFlag;
use crate::error::AuthFailure;

pub use wait::{Deadline, WaitOutcome};

/// Elements of the identity provider's pages
pub mod selectors {
    pub const EMAIL_INPUT: &str = r#"input[placeholder="Email"], input[name="loginfmt"]"#;
    pub const PASSWORD_INPUT: &str = r#"input[placeholder="Password"], input[name="passwd"]"#;
    pub const SUBMIT_BUTTON: &str = r#"input[type="submit"]"#;
    pub const USERNAME_ERROR: &str = "#usernameError";
    pub const PASSWORD_ERROR: &str = "#passwordError";
    pub const STAY_SIGNED_IN: &str = "#KmsiCheckboxField";
    pub const STAY_SIGNED_IN_YES: &str = "#idSIButton9";
    pub const APP_NUMBER: &str = "#idRichContext_DisplaySign";
    pub const APP_PROMPT: &str = "#idDiv_SAOTCAS_Title";
    pub const APP_OPTION: &str = r#"div[data-value="PhoneAppNotification"]"#;
    pub const SMS_OPTION: &str = r#"div[data-value="OneWaySMS"]"#;
    pub const OTC_INPUT: &str = r#"input[name="otc"], input[type="tel"]"#;
    pub const OTC_ERROR: &str = "#idSpan_SAOTCC_Error_OTC";
    pub const APPROVAL_DENIED: &str = "#idDiv_SAASDS_Title";
    pub const APPROVAL_TIMED_OUT: &str = "#idDiv_SAASTO_Title";
    pub const ANY_DIV: &str = "div";

    pub const NEXT_LABEL: &str = "Next";
    pub const SIGN_IN_LABEL: &str = "Sign in";
    pub const SMS_LABEL: &str = "Text";
    pub const VERIFY_LABEL: &str = "Verify";
}

use selectors::*;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(30);
pub const CODE_TIMEOUT: Duration = Duration::from_secs(20);
pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(120);
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const SMS_RETRIES: u32 = 1;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Interactive side of the login flow
pub trait Prompter: Send + Sync {
    /// Ask for email and password. An error ends the flow.
    fn credentials(&self, default_email: Option<&str>) -> Result<Credentials, AuthFailure>;

    /// Ask for the SMS code; `attempt` starts at 1
    fn sms_code(&self, attempt: u32) -> Result<String, AuthFailure>;

    /// Show the number to confirm in the authenticator app
    fn show_app_code(&self, code: &str);

    fn status(&self, message: &str);
}

#[derive(Debug)]
pub enum AuthState {
    CheckCache(Option<Session>),
    CredentialPrompt,
    SubmitCredentials(Credentials),
    SecondFactor(TwoFactorMethod),
    SessionExtraction,
    Authenticated(Session),
    Failed(AuthFailure),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::CheckCache(_) => "CheckCache",
            AuthState::CredentialPrompt => "CredentialPrompt",
            AuthState::SubmitCredentials(_) => "SubmitCredentials",
            AuthState::SecondFactor(_) => "SecondFactor",
            AuthState::SessionExtraction => "SessionExtraction",
            AuthState::Authenticated(_) => "Authenticated",
            AuthState::Failed(_) => "Failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub method: TwoFactorMethod,
    /// Bound on each page transition (email, password, code submission)
    pub step_timeout: Duration,
    /// How long to look for the second-factor challenge
    pub code_timeout: Duration,
    /// How long to wait for an app approval
    pub approval_timeout: Duration,
    pub poll_interval: Duration,
    /// Extra SMS code attempts after a rejection
    pub sms_retries: u32,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            method: TwoFactorMethod::default(),
            step_timeout: STEP_TIMEOUT,
            code_timeout: CODE_TIMEOUT,
            approval_timeout: APPROVAL_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            sms_retries: SMS_RETRIES,
        }
    }
}

/// What the current page shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageSignal {
    Landing,
    StaySignedIn,
    BadCredentials,
    ApprovalDenied,
    CodeRejected,
    SecondFactor,
    Nothing,
}

/// Checked in order; the first element present wins
const SIGNALS: &[(&str, PageSignal)] = &[
    (STAY_SIGNED_IN, PageSignal::StaySignedIn),
    (USERNAME_ERROR, PageSignal::BadCredentials),
    (PASSWORD_ERROR, PageSignal::BadCredentials),
    (APPROVAL_DENIED, PageSignal::ApprovalDenied),
    (APPROVAL_TIMED_OUT, PageSignal::ApprovalDenied),
    (OTC_ERROR, PageSignal::CodeRejected),
    (APP_NUMBER, PageSignal::SecondFactor),
    (APP_PROMPT, PageSignal::SecondFactor),
    (APP_OPTION, PageSignal::SecondFactor),
    (SMS_OPTION, PageSignal::SecondFactor),
    (OTC_INPUT, PageSignal::SecondFactor),
];

pub struct Authenticator<'a> {
    portal: Portal,
    launcher: &'a dyn BrowserLauncher,
    probe: &'a dyn SessionProbe,
    prompter: &'a dyn Prompter,
    store: Option<&'a SessionStore>,
    default_email: Option<String>,
    options: AuthOptions,
    cancel_flag: CancelFlag,
    visited: Mutex<Vec<&'static str>>,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        portal: Portal,
        launcher: &'a dyn BrowserLauncher,
        probe: &'a dyn SessionProbe,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            portal,
            launcher,
            probe,
            prompter,
            store: None,
            default_email: None,
            options: AuthOptions::default(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn with_options(mut self, options: AuthOptions) -> Self {
        self.options = options;
        self
    }

    /// Persist the session here once it is validated
    pub fn with_store(mut self, store: &'a SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_default_email(mut self, email: Option<String>) -> Self {
        self.default_email = email;
        self
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// Names of the states entered by the last run, in order
    pub fn visited(&self) -> Vec<&'static str> {
        self.visited.lock().clone()
    }

    /// Run the state machine until it reaches `Authenticated` or `Failed`.
    ///
    /// `cached` is the previously stored session, if any. Passing `None`
    /// forces a fresh login.
    pub async fn run(&self, cached: Option<Session>) -> Result<Session, AuthFailure> {
        self.visited.lock().clear();

        let mut browser: Option<Box<dyn BrowserDriver>> = None;
        let mut state = AuthState::CheckCache(cached);

        let result = loop {
            log::debug!("Login state: {}", state.name());
            self.visited.lock().push(state.name());

            state = match state {
                AuthState::CheckCache(Some(session)) => {
                    if self.probe.probe(&session).await {
                        AuthState::Authenticated(session)
                    } else {
                        log::info!("Cached session was rejected, logging in again");
                        AuthState::CredentialPrompt
                    }
                }
                AuthState::CheckCache(None) => AuthState::CredentialPrompt,
                AuthState::CredentialPrompt => {
                    match self.prompter.credentials(self.default_email.as_deref()) {
                        Ok(credentials) => AuthState::SubmitCredentials(credentials),
                        Err(failure) => AuthState::Failed(failure),
                    }
                }
                AuthState::SubmitCredentials(credentials) => match self.browser(&mut browser).await {
                    Ok(driver) => self
                        .submit_credentials(driver, credentials)
                        .await
                        .unwrap_or_else(AuthState::Failed),
                    Err(failure) => AuthState::Failed(failure),
                },
                AuthState::SecondFactor(method) => match self.browser(&mut browser).await {
                    Ok(driver) => self
                        .second_factor(driver, method)
                        .await
                        .unwrap_or_else(AuthState::Failed),
                    Err(failure) => AuthState::Failed(failure),
                },
                AuthState::SessionExtraction => match self.browser(&mut browser).await {
                    Ok(driver) => self.extract_session(driver).await.unwrap_or_else(AuthState::Failed),
                    Err(failure) => AuthState::Failed(failure),
                },
                AuthState::Authenticated(session) => break Ok(session),
                AuthState::Failed(failure) => break Err(failure),
            };
        };

        if let Some(mut driver) = browser {
            driver.close().await;
        }
        result
    }

    /// The browser for the remaining steps, launched on first use
    async fn browser<'b>(
        &self,
        browser: &'b mut Option<Box<dyn BrowserDriver>>,
    ) -> Result<&'b mut (dyn BrowserDriver + 'static), AuthFailure> {
        if browser.is_none() {
            self.prompter.status("Starting browser...");
            *browser = Some(self.launcher.launch().await?);
        }
        browser
            .as_deref_mut()
            .ok_or_else(|| AuthFailure::Browser("browser unavailable".to_string()))
    }

    async fn submit_credentials(
        &self,
        driver: &mut dyn BrowserDriver,
        credentials: Credentials,
    ) -> Result<AuthState, AuthFailure> {
        self.prompter.status("Opening login page...");
        driver.navigate(self.portal.login_url()).await?;

        let deadline = self.deadline(self.options.step_timeout);
        while !driver.exists(EMAIL_INPUT).await? {
            self.pause(&deadline, || browser_timeout("the email field")).await?;
        }
        driver.fill(EMAIL_INPUT, &credentials.email).await?;
        self.click_first(driver, &[Target::text(NEXT_LABEL), Target::css(SUBMIT_BUTTON)])
            .await?;

        let deadline = self.deadline(self.options.step_timeout);
        loop {
            if driver.exists(USERNAME_ERROR).await? {
                return Ok(AuthState::Failed(AuthFailure::InvalidCredentials));
            }
            if driver.exists(PASSWORD_INPUT).await? {
                break;
            }
            self.pause(&deadline, || browser_timeout("the password field")).await?;
        }

        self.prompter.status("Signing in...");
        driver.fill(PASSWORD_INPUT, &credentials.password).await?;
        self.click_first(driver, &[Target::text(SIGN_IN_LABEL), Target::css(SUBMIT_BUTTON)])
            .await?;

        let deadline = self.deadline(self.options.step_timeout);
        loop {
            match self.detect(driver).await? {
                PageSignal::Landing => return Ok(AuthState::SessionExtraction),
                PageSignal::StaySignedIn => self.stay_signed_in(driver).await?,
                PageSignal::BadCredentials => {
                    return Ok(AuthState::Failed(AuthFailure::InvalidCredentials))
                }
                PageSignal::SecondFactor | PageSignal::CodeRejected => {
                    return Ok(AuthState::SecondFactor(self.options.method))
                }
                PageSignal::ApprovalDenied => {
                    return Ok(AuthState::Failed(AuthFailure::SecondFactorRejected(
                        "sign-in request was denied".to_string(),
                    )))
                }
                PageSignal::Nothing => {}
            }
            self.pause(&deadline, || browser_timeout("a response to the sign-in"))
                .await?;
        }
    }

    async fn second_factor(
        &self,
        driver: &mut dyn BrowserDriver,
        method: TwoFactorMethod,
    ) -> Result<AuthState, AuthFailure> {
        match method {
            TwoFactorMethod::App => self.approve_in_app(driver).await,
            TwoFactorMethod::Sms => self.verify_sms(driver).await,
        }
    }

    async fn approve_in_app(&self, driver: &mut dyn BrowserDriver) -> Result<AuthState, AuthFailure> {
        if driver.exists(APP_OPTION).await? {
            driver.click(&Target::css(APP_OPTION)).await?;
        }

        let code_deadline = self.deadline(self.options.code_timeout);
        let deadline = self.deadline(self.options.approval_timeout);
        let mut announced = false;

        loop {
            if !announced {
                if let Some(code) = self.app_number(driver).await? {
                    self.prompter.show_app_code(&code);
                    announced = true;
                } else if code_deadline.expired() {
                    self.prompter
                        .status("Approve the sign-in request in your authenticator app");
                    announced = true;
                }
            }

            match self.detect(driver).await? {
                PageSignal::Landing => return Ok(AuthState::SessionExtraction),
                PageSignal::StaySignedIn => self.stay_signed_in(driver).await?,
                PageSignal::ApprovalDenied => {
                    return Ok(AuthState::Failed(AuthFailure::SecondFactorRejected(
                        "sign-in request was denied or expired".to_string(),
                    )))
                }
                _ => {}
            }

            let seconds = self.options.approval_timeout.as_secs();
            self.pause(&deadline, || {
                AuthFailure::SecondFactorRejected(format!("no approval within {} seconds", seconds))
            })
            .await?;
        }
    }

    /// The two-digit number to confirm in the authenticator app
    async fn app_number(&self, driver: &mut dyn BrowserDriver) -> BrowserResult<Option<String>> {
        let is_code = |text: &str| text.len() == 2 && text.chars().all(|c| c.is_ascii_digit());

        if let Some(code) = driver.texts(APP_NUMBER).await?.into_iter().find(|t| is_code(t.as_str())) {
            return Ok(Some(code));
        }
        Ok(driver.texts(ANY_DIV).await?.into_iter().find(|t| is_code(t.as_str())))
    }

    async fn verify_sms(&self, driver: &mut dyn BrowserDriver) -> Result<AuthState, AuthFailure> {
        if !driver.exists(OTC_INPUT).await? {
            self.click_first(driver, &[Target::css(SMS_OPTION), Target::text(SMS_LABEL)])
                .await?;
        }

        let deadline = self.deadline(self.options.code_timeout);
        while !driver.exists(OTC_INPUT).await? {
            self.pause(&deadline, || {
                AuthFailure::SecondFactorRejected("SMS code field did not appear".to_string())
            })
            .await?;
        }

        let attempts = 1 + self.options.sms_retries;
        for attempt in 1..=attempts {
            let code = self.prompter.sms_code(attempt)?;
            // A rejection of the previous code may still be on screen until the page reloads
            let mut stale_error = self.otc_error(driver).await?;
            driver.fill(OTC_INPUT, code.trim()).await?;
            self.click_first(driver, &[Target::text(VERIFY_LABEL), Target::css(SUBMIT_BUTTON)])
                .await?;

            let deadline = self.deadline(self.options.step_timeout);
            loop {
                let signal = self.detect(driver).await?;
                match signal {
                    PageSignal::Landing => return Ok(AuthState::SessionExtraction),
                    PageSignal::StaySignedIn => self.stay_signed_in(driver).await?,
                    PageSignal::CodeRejected => {
                        let current = self.otc_error(driver).await?;
                        if stale_error.is_none() || current != stale_error {
                            break;
                        }
                    }
                    PageSignal::ApprovalDenied => {
                        return Ok(AuthState::Failed(AuthFailure::SecondFactorRejected(
                            "verification was denied".to_string(),
                        )))
                    }
                    _ => stale_error = None,
                }

                // The same message never went away: the new code was rejected too
                if signal == PageSignal::CodeRejected && deadline.expired() {
                    break;
                }
                self.pause(&deadline, || {
                    AuthFailure::SecondFactorRejected("no response after submitting the code".to_string())
                })
                .await?;
            }

            if attempt < attempts {
                self.prompter.status("Code rejected, try again");
            }
        }

        Ok(AuthState::Failed(AuthFailure::SecondFactorRejected(format!(
            "SMS code rejected {} times",
            attempts
        ))))
    }

    /// Text of the code-rejected message, `None` when it is not shown
    async fn otc_error(&self, driver: &mut dyn BrowserDriver) -> BrowserResult<Option<String>> {
        if !driver.exists(OTC_ERROR).await? {
            return Ok(None);
        }
        Ok(Some(driver.texts(OTC_ERROR).await?.join(" ")))
    }

    async fn extract_session(&self, driver: &mut dyn BrowserDriver) -> Result<AuthState, AuthFailure> {
        let session = Session::new(driver.cookies().await?);
        if session.is_empty() {
            log::warn!("Browser returned no cookies after login");
            return Ok(AuthState::Failed(AuthFailure::SessionInvalid));
        }

        if !self.probe.probe(&session).await {
            return Ok(AuthState::Failed(AuthFailure::SessionInvalid));
        }

        if let Some(store) = self.store {
            if let Err(e) = store.save(&session) {
                log::warn!("Could not cache session: {:#}", e);
            }
        }
        Ok(AuthState::Authenticated(session))
    }

    async fn detect(&self, driver: &mut dyn BrowserDriver) -> BrowserResult<PageSignal> {
        if self.portal.is_landing(&driver.current_url().await?) {
            return Ok(PageSignal::Landing);
        }
        for (selector, signal) in SIGNALS {
            if driver.exists(selector).await? {
                return Ok(*signal);
            }
        }
        Ok(PageSignal::Nothing)
    }

    async fn stay_signed_in(&self, driver: &mut dyn BrowserDriver) -> BrowserResult<()> {
        driver.click(&Target::css(STAY_SIGNED_IN_YES)).await?;
        Ok(())
    }

    async fn click_first(
        &self,
        driver: &mut dyn BrowserDriver,
        targets: &[Target],
    ) -> Result<(), AuthFailure> {
        for target in targets {
            if driver.click(target).await? {
                return Ok(());
            }
        }
        Err(AuthFailure::Browser(format!("nothing to click among {:?}", targets)))
    }

    fn deadline(&self, timeout: Duration) -> Deadline {
        Deadline::after(timeout, self.options.poll_interval)
    }

    async fn pause<F>(&self, deadline: &Deadline, on_timeout: F) -> Result<(), AuthFailure>
    where
        F: FnOnce() -> AuthFailure,
    {
        match deadline.pause(&self.cancel_flag).await {
            WaitOutcome::Continue => Ok(()),
            WaitOutcome::TimedOut => Err(on_timeout()),
            WaitOutcome::Cancelled => Err(AuthFailure::Cancelled),
        }
    }
}

fn browser_timeout(what: &str) -> AuthFailure {
    AuthFailure::Browser(format!("timed out waiting for {}", what))
}
