// Shared plumbing for commands that talk to the portal

use anyhow::Result;
use std::sync::Arc;

use crate::core::auth::{AuthOptions, Authenticator};
use crate::core::browser::ChromeLauncher;
use crate::core::client::{HttpProbe, PortalClient};
use crate::core::courses::Course;
use crate::core::session::{Session, SessionStore};
use crate::core::{CancelFlag, Config, Portal};
use crate::error::{FetchError, UforaError};
use crate::ui::{self, TerminalPrompter};

pub fn session_store() -> Result<SessionStore> {
    Ok(SessionStore::new(Config::session_path()?))
}

/// Run the login flow. `cached` short-circuits it when the portal still accepts it.
pub async fn authenticate(
    config: &Config,
    store: &SessionStore,
    cached: Option<Session>,
    show_browser: bool,
    cancel_flag: CancelFlag,
) -> Result<Session> {
    let portal = Portal::default();
    let launcher = ChromeLauncher::new().headless(!show_browser);
    let probe = HttpProbe::new(portal.clone());
    let prompter = TerminalPrompter;

    let options = AuthOptions {
        method: config.twofa_method,
        ..AuthOptions::default()
    };
    let authenticator = Authenticator::new(portal, &launcher, &probe, &prompter)
        .with_options(options)
        .with_store(store)
        .with_default_email(config.email.clone())
        .with_cancel_flag(cancel_flag);

    authenticator
        .run(cached)
        .await
        .map_err(|failure| UforaError::from(failure).into())
}

/// HTTP client over the cached session, logging in first when needed
pub async fn connect(config: &Config, cancel_flag: CancelFlag) -> Result<PortalClient> {
    let store = session_store()?;
    let session = authenticate(config, &store, store.load(), false, cancel_flag).await?;
    let client = PortalClient::new(Portal::default(), Arc::new(session)).map_err(UforaError::from)?;
    Ok(client)
}

/// Forget the cached session after the portal rejected it mid-command
pub fn forget_rejected_session(error: &FetchError) {
    if !error.is_auth() {
        return;
    }
    match session_store().and_then(|store| store.clear()) {
        Ok(()) => ui::warn("The portal rejected the session. Run 'ufora login' and try again."),
        Err(e) => log::warn!("Could not clear cached session: {:#}", e),
    }
}

/// Course for the 1-based id printed by `ufora courses`
pub fn resolve_course(config: &Config, id: usize) -> Result<Course> {
    if config.courses.is_empty() {
        return Err(UforaError::invalid_input("No course list yet; run 'ufora courses' first").into());
    }
    config.course_by_index(id).cloned().ok_or_else(|| {
        UforaError::invalid_input(format!(
            "Invalid course ID {} (choose 1-{} from 'ufora courses')",
            id,
            config.courses.len()
        ))
        .into()
    })
}
