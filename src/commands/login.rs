use anyhow::Result;

use crate::commands::session::{authenticate, session_store};
use crate::core::{CancelFlag, Config};
use crate::ui;

/// Always run the full login flow and replace the cached session
pub async fn execute(show_browser: bool, cancel_flag: CancelFlag) -> Result<()> {
    let config = Config::load()?;
    let store = session_store()?;

    let session = authenticate(&config, &store, None, show_browser, cancel_flag).await?;

    ui::success("✓ Logged in");
    ui::dimmed(&format!(
        "Session with {} cookies saved to {}",
        session.cookies().len(),
        store.path().display()
    ));
    Ok(())
}
