use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::commands::session::{connect, forget_rejected_session, resolve_course};
use crate::core::discovery::TreeDiscovery;
use crate::core::{CancelFlag, Config};
use crate::error::UforaError;
use crate::ui;

pub async fn execute(matches: &ArgMatches, cancel_flag: CancelFlag) -> Result<()> {
    let id = *matches
        .get_one::<usize>("course")
        .context("Course argument is required")?;
    let config = Config::load()?;
    let course = resolve_course(&config, id)?;
    let client = connect(&config, cancel_flag).await?;

    ui::dimmed(&format!("Reading materials of {}...", course.title));
    let root = match TreeDiscovery::new(&client).discover(&course.id).await {
        Ok(root) => root,
        Err(e) => {
            forget_rejected_session(&e);
            return Err(UforaError::from(e).into());
        }
    };

    if root.children.is_empty() {
        ui::warn("No materials found.");
        return Ok(());
    }

    println!();
    ui::bold(&format!("Course materials for {}", course.title));
    for line in ui::render_tree(&root) {
        println!("{}", line);
    }
    println!();

    let warnings = root.warnings();
    if !warnings.is_empty() {
        ui::warn(&format!(
            "{} folder(s) could not be read and are shown empty",
            warnings.len()
        ));
    }
    ui::dimmed(&format!(
        "{} files. Download with 'ufora download {} [--select <ids>]'.",
        root.files().len(),
        id
    ));
    Ok(())
}
