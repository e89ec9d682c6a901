use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;

use crate::commands::session::{connect, forget_rejected_session, resolve_course};
use crate::core::courses::Course;
use crate::core::discovery::TreeDiscovery;
use crate::core::download::{AbortReason, DownloadOrchestrator, DownloadReport};
use crate::core::naming::sanitize_file_name;
use crate::core::{CancelFlag, Config, ContentFetcher};
use crate::error::{FetchError, UforaError};
use crate::ui;

pub async fn execute(matches: &ArgMatches, cancel_flag: CancelFlag) -> Result<()> {
    let id = *matches
        .get_one::<usize>("course")
        .context("Course argument is required")?;
    let config = Config::load()?;
    let course = resolve_course(&config, id)?;
    let destination = destination(matches, &config, &course)?;

    let client = connect(&config, cancel_flag.clone()).await?;

    ui::dimmed(&format!("Reading materials of {}...", course.title));
    let root = match TreeDiscovery::new(&client).discover(&course.id).await {
        Ok(root) => root,
        Err(e) => {
            forget_rejected_session(&e);
            return Err(UforaError::from(e).into());
        }
    };

    for (path, warning) in root.warnings() {
        ui::warn(&format!("Skipping unreadable folder '{}': {}", path.display(), warning));
    }
    if root.files().is_empty() {
        ui::warn("No materials found.");
        return Ok(());
    }

    let selector = if matches.get_flag("pick") {
        let names: Vec<String> = root.children.iter().map(|n| n.name.clone()).collect();
        let picked = ui::pick_many("Select what to download (space to toggle)", &names)?;
        if picked.is_empty() {
            ui::warn("Nothing selected.");
            return Ok(());
        }
        Some(picked)
    } else {
        matches
            .get_many::<usize>("select")
            .map(|ids| ids.copied().collect::<Vec<_>>())
    };

    ui::info(&format!("Downloading to {}", destination.display()));
    ui::dimmed("Press Ctrl+C to stop after the current files");

    let orchestrator = DownloadOrchestrator::new(&client)
        .with_cancel_flag(cancel_flag)
        .on_progress(|done, total| ui::show_progress_bar(done, total, "Downloading"));
    let report = orchestrator
        .download(&root.children, &destination, selector.as_deref())
        .await?;
    ui::clear_line();

    print_summary(&report);

    if report.aborted == Some(AbortReason::SessionInvalidated) {
        forget_rejected_session(&FetchError::unauthorized(client.portal().base().as_str()));
    }
    report.ensure_success()?;
    Ok(())
}

/// `--dir`, `--here`, or `<base directory>/<course name>`
fn destination(matches: &ArgMatches, config: &Config, course: &Course) -> Result<PathBuf> {
    if let Some(dir) = matches.get_one::<String>("dir") {
        return Ok(PathBuf::from(dir));
    }
    if matches.get_flag("here") {
        return std::env::current_dir().context("Failed to read the current directory");
    }
    Ok(config.base_directory().join(sanitize_file_name(&course.name)))
}

fn print_summary(report: &DownloadReport) {
    let done = report.done().count();
    let reused = report.reused_count();
    let failed = report.failed().count();

    println!();
    match report.aborted {
        Some(AbortReason::Cancelled) => ui::warn("Download cancelled; showing partial results"),
        Some(AbortReason::SessionInvalidated) => {
            ui::warn("The portal rejected the session; remaining files were not started")
        }
        None => {}
    }

    println!(
        "{} {}/{} files ({} new, {} already present, {})",
        if failed == 0 { "✓".green() } else { "!".yellow() },
        done,
        report.total(),
        done - reused,
        reused,
        ui::format_size(report.bytes_downloaded())
    );

    if failed > 0 {
        println!("{}", format!("{} failed:", failed).red().bold());
        for line in ui::render_failures(report) {
            println!("{}", line);
        }
        ui::dimmed("Re-run the same command to retry; finished files are skipped.");
    }
}
