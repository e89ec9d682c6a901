use crate::core::{Config, ConfigKey};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

pub fn execute(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("set", sub_matches)) => handle_set(sub_matches),
        Some(("show", _)) => handle_show(),
        _ => {
            println!("Use 'ufora config --help' for more information.");
            Ok(())
        }
    }
}

fn handle_set(matches: &clap::ArgMatches) -> Result<()> {
    let key: ConfigKey = matches
        .get_one::<String>("key")
        .context("Key argument is required")?
        .parse()?;
    let raw = matches
        .get_one::<String>("value")
        .context("Value argument is required")?;

    let value = match key {
        ConfigKey::BaseDirectory => normalize_directory(raw)?,
        _ => raw.clone(),
    };

    let mut config = Config::load()?;
    config.set(key, &value)?;
    config.save()?;

    println!(
        "{}",
        format!("✓ {} set to: {}", key.name(), value).green()
    );
    Ok(())
}

/// Absolute form of `path`; a missing directory is accepted with a warning
fn normalize_directory(path: &str) -> Result<String> {
    let path_buf = Path::new(path.trim());
    if !path_buf.exists() {
        println!(
            "{}",
            format!("⚠️  Warning: Path '{}' does not exist", path).yellow()
        );
        println!(
            "{}",
            "It will be created on the first download.".dimmed()
        );
        let absolute = std::path::absolute(path_buf)
            .with_context(|| format!("Failed to resolve path: {}", path))?;
        return Ok(absolute.to_string_lossy().to_string());
    }

    Ok(path_buf
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", path))?
        .to_string_lossy()
        .to_string())
}

fn handle_show() -> Result<()> {
    let config = Config::load()?;

    println!("{}", "Settings".white().bold());
    for key in ConfigKey::ALL {
        let value = config
            .get(key)
            .unwrap_or_else(|| "(not set)".dimmed().to_string());
        println!("  {:<6} {}", key.name().cyan(), value);
    }
    println!(
        "  {:<6} {}",
        "base".cyan(),
        config.base_directory().display().to_string().dimmed()
    );
    println!(
        "  {:<6} {}",
        "file".cyan(),
        Config::config_dir()?.display().to_string().dimmed()
    );
    Ok(())
}
