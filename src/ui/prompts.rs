// UI prompts and user interaction module

use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, MultiSelect, Password};

use crate::core::auth::{Credentials, Prompter};
use crate::error::AuthFailure;

/// Display a warning message
pub fn warn(message: &str) {
    eprintln!("{}", format!("Warning: {}", message).yellow().bold());
}

/// Display an info message
pub fn info(message: &str) {
    println!("{}", message.cyan());
}

/// Display a success message
pub fn success(message: &str) {
    println!("{}", message.green().bold());
}

/// Display a dimmed/secondary message
pub fn dimmed(message: &str) {
    println!("{}", message.dimmed());
}

/// Display a bold white message
pub fn bold(message: &str) {
    println!("{}", message.white().bold());
}

/// Let the user tick any number of entries.
///
/// Returns 1-based positions, in list order. Empty when nothing was picked.
pub fn pick_many(title: &str, items: &[String]) -> anyhow::Result<Vec<usize>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let picked = MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt(title)
        .items(items)
        .interact_opt()?
        .unwrap_or_default();

    Ok(picked.into_iter().map(|i| i + 1).collect())
}

/// Terminal-backed prompts for the login flow
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn credentials(&self, default_email: Option<&str>) -> Result<Credentials, AuthFailure> {
        let theme = ColorfulTheme::default();

        let mut email = Input::<String>::with_theme(&theme).with_prompt("Email");
        if let Some(default) = default_email {
            email = email.default(default.to_string());
        }
        let email = email
            .validate_with(|input: &String| -> Result<(), &str> {
                if input.contains('@') {
                    Ok(())
                } else {
                    Err("Enter your full university email address")
                }
            })
            .interact_text()
            .map_err(|_| AuthFailure::Cancelled)?;

        let password = Password::with_theme(&theme)
            .with_prompt("Password")
            .interact()
            .map_err(|_| AuthFailure::Cancelled)?;

        Ok(Credentials {
            email: email.trim().to_string(),
            password,
        })
    }

    fn sms_code(&self, attempt: u32) -> Result<String, AuthFailure> {
        let prompt = if attempt > 1 {
            format!("SMS code (attempt {})", attempt)
        } else {
            "SMS code".to_string()
        };

        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .validate_with(|input: &String| -> Result<(), &str> {
                if !input.trim().is_empty() && input.trim().chars().all(|c| c.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err("The code only contains digits")
                }
            })
            .interact_text()
            .map_err(|_| AuthFailure::Cancelled)
    }

    fn show_app_code(&self, code: &str) {
        println!();
        println!(
            "{} {}",
            "Enter this number in your authenticator app:".white().bold(),
            code.green().bold()
        );
        println!("{}", "Waiting for approval...".dimmed());
    }

    fn status(&self, message: &str) {
        dimmed(message);
    }
}
