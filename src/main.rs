use anyhow::Result;
use colored::Colorize;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ufora::cli::build_cli;
use ufora::commands;
use ufora::core::CancelFlag;
use ufora::error::{exit_code, UforaError};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    ufora::init_logging(matches.get_flag("verbose"));

    let cancel_flag: CancelFlag = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_interrupt_handler(cancel_flag.clone()) {
        log::warn!("{:#}", e);
    }

    let code = match run(&matches, cancel_flag).await {
        Ok(()) => exit_code::SUCCESS,
        Err(err) => report_error(&err),
    };
    process::exit(code);
}

async fn run(matches: &clap::ArgMatches, cancel_flag: CancelFlag) -> Result<()> {
    match matches.subcommand() {
        Some(("login", sub_matches)) => {
            commands::login::execute(sub_matches.get_flag("show-browser"), cancel_flag).await
        }
        Some(("courses", sub_matches)) => commands::courses::execute(sub_matches, cancel_flag).await,
        Some(("materials", sub_matches)) => {
            commands::materials::execute(sub_matches, cancel_flag).await
        }
        Some(("download", sub_matches)) => {
            commands::download::execute(sub_matches, cancel_flag).await
        }
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        Some(("completions", sub_matches)) => {
            commands::completions::execute(sub_matches, &mut build_cli())
        }
        _ => {
            println!("Use 'ufora --help' for more information.");
            Ok(())
        }
    }
}

/// First Ctrl+C asks running work to stop; a second one exits immediately
fn install_interrupt_handler(cancel_flag: CancelFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel_flag.swap(true, Ordering::SeqCst) {
            eprintln!();
            process::exit(130);
        }
        eprintln!();
        eprintln!("{}", "Cancellation requested...".yellow().bold());
        eprintln!("{}", "Finishing current work (press Ctrl+C again to quit)".dimmed());
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))
}

fn report_error(err: &anyhow::Error) -> i32 {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let ufora_error = err.chain().find_map(|cause| cause.downcast_ref::<UforaError>());
    match ufora_error {
        Some(UforaError::Auth(failure)) => {
            eprintln!("{}", failure.remediation().dimmed());
            exit_code::AUTH
        }
        Some(e) => e.exit_code(),
        None => exit_code::GENERAL,
    }
}
