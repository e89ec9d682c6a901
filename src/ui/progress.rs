// Progress bar for long-running downloads

use colored::Colorize;
use std::io::{self, Write};

const BAR_LENGTH: usize = 30;

/// Filled and empty cell counts for a bar of `width` cells
pub fn bar_cells(processed: usize, total: usize, width: usize) -> (usize, usize) {
    let filled = if total > 0 {
        (processed.min(total) * width) / total
    } else {
        0
    };
    (filled, width - filled)
}

/// Redraw the progress bar on the current line
///
/// # Arguments
/// * `processed` - Number of items processed
/// * `total` - Total number of items
/// * `prefix` - Text to display before the progress bar
pub fn show_progress_bar(processed: usize, total: usize, prefix: &str) {
    let percentage = if total > 0 {
        processed.min(total) * 100 / total
    } else {
        0
    };
    let (filled, empty) = bar_cells(processed, total, BAR_LENGTH);

    // stderr keeps the bar out of piped output
    let mut err = io::stderr();
    let _ = write!(
        err,
        "\r{} [{}{}] {}% ({}/{}) ",
        prefix.white(),
        "=".repeat(filled).green(),
        " ".repeat(empty),
        percentage,
        processed,
        total
    );
    let _ = err.flush();
}

/// Clear the current line (useful for progress bars)
pub fn clear_line() {
    let mut err = io::stderr();
    let _ = write!(err, "\r{}\r", " ".repeat(80));
    let _ = err.flush();
}
