// UI and formatting module

pub mod formatters;
pub mod progress;
pub mod prompts;
pub mod table;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_size, render_failures, render_tree};
pub use progress::{clear_line, show_progress_bar};
pub use prompts::{bold, dimmed, info, pick_many, success, warn, TerminalPrompter};
pub use table::Table;
