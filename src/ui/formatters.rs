use colored::Colorize;
use humansize::{format_size as humansize_format, DECIMAL};

use crate::core::download::{DownloadReport, TaskStatus};
use crate::core::material::MaterialNode;

/// Format a byte count in human-readable form (e.g. "1.20 MB")
pub fn format_size(size: u64) -> String {
    humansize_format(size, DECIMAL)
}

/// Indented listing of a material tree.
///
/// Top-level entries carry the 1-based id accepted by `download --select`.
pub fn render_tree(root: &MaterialNode) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, node) in root.children.iter().enumerate() {
        let id = format!("[{}]", index + 1);
        render_node(node, &format!("{:>4} ", id.bold()), 0, &mut lines);
    }
    lines
}

fn render_node(node: &MaterialNode, prefix: &str, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let label = if node.is_folder() {
        format!("{}/", node.name).blue().bold().to_string()
    } else {
        match &node.type_label {
            Some(kind) => format!("{} {}", node.name, format!("({})", kind).dimmed()),
            None => node.name.clone(),
        }
    };

    let mut line = format!("{}{}{}", prefix, indent, label);
    if let Some(warning) = &node.warning {
        line.push_str(&format!("  {}", format!("! {}", warning).yellow()));
    }
    lines.push(line);

    let child_prefix = " ".repeat(5);
    for child in &node.children {
        render_node(child, &child_prefix, depth + 1, lines);
    }
}

/// One line per failed file, for the download summary
pub fn render_failures(report: &DownloadReport) -> Vec<String> {
    report
        .failed()
        .filter_map(|entry| match &entry.status {
            TaskStatus::Failed(reason) => Some(format!(
                "  {} {}: {}",
                "✗".red(),
                entry.path.display(),
                reason.dimmed()
            )),
            _ => None,
        })
        .collect()
}
