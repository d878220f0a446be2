//! Terminal output helpers.

use crate::error::{Result, StoreError};
use crate::history::CommitInfo;
use crate::tree::PwNode;
use colored::*;
use std::io::{self, BufRead, Write};
use zeroize::Zeroizing;

/// Render `root` as an indented tree, folders marked with a trailing `/`.
///
/// Siblings are ordered case-insensitively.
pub fn format_tree(root: &PwNode) -> Vec<String> {
    if root.children().is_empty() {
        return vec!["(empty)".to_string()];
    }
    let mut lines = Vec::new();
    push_children(root, "", &mut lines);
    lines
}

fn push_children(node: &PwNode, prefix: &str, lines: &mut Vec<String>) {
    let mut children: Vec<&PwNode> = node.children().iter().collect();
    children.sort_by_key(|child| child.name().to_lowercase());

    let count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let is_last = i + 1 == count;
        let branch = if is_last { "└── " } else { "├── " };
        let label = if child.is_entry() {
            child.name().to_string()
        } else {
            format!("{}/", child.name())
        };
        lines.push(format!("{prefix}{branch}{label}"));

        if !child.is_entry() {
            let extension = if is_last { "    " } else { "│   " };
            push_children(child, &format!("{prefix}{extension}"), lines);
        }
    }
}

/// One line per commit: short revision, local time, summary.
pub fn format_commit(commit: &CommitInfo) -> String {
    let local = commit.timestamp.with_timezone(&chrono::Local);
    format!(
        "{} {} {}",
        commit.short_revision().yellow(),
        local.format("%Y-%m-%d %H:%M"),
        commit.summary
    )
}

/// Print an error message and exit.
pub fn error_exit(message: &str, code: i32) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), message);
    std::process::exit(code);
}

/// Print an error message without exiting.
pub fn error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

/// Print a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print a warning message.
pub fn warning(message: &str) {
    println!("{} {}", "Warning:".yellow(), message);
}

/// Clear the terminal screen.
pub fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
    let _ = io::stdout().flush();
}

/// Ask a yes/no question on the terminal.
pub fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool> {
    let default_hint = if default { "Y/n" } else { "y/N" };
    print!("{prompt} [{default_hint}]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    if input.is_empty() {
        Ok(default)
    } else {
        Ok(input == "y" || input == "yes")
    }
}

/// Read a secret from the first line of `reader`, without the line ending.
pub fn read_secret_line(reader: &mut impl BufRead) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    if reader.read_line(&mut line)? == 0 {
        return Err(StoreError::InvalidSecret("no input".to_string()));
    }
    let trimmed_len = line.trim_end_matches(&['\r', '\n'][..]).len();
    line.truncate(trimmed_len);
    Ok(line)
}
