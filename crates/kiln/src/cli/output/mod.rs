//! Output formatting utilities

use console::{style, Style};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Header printed before a task's action runs
pub fn task_header(name: &str) -> String {
    format!("{} {}", style(">").dim(), style(name).bold())
}

/// One line of the `--list` output; `*` marks default tasks
pub fn task_line(name: &str, default: bool) -> String {
    if default {
        format!("{} {}", task_style().apply_to(name), style("*").yellow())
    } else {
        task_style().apply_to(name).to_string()
    }
}

/// Style for task names
pub fn task_style() -> Style {
    Style::new().cyan()
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}
