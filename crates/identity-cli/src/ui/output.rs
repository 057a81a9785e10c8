//! Terminal output helpers.
//!
//! Status lines carry a colored marker that falls back to ASCII when the
//! terminal can't render it.

use std::fmt::Display;

use console::{Emoji, style};

static OK: Emoji<'_, '_> = Emoji("✓", "ok");
static FAIL: Emoji<'_, '_> = Emoji("✗", "error:");
static WARN: Emoji<'_, '_> = Emoji("⚠", "warning:");
static NOTE: Emoji<'_, '_> = Emoji("ℹ", "-");

pub fn success(msg: impl Display) {
    println!("{} {msg}", style(OK).green().bold());
}

/// Errors go to stderr so piped output stays clean.
pub fn error(msg: impl Display) {
    eprintln!("{} {msg}", style(FAIL).red().bold());
}

pub fn warning(msg: impl Display) {
    eprintln!("{} {msg}", style(WARN).yellow().bold());
}

pub fn info(msg: impl Display) {
    println!("{} {msg}", style(NOTE).cyan());
}

/// Section title, preceded by a blank line.
pub fn header(title: impl Display) {
    println!("\n{}", style(title).bold().underlined());
}

/// Indented `label: value` line.
pub fn kv(label: &str, value: impl Display) {
    println!("  {:<12} {value}", style(format!("{label}:")).bold());
}

/// One row of left-aligned, fixed-width columns.
pub fn table_row(cols: &[(&str, usize)]) {
    let line = cols
        .iter()
        .map(|(text, width)| format!("{text:<width$}", width = *width))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", line.trim_end());
}
