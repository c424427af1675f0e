//! Terminal output for CLI handlers.
//!
//! A command prints either for people (aligned fields, tables, colored
//! marks) or, with `--json`, exactly one JSON document on stdout via
//! [`document`]. In JSON mode every human helper stays silent and only
//! warnings and errors are written, to stderr, as `{"level", "message"}`
//! objects, so stdout always parses. `--quiet` keeps warnings and errors.

use std::fmt::Display;
use std::sync::OnceLock;

use owo_colors::{OwoColorize, Stream};
use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::application::tuner::Severity;

/// Width of the label column; fits `tcp_max_syn_backlog`.
const LABEL_WIDTH: usize = 20;

/// Output mode selected by the global CLI flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// One JSON document instead of human-readable text.
    pub json: bool,
    /// Only warnings and errors.
    pub quiet: bool,
    /// Number of `-v` flags.
    pub verbose: u8,
}

impl OutputConfig {
    #[must_use]
    pub const fn new(json: bool, quiet: bool, verbose: u8) -> Self {
        Self {
            json,
            quiet,
            verbose,
        }
    }

    const fn human(self) -> bool {
        !self.json && !self.quiet
    }
}

static MODE: OnceLock<OutputConfig> = OnceLock::new();

/// Set the output mode. Only the first call takes effect.
pub fn configure(config: OutputConfig) {
    let _ = MODE.set(config);
}

fn mode() -> OutputConfig {
    MODE.get().copied().unwrap_or_default()
}

#[must_use]
pub fn is_json() -> bool {
    mode().json
}

#[must_use]
pub fn is_quiet() -> bool {
    mode().quiet
}

#[must_use]
pub fn verbosity() -> u8 {
    mode().verbose
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Success,
    Warning,
    Error,
    Hint,
}

impl Mark {
    const fn level(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Hint => "hint",
        }
    }

    /// Whether the line is printed under `config`.
    const fn shown(self, config: OutputConfig) -> bool {
        match self {
            Self::Warning | Self::Error => true,
            Self::Success | Self::Hint => config.human(),
        }
    }
}

fn marked(mark: Mark, message: &str) {
    let config = mode();
    if !mark.shown(config) {
        return;
    }
    if config.json {
        eprintln!("{}", json!({ "level": mark.level(), "message": message }));
        return;
    }

    match mark {
        Mark::Success => println!(
            "  {} {message}",
            "✓".if_supports_color(Stream::Stdout, |s| s.green())
        ),
        Mark::Warning => println!(
            "  {} {message}",
            "!".if_supports_color(Stream::Stdout, |s| s.yellow())
        ),
        Mark::Error => eprintln!(
            "  {} {message}",
            "×".if_supports_color(Stream::Stderr, |s| s.red())
        ),
        Mark::Hint => println!(
            "  {} {}",
            "hint:".if_supports_color(Stream::Stdout, |s| s.cyan()),
            message.if_supports_color(Stream::Stdout, |s| s.dimmed())
        ),
    }
}

pub fn success(message: &str) {
    marked(Mark::Success, message);
}

/// Shown even with `--quiet`.
pub fn warning(message: &str) {
    marked(Mark::Warning, message);
}

/// Always written to stderr.
pub fn error(message: &str) {
    marked(Mark::Error, message);
}

pub fn hint(message: &str) {
    marked(Mark::Hint, message);
}

/// `wsgate <version>` banner.
pub fn header(version: &str) {
    if !mode().human() {
        return;
    }
    println!(
        "{} {}",
        "wsgate".if_supports_color(Stream::Stdout, |s| s.bold()),
        version.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
    println!();
}

pub fn section(title: &str) {
    if !mode().human() {
        return;
    }
    println!();
    println!("{}", title.if_supports_color(Stream::Stdout, |s| s.bold()));
}

/// Aligned `label value` line.
pub fn field(label: &str, value: impl Display) {
    if !mode().human() {
        return;
    }
    let label = format!("{label:<LABEL_WIDTH$}");
    println!(
        "  {} {value}",
        label.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
}

/// `used / max (pct%)` field for a bounded count.
pub fn usage(label: &str, used: usize, max: usize) {
    field(label, fmt_usage(used, max));
}

fn fmt_usage(used: usize, max: usize) -> String {
    if max == 0 {
        return format!("{used} / {max}");
    }
    let percent = used as f64 / max as f64 * 100.0;
    format!("{used} / {max} ({percent:.0}%)")
}

/// Rows as an indented table.
pub fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) {
    if !mode().human() {
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    block(&table.to_string());
}

/// Indented multi-line text, such as rendered TOML.
pub fn block(content: &str) {
    if !mode().human() {
        return;
    }
    for line in content.lines() {
        println!("  {line}");
    }
}

/// Severity label colored by how bad it is.
#[must_use]
pub fn severity(severity: Severity) -> String {
    let label = severity.as_str();
    match severity {
        Severity::Ok => label.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
        Severity::Advisory => label.if_supports_color(Stream::Stdout, |s| s.cyan()).to_string(),
        Severity::Warning => label
            .if_supports_color(Stream::Stdout, |s| s.yellow())
            .to_string(),
        Severity::Critical => label
            .if_supports_color(Stream::Stdout, |s| s.red().bold().to_string())
            .to_string(),
    }
}

/// The command's single JSON document, pretty-printed to stdout.
pub fn document(value: &serde_json::Value) {
    println!("{value:#}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_and_json_silence_human_lines_but_not_problems() {
        let quiet = OutputConfig::new(false, true, 0);
        let json = OutputConfig::new(true, false, 0);
        let normal = OutputConfig::new(false, false, 1);

        for config in [quiet, json] {
            assert!(!Mark::Success.shown(config));
            assert!(!Mark::Hint.shown(config));
            assert!(Mark::Warning.shown(config));
            assert!(Mark::Error.shown(config));
        }
        assert!(Mark::Success.shown(normal));
        assert!(Mark::Hint.shown(normal));
    }

    #[test]
    fn usage_shows_share_of_capacity() {
        assert_eq!(fmt_usage(250, 1000), "250 / 1000 (25%)");
        assert_eq!(fmt_usage(0, 0), "0 / 0");
    }

    #[test]
    fn severity_label_keeps_its_name() {
        for level in [
            Severity::Ok,
            Severity::Advisory,
            Severity::Warning,
            Severity::Critical,
        ] {
            assert!(severity(level).contains(level.as_str()));
        }
    }
}
