//! Operator-facing output.
//!
//! Every status message goes through [`emit`]: in JSON mode it becomes one
//! `{"type": ..., "payload": ...}` line on stdout, otherwise it is printed
//! for humans unless `--quiet` suppresses it. Warnings and errors are never
//! suppressed. The master's own output is streamed by the container adapter
//! and does not pass through here.

use std::fmt::Display;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::{json, Value};

use super::command::ColorChoice;

/// Output settings taken from the global flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// One JSON object per line instead of human output.
    pub json: bool,
    /// Hide everything but warnings and errors.
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

    fn shows(self, level: Level) -> bool {
        level == Level::Always || !self.quiet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Normal,
    Always,
}

static SETTINGS: OnceLock<RwLock<OutputConfig>> = OnceLock::new();

fn settings() -> OutputConfig {
    let cell = SETTINGS.get_or_init(|| RwLock::new(OutputConfig::default()));
    match cell.read() {
        Ok(config) => *config,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Apply output settings from global CLI flags.
pub fn configure(config: OutputConfig, color: &ColorChoice) {
    let cell = SETTINGS.get_or_init(|| RwLock::new(OutputConfig::default()));
    match cell.write() {
        Ok(mut current) => *current = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }

    match color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto if config.json => owo_colors::set_override(false),
        ColorChoice::Auto => owo_colors::unset_override(),
    }
}

fn json_line(kind: &str, payload: Value) -> String {
    json!({ "type": kind, "payload": payload }).to_string()
}

fn emit(kind: &str, payload: Value, level: Level, human: impl FnOnce()) {
    let config = settings();
    if config.json {
        println!("{}", json_line(kind, payload));
    } else if config.shows(level) {
        human();
    }
}

/// Whether `--json` is active.
#[must_use]
pub fn is_json() -> bool {
    settings().json
}

/// Number of `-v` flags given.
#[must_use]
pub fn verbosity() -> u8 {
    settings().verbose
}

/// Application name and version, printed once per command.
pub fn header(version: &str) {
    emit(
        "header",
        json!({ "app": "grizzly-cli", "version": version }),
        Level::Normal,
        || println!("{} {}\n", "grizzly-cli".bold(), version.dimmed()),
    );
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    let value = value.to_string();
    emit(
        "field",
        json!({ "label": label, "value": value }),
        Level::Normal,
        || println!("  {:<12} {}", label.dimmed(), value),
    );
}

/// A completed step, marked with a check.
pub fn success(message: &str) {
    emit("success", json!({ "message": message }), Level::Normal, || {
        println!("  {} {}", "✓".green(), message)
    });
}

/// Shown even in quiet mode.
pub fn warning(message: &str) {
    emit("warning", json!({ "message": message }), Level::Always, || {
        println!("  {} {}", "⚠".yellow(), message)
    });
}

/// Errors go to stderr in both modes.
pub fn error(message: &str) {
    if is_json() {
        eprintln!("{}", json_line("error", json!({ "message": message })));
    } else {
        eprintln!("  {} {}", "×".red(), message);
    }
}

/// Bold title that opens a new phase of output.
pub fn section(title: &str) {
    emit("section", json!({ "title": title }), Level::Normal, || {
        println!("\n{}", title.bold())
    });
}

/// Dimmed secondary information.
pub fn note(message: &str) {
    emit("note", json!({ "message": message }), Level::Normal, || {
        println!("  {}", message.dimmed())
    });
}

/// Multi-line content such as a rendered table, indented.
pub fn lines(content: &str) {
    emit("lines", json!({ "content": content }), Level::Normal, || {
        for line in content.lines() {
            println!("  {line}");
        }
    });
}

/// Typed payload for scripts; nothing is printed outside JSON mode.
pub fn json_event(kind: &str, payload: Value) {
    if is_json() {
        println!("{}", json_line(kind, payload));
    }
}

/// Color `value` for embedding in a message; plain in JSON mode.
pub fn highlight(value: impl Display) -> String {
    if is_json() {
        value.to_string()
    } else {
        value.cyan().to_string()
    }
}

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Start a spinner; hidden in JSON and quiet mode.
pub fn spinner(message: &str) -> ProgressBar {
    let config = settings();
    let bar = if config.json || config.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_strings(SPINNER_FRAMES)
            .template("  {spinner:.cyan} {msg}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    };
    bar.set_message(message.to_string());
    bar
}

/// Stop the spinner with a success mark.
pub fn spinner_success(bar: &ProgressBar, message: &str) {
    finish(bar, "spinner_success", message, Level::Normal, "✓".green().to_string());
}

/// Stop the spinner with a failure mark. Shown even in quiet mode.
pub fn spinner_fail(bar: &ProgressBar, message: &str) {
    finish(bar, "spinner_fail", message, Level::Always, "×".red().to_string());
}

fn finish(bar: &ProgressBar, kind: &str, message: &str, level: Level, mark: String) {
    let config = settings();
    if config.json {
        println!("{}", json_line(kind, json!({ "message": message })));
        bar.finish_and_clear();
    } else if config.shows(level) {
        bar.finish_with_message(format!("{mark} {message}"));
    } else {
        bar.finish_and_clear();
    }
}
