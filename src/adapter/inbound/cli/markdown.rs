//! Markdown rendering of the command-line help (`--md-help`).
//!
//! Every command becomes a heading with its description, a usage code
//! block and one argument table per section. Subcommands follow with
//! headings one level deeper.

use clap::{Arg, Command};

const SKIPPED_ARGS: [&str; 3] = ["help", "version", "md_help"];

/// Render the help of `command` and all its subcommands.
pub fn render(mut command: Command) -> String {
    command.build();
    let mut out = String::new();
    render_command(&command, 0, &mut out);
    out
}

fn render_command(command: &Command, level: usize, out: &mut String) {
    let title = "#".repeat(level + 1);
    let section = "#".repeat(level + 2);
    let prog = command.get_bin_name().unwrap_or(command.get_name());

    out.push_str(&format!("{title} `{prog}`\n\n"));

    if let Some(about) = command.get_long_about().or(command.get_about()) {
        out.push_str(&format!("{}\n\n", about.to_string().trim()));
    }

    let usage = command.clone().render_usage().to_string();
    let usage = usage.trim().trim_start_matches("Usage:").trim();
    out.push_str(&format!("{section} Usage\n\n```bash\n{usage}\n```\n\n"));

    let (positionals, options): (Vec<&Arg>, Vec<&Arg>) = command
        .get_arguments()
        .filter(|arg| include(arg, level))
        .partition(|arg| arg.is_positional());

    table(&format!("{section} Positional arguments"), &positionals, out);
    table(&format!("{section} Options"), &options, out);

    for sub in command.get_subcommands().filter(|sub| sub.get_name() != "help") {
        render_command(sub, level + 1, out);
    }
}

fn include(arg: &Arg, level: usize) -> bool {
    if arg.is_hide_set() || SKIPPED_ARGS.contains(&arg.get_id().as_str()) {
        return false;
    }
    // global flags are documented once, on the root command
    level == 0 || !arg.is_global_set()
}

fn table(heading: &str, args: &[&Arg], out: &mut String) {
    if args.is_empty() {
        return;
    }

    out.push_str(&format!("{heading}\n\n"));
    out.push_str("| argument | default | help |\n");
    out.push_str("| -------- | ------- | ---- |\n");
    for arg in args {
        out.push_str(&row(arg));
        out.push('\n');
    }
    out.push('\n');
}

fn row(arg: &Arg) -> String {
    let argument = if arg.is_positional() {
        arg.get_value_names()
            .and_then(|names| names.first())
            .map(|name| name.to_string().to_lowercase())
            .unwrap_or_else(|| arg.get_id().to_string())
    } else {
        let mut names = Vec::new();
        if let Some(short) = arg.get_short() {
            names.push(format!("-{short}"));
        }
        if let Some(long) = arg.get_long() {
            names.push(format!("--{long}"));
        }
        names.join(", ")
    };

    let defaults: Vec<String> = arg
        .get_default_values()
        .iter()
        .map(|value| value.to_string_lossy().into_owned())
        .collect();
    let default = if defaults.is_empty() {
        String::new()
    } else {
        format!("`{}`", defaults.join(" "))
    };

    let help = arg
        .get_long_help()
        .or(arg.get_help())
        .map(|help| help.to_string().trim().lines().collect::<Vec<_>>().join("<br/>"))
        .unwrap_or_default();

    format!("| `{argument}` | {default} | {help} |")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::adapter::inbound::cli::command::Cli;

    fn help() -> String {
        render(Cli::command())
    }

    #[test]
    fn root_has_title_usage_and_table() {
        let md = help();

        assert!(md.starts_with("# `grizzly-cli`\n"));
        assert!(md.contains("## Usage\n\n```bash\ngrizzly-cli"));
        assert!(md.contains("| argument | default | help |\n| -------- | ------- | ---- |\n"));
        assert!(md.contains("| `--color` | `auto` |"));
    }

    #[test]
    fn subcommands_get_deeper_headings() {
        let md = help();

        assert!(md.contains("\n## `grizzly-cli dist`\n"));
        assert!(md.contains("\n### `grizzly-cli dist run`\n"));
        assert!(md.contains("\n### `grizzly-cli dist compose`\n"));
        assert!(md.contains("| `-w, --workers` |"));
        assert!(md.contains("| `-T, --testdata-variable` |"));
    }

    #[test]
    fn help_version_and_md_help_are_omitted() {
        let md = help();

        assert!(!md.contains("`-h, --help`"));
        assert!(!md.contains("`-V, --version`"));
        assert!(!md.contains("`--md-help`"));
    }

    #[test]
    fn positional_file_is_listed() {
        let md = help();
        assert!(md.contains("#### Positional arguments"));
        assert!(md.contains("| `file` |"));
    }

    #[test]
    fn global_flags_are_documented_once() {
        let md = help();
        assert_eq!(md.matches("| `--json-logs` |").count(), 1);
    }
}
