//! Command-line interface definitions.
//!
//! Defines the CLI structure using `clap`. Cluster settings given on the
//! command line override the matching `GRIZZLY_*` environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::adapter::outbound::container::ContainerSystem;
use crate::config;

/// Run grizzly load tests distributed over a master and its workers
#[derive(Parser, Debug)]
#[command(name = "grizzly-cli")]
#[command(version)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log level filter (overrides -v)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Print the help of every command as Markdown
    #[arg(long)]
    pub md_help: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test distributed over one master and N workers
    #[command(subcommand)]
    Dist(DistCommand),
}

/// Subcommands for `grizzly-cli dist`.
#[derive(Subcommand, Debug)]
pub enum DistCommand {
    /// Start the cluster, follow the master and tear everything down
    Run(DistRunArgs),
    /// Render the cluster as a compose document
    Compose(DistComposeArgs),
}

/// Cluster settings shared by `dist run` and `dist compose`.
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Feature file (or directory) to run
    pub file: Option<PathBuf>,

    /// Number of workers to start
    #[arg(short, long)]
    pub workers: Option<u32>,

    /// Unique identifier suffixed to the cluster name
    #[arg(long)]
    pub id: Option<String>,

    /// Project name (defaults to the current directory name)
    #[arg(long)]
    pub project_name: Option<String>,

    /// Registry prefix of the image, e.g. `registry.example.com/`
    #[arg(long)]
    pub registry: Option<String>,

    /// Open file limit inside the containers
    #[arg(long)]
    pub limit_nofile: Option<u64>,

    /// Seconds between master health probes
    #[arg(long)]
    pub health_interval: Option<u64>,

    /// Seconds before a single health probe times out
    #[arg(long)]
    pub health_timeout: Option<u64>,

    /// Failed probes before the master is declared unhealthy
    #[arg(long)]
    pub health_retries: Option<u32>,

    /// Allocate a pseudo-TTY in the containers
    #[arg(long)]
    pub tty: bool,

    /// File with environment variables passed to the containers
    #[arg(short, long)]
    pub environment_file: Option<PathBuf>,

    /// Testdata variable passed to the test run, as KEY=VALUE
    #[arg(short = 'T', long = "testdata-variable", value_parser = parse_key_value)]
    pub testdata_variables: Vec<(String, String)>,
}

/// Arguments for `grizzly-cli dist run`.
#[derive(Args, Debug)]
pub struct DistRunArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Answer yes to every confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print the container commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Container engine (detected from PATH when omitted)
    #[arg(long, value_enum)]
    pub container_system: Option<ContainerSystem>,
}

/// Arguments for `grizzly-cli dist compose`.
#[derive(Args, Debug)]
pub struct DistComposeArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Write the document to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ClusterArgs {
    /// Apply the given overrides on top of `vars`.
    pub fn apply(&self, vars: &mut BTreeMap<String, String>) {
        let mut set = |name: &str, value: String| {
            vars.insert(name.to_string(), value);
        };

        if let Some(file) = &self.file {
            set(config::RUN_FILE, file.display().to_string());
        }
        if let Some(workers) = self.workers {
            set(config::EXPECTED_WORKERS, workers.to_string());
        }
        if let Some(project) = &self.project_name {
            set(config::PROJECT_NAME, project.clone());
        }
        if let Some(id) = &self.id {
            set(config::CLUSTER_ID, id.clone());
        }
        if let Some(registry) = &self.registry {
            let registry = if registry.ends_with('/') {
                registry.clone()
            } else {
                format!("{registry}/")
            };
            set(config::IMAGE_REGISTRY, registry);
        }
        if let Some(limit) = self.limit_nofile {
            set(config::LIMIT_NOFILE, limit.to_string());
        }
        if let Some(interval) = self.health_interval {
            set(config::HEALTH_CHECK_INTERVAL, interval.to_string());
        }
        if let Some(timeout) = self.health_timeout {
            set(config::HEALTH_CHECK_TIMEOUT, timeout.to_string());
        }
        if let Some(retries) = self.health_retries {
            set(config::HEALTH_CHECK_RETRIES, retries.to_string());
        }
        if self.tty {
            set(config::CONTAINER_TTY, "true".to_string());
        }
        if let Some(file) = &self.environment_file {
            set(config::ENVIRONMENT_FILE, file.display().to_string());
        }
        for (key, value) in &self.testdata_variables {
            set(&format!("{}{key}", config::TESTDATA_VARIABLE_PREFIX), value.clone());
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got \"{raw}\"")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn run_args(argv: &[&str]) -> DistRunArgs {
        let mut full = vec!["grizzly-cli", "dist", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Some(Commands::Dist(DistCommand::Run(args))) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "grizzly-cli");
    }

    #[test]
    fn md_help_needs_no_subcommand() {
        let cli = Cli::try_parse_from(["grizzly-cli", "--md-help"]).unwrap();
        assert!(cli.md_help);
        assert!(cli.command.is_none());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["grizzly-cli", "dist", "run", "-vv", "--json", "--color", "never"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert!(matches!(cli.color, ColorChoice::Never));
    }

    #[test]
    fn run_flags_are_parsed() {
        let args = run_args(&[
            "features/test.feature",
            "-w",
            "3",
            "--id",
            "nightly",
            "-T",
            "host=example.com",
            "--testdata-variable",
            "empty=",
            "--container-system",
            "podman",
            "--dry-run",
            "-y",
        ]);

        assert_eq!(args.cluster.file, Some(PathBuf::from("features/test.feature")));
        assert_eq!(args.cluster.workers, Some(3));
        assert_eq!(args.cluster.id.as_deref(), Some("nightly"));
        assert_eq!(
            args.cluster.testdata_variables,
            vec![
                ("host".to_string(), "example.com".to_string()),
                ("empty".to_string(), String::new()),
            ]
        );
        assert_eq!(args.container_system, Some(ContainerSystem::Podman));
        assert!(args.dry_run);
        assert!(args.yes);
    }

    #[test]
    fn testdata_variable_requires_key_value() {
        let result = Cli::try_parse_from(["grizzly-cli", "dist", "run", "-T", "novalue"]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_are_applied_to_variables() {
        let args = run_args(&[
            "smoke.feature",
            "--workers",
            "2",
            "--registry",
            "registry.local",
            "--health-retries",
            "5",
            "--tty",
            "-T",
            "users=10",
        ]);
        let mut vars = BTreeMap::from([(config::EXPECTED_WORKERS.to_string(), "9".to_string())]);

        args.cluster.apply(&mut vars);

        assert_eq!(vars[config::RUN_FILE], "smoke.feature");
        assert_eq!(vars[config::EXPECTED_WORKERS], "2");
        assert_eq!(vars[config::IMAGE_REGISTRY], "registry.local/");
        assert_eq!(vars[config::HEALTH_CHECK_RETRIES], "5");
        assert_eq!(vars[config::CONTAINER_TTY], "true");
        assert_eq!(vars["TESTDATA_VARIABLE_users"], "10");
    }

    #[test]
    fn id_sets_cluster_suffix_and_keeps_user_tag() {
        let args = run_args(&["--id", "nightly"]);
        let mut vars = BTreeMap::from([(config::USER_TAG.to_string(), "alice".to_string())]);

        args.cluster.apply(&mut vars);

        assert_eq!(vars[config::CLUSTER_ID], "nightly");
        assert_eq!(vars[config::USER_TAG], "alice");
    }

    #[test]
    fn absent_flags_leave_variables_alone() {
        let args = run_args(&[]);
        let mut vars = BTreeMap::from([(config::USER_TAG.to_string(), "alice".to_string())]);

        args.cluster.apply(&mut vars);

        assert_eq!(vars.len(), 1);
    }
}
