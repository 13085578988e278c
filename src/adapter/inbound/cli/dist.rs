//! Handlers for `grizzly-cli dist`.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::inbound::cli::command::{ClusterArgs, DistComposeArgs, DistRunArgs};
use crate::adapter::inbound::cli::{output, prompt};
use crate::adapter::outbound::compose::ComposeDocument;
use crate::adapter::outbound::container::{self, CliRuntime, ContainerSystem};
use crate::application::coordinator::{Coordinator, RunReport};
use crate::application::distribution;
use crate::config::{self, RunConfig};
use crate::domain::{ClusterPlan, Feature};
use crate::error::{ConfigError, Error, Result};
use crate::port::ContainerRuntime;

/// Execute `dist run`. Returns the process exit code.
pub async fn run(args: &DistRunArgs) -> Result<i32> {
    let mut vars = variables(&args.cluster);

    let run_file = run_file(&vars);
    if run_file.is_file() {
        let feature = Feature::from_file(&run_file)?;
        prepare_feature(&feature, &run_file, &mut vars, args.yes)?;
    } else {
        debug!(path = %run_file.display(), "Run file is not a feature file, skipping distribution");
    }

    let system = match args.container_system.or_else(ContainerSystem::detect) {
        Some(system) => system,
        None if args.dry_run => ContainerSystem::Docker,
        None => {
            return Err(ConfigError::Other(
                "neither \"podman\" nor \"docker\" found in PATH".into(),
            )
            .into())
        }
    };

    if !vars.contains_key(config::MTU) && !args.dry_run {
        if let Some(mtu) = system.default_mtu().await {
            vars.insert(config::MTU.to_string(), mtu.to_string());
        }
    }

    let run_config = RunConfig::from_vars(&vars)?;
    let plan = ClusterPlan::from_config(&run_config);
    print_plan(&plan, system);

    if args.dry_run {
        print_commands(&plan, system);
        return Ok(0);
    }

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(CliRuntime::new(system).verbose(output::verbosity() > 0));
    execute(runtime, &plan).await
}

/// Execute `dist compose`.
pub fn compose(args: &DistComposeArgs) -> Result<()> {
    let vars = variables(&args.cluster);
    let run_config = RunConfig::from_vars(&vars)?;
    let plan = ClusterPlan::from_config(&run_config);
    let yaml = ComposeDocument::from_plan(&plan).to_yaml()?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &yaml)?;
            output::success(&format!("Wrote {}", path.display()));
        }
        None if output::is_json() => output::json_event("compose", json!({ "document": yaml })),
        None => print!("{yaml}"),
    }
    Ok(())
}

/// Run the plan against `runtime`: start the cluster behind the master
/// health gate, follow the master, then remove everything again.
pub async fn execute(runtime: Arc<dyn ContainerRuntime>, plan: &ClusterPlan) -> Result<i32> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let signal = tokio::spawn(async move {
        if let Some(code) = watch_interrupts(tokio::signal::ctrl_c, interrupt).await {
            std::process::exit(code);
        }
    });

    let coordinator = Coordinator::new(Arc::clone(&runtime));
    let spinner = output::spinner("Waiting for master to become healthy");
    let result = coordinator.run(plan, &cancel).await;

    let code = match result {
        Ok(report) => {
            output::spinner_success(&spinner, &format!("Master healthy after {} probes", report.probes));
            report_workers(&report);
            let code = follow_master(runtime.as_ref(), &report, &cancel).await;
            if code == 0 && report.failed_workers().next().is_some() {
                1
            } else {
                code
            }
        }
        Err(e) => {
            output::spinner_fail(&spinner, &format!("{} failed", e.stage()));
            output::error(&Error::from(e).to_string());
            1
        }
    };

    output::section("Teardown");
    match runtime.teardown(plan).await {
        Ok(()) => output::success(&format!("Removed {}", plan.name)),
        Err(e) => output::warning(&format!("teardown incomplete: {e}")),
    }
    signal.abort();

    output::json_event("result", json!({ "cluster": plan.name, "returncode": code }));
    Ok(code)
}

/// Exit status when a second interrupt cuts teardown short.
const FORCED_EXIT_CODE: i32 = 130;

/// The first interrupt cancels the run so teardown can proceed. A second one
/// yields [`FORCED_EXIT_CODE`]. `None` when interrupts cannot be received.
async fn watch_interrupts<F, Fut>(mut interrupted: F, cancel: CancellationToken) -> Option<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupted().await {
        warn!(error = %e, "Cannot listen for interrupts");
        return None;
    }
    warn!("Interrupted, stopping cluster");
    cancel.cancel();

    interrupted().await.ok()?;
    warn!("Interrupted again, exiting without teardown");
    Some(FORCED_EXIT_CODE)
}

async fn follow_master(
    runtime: &dyn ContainerRuntime,
    report: &RunReport,
    cancel: &CancellationToken,
) -> i32 {
    output::section("Master output");
    tokio::select! {
        result = runtime.attach(&report.master) => match result {
            Ok(code) => {
                info!(code, "Master finished");
                code
            }
            Err(e) => {
                output::error(&format!("could not follow master: {e}"));
                1
            }
        },
        _ = cancel.cancelled() => {
            output::warning("interrupted");
            1
        }
    }
}

fn report_workers(report: &RunReport) {
    let started = report.started_workers().count();
    output::success(&format!("Started {started} of {} workers", report.workers.len()));
    for worker in report.failed_workers() {
        if let Err(e) = &worker.result {
            output::warning(&format!("{} failed to start: {e}", worker.name));
        }
    }
}

/// Process environment with defaults for project and tag, then the
/// command-line overrides on top.
fn variables(args: &ClusterArgs) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = std::env::vars().collect();
    apply_defaults(&mut vars, std::env::current_dir().ok().as_deref());
    args.apply(&mut vars);
    vars
}

/// Project name defaults to the current directory's name, the mounted
/// context to the current directory and the user tag to the login name.
pub fn apply_defaults(vars: &mut BTreeMap<String, String>, cwd: Option<&Path>) {
    let unset = |vars: &BTreeMap<String, String>, name: &str| {
        vars.get(name).map_or(true, |value| value.trim().is_empty())
    };

    if unset(vars, config::PROJECT_NAME) {
        if let Some(name) = cwd.and_then(Path::file_name) {
            vars.insert(config::PROJECT_NAME.to_string(), name.to_string_lossy().into_owned());
        }
    }

    if unset(vars, config::MOUNT_CONTEXT) {
        if let Some(cwd) = cwd {
            vars.insert(config::MOUNT_CONTEXT.to_string(), cwd.display().to_string());
        }
    }

    if unset(vars, config::USER_TAG) {
        let user = ["USER", "USERNAME"]
            .iter()
            .find_map(|name| vars.get(*name).filter(|v| !v.trim().is_empty()).cloned());
        if let Some(user) = user {
            vars.insert(config::USER_TAG.to_string(), user);
        }
    }
}

fn run_file(vars: &BTreeMap<String, String>) -> PathBuf {
    vars.get(config::RUN_FILE)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(config::DEFAULT_RUN_FILE)
        .into()
}

/// Notices, questions and the user distribution of a feature file.
fn prepare_feature(
    feature: &Feature,
    path: &Path,
    vars: &mut BTreeMap<String, String>,
    assume_yes: bool,
) -> Result<()> {
    for notice in feature.notices() {
        output::warning(&notice);
        prompt::ask_yes_no("continue?", assume_yes)?;
    }

    for variable in feature.question_variables()? {
        let key = format!("{}{variable}", config::TESTDATA_VARIABLE_PREFIX);
        if !vars.contains_key(&key) {
            let value = prompt::ask_value(&variable)?;
            vars.insert(key, value);
        }
    }

    let testdata: BTreeMap<String, String> = vars
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(config::TESTDATA_VARIABLE_PREFIX)
                .map(|name| (name.to_string(), value.clone()))
        })
        .collect();

    let distribution = distribution::compute(feature, &testdata)?;

    if output::is_json() {
        output::json_event("distribution", serde_json::to_value(&distribution)?);
    } else {
        output::section(&format!(
            "feature file {} will execute in total {} iterations",
            path.display(),
            distribution.total_iterations()
        ));
        output::note("each scenario will execute accordingly:");
        output::lines(&distribution.table());
    }

    distribution.check_iterations()?;
    prompt::ask_yes_no("continue?", assume_yes)
}

fn print_plan(plan: &ClusterPlan, system: ContainerSystem) {
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Cluster", output::highlight(&plan.name));
    output::field("Engine", system);
    output::field("Image", &plan.master.image);
    output::field("Workers", plan.workers);
    output::field("Network", format!("{} (mtu {})", plan.network.name, plan.network.mtu));
    if output::verbosity() > 0 {
        output::field(
            "Health",
            format!(
                "port {} every {:?}, timeout {:?}, {} retries",
                plan.health.port, plan.health.interval, plan.health.timeout, plan.health.retries
            ),
        );
    }
}

/// Container engine invocations the plan translates to.
pub fn planned_commands(plan: &ClusterPlan, system: ContainerSystem) -> Vec<String> {
    std::iter::once(container::network_create_args(&plan.network))
        .chain(std::iter::once(container::run_args(&plan.master)))
        .chain(plan.worker_specs().iter().map(container::run_args))
        .map(|args| system.command_line(&args))
        .collect()
}

fn print_commands(plan: &ClusterPlan, system: ContainerSystem) {
    let commands = planned_commands(plan, system);
    if output::is_json() {
        output::json_event("dry_run", json!({ "commands": commands }));
        return;
    }

    output::section("Dry run");
    for command in &commands {
        println!("{command}");
    }
}
