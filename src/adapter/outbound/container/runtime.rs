//! [`ContainerRuntime`] backed by the docker/podman command-line client.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::ContainerSystem;
use crate::domain::{ClusterPlan, LaunchSpec, NetworkSpec, ProbeOutcome};
use crate::error::LaunchError;
use crate::infrastructure::process::{self, RunOptions};
use crate::port::{ContainerHandle, ContainerRuntime};

/// Drives the engine CLI. Every operation is one CLI invocation, so the
/// runtime is stateless and safe to share between concurrent launches.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    system: ContainerSystem,
    verbose: bool,
}

impl CliRuntime {
    pub fn new(system: ContainerSystem) -> Self {
        Self {
            system,
            verbose: false,
        }
    }

    /// Log every command line before running it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    async fn capture(&self, args: Vec<String>) -> Result<String, LaunchError> {
        if self.verbose {
            info!(command = %process::command_line(self.system.program(), &args), "run_command");
        }
        process::capture(self.system.program(), &args).await
    }
}

/// Arguments of `network create` for `network`.
pub fn network_create_args(network: &NetworkSpec) -> Vec<String> {
    vec![
        "network".into(),
        "create".into(),
        "--driver".into(),
        "bridge".into(),
        "--opt".into(),
        format!("com.docker.network.driver.mtu={}", network.mtu),
        network.name.clone(),
    ]
}

/// Arguments of `run` starting `spec` in the background.
pub fn run_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--detach".into(),
        "--name".into(),
        spec.name.clone(),
        "--label".into(),
        format!("grizzly.role={}", spec.role),
        "--network".into(),
        spec.network.clone(),
    ];

    if let Some(hostname) = &spec.hostname {
        args.extend(["--hostname".into(), hostname.clone()]);
    }
    for alias in &spec.aliases {
        args.extend(["--network-alias".into(), alias.clone()]);
    }

    args.extend([
        "--ulimit".into(),
        format!("nofile={0}:{0}", spec.ulimit_nofile),
    ]);

    if let Some(mount) = &spec.mount {
        args.extend([
            "--volume".into(),
            format!("{}:{}", mount.context.display(), mount.path),
        ]);
    }
    if let Some(env_file) = &spec.env_file {
        args.extend(["--env-file".into(), env_file.display().to_string()]);
    }
    for (key, value) in &spec.env {
        args.extend(["--env".into(), format!("{key}={value}")]);
    }
    if spec.tty {
        args.push("--tty".into());
    }

    args.push(spec.image.to_string());
    args.extend(spec.args.iter().cloned());
    args
}

/// Arguments of the in-container check for a listener on `port`.
pub fn probe_args(container: &str, port: u16) -> Vec<String> {
    vec![
        "exec".into(),
        container.to_string(),
        "sh".into(),
        "-c".into(),
        format!("netstat -ltn | grep -c :{port}"),
    ]
}

/// Interpret the output of [`probe_args`]: the number of matching sockets.
pub fn parse_probe(output: &str, port: u16) -> ProbeOutcome {
    match output.trim().parse::<u32>() {
        Ok(count) if count > 0 => ProbeOutcome::Listening,
        _ => ProbeOutcome::NotListening(format!("nothing listening on :{port}")),
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    fn name(&self) -> &'static str {
        self.system.program()
    }

    async fn prepare_network(&self, network: &NetworkSpec) -> Result<(), LaunchError> {
        let inspect = vec!["network".into(), "inspect".into(), network.name.clone()];
        if self.capture(inspect).await.is_ok() {
            debug!(network = %network.name, "Network already exists");
            return Ok(());
        }

        self.capture(network_create_args(network)).await?;
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle, LaunchError> {
        let id = self.capture(run_args(spec)).await?.trim().to_string();
        if id.is_empty() {
            return Err(LaunchError::Rejected(format!(
                "{} returned no container id for {}",
                self.system, spec.name
            )));
        }

        Ok(ContainerHandle {
            role: spec.role,
            name: spec.name.clone(),
            id,
        })
    }

    async fn probe(&self, master: &ContainerHandle, port: u16) -> Result<ProbeOutcome, LaunchError> {
        match self.capture(probe_args(&master.name, port)).await {
            Ok(output) => Ok(parse_probe(&output, port)),
            // grep -c exits non-zero when it counted nothing
            Err(LaunchError::CommandFailed { stderr, code, .. }) => Ok(ProbeOutcome::NotListening(
                if stderr.is_empty() {
                    format!("nothing listening on :{port}")
                } else {
                    format!("probe exited with {code}: {stderr}")
                },
            )),
            Err(e) => Err(e),
        }
    }

    async fn attach(&self, master: &ContainerHandle) -> Result<i32, LaunchError> {
        let options = RunOptions {
            verbose: self.verbose,
            ..RunOptions::default()
        };
        let logs = vec!["logs".into(), "--follow".into(), master.name.clone()];
        let outcome = process::run_command(self.system.program(), &logs, &options).await?;

        if let Some(code) = outcome.token {
            return Ok(code);
        }

        let wait = vec!["wait".into(), master.name.clone()];
        let output = self.capture(wait).await?;
        output.trim().parse().map_err(|_| {
            LaunchError::Rejected(format!("unexpected output from wait: {}", output.trim()))
        })
    }

    async fn teardown(&self, plan: &ClusterPlan) -> Result<(), LaunchError> {
        for name in plan.container_names() {
            let remove = vec!["rm".into(), "--force".into(), name.clone()];
            if let Err(e) = self.capture(remove).await {
                warn!(container = %name, error = %e, "Could not remove container");
            }
        }

        let remove = vec!["network".into(), "rm".into(), plan.network.name.clone()];
        self.capture(remove).await?;
        debug!(network = %plan.network.name, "Network removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::MountConfig;
    use crate::testkit::config::plan;

    #[test]
    fn master_run_args_carry_identity_and_command() {
        let plan = plan(2, 3);
        let args = run_args(&plan.master);

        let expected_prefix: Vec<String> = [
            "run",
            "--detach",
            "--name",
            "grizzly-test-master",
            "--label",
            "grizzly.role=master",
            "--network",
            "grizzly-test-network",
            "--hostname",
            "master",
            "--network-alias",
            "master",
            "--ulimit",
            "nofile=10001:10001",
            "grizzly:test",
        ]
        .map(String::from)
        .to_vec();
        assert_eq!(args[..expected_prefix.len()], expected_prefix[..]);
        assert_eq!(
            args[expected_prefix.len()..],
            ["-D", "master=true", "-D", "expected-workers=2", "features"].map(String::from)
        );
    }

    #[test]
    fn worker_run_args_have_no_hostname() {
        let plan = plan(1, 3);
        let args = run_args(&plan.worker(1));

        assert!(!args.contains(&"--hostname".to_string()));
        assert!(args.contains(&"grizzly-test-worker-1".to_string()));
        assert!(args.contains(&"master-host=master".to_string()));
    }

    #[test]
    fn optional_flags_are_rendered() {
        let mut spec = plan(1, 3).worker(1);
        spec.mount = Some(MountConfig {
            context: PathBuf::from("/home/alice/project"),
            path: "/srv/grizzly".into(),
        });
        spec.env_file = Some(PathBuf::from("env.list"));
        spec.env = vec![("TESTDATA_VARIABLE_host".into(), "example.com".into())];
        spec.tty = true;

        let args = run_args(&spec).join(" ");

        assert!(args.contains("--volume /home/alice/project:/srv/grizzly"));
        assert!(args.contains("--env-file env.list"));
        assert!(args.contains("--env TESTDATA_VARIABLE_host=example.com"));
        assert!(args.contains("--tty grizzly:test"));
    }

    #[test]
    fn network_is_created_with_mtu() {
        let plan = plan(1, 3);
        assert_eq!(
            network_create_args(&plan.network).join(" "),
            "network create --driver bridge --opt com.docker.network.driver.mtu=1500 grizzly-test-network"
        );
    }

    #[test]
    fn probe_checks_control_port() {
        assert_eq!(
            probe_args("grizzly-test-master", 5557).join(" "),
            "exec grizzly-test-master sh -c netstat -ltn | grep -c :5557"
        );
        assert_eq!(parse_probe("1\n", 5557), ProbeOutcome::Listening);
        assert!(matches!(parse_probe("0\n", 5557), ProbeOutcome::NotListening(_)));
        assert!(matches!(parse_probe("", 5557), ProbeOutcome::NotListening(_)));
    }
}
