//! Launch specifications for the master and worker roles.
//!
//! A [`ClusterPlan`] is derived once from a [`RunConfig`] and holds everything
//! a container runtime needs: the shared network, the master specification
//! and the worker template from which each worker instance is stamped out.

use std::fmt;
use std::path::PathBuf;

use crate::config::{HealthCheckConfig, MountConfig, RunConfig, COLUMNS, LINES, TESTDATA_VARIABLE_PREFIX};

/// Hostname every worker uses to reach the master.
pub const MASTER_HOSTNAME: &str = "master";

/// Container role within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image reference shared by both roles: `{registry}{project}:{tag}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            registry: config.image_registry.clone(),
            name: config.project_name.clone(),
            tag: config.user_tag.clone(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", self.registry, self.name, self.tag)
    }
}

/// Isolated network shared by all roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub mtu: u32,
}

/// Everything needed to start one container instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub role: Role,
    /// Container name, unique per instance.
    pub name: String,
    pub hostname: Option<String>,
    /// Extra DNS names on the cluster network.
    pub aliases: Vec<String>,
    pub image: ImageRef,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub env_file: Option<PathBuf>,
    pub ulimit_nofile: u64,
    pub mount: Option<MountConfig>,
    pub tty: bool,
    pub network: String,
}

/// The complete, immutable plan for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPlan {
    pub name: String,
    pub network: NetworkSpec,
    pub master: LaunchSpec,
    worker_template: LaunchSpec,
    pub workers: u32,
    pub health: HealthCheckConfig,
}

impl ClusterPlan {
    pub fn from_config(config: &RunConfig) -> Self {
        let name = config.cluster_name();
        let network = NetworkSpec {
            name: format!("{name}-network"),
            mtu: config.mtu,
        };

        let base = LaunchSpec {
            role: Role::Master,
            name: String::new(),
            hostname: None,
            aliases: Vec::new(),
            image: ImageRef::from_config(config),
            args: Vec::new(),
            env: container_env(config),
            env_file: config.environment_file.clone(),
            ulimit_nofile: config.limit_nofile,
            mount: config.mount.clone(),
            tty: config.container_tty,
            network: network.name.clone(),
        };

        let master = LaunchSpec {
            role: Role::Master,
            name: format!("{name}-master"),
            hostname: Some(MASTER_HOSTNAME.to_string()),
            aliases: vec![MASTER_HOSTNAME.to_string()],
            args: master_args(config),
            ..base.clone()
        };

        let worker_template = LaunchSpec {
            role: Role::Worker,
            name: format!("{name}-worker"),
            args: worker_args(config),
            ..base
        };

        Self {
            name,
            network,
            master,
            worker_template,
            workers: config.expected_workers,
            health: config.health,
        }
    }

    /// The shared worker configuration, before per-instance identity is applied.
    pub fn worker_template(&self) -> &LaunchSpec {
        &self.worker_template
    }

    /// Specification of worker `index` (1-based).
    pub fn worker(&self, index: u32) -> LaunchSpec {
        let mut spec = self.worker_template.clone();
        spec.name = format!("{}-{index}", self.worker_template.name);
        spec
    }

    /// All worker specifications, in index order.
    pub fn worker_specs(&self) -> Vec<LaunchSpec> {
        (1..=self.workers).map(|index| self.worker(index)).collect()
    }

    /// Container names of every instance in the plan, master first.
    pub fn container_names(&self) -> Vec<String> {
        std::iter::once(self.master.name.clone())
            .chain(self.worker_specs().into_iter().map(|spec| spec.name))
            .collect()
    }
}

fn master_args(config: &RunConfig) -> Vec<String> {
    let mut args = vec![
        "-D".to_string(),
        "master=true".to_string(),
        "-D".to_string(),
        format!("expected-workers={}", config.expected_workers),
    ];
    args.extend(config.master_run_args.iter().cloned());
    args.extend(config.common_run_args.iter().cloned());
    args.push(config.run_file.clone());
    args
}

fn worker_args(config: &RunConfig) -> Vec<String> {
    let mut args = vec![
        "-D".to_string(),
        "worker=true".to_string(),
        "-D".to_string(),
        format!("master-host={MASTER_HOSTNAME}"),
    ];
    args.extend(config.worker_run_args.iter().cloned());
    args.extend(config.common_run_args.iter().cloned());
    args.push(config.run_file.clone());
    args
}

fn container_env(config: &RunConfig) -> Vec<(String, String)> {
    let mut env = Vec::new();
    if let Some(columns) = config.terminal.columns {
        env.push((COLUMNS.to_string(), columns.to_string()));
    }
    if let Some(lines) = config.terminal.lines {
        env.push((LINES.to_string(), lines.to_string()));
    }
    env.extend(
        config
            .testdata
            .iter()
            .map(|(name, value)| (format!("{TESTDATA_VARIABLE_PREFIX}{name}"), value.clone())),
    );
    env
}
