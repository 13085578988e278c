//! Compose document rendering.
//!
//! Expresses a [`ClusterPlan`] as a compose file, for operators who prefer
//! to start the cluster with `docker compose up`. The master gate becomes a
//! `service_healthy` dependency backed by the same listen check the
//! coordinator runs.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{ClusterPlan, LaunchSpec, Role};

/// Top-level compose file with one network and the `master` and `worker`
/// services.
#[derive(Debug, Serialize, PartialEq)]
pub struct ComposeDocument {
    /// Compose project name, the cluster name.
    pub name: String,
    pub networks: BTreeMap<String, Network>,
    pub services: BTreeMap<String, Service>,
}

/// Bridge network carrying the configured MTU.
#[derive(Debug, Serialize, PartialEq)]
pub struct Network {
    pub name: String,
    pub driver: String,
    pub driver_opts: BTreeMap<String, String>,
}

/// One service entry, rendered from a [`LaunchSpec`].
#[derive(Debug, Serialize, PartialEq)]
pub struct Service {
    pub image: String,
    /// Only pinned for the master; workers are scaled replicas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Arguments passed to the image entrypoint.
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_file: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    pub tty: bool,
    /// Keyed by limit name, e.g. `nofile`.
    pub ulimits: BTreeMap<String, Ulimit>,
    pub networks: BTreeMap<String, ServiceNetwork>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheck>,
    /// Workers wait for the master to report healthy.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, Dependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<Deploy>,
}

/// Soft and hard resource limit.
#[derive(Debug, Serialize, PartialEq)]
pub struct Ulimit {
    pub soft: u64,
    pub hard: u64,
}

/// Attachment of a service to the cluster network.
#[derive(Debug, Serialize, PartialEq)]
pub struct ServiceNetwork {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// Master health check: the control port is listening.
#[derive(Debug, Serialize, PartialEq)]
pub struct HealthCheck {
    /// Exec form, starting with `CMD`.
    pub test: Vec<String>,
    /// Duration strings such as `5s`.
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
}

/// `depends_on` entry; the condition is `service_healthy`.
#[derive(Debug, Serialize, PartialEq)]
pub struct Dependency {
    pub condition: String,
}

/// Worker replica count.
#[derive(Debug, Serialize, PartialEq)]
pub struct Deploy {
    pub replicas: u32,
}

impl ComposeDocument {
    /// Render `plan`; the worker service is scaled to the plan's count.
    pub fn from_plan(plan: &ClusterPlan) -> Self {
        let network_key = "grizzly".to_string();

        let mut master = service(&plan.master, &network_key);
        master.container_name = Some(plan.master.name.clone());
        master.healthcheck = Some(HealthCheck {
            test: vec![
                "CMD".into(),
                "sh".into(),
                "-c".into(),
                format!("netstat -ltn | grep -c :{}", plan.health.port),
            ],
            interval: seconds(plan.health.interval),
            timeout: seconds(plan.health.timeout),
            retries: plan.health.retries,
        });

        let mut worker = service(plan.worker_template(), &network_key);
        worker.depends_on.insert(
            Role::Master.to_string(),
            Dependency {
                condition: "service_healthy".into(),
            },
        );
        worker.deploy = Some(Deploy {
            replicas: plan.workers,
        });

        Self {
            name: plan.name.clone(),
            networks: BTreeMap::from([(
                network_key,
                Network {
                    name: plan.network.name.clone(),
                    driver: "bridge".into(),
                    driver_opts: BTreeMap::from([(
                        "com.docker.network.driver.mtu".to_string(),
                        plan.network.mtu.to_string(),
                    )]),
                },
            )]),
            services: BTreeMap::from([
                (Role::Master.to_string(), master),
                (Role::Worker.to_string(), worker),
            ]),
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn service(spec: &LaunchSpec, network_key: &str) -> Service {
    Service {
        image: spec.image.to_string(),
        container_name: None,
        hostname: spec.hostname.clone(),
        command: spec.args.clone(),
        environment: spec.env.iter().cloned().collect(),
        env_file: spec
            .env_file
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        volumes: spec
            .mount
            .iter()
            .map(|mount| format!("{}:{}", mount.context.display(), mount.path))
            .collect(),
        tty: spec.tty,
        ulimits: BTreeMap::from([(
            "nofile".to_string(),
            Ulimit {
                soft: spec.ulimit_nofile,
                hard: spec.ulimit_nofile,
            },
        )]),
        networks: BTreeMap::from([(
            network_key.to_string(),
            ServiceNetwork {
                aliases: spec.aliases.clone(),
            },
        )]),
        healthcheck: None,
        depends_on: BTreeMap::new(),
        deploy: None,
    }
}

fn seconds(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
