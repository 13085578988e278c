//! Scripted [`ContainerRuntime`] for testing the coordinator and CLI flows.
//!
//! Each call to `probe()` pops the next scripted result; once the script is
//! exhausted the master reports "not listening". Every operation is appended
//! to an event log so tests can assert on ordering.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ClusterPlan, LaunchSpec, NetworkSpec, ProbeOutcome, Role};
use crate::error::LaunchError;
use crate::port::{ContainerHandle, ContainerRuntime};

/// Scripted result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeScript {
    Listening,
    NotListening,
    /// The probe command itself fails.
    Error,
    /// The probe never returns; only the coordinator's timeout ends it.
    Hang,
}

/// Recorded runtime operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    NetworkPrepared(String),
    Launched { role: Role, name: String },
    LaunchFailed { role: Role, name: String },
    Probed { attempt: u32, listening: bool },
    Attached(String),
    Removed(String),
    NetworkRemoved(String),
}

pub struct ScriptedRuntime {
    probes: Mutex<VecDeque<ProbeScript>>,
    failing: HashSet<String>,
    attach_code: i32,
    events: Mutex<Vec<RuntimeEvent>>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self {
            probes: Mutex::new(VecDeque::new()),
            failing: HashSet::new(),
            attach_code: 0,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_probes(self, probes: Vec<ProbeScript>) -> Self {
        *self.probes.lock().unwrap() = probes.into();
        self
    }

    /// Make the launch of the container named `name` fail.
    pub fn failing_launch(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Return code reported by `attach()`.
    pub fn with_attach_code(mut self, code: i32) -> Self {
        self.attach_code = code;
        self
    }

    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RuntimeEvent::Probed { .. }))
            .count()
    }

    /// Successful and failed worker launch attempts.
    pub fn worker_launches(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    RuntimeEvent::Launched { role: Role::Worker, .. }
                        | RuntimeEvent::LaunchFailed { role: Role::Worker, .. }
                )
            })
            .count()
    }

    pub fn launched(&self, role: Role) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RuntimeEvent::Launched { role: r, name } if r == role => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn was_removed(&self, name: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, RuntimeEvent::Removed(n) if n == name))
    }

    fn record(&self, event: RuntimeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn prepare_network(&self, network: &NetworkSpec) -> Result<(), LaunchError> {
        self.record(RuntimeEvent::NetworkPrepared(network.name.clone()));
        Ok(())
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle, LaunchError> {
        if self.failing.contains(&spec.name) {
            self.record(RuntimeEvent::LaunchFailed {
                role: spec.role,
                name: spec.name.clone(),
            });
            return Err(LaunchError::Rejected(format!("{} refused to start", spec.name)));
        }

        self.record(RuntimeEvent::Launched {
            role: spec.role,
            name: spec.name.clone(),
        });
        Ok(ContainerHandle {
            role: spec.role,
            name: spec.name.clone(),
            id: format!("id-{}", spec.name),
        })
    }

    async fn probe(&self, _master: &ContainerHandle, port: u16) -> Result<ProbeOutcome, LaunchError> {
        let script = self
            .probes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProbeScript::NotListening);
        let attempt = self.probe_count() as u32 + 1;
        self.record(RuntimeEvent::Probed {
            attempt,
            listening: script == ProbeScript::Listening,
        });

        match script {
            ProbeScript::Listening => Ok(ProbeOutcome::Listening),
            ProbeScript::NotListening => Ok(ProbeOutcome::NotListening(format!(
                "nothing listening on {port}"
            ))),
            ProbeScript::Error => Err(LaunchError::Rejected("exec failed".into())),
            ProbeScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProbeOutcome::Listening)
            }
        }
    }

    async fn attach(&self, master: &ContainerHandle) -> Result<i32, LaunchError> {
        self.record(RuntimeEvent::Attached(master.name.clone()));
        Ok(self.attach_code)
    }

    async fn teardown(&self, plan: &ClusterPlan) -> Result<(), LaunchError> {
        for name in plan.container_names() {
            self.record(RuntimeEvent::Removed(name));
        }
        self.record(RuntimeEvent::NetworkRemoved(plan.network.name.clone()));
        Ok(())
    }
}
