//! Container runtime port.
//!
//! Defines the operations the role coordinator needs from a container
//! engine. The production implementation drives the `docker`/`podman` CLI;
//! tests use a scripted double.

use async_trait::async_trait;

use crate::domain::{ClusterPlan, LaunchSpec, NetworkSpec, ProbeOutcome, Role};
use crate::error::LaunchError;

/// A started container instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub role: Role,
    /// Container name as given in the launch specification.
    pub name: String,
    /// Engine-assigned identifier.
    pub id: String,
}

/// Operations on a container engine.
///
/// Implementations must be safe to call concurrently: workers are launched
/// in parallel against the same runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short engine name used in logs.
    fn name(&self) -> &'static str;

    /// Create the shared cluster network if it does not exist yet.
    async fn prepare_network(&self, network: &NetworkSpec) -> Result<(), LaunchError>;

    /// Start one container in the background.
    async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle, LaunchError>;

    /// Run a single TCP-listen check against `port` inside `master`.
    ///
    /// The coordinator bounds each call with the configured probe timeout.
    async fn probe(&self, master: &ContainerHandle, port: u16) -> Result<ProbeOutcome, LaunchError>;

    /// Stream the master's output until it exits and return its return code.
    async fn attach(&self, master: &ContainerHandle) -> Result<i32, LaunchError>;

    /// Remove every container of the plan and the cluster network.
    async fn teardown(&self, plan: &ClusterPlan) -> Result<(), LaunchError>;
}
