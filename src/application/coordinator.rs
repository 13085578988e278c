//! Role coordinator: health-gated startup of the master and its workers.
//!
//! # Flow
//!
//! ```text
//! prepare network -> launch master -> health monitor --(watch)--> gate
//!                                         |                        |
//!                                   probe every interval      Healthy: fan out workers
//!                                   (bounded by timeout)      Unhealthy / cancelled: fail
//! ```
//!
//! The monitor runs as its own task and publishes the master's state
//! transition on a `watch` channel. The worker fan-out only proceeds once it
//! has observed `Healthy` on that channel.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::HealthCheckConfig;
use crate::domain::{ClusterPlan, MasterState, ProbeOutcome};
use crate::error::{LaunchError, RunError};
use crate::port::{ContainerHandle, ContainerRuntime};

/// Outcome of launching one worker instance.
#[derive(Debug)]
pub struct WorkerLaunch {
    /// 1-based worker index.
    pub index: u32,
    pub name: String,
    pub result: Result<ContainerHandle, LaunchError>,
}

impl WorkerLaunch {
    pub fn is_started(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of a run that got past the master health gate.
#[derive(Debug)]
pub struct RunReport {
    pub master: ContainerHandle,
    /// Number of probes it took for the master to become healthy.
    pub probes: u32,
    pub workers: Vec<WorkerLaunch>,
}

impl RunReport {
    pub fn started_workers(&self) -> impl Iterator<Item = &WorkerLaunch> {
        self.workers.iter().filter(|w| w.is_started())
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerLaunch> {
        self.workers.iter().filter(|w| !w.is_started())
    }
}

/// Publishing side of the master state.
struct HealthGate {
    tx: watch::Sender<MasterState>,
}

impl HealthGate {
    fn new() -> (Self, HealthWatcher) {
        let (tx, rx) = watch::channel(MasterState::Pending);
        (Self { tx }, HealthWatcher { rx })
    }

    fn publish(&self, next: MasterState) {
        self.tx.send_if_modified(|state| state.transition(next));
    }
}

/// Consuming side of the master state.
struct HealthWatcher {
    rx: watch::Receiver<MasterState>,
}

impl HealthWatcher {
    /// Wait until the master leaves `Pending`. Returns `Pending` if the
    /// monitor stopped without publishing a verdict (cancellation).
    async fn settled(&mut self) -> MasterState {
        match self.rx.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            Err(_) => MasterState::Pending,
        }
    }
}

/// Sequences one master and a pool of workers behind the master health gate.
pub struct Coordinator {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Coordinator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Start the cluster described by `plan`.
    ///
    /// Returns once every worker launch has been attempted. Cancelling
    /// `cancel` before the master is healthy guarantees no worker is started.
    /// Containers that were started are left running; teardown is the
    /// caller's responsibility.
    #[instrument(level = "info", skip_all, fields(cluster = %plan.name, workers = plan.workers))]
    pub async fn run(
        &self,
        plan: &ClusterPlan,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        self.runtime
            .prepare_network(&plan.network)
            .await
            .map_err(RunError::Network)?;
        debug!(network = %plan.network.name, mtu = plan.network.mtu, "Network ready");

        let master = self
            .runtime
            .launch(&plan.master)
            .await
            .map_err(RunError::MasterLaunch)?;
        info!(master = %master.name, runtime = self.runtime.name(), "Master started");

        let (gate, mut watcher) = HealthGate::new();
        let monitor = tokio::spawn(monitor_master(
            Arc::clone(&self.runtime),
            master.clone(),
            plan.health,
            gate,
            cancel.child_token(),
        ));

        let state = watcher.settled().await;
        if let Err(e) = monitor.await {
            warn!(error = %e, "Health monitor task failed");
        }

        let probes = match state {
            MasterState::Healthy { attempts } => attempts,
            MasterState::Unhealthy {
                attempts,
                last_failure,
            } => {
                return Err(RunError::MasterUnhealthy {
                    attempts,
                    last_failure,
                })
            }
            MasterState::Pending => return Err(RunError::Cancelled),
        };

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        info!(probes, "Master healthy, starting workers");
        let workers = self.launch_workers(plan).await;

        Ok(RunReport {
            master,
            probes,
            workers,
        })
    }

    async fn launch_workers(&self, plan: &ClusterPlan) -> Vec<WorkerLaunch> {
        let launches = (1..=plan.workers).map(|index| {
            let runtime = Arc::clone(&self.runtime);
            let spec = plan.worker(index);
            async move {
                let result = runtime.launch(&spec).await;
                match &result {
                    Ok(handle) => debug!(worker = %handle.name, "Worker started"),
                    Err(e) => warn!(worker = %spec.name, error = %e, "Worker failed to start"),
                }
                WorkerLaunch {
                    index,
                    name: spec.name,
                    result,
                }
            }
        });

        join_all(launches).await
    }
}

/// Probe the master until it is listening, retries run out, or the run is
/// cancelled. The verdict is published through `gate`; on cancellation the
/// gate is dropped without a verdict.
async fn monitor_master(
    runtime: Arc<dyn ContainerRuntime>,
    master: ContainerHandle,
    health: HealthCheckConfig,
    gate: HealthGate,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Health monitor cancelled");
                return;
            }
            _ = tokio::time::sleep(health.interval) => {}
        }

        let attempt = failures + 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Health monitor cancelled during probe");
                return;
            }
            result = tokio::time::timeout(health.timeout, runtime.probe(&master, health.port)) => result,
        };

        let failure = match outcome {
            Ok(Ok(ProbeOutcome::Listening)) => {
                gate.publish(MasterState::Healthy { attempts: attempt });
                return;
            }
            Ok(Ok(ProbeOutcome::NotListening(reason))) => reason,
            Ok(Err(e)) => e.to_string(),
            Err(_) => LaunchError::ProbeTimeout(health.timeout).to_string(),
        };

        failures = attempt;
        warn!(
            attempt,
            retries = health.retries,
            port = health.port,
            reason = %failure,
            "Master not listening yet"
        );

        if failures >= health.retries {
            gate.publish(MasterState::Unhealthy {
                attempts: failures,
                last_failure: Some(failure),
            });
            return;
        }
    }
}
