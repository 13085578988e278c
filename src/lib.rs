//! grizzly-cli - distributed grizzly load tests on a container engine.
//!
//! Runs a test as one master and N workers on an isolated container
//! network. Workers are only started once the master accepts connections on
//! its control port, so no worker ever races the master's startup.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - [`domain`] - Launch specifications, master health state, feature files
//! - [`port`] - The [`port::ContainerRuntime`] trait the coordinator drives
//! - [`application`] - Health-gated role coordinator, user distribution
//! - [`adapter`] - docker/podman CLI runtime, compose rendering, the CLI
//! - [`infrastructure`] - Child process execution
//! - [`config`] - `GRIZZLY_*` run configuration and logging setup
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use grizzly_cli::adapter::outbound::container::{CliRuntime, ContainerSystem};
//! use grizzly_cli::application::coordinator::Coordinator;
//! use grizzly_cli::config::RunConfig;
//! use grizzly_cli::domain::ClusterPlan;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> grizzly_cli::error::Result<()> {
//! let config = RunConfig::from_env()?;
//! let plan = ClusterPlan::from_config(&config);
//! let coordinator = Coordinator::new(Arc::new(CliRuntime::new(ContainerSystem::Docker)));
//! let report = coordinator.run(&plan, &CancellationToken::new()).await?;
//! println!("{} workers started", report.started_workers().count());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
