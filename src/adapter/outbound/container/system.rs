//! Container engine selection and host network defaults.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use tracing::warn;

use crate::config::DEFAULT_MTU;
use crate::infrastructure::process;

const MTU_OPTION: &str = "com.docker.network.driver.mtu";

/// Container engine whose CLI drives the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContainerSystem {
    Docker,
    Podman,
}

impl ContainerSystem {
    pub const fn program(self) -> &'static str {
        match self {
            ContainerSystem::Docker => "docker",
            ContainerSystem::Podman => "podman",
        }
    }

    /// Shell-style rendering of an invocation of this engine.
    pub fn command_line(self, args: &[String]) -> String {
        process::command_line(self.program(), args)
    }

    /// First engine found in `PATH`, preferring docker.
    pub fn detect() -> Option<Self> {
        let path = env::var_os("PATH")?;
        let dirs: Vec<PathBuf> = env::split_paths(&path).collect();
        Self::detect_in(&dirs)
    }

    /// First engine found in `dirs`, preferring docker.
    pub fn detect_in(dirs: &[PathBuf]) -> Option<Self> {
        let system = [ContainerSystem::Docker, ContainerSystem::Podman]
            .into_iter()
            .find(|system| dirs.iter().any(|dir| dir.join(system.program()).is_file()))?;
        if system == ContainerSystem::Podman {
            warn!("podman might not work due to buildah missing support for `RUN --mount=type=ssh`");
        }
        Some(system)
    }

    /// MTU of the engine's default bridge network.
    ///
    /// `None` when the engine could not be asked; the default MTU when the
    /// bridge does not set one explicitly.
    pub async fn default_mtu(self) -> Option<u32> {
        let args = ["network", "inspect", "bridge", "--format", "{{ json .Options }}"]
            .map(String::from)
            .to_vec();
        match process::capture(self.program(), &args).await {
            Ok(output) => parse_bridge_mtu(&output),
            Err(e) => {
                warn!(error = %e, "Could not inspect bridge network");
                None
            }
        }
    }
}

impl fmt::Display for ContainerSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Read the MTU from the JSON options of `network inspect`.
pub fn parse_bridge_mtu(output: &str) -> Option<u32> {
    let line = output.lines().next()?;
    let options: Option<HashMap<String, String>> = serde_json::from_str(line).ok()?;
    match options.as_ref().and_then(|o| o.get(MTU_OPTION)) {
        Some(mtu) => mtu.trim().parse().ok(),
        None => Some(DEFAULT_MTU),
    }
}
