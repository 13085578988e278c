//! Container engine adapter.

mod runtime;
mod system;

pub use runtime::{network_create_args, parse_probe, probe_args, run_args, CliRuntime};
pub use system::{parse_bridge_mtu, ContainerSystem};
