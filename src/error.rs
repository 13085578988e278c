use std::fmt;

use thiserror::Error;

pub use crate::domain::feature::FeatureError;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable: {variable}")]
    MissingVariable { variable: &'static str },

    #[error("invalid value for {variable}: {reason}")]
    InvalidValue {
        variable: &'static str,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors raised by a container runtime while executing a single operation.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("probe timed out after {0:?}")]
    ProbeTimeout(std::time::Duration),

    #[error("{0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage of a cluster run, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Network,
    MasterLaunch,
    MasterHealth,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Network => "network",
            Stage::MasterLaunch => "master launch",
            Stage::MasterHealth => "master health check",
        };
        f.write_str(name)
    }
}

/// Fatal errors of the role coordinator. Worker failures are not fatal and
/// are reported per worker in the run report instead.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("network setup failed: {0}")]
    Network(#[source] LaunchError),

    #[error("master failed to start: {0}")]
    MasterLaunch(#[source] LaunchError),

    #[error("master did not become healthy after {attempts} probes{}", last_failure_suffix(.last_failure))]
    MasterUnhealthy {
        attempts: u32,
        last_failure: Option<String>,
    },

    #[error("run cancelled before master became healthy")]
    Cancelled,
}

fn last_failure_suffix(last_failure: &Option<String>) -> String {
    last_failure
        .as_ref()
        .map(|reason| format!(" (last: {reason})"))
        .unwrap_or_default()
}

impl RunError {
    /// The stage the run was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            RunError::Network(_) => Stage::Network,
            RunError::MasterLaunch(_) => Stage::MasterLaunch,
            RunError::MasterUnhealthy { .. } | RunError::Cancelled => Stage::MasterHealth,
        }
    }
}

/// Errors while computing the distribution of users over scenarios.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("{scenario} does not have any steps")]
    NoSteps { scenario: String },

    #[error("grizzly needs at least {required} users to run this feature")]
    NotEnoughUsers { required: usize },

    #[error("{scenario} does not have a user type")]
    MissingUserType { scenario: String },

    #[error("total weight of all scenarios must be greater than zero")]
    ZeroWeight,

    #[error("{scenario} will have {users} users to run {iterations} iterations, increase iterations or lower user count")]
    TooFewIterations {
        scenario: String,
        users: u64,
        iterations: u64,
    },

    #[error("could not interpret \"{value}\" in step \"{step}\" as a number")]
    NotANumber { step: String, value: String },

    #[error("value {value} in step \"{step}\" exceeds the maximum of {max}")]
    TooLarge { step: String, value: String, max: u64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("{} failed: {source}", .source.stage())]
    Run {
        #[from]
        source: RunError,
    },

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("aborted by user")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        // dialoguer::Error wraps an IO error
        Error::Io(std::io::Error::other(err.to_string()))
    }
}
