//! Run configuration assembled from `GRIZZLY_*` environment variables.
//!
//! The whole run is driven by one immutable [`RunConfig`] snapshot. It is
//! built once, before orchestration starts, from a map of variables (usually
//! the process environment with command-line overrides applied) and then
//! passed explicitly to everything that needs it.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use grizzly_cli::config::RunConfig;
//!
//! let vars = BTreeMap::from([
//!     ("GRIZZLY_PROJECT_NAME".to_string(), "loadtest".to_string()),
//!     ("GRIZZLY_USER_TAG".to_string(), "alice".to_string()),
//! ]);
//! let config = RunConfig::from_vars(&vars).unwrap();
//! assert_eq!(config.run_file, "features");
//! assert_eq!(config.expected_workers, 1);
//! ```

pub mod logging;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const PROJECT_NAME: &str = "GRIZZLY_PROJECT_NAME";
pub const USER_TAG: &str = "GRIZZLY_USER_TAG";
pub const CLUSTER_ID: &str = "GRIZZLY_CLUSTER_ID";
pub const IMAGE_REGISTRY: &str = "GRIZZLY_IMAGE_REGISTRY";
pub const CONTAINER_TTY: &str = "GRIZZLY_CONTAINER_TTY";
pub const LIMIT_NOFILE: &str = "GRIZZLY_LIMIT_NOFILE";
pub const MOUNT_CONTEXT: &str = "GRIZZLY_MOUNT_CONTEXT";
pub const MOUNT_PATH: &str = "GRIZZLY_MOUNT_PATH";
pub const ENVIRONMENT_FILE: &str = "GRIZZLY_ENVIRONMENT_FILE";
pub const EXPECTED_WORKERS: &str = "GRIZZLY_EXPECTED_WORKERS";
pub const RUN_FILE: &str = "GRIZZLY_RUN_FILE";
pub const MASTER_RUN_ARGS: &str = "GRIZZLY_MASTER_RUN_ARGS";
pub const WORKER_RUN_ARGS: &str = "GRIZZLY_WORKER_RUN_ARGS";
pub const COMMON_RUN_ARGS: &str = "GRIZZLY_COMMON_RUN_ARGS";
pub const HEALTH_CHECK_INTERVAL: &str = "GRIZZLY_HEALTH_CHECK_INTERVAL";
pub const HEALTH_CHECK_TIMEOUT: &str = "GRIZZLY_HEALTH_CHECK_TIMEOUT";
pub const HEALTH_CHECK_RETRIES: &str = "GRIZZLY_HEALTH_CHECK_RETRIES";
pub const MTU: &str = "GRIZZLY_MTU";
pub const COLUMNS: &str = "COLUMNS";
pub const LINES: &str = "LINES";

/// Prefix of variables forwarded to the test run as testdata variables.
pub const TESTDATA_VARIABLE_PREFIX: &str = "TESTDATA_VARIABLE_";

pub const DEFAULT_RUN_FILE: &str = "features";
pub const DEFAULT_EXPECTED_WORKERS: u32 = 1;
pub const DEFAULT_LIMIT_NOFILE: u64 = 10001;
pub const DEFAULT_MTU: u32 = 1500;
pub const DEFAULT_MOUNT_PATH: &str = "/srv/grizzly";

/// Port the master's controller listens on.
pub const MASTER_CONTROL_PORT: u16 = 5557;

/// Health probe tuning for the master role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Control port probed inside the master.
    pub port: u16,
    /// Delay before each probe.
    pub interval: Duration,
    /// Upper bound for a single probe.
    pub timeout: Duration,
    /// Consecutive failures before the master is declared unhealthy.
    pub retries: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            port: MASTER_CONTROL_PORT,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            retries: 3,
        }
    }
}

/// Host directory bind-mounted into every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    pub context: PathBuf,
    pub path: String,
}

/// Terminal dimensions propagated into the containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: Option<u16>,
    pub lines: Option<u16>,
}

/// Immutable configuration snapshot for one cluster run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub project_name: String,
    pub user_tag: String,
    /// Extra suffix for the cluster name; does not affect the image tag.
    pub cluster_id: Option<String>,
    /// Registry prefix, including its trailing `/` when set.
    pub image_registry: String,
    pub container_tty: bool,
    pub limit_nofile: u64,
    pub mount: Option<MountConfig>,
    pub environment_file: Option<PathBuf>,
    pub expected_workers: u32,
    pub run_file: String,
    pub master_run_args: Vec<String>,
    pub worker_run_args: Vec<String>,
    pub common_run_args: Vec<String>,
    pub health: HealthCheckConfig,
    pub mtu: u32,
    pub terminal: TerminalSize,
    /// `TESTDATA_VARIABLE_*` values with the prefix stripped.
    pub testdata: BTreeMap<String, String>,
}

impl RunConfig {
    /// Build the snapshot from the current process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build the snapshot from an explicit variable map.
    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let lookup = Lookup(vars);

        let project_name = lookup.required(PROJECT_NAME)?;
        let user_tag = lookup.required(USER_TAG)?;
        validate_name(PROJECT_NAME, &project_name)?;
        validate_name(USER_TAG, &user_tag)?;
        let cluster_id = lookup.get(CLUSTER_ID).map(str::to_string);
        if let Some(id) = &cluster_id {
            validate_name(CLUSTER_ID, id)?;
        }

        let mount = match (lookup.get(MOUNT_CONTEXT), lookup.get(MOUNT_PATH)) {
            (Some(context), Some(path)) => Some(MountConfig {
                context: PathBuf::from(context),
                path: path.to_string(),
            }),
            (Some(context), None) => Some(MountConfig {
                context: PathBuf::from(context),
                path: DEFAULT_MOUNT_PATH.to_string(),
            }),
            (None, Some(_)) => {
                return Err(ConfigError::InvalidValue {
                    variable: MOUNT_PATH,
                    reason: format!("{MOUNT_CONTEXT} must be set when {MOUNT_PATH} is"),
                })
            }
            (None, None) => None,
        };

        let health = HealthCheckConfig {
            port: MASTER_CONTROL_PORT,
            interval: lookup.seconds(HEALTH_CHECK_INTERVAL, 5)?,
            timeout: lookup.seconds(HEALTH_CHECK_TIMEOUT, 3)?,
            retries: lookup.number(HEALTH_CHECK_RETRIES, 3u32)?,
        };
        if health.retries == 0 {
            return Err(ConfigError::InvalidValue {
                variable: HEALTH_CHECK_RETRIES,
                reason: "must be at least 1".into(),
            });
        }

        let mtu = lookup.number(MTU, DEFAULT_MTU)?;
        if !(68..=65535).contains(&mtu) {
            return Err(ConfigError::InvalidValue {
                variable: MTU,
                reason: format!("{mtu} is outside 68..=65535"),
            });
        }

        let limit_nofile = lookup.number(LIMIT_NOFILE, DEFAULT_LIMIT_NOFILE)?;
        if limit_nofile == 0 {
            return Err(ConfigError::InvalidValue {
                variable: LIMIT_NOFILE,
                reason: "must be greater than zero".into(),
            });
        }

        let testdata = vars
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(TESTDATA_VARIABLE_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();

        Ok(Self {
            project_name,
            user_tag,
            cluster_id,
            image_registry: lookup.get(IMAGE_REGISTRY).unwrap_or_default().to_string(),
            container_tty: lookup.flag(CONTAINER_TTY)?,
            limit_nofile,
            mount,
            environment_file: lookup.get(ENVIRONMENT_FILE).map(PathBuf::from),
            expected_workers: lookup.number(EXPECTED_WORKERS, DEFAULT_EXPECTED_WORKERS)?,
            run_file: lookup.get(RUN_FILE).unwrap_or(DEFAULT_RUN_FILE).to_string(),
            master_run_args: lookup.words(MASTER_RUN_ARGS),
            worker_run_args: lookup.words(WORKER_RUN_ARGS),
            common_run_args: lookup.words(COMMON_RUN_ARGS),
            health,
            mtu,
            terminal: TerminalSize {
                columns: lookup.optional_number(COLUMNS)?,
                lines: lookup.optional_number(LINES)?,
            },
            testdata,
        })
    }

    /// Name shared by the network and the containers of this run.
    pub fn cluster_name(&self) -> String {
        match &self.cluster_id {
            Some(id) => format!("{}-{}-{id}", self.project_name, self.user_tag),
            None => format!("{}-{}", self.project_name, self.user_tag),
        }
    }
}

/// Read-only view over the variable map. Empty values count as unset.
struct Lookup<'a>(&'a BTreeMap<String, String>);

impl<'a> Lookup<'a> {
    fn get(&self, name: &str) -> Option<&'a str> {
        self.0
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name)
            .map(str::to_string)
            .ok_or(ConfigError::MissingVariable { variable: name })
    }

    fn number<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                variable: name,
                reason: format!("\"{raw}\": {e}"),
            }),
        }
    }

    fn optional_number<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                    variable: name,
                    reason: format!("\"{raw}\": {e}"),
                })
            })
            .transpose()
    }

    /// Whole seconds, optionally suffixed with `s`.
    fn seconds(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let seconds = match self.get(name) {
            None => default,
            Some(raw) => {
                let digits = raw.strip_suffix('s').unwrap_or(raw);
                digits.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    variable: name,
                    reason: format!("\"{raw}\": {e}"),
                })?
            }
        };
        if seconds == 0 {
            return Err(ConfigError::InvalidValue {
                variable: name,
                reason: "must be greater than zero".into(),
            });
        }
        Ok(Duration::from_secs(seconds))
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        match self.get(name).map(str::to_ascii_lowercase).as_deref() {
            None | Some("false") | Some("0") | Some("no") => Ok(false),
            Some("true") | Some("1") | Some("yes") => Ok(true),
            Some(other) => Err(ConfigError::InvalidValue {
                variable: name,
                reason: format!("\"{other}\" is not a boolean"),
            }),
        }
    }

    fn words(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn validate_name(variable: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            variable,
            reason: format!("\"{value}\" may only contain [a-zA-Z0-9_.-]"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut map = BTreeMap::from([
            (PROJECT_NAME.to_string(), "project".to_string()),
            (USER_TAG.to_string(), "alice".to_string()),
        ]);
        for (key, value) in pairs {
            map.insert(key.to_string(), value.to_string());
        }
        map
    }

    #[test]
    fn defaults_apply_when_variables_are_unset() {
        let config = RunConfig::from_vars(&vars(&[])).unwrap();

        assert_eq!(config.run_file, "features");
        assert_eq!(config.expected_workers, 1);
        assert_eq!(config.health, HealthCheckConfig::default());
        assert_eq!(config.mtu, 1500);
        assert_eq!(config.limit_nofile, 10001);
        assert!(!config.container_tty);
        assert!(config.mount.is_none());
        assert!(config.image_registry.is_empty());
        assert!(config.master_run_args.is_empty());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = RunConfig::from_vars(&vars(&[(RUN_FILE, ""), (EXPECTED_WORKERS, "  ")])).unwrap();
        assert_eq!(config.run_file, "features");
        assert_eq!(config.expected_workers, 1);
    }

    #[test]
    fn missing_project_name_is_reported() {
        let mut map = vars(&[]);
        map.remove(PROJECT_NAME);

        assert_eq!(
            RunConfig::from_vars(&map).unwrap_err(),
            ConfigError::MissingVariable {
                variable: PROJECT_NAME
            }
        );
    }

    #[test]
    fn health_check_accepts_seconds_suffix() {
        let config = RunConfig::from_vars(&vars(&[
            (HEALTH_CHECK_INTERVAL, "10s"),
            (HEALTH_CHECK_TIMEOUT, "2"),
            (HEALTH_CHECK_RETRIES, "5"),
        ]))
        .unwrap();

        assert_eq!(config.health.interval, Duration::from_secs(10));
        assert_eq!(config.health.timeout, Duration::from_secs(2));
        assert_eq!(config.health.retries, 5);
        assert_eq!(config.health.port, 5557);
    }

    #[test]
    fn zero_retries_is_rejected() {
        let err = RunConfig::from_vars(&vars(&[(HEALTH_CHECK_RETRIES, "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                variable: HEALTH_CHECK_RETRIES,
                ..
            }
        ));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = RunConfig::from_vars(&vars(&[(EXPECTED_WORKERS, "three")])).unwrap_err();
        assert!(err.to_string().starts_with("invalid value for GRIZZLY_EXPECTED_WORKERS"));
    }

    #[test]
    fn run_args_are_split_on_whitespace() {
        let config = RunConfig::from_vars(&vars(&[
            (MASTER_RUN_ARGS, "--stop  --verbose"),
            (COMMON_RUN_ARGS, "-T a=b"),
        ]))
        .unwrap();

        assert_eq!(config.master_run_args, vec!["--stop", "--verbose"]);
        assert_eq!(config.common_run_args, vec!["-T", "a=b"]);
        assert!(config.worker_run_args.is_empty());
    }

    #[test]
    fn testdata_variables_are_collected_without_prefix() {
        let config = RunConfig::from_vars(&vars(&[
            ("TESTDATA_VARIABLE_users", "10"),
            ("TESTDATA_VARIABLE_", "ignored"),
            ("OTHER", "x"),
        ]))
        .unwrap();

        assert_eq!(config.testdata.len(), 1);
        assert_eq!(config.testdata.get("users").map(String::as_str), Some("10"));
    }

    #[test]
    fn mount_requires_context() {
        let err = RunConfig::from_vars(&vars(&[(MOUNT_PATH, "/srv")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { variable: MOUNT_PATH, .. }));

        let config = RunConfig::from_vars(&vars(&[(MOUNT_CONTEXT, "/home/alice/project")])).unwrap();
        assert_eq!(
            config.mount,
            Some(MountConfig {
                context: PathBuf::from("/home/alice/project"),
                path: DEFAULT_MOUNT_PATH.to_string(),
            })
        );
    }

    #[test]
    fn tty_flag_parses_booleans() {
        assert!(RunConfig::from_vars(&vars(&[(CONTAINER_TTY, "true")])).unwrap().container_tty);
        assert!(!RunConfig::from_vars(&vars(&[(CONTAINER_TTY, "False")])).unwrap().container_tty);
        assert!(RunConfig::from_vars(&vars(&[(CONTAINER_TTY, "maybe")])).is_err());
    }

    #[test]
    fn mtu_must_be_in_range() {
        assert!(RunConfig::from_vars(&vars(&[(MTU, "9000")])).is_ok());
        assert!(RunConfig::from_vars(&vars(&[(MTU, "10")])).is_err());
    }

    #[test]
    fn names_with_spaces_are_rejected() {
        let err = RunConfig::from_vars(&vars(&[(USER_TAG, "al ice")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { variable: USER_TAG, .. }));
    }

    #[test]
    fn cluster_name_joins_project_and_tag() {
        let config = RunConfig::from_vars(&vars(&[])).unwrap();
        assert_eq!(config.cluster_name(), "project-alice");
    }

    #[test]
    fn cluster_id_suffixes_name_but_not_tag() {
        let config = RunConfig::from_vars(&vars(&[(CLUSTER_ID, "nightly")])).unwrap();

        assert_eq!(config.cluster_name(), "project-alice-nightly");
        assert_eq!(config.user_tag, "alice");
        assert!(RunConfig::from_vars(&vars(&[(CLUSTER_ID, "a/b")])).is_err());
    }
}
