//! Canonical test configurations.
//!
//! Single source of truth for variable maps and plans used across tests.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{self, RunConfig};
use crate::domain::ClusterPlan;

/// Minimal variable map: project `grizzly`, user tag `test`.
pub fn vars() -> BTreeMap<String, String> {
    BTreeMap::from([
        (config::PROJECT_NAME.to_string(), "grizzly".to_string()),
        (config::USER_TAG.to_string(), "test".to_string()),
    ])
}

/// Variable map with extra entries on top of [`vars`].
pub fn vars_with(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut map = vars();
    for (key, value) in pairs {
        map.insert((*key).to_string(), (*value).to_string());
    }
    map
}

/// Plan for `workers` workers whose health check gives up after `retries`
/// probes, with millisecond timings so tests never wait on real seconds.
pub fn plan(workers: u32, retries: u32) -> ClusterPlan {
    let workers = workers.to_string();
    let retries = retries.to_string();
    let run_config = RunConfig::from_vars(&vars_with(&[
        (config::EXPECTED_WORKERS, &workers),
        (config::HEALTH_CHECK_RETRIES, &retries),
    ]))
    .expect("canonical test config is valid");

    let mut plan = ClusterPlan::from_config(&run_config);
    plan.health.interval = Duration::from_millis(1);
    plan.health.timeout = Duration::from_millis(20);
    plan
}
