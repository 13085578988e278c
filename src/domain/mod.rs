//! Cluster domain types: roles, launch specifications, master health and
//! the feature files a run executes.

pub mod feature;
mod health;
mod launch;

pub use feature::{Feature, FeatureError, Scenario, Step, StepKind};
pub use health::{MasterState, ProbeOutcome};
pub use launch::{ClusterPlan, ImageRef, LaunchSpec, NetworkSpec, Role, MASTER_HOSTNAME};
