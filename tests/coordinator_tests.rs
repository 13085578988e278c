//! Health-gated cluster startup against a scripted runtime.

use std::sync::Arc;

use grizzly_cli::application::coordinator::Coordinator;
use grizzly_cli::config::{self, RunConfig};
use grizzly_cli::domain::{ClusterPlan, Role};
use grizzly_cli::error::RunError;
use grizzly_cli::testkit::config::{plan, vars_with};
use grizzly_cli::testkit::runtime::{ProbeScript, RuntimeEvent, ScriptedRuntime};
use tokio_util::sync::CancellationToken;

fn position(events: &[RuntimeEvent], wanted: impl Fn(&RuntimeEvent) -> bool) -> usize {
    events
        .iter()
        .position(wanted)
        .unwrap_or_else(|| panic!("event not found in {events:#?}"))
}

#[tokio::test]
async fn expected_workers_start_once_master_listens() {
    let run_config =
        RunConfig::from_vars(&vars_with(&[(config::EXPECTED_WORKERS, "3")])).unwrap();
    let mut plan = ClusterPlan::from_config(&run_config);
    plan.health.interval = std::time::Duration::from_millis(1);

    let runtime = Arc::new(ScriptedRuntime::new().with_probes(vec![
        ProbeScript::NotListening,
        ProbeScript::Listening,
    ]));
    let report = Coordinator::new(runtime.clone())
        .run(&plan, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.probes, 2);
    assert_eq!(report.started_workers().count(), 3);
    assert_eq!(
        runtime.launched(Role::Worker),
        vec![
            "grizzly-test-worker-1".to_string(),
            "grizzly-test-worker-2".to_string(),
            "grizzly-test-worker-3".to_string(),
        ]
    );

    let events = runtime.events();
    let healthy = position(&events, |e| {
        matches!(e, RuntimeEvent::Probed { listening: true, .. })
    });
    let first_worker = position(&events, |e| {
        matches!(e, RuntimeEvent::Launched { role: Role::Worker, .. })
    });
    assert!(healthy < first_worker);
    assert!(matches!(events[0], RuntimeEvent::NetworkPrepared(_)));
}

#[tokio::test]
async fn probe_errors_count_against_retries() {
    let runtime = Arc::new(ScriptedRuntime::new().with_probes(vec![
        ProbeScript::Error,
        ProbeScript::Error,
        ProbeScript::Error,
        ProbeScript::Listening,
    ]));

    let err = Coordinator::new(runtime.clone())
        .run(&plan(3, 3), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        RunError::MasterUnhealthy {
            attempts,
            last_failure,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_failure.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.probe_count(), 3);
    assert_eq!(runtime.worker_launches(), 0);
}

#[tokio::test]
async fn zero_workers_still_waits_for_master() {
    let runtime = Arc::new(ScriptedRuntime::new().with_probes(vec![ProbeScript::Listening]));

    let report = Coordinator::new(runtime.clone())
        .run(&plan(0, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.probes, 1);
    assert!(report.workers.is_empty());
    assert_eq!(runtime.launched(Role::Master), vec!["grizzly-test-master".to_string()]);
}

#[tokio::test]
async fn cancelled_token_starts_no_workers() {
    let runtime = Arc::new(ScriptedRuntime::new().with_probes(vec![ProbeScript::Hang]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Coordinator::new(runtime.clone())
        .run(&plan(2, 3), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Cancelled));
    assert_eq!(runtime.worker_launches(), 0);
}
