//! Pebble reconciliation scenarios

mod common;

use common::{Call, FakeSupervisor};
use influxdb2_operator::charm::{influxdb2_layer, ReconcileOutcome, ReconcilePhase, Reconciler};
use influxdb2_operator::config::WorkloadConfig;
use influxdb2_operator::pebble::{PebbleError, Plan, ServiceState};

const SERVICE: &str = "influxdb2";

fn desired_plan() -> Plan {
    Plan {
        services: influxdb2_layer(&WorkloadConfig::default()).services,
    }
}

async fn run(supervisor: &FakeSupervisor) -> ReconcileOutcome {
    let layer = influxdb2_layer(&WorkloadConfig::default());
    Reconciler::new(supervisor, SERVICE, SERVICE)
        .reconcile(&layer)
        .await
}

#[tokio::test]
async fn test_fresh_deploy_applies_and_starts() {
    let supervisor = FakeSupervisor::new();

    let outcome = run(&supervisor).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            applied: true,
            restarted: false
        }
    );
    assert_eq!(
        supervisor.calls(),
        vec![
            Call::GetPlan,
            Call::AddLayer {
                label: SERVICE.to_string(),
                combine: true
            },
            Call::GetService(SERVICE.to_string()),
            Call::Start(SERVICE.to_string()),
        ]
    );
    assert_eq!(supervisor.plan(), desired_plan());
    assert_eq!(supervisor.state(SERVICE), Some(ServiceState::Active));
}

#[tokio::test]
async fn test_matching_plan_is_a_no_op() {
    let supervisor = FakeSupervisor::new()
        .with_plan(desired_plan())
        .with_state(SERVICE, ServiceState::Active);

    let outcome = run(&supervisor).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            applied: false,
            restarted: false
        }
    );
    assert_eq!(supervisor.calls(), vec![Call::GetPlan]);
}

#[tokio::test]
async fn test_second_pass_after_apply_is_a_no_op() {
    let supervisor = FakeSupervisor::new();
    run(&supervisor).await;
    supervisor.clear_calls();

    let outcome = run(&supervisor).await;

    assert_eq!(outcome.phase(), ReconcilePhase::Done);
    assert_eq!(supervisor.calls(), vec![Call::GetPlan]);
}

#[tokio::test]
async fn test_drift_on_running_service_stops_before_start() {
    let mut stale = desired_plan();
    stale
        .services
        .get_mut(SERVICE)
        .unwrap()
        .environment
        .insert("DOCKER_INFLUXDB_INIT_ORG".to_string(), "old-org".to_string());
    let supervisor = FakeSupervisor::new()
        .with_plan(stale)
        .with_state(SERVICE, ServiceState::Active);

    let outcome = run(&supervisor).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            applied: true,
            restarted: true
        }
    );
    let calls = supervisor.calls();
    let stop = calls
        .iter()
        .position(|c| *c == Call::Stop(SERVICE.to_string()))
        .expect("stop issued");
    let start = calls
        .iter()
        .position(|c| *c == Call::Start(SERVICE.to_string()))
        .expect("start issued");
    assert!(stop < start);
    assert_eq!(supervisor.plan(), desired_plan());
}

#[tokio::test]
async fn test_drift_on_stopped_service_starts_directly() {
    let supervisor = FakeSupervisor::new().with_state(SERVICE, ServiceState::Inactive);

    let outcome = run(&supervisor).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            applied: true,
            restarted: false
        }
    );
    assert_eq!(supervisor.count(|c| matches!(c, Call::Stop(_))), 0);
    assert_eq!(supervisor.count(|c| matches!(c, Call::Start(_))), 1);
}

#[tokio::test]
async fn test_errored_service_is_not_stopped() {
    let supervisor = FakeSupervisor::new().with_state(SERVICE, ServiceState::Error);

    run(&supervisor).await;

    assert_eq!(supervisor.count(|c| matches!(c, Call::Stop(_))), 0);
    assert_eq!(supervisor.state(SERVICE), Some(ServiceState::Active));
}

#[tokio::test]
async fn test_fetch_failure_defers_without_writes() {
    let supervisor = FakeSupervisor::new();
    supervisor.fail_next_get_plan(PebbleError::Connection("socket not found".to_string()));

    let outcome = run(&supervisor).await;

    match outcome {
        ReconcileOutcome::Deferred { phase, reason } => {
            assert_eq!(phase, ReconcilePhase::Fetching);
            assert!(reason.contains("socket not found"));
        }
        other => panic!("expected deferral, got {:?}", other),
    }
    assert_eq!(supervisor.calls(), vec![Call::GetPlan]);
    assert_eq!(supervisor.plan(), Plan::default());
}

#[tokio::test]
async fn test_apply_failure_defers_without_restart() {
    let supervisor = FakeSupervisor::new().with_state(SERVICE, ServiceState::Active);
    supervisor.fail_next_add_layer(PebbleError::Api {
        code: 500,
        message: "layer rejected".to_string(),
    });

    let outcome = run(&supervisor).await;

    assert!(outcome.is_deferred());
    assert!(matches!(
        outcome,
        ReconcileOutcome::Deferred {
            phase: ReconcilePhase::Applying,
            ..
        }
    ));
    assert_eq!(supervisor.count(|c| matches!(c, Call::Stop(_))), 0);
    assert_eq!(supervisor.count(|c| matches!(c, Call::Start(_))), 0);
}

#[tokio::test]
async fn test_start_failure_defers() {
    let supervisor = FakeSupervisor::new();
    supervisor.fail_next_start(PebbleError::ChangeFailed {
        change: "7".to_string(),
        message: "exited quickly".to_string(),
    });

    let outcome = run(&supervisor).await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Deferred {
            phase: ReconcilePhase::Starting,
            ..
        }
    ));
}

#[tokio::test]
async fn test_resumed_start_skips_plan_and_layer() {
    let supervisor = FakeSupervisor::new().with_plan(desired_plan());

    let outcome = Reconciler::new(&supervisor, SERVICE, SERVICE)
        .resume_start()
        .await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            applied: false,
            restarted: false
        }
    );
    assert_eq!(
        supervisor.calls(),
        vec![
            Call::GetService(SERVICE.to_string()),
            Call::Start(SERVICE.to_string()),
        ]
    );
    assert_eq!(supervisor.state(SERVICE), Some(ServiceState::Active));
}

#[tokio::test]
async fn test_resumed_start_restarts_running_service() {
    let supervisor = FakeSupervisor::new()
        .with_plan(desired_plan())
        .with_state(SERVICE, ServiceState::Active);

    let outcome = Reconciler::new(&supervisor, SERVICE, SERVICE)
        .resume_start()
        .await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            applied: false,
            restarted: true
        }
    );
    assert_eq!(
        supervisor.calls(),
        vec![
            Call::GetService(SERVICE.to_string()),
            Call::Stop(SERVICE.to_string()),
            Call::Start(SERVICE.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_resumed_start_failure_stays_in_starting() {
    let supervisor = FakeSupervisor::new().with_plan(desired_plan());
    supervisor.fail_next_start(PebbleError::Connection("no socket".to_string()));

    let outcome = Reconciler::new(&supervisor, SERVICE, SERVICE)
        .resume_start()
        .await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Deferred {
            phase: ReconcilePhase::Starting,
            ..
        }
    ));
}
