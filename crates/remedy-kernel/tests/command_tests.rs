use remedy_kernel::command::{CommandCenter, CommandInput, CommandKind, CommandOutcome, CommandStatus, Snapshot};
use remedy_kernel::config::RemedyConfig;
use remedy_kernel::playbook::StaticPlaybook;
use remedy_kernel::repository::{InMemoryRepository, Repository};
use remedy_kernel::types::{IncidentId, IncidentRecord, RunState, Severity, StepSpec};
use remedy_test_utils::{
    command, diamond_steps, incident, step, FaultyRepository, ScriptedExecutor, TENANT,
};
use std::sync::Arc;

struct Harness {
    repo: Arc<InMemoryRepository>,
    exec: Arc<ScriptedExecutor>,
    center: CommandCenter,
}

fn harness(incidents: Vec<IncidentRecord>, steps: Vec<StepSpec>, exec: ScriptedExecutor) -> Harness {
    let repo = Arc::new(InMemoryRepository::with_incidents(incidents));
    let exec = Arc::new(exec);
    let center = CommandCenter::new(
        &RemedyConfig::default(),
        repo.clone(),
        Arc::new(StaticPlaybook::from_specs(steps)),
        exec.clone(),
    );
    Harness { repo, exec, center }
}

fn diamond_for(severity: Severity) -> Harness {
    harness(
        vec![incident("inc-1", severity)],
        diamond_steps(),
        ScriptedExecutor::new(),
    )
}

fn assert_rejected_with(outcome: &CommandOutcome, kind: &str) {
    assert_eq!(outcome.status, CommandStatus::Rejected, "{}", outcome.message);
    assert!(
        outcome.message.starts_with(kind),
        "expected {kind}, got: {}",
        outcome.message
    );
}

#[tokio::test]
async fn test_low_severity_plan_then_execute() {
    let h = diamond_for(Severity::Low);

    let planned = h.center.dispatch(command(CommandKind::Plan, "inc-1")).await;
    assert_eq!(planned.status, CommandStatus::Accepted);
    match &planned.snapshot {
        Snapshot::Plan { plan, decision, batches } => {
            assert!(plan.is_approved());
            assert!(decision.can_auto_approve);
            assert_eq!(batches.len(), 3);
        }
        other => panic!("unexpected snapshot {other:?}"),
    }

    let executed = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    assert_eq!(executed.status, CommandStatus::Done, "{}", executed.message);
    assert_eq!(h.exec.call_count(), 4);

    let runs = h.repo.get_runs(&IncidentId::from("inc-1")).await.unwrap();
    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|r| r.state == RunState::Done));
}

#[tokio::test]
async fn test_critical_plan_needs_promotion() {
    let h = diamond_for(Severity::Critical);

    let planned = h.center.dispatch(command(CommandKind::Plan, "inc-1")).await;
    assert_eq!(planned.status, CommandStatus::Accepted);
    assert!(planned.message.contains("promotion required"));

    // stored unapproved, so execution records a pending no-op
    let executed = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    assert_eq!(executed.status, CommandStatus::Rejected);
    assert_eq!(h.exec.call_count(), 0);
    let runs = h.repo.get_runs(&IncidentId::from("inc-1")).await.unwrap();
    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|r| r.state == RunState::Pending));

    let promoted = h
        .center
        .dispatch(command(CommandKind::Promote, "inc-1").with_reason("on-call approved"))
        .await;
    assert_eq!(promoted.status, CommandStatus::Accepted);
    assert!(promoted.message.contains("on-call approved"));

    let executed = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    assert_eq!(executed.status, CommandStatus::Done, "{}", executed.message);
    assert_eq!(h.exec.call_count(), 4);
}

#[tokio::test]
async fn test_promotion_never_bypasses_risk_ceiling() {
    let h = harness(
        vec![incident("inc-1", Severity::Extreme)],
        diamond_steps(),
        ScriptedExecutor::new(),
    );

    let planned = h.center.dispatch(command(CommandKind::Plan, "inc-1")).await;
    assert_eq!(planned.status, CommandStatus::Rejected);

    let promoted = h.center.dispatch(command(CommandKind::Promote, "inc-1")).await;
    assert_eq!(promoted.status, CommandStatus::Rejected);
    assert!(promoted.message.contains("cannot be promoted"));

    let executed = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    assert_eq!(executed.status, CommandStatus::Rejected);
    assert_eq!(h.exec.call_count(), 0);
}

#[tokio::test]
async fn test_failed_node_leaves_execution_queued() {
    let h = harness(
        vec![incident("inc-1", Severity::Low)],
        diamond_steps(),
        ScriptedExecutor::new().failing("c"),
    );
    h.center.dispatch(command(CommandKind::Plan, "inc-1")).await;

    let first = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    assert_eq!(first.status, CommandStatus::Queued);
    match &first.snapshot {
        Snapshot::Execution { summary, .. } => {
            assert_eq!((summary.done, summary.failed), (3, 1));
        }
        other => panic!("unexpected snapshot {other:?}"),
    }

    // a retry is a new attempt of the same plan
    let second = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    match &second.snapshot {
        Snapshot::Execution { summary, .. } => {
            assert!(summary.runs.iter().all(|r| r.attempt == 2));
        }
        other => panic!("unexpected snapshot {other:?}"),
    }
}

#[tokio::test]
async fn test_execute_without_plan_is_rejected() {
    let h = diamond_for(Severity::Low);
    let outcome = h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;
    assert_rejected_with(&outcome, "PlanNotFound");
    assert!(matches!(outcome.snapshot, Snapshot::None));
}

#[tokio::test]
async fn test_unknown_or_foreign_incident_is_rejected() {
    let h = harness(
        vec![IncidentRecord::new("inc-foreign", "globex", Severity::Low)],
        diamond_steps(),
        ScriptedExecutor::new(),
    );

    let missing = h.center.dispatch(command(CommandKind::Plan, "inc-404")).await;
    assert_rejected_with(&missing, "IncidentNotFound");

    let foreign = h.center.dispatch(command(CommandKind::Plan, "inc-foreign")).await;
    assert_rejected_with(&foreign, "IncidentNotFound");
    assert_eq!(h.repo.plan_count(), 0);
}

#[tokio::test]
async fn test_cyclic_playbook_is_rejected_with_kind() {
    let h = harness(
        vec![incident("inc-1", Severity::Low)],
        vec![step("a", &["b"]), step("b", &["a"])],
        ScriptedExecutor::new(),
    );
    let outcome = h.center.dispatch(command(CommandKind::Plan, "inc-1")).await;
    assert_rejected_with(&outcome, "CycleDetected");
    assert_eq!(h.repo.plan_count(), 0);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_and_audited() {
    let h = diamond_for(Severity::Low);

    let missing = CommandInput {
        tenant_id: None,
        ..command(CommandKind::Plan, "inc-1")
    };
    let outcome = h.center.dispatch(missing).await;
    assert_rejected_with(&outcome, "ValidationFailed");
    assert!(outcome.message.contains("tenantId"));
    assert_eq!(outcome.audit.len(), 1);

    let garbage = h.center.dispatch_json("{not json").await;
    assert_rejected_with(&garbage, "ValidationFailed");

    let unknown = h
        .center
        .dispatch_json(r#"{"tenantId":"acme","correlationId":"c","incidentId":"inc-1","command":"reboot"}"#)
        .await;
    assert_rejected_with(&unknown, "ValidationFailed");
    assert_eq!(unknown.audit[0].command, "reboot");

    assert_eq!(h.center.audit_log().len(), 3);
    assert!(h.center.audit_log().verify_integrity().is_ok());
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let h = diamond_for(Severity::Low);

    let first = h.center.dispatch(command(CommandKind::Refresh, "inc-1")).await;
    assert_eq!(first.status, CommandStatus::Accepted);
    assert_eq!(h.repo.plan_count(), 1);

    let second = h.center.dispatch(command(CommandKind::Refresh, "inc-1")).await;
    assert_eq!(second.status, CommandStatus::Accepted);
    assert!(second.message.contains("unchanged"));
    assert_eq!(h.repo.plan_count(), 1);

    let (Snapshot::Plan { plan: a, .. }, Snapshot::Plan { plan: b, .. }) =
        (&first.snapshot, &second.snapshot)
    else {
        panic!("expected plan snapshots");
    };
    assert_eq!(a.id(), b.id());
}

#[tokio::test]
async fn test_query_summarizes_tenant_incidents() {
    let h = harness(
        vec![
            incident("inc-1", Severity::Low),
            incident("inc-2", Severity::Medium).resolved(),
            incident("inc-3", Severity::High),
            IncidentRecord::new("inc-x", "globex", Severity::Low),
        ],
        diamond_steps(),
        ScriptedExecutor::new(),
    );
    h.center.dispatch(command(CommandKind::Plan, "inc-1")).await;
    h.center.dispatch(command(CommandKind::Execute, "inc-1")).await;

    let all = h.center.dispatch(command(CommandKind::Query, "inc-1")).await;
    assert_eq!(all.status, CommandStatus::Done);
    let Snapshot::Query(summary) = &all.snapshot else {
        panic!("expected query snapshot");
    };
    assert_eq!(summary.total, 3);
    assert_eq!(summary.plan_count, 1);
    assert_eq!(summary.runs.done, 4);
    assert_eq!(summary.incidents[0].latest_plan_approved, Some(true));

    let open = h
        .center
        .dispatch(command(CommandKind::Query, "inc-1").with_filter(true, Some(1)))
        .await;
    let Snapshot::Query(summary) = &open.snapshot else {
        panic!("expected query snapshot");
    };
    assert_eq!(summary.total, 2);
    assert_eq!(summary.incidents.len(), 1);
    assert_eq!(summary.incidents[0].incident_id.as_str(), "inc-1");
}

#[tokio::test]
async fn test_repository_failures_are_rejected_unchanged() {
    let repo = Arc::new(FaultyRepository::with_incidents(vec![incident(
        "inc-1",
        Severity::Low,
    )]));
    let center = CommandCenter::new(
        &RemedyConfig::default(),
        repo.clone(),
        Arc::new(StaticPlaybook::from_specs(diamond_steps())),
        Arc::new(ScriptedExecutor::new()),
    );

    repo.fail_writes(true);
    let outcome = center.dispatch(command(CommandKind::Plan, "inc-1")).await;
    assert_rejected_with(&outcome, "RepositoryFailure");
    assert!(outcome.message.contains("write path down"));

    repo.fail_writes(false);
    repo.fail_reads(true);
    let outcome = center.dispatch(command(CommandKind::Query, "inc-1")).await;
    assert_rejected_with(&outcome, "RepositoryFailure");
    assert!(outcome.message.contains("read path down"));

    repo.fail_reads(false);
    assert_eq!(center.dispatch(command(CommandKind::Plan, "inc-1")).await.status, CommandStatus::Accepted);
    assert_eq!(repo.inner().plan_count(), 1);
}

#[tokio::test]
async fn test_every_command_appends_one_chained_audit_entry() {
    let h = diamond_for(Severity::Low);
    for kind in [
        CommandKind::Plan,
        CommandKind::Execute,
        CommandKind::Refresh,
        CommandKind::Query,
        CommandKind::Promote,
    ] {
        let outcome = h.center.dispatch(command(kind, "inc-1")).await;
        assert_eq!(outcome.audit.len(), 1);
        assert_eq!(outcome.audit[0].status, outcome.status);
        assert_eq!(outcome.audit[0].tenant_id.as_str(), TENANT);
    }

    let entries = h.center.audit_log().entries();
    assert_eq!(entries.len(), 5);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
    }
    assert!(h.center.audit_log().verify_integrity().is_ok());
}
