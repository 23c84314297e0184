use proptest::prelude::*;
use remedy_kernel::config::PolicyThresholds;
use remedy_kernel::construction::PlanGraph;
use remedy_kernel::policy::{PlanShape, PolicyGate};
use remedy_kernel::scheduler::BatchScheduler;
use remedy_kernel::types::{RiskDecision, Severity};
use remedy_test_utils::{chain_steps, incident};

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

fn shape() -> impl Strategy<Value = PlanShape> {
    (1..40usize, 1..40usize, 0..400u64).prop_map(|(route_length, batch_count, critical_path_minutes)| {
        PlanShape {
            route_length,
            batch_count,
            critical_path_minutes,
        }
    })
}

fn evaluate(severity: Severity, nodes: usize) -> RiskDecision {
    let inc = incident("inc", severity);
    let plan = PlanGraph::build_from(&inc, chain_steps(nodes)).unwrap();
    let batches = BatchScheduler::new(4).partition(&plan).unwrap();
    PolicyGate::default().evaluate(&inc, &plan, &batches).unwrap()
}

proptest! {
    #[test]
    fn prop_score_is_monotone_in_severity(a in severity(), b in severity(), shape in shape()) {
        let gate = PolicyGate::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(gate.score(low, &shape) <= gate.score(high, &shape));
    }

    #[test]
    fn prop_score_stays_in_range(s in severity(), shape in shape()) {
        let score = PolicyGate::default().score(s, &shape);
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn prop_higher_severity_never_flips_to_approved(a in severity(), b in severity(), nodes in 1..14usize) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if evaluate(high, nodes).approved {
            prop_assert!(evaluate(low, nodes).approved);
        }
    }

    #[test]
    fn prop_auto_approval_needs_severity_below_ceiling(s in severity(), nodes in 1..6usize) {
        let decision = evaluate(s, nodes);
        if s >= PolicyThresholds::default().auto_approve_ceiling {
            prop_assert!(!decision.can_auto_approve);
        }
        prop_assert!(!decision.can_auto_approve || decision.approved);
        prop_assert!(!decision.reasons.is_empty());
    }
}

#[test]
fn test_critical_is_rejected_unless_trivial() {
    // 70 base + 1.5 per extra node: seven nodes cross 78
    assert!(evaluate(Severity::Critical, 1).approved);
    assert!(evaluate(Severity::Critical, 6).approved);
    assert!(!evaluate(Severity::Critical, 7).approved);
    assert!(!evaluate(Severity::Critical, 1).can_auto_approve);
}

#[test]
fn test_extreme_is_always_rejected_at_default_threshold() {
    let decision = evaluate(Severity::Extreme, 1);
    assert_eq!(decision.score, 77.0);
    assert!(decision.approved);

    let decision = evaluate(Severity::Extreme, 2);
    assert_eq!(decision.score, 78.5);
    assert!(!decision.approved);
    assert!(decision.reasons.iter().any(|r| r.contains("exceeds max")));
}

#[test]
fn test_lowering_max_risk_rejects_medium() {
    let inc = incident("inc", Severity::Medium);
    let plan = PlanGraph::build_from(&inc, chain_steps(3)).unwrap();
    let batches = BatchScheduler::new(2).partition(&plan).unwrap();

    let strict = PolicyGate::new(PolicyThresholds::default().with_max_risk(20.0));
    let decision = strict.evaluate(&inc, &plan, &batches).unwrap();
    assert_eq!(decision.score, 31.0);
    assert!(!decision.approved);
    assert_eq!(decision.plan_id, *plan.id());
}
