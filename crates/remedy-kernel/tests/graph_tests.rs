use proptest::prelude::*;
use remedy_kernel::construction::{topological_order_of, PlanGraph};
use remedy_kernel::error::GraphError;
use remedy_kernel::types::{NodeId, Severity, StepSpec};
use remedy_test_utils::{chain_steps, ids, incident, step};
use std::collections::HashMap;

/// Random DAG: node i may only depend on nodes with a lower index.
/// Declaration order is reversed so the builder has to reorder.
fn dag_steps() -> impl Strategy<Value = Vec<StepSpec>> {
    (1..24usize)
        .prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n)
        })
        .prop_map(|deps| {
            let mut steps: Vec<StepSpec> = deps
                .iter()
                .enumerate()
                .map(|(i, picks)| {
                    let id = format!("n{i}");
                    let dep_ids: Vec<String> = if i == 0 {
                        vec![]
                    } else {
                        picks.iter().map(|p| format!("n{}", p.index(i))).collect()
                    };
                    let dep_refs: Vec<&str> = dep_ids.iter().map(String::as_str).collect();
                    step(&id, &dep_refs)
                })
                .collect();
            steps.reverse();
            steps
        })
}

proptest! {
    #[test]
    fn prop_acyclic_input_builds_in_dependency_order(steps in dag_steps()) {
        let plan = PlanGraph::build_from(&incident("inc", Severity::Low), steps.clone()).unwrap();
        prop_assert_eq!(plan.node_count(), steps.len());

        let position: HashMap<&NodeId, usize> =
            plan.nodes().iter().enumerate().map(|(i, n)| (&n.id, i)).collect();
        for node in plan.nodes() {
            for dep in &node.depends_on {
                prop_assert!(position[dep] < position[&node.id]);
            }
        }
        prop_assert!(plan.validate().is_ok());
    }

    #[test]
    fn prop_ordering_is_deterministic(steps in dag_steps()) {
        let inc = incident("inc", Severity::Low);
        let first = PlanGraph::build_from(&inc, steps.clone()).unwrap();
        let second = PlanGraph::build_from(&inc, steps.clone()).unwrap();

        prop_assert_eq!(first.topological_order().unwrap(), second.topological_order().unwrap());
        prop_assert_eq!(first.fingerprint(), second.fingerprint());
        prop_assert_eq!(topological_order_of(first.nodes()).unwrap(), first.topological_order().unwrap());
    }

    #[test]
    fn prop_closing_a_chain_is_a_cycle(len in 2..16usize) {
        let mut steps = chain_steps(len);
        let last = format!("s{}", len - 1);
        steps[0] = step("s0", &[last.as_str()]);

        match PlanGraph::build_from(&incident("inc", Severity::Low), steps) {
            Err(GraphError::CycleDetected { nodes }) => prop_assert_eq!(nodes.len(), len),
            other => prop_assert!(false, "expected cycle, got {:?}", other),
        }
    }
}

#[test]
fn test_independent_steps_keep_declaration_order() {
    let steps = vec![step("zeta", &[]), step("alpha", &[]), step("mid", &[])];
    let plan = PlanGraph::build_from(&incident("inc", Severity::Low), steps).unwrap();
    assert_eq!(ids(&plan.topological_order().unwrap()), vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_dependency_pulls_step_forward() {
    let steps = vec![step("restart", &["drain"]), step("drain", &[])];
    let plan = PlanGraph::build_from(&incident("inc", Severity::Low), steps).unwrap();
    assert_eq!(ids(&plan.topological_order().unwrap()), vec!["drain", "restart"]);
    assert_eq!(ids(&plan.entry_nodes()), vec!["drain"]);
    assert_eq!(ids(&plan.exit_nodes().unwrap()), vec!["restart"]);
}

#[test]
fn test_dangling_dependency_is_named() {
    let steps = vec![step("a", &[]), step("b", &["ghost"])];
    let err = PlanGraph::build_from(&incident("inc", Severity::Low), steps).unwrap_err();
    assert_eq!(
        err,
        GraphError::DanglingDependency {
            node: NodeId::from("b"),
            missing: NodeId::from("ghost"),
        }
    );
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let steps = vec![step("a", &["a"])];
    let err = PlanGraph::build_from(&incident("inc", Severity::Low), steps).unwrap_err();
    assert_eq!(err.kind(), "CycleDetected");
}

#[test]
fn test_cycle_reports_only_stuck_nodes() {
    let steps = vec![
        step("root", &[]),
        step("x", &["root", "y"]),
        step("y", &["x"]),
    ];
    match PlanGraph::build_from(&incident("inc", Severity::Low), steps) {
        Err(GraphError::CycleDetected { nodes }) => assert_eq!(ids(&nodes), vec!["x", "y"]),
        other => panic!("expected cycle, got {other:?}"),
    }
}
