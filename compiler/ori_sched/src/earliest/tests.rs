use ori_son::{GuardPriority, Node};
use pretty_assertions::assert_eq;

use super::*;
use crate::config::SchedulingStrategy;
use crate::test_helpers::{b, make_cfg, verifying, F1};

fn earliest(graph: &Graph, cfg: &ControlFlowGraph) -> EarliestSchedule {
    earliest_with(graph, cfg, SchedulingStrategy::Earliest)
}

fn earliest_with(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    strategy: SchedulingStrategy,
) -> EarliestSchedule {
    schedule_earliest(graph, cfg, &verifying(strategy)).unwrap_or_else(|e| panic!("{e}"))
}

/// A floating node lands right after the fixed node producing its
/// latest-available input.
#[test]
fn floating_nodes_follow_their_latest_input() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let c = graph.add(Node::constant("c"));
    let branch = graph.add(Node::if_(c, 0.5));
    let left = graph.add(Node::begin());
    let v = graph.add(Node::value("v", [c]));
    let r = graph.add(Node::read(F1, c, Some(start), [left]));
    let use_both = graph.add(Node::sink([v, r]));
    let left_end = graph.add(Node::end());
    let right = graph.add(Node::begin());
    let right_end = graph.add(Node::end());
    let merge = graph.add(Node::merge());
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(
        &graph,
        &[
            &[start, branch],
            &[left, use_both, left_end],
            &[right, right_end],
            &[merge, ret],
        ],
        &[(0, 1), (0, 2), (1, 3), (2, 3)],
    );

    let result = earliest(&graph, &cfg);
    assert_eq!(result.block_lists[0], vec![start, c, v, branch]);
    assert_eq!(result.block_lists[1], vec![left, r, use_both, left_end]);
    assert_eq!(result.node_to_block[v.index()], Some(b(0)));
    assert_eq!(result.node_to_block[r.index()], Some(b(1)));
    assert!(result.dead.is_empty());
}

#[test]
fn unused_nodes_are_dead() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let c = graph.add(Node::constant("c"));
    let unused = graph.add(Node::value("unused", [c]));
    let ret = graph.add(Node::ret(Some(c)));
    let cfg = make_cfg(&graph, &[&[start, ret]], &[]);

    let result = earliest(&graph, &cfg);
    assert_eq!(result.dead, vec![unused]);
    assert_eq!(result.node_to_block[unused.index()], None);
    assert_eq!(result.block_lists[0], vec![start, c, ret]);
}

/// Loop phis sit right after the loop header; their back-edge values are
/// resolved once the phi is reached.
#[test]
fn loop_phi_back_edge_values_are_resolved() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let entry_end = graph.add(Node::end());
    let header = graph.add(Node::loop_begin());
    let zero = graph.add(Node::constant("0"));
    let one = graph.add(Node::constant("1"));
    let i = graph.add(Node::phi(header, [zero]));
    let next = graph.add(Node::value("add", [i, one]));
    graph.add_input(i, next);
    let cond = graph.add(Node::value("lt", [i]));
    let branch = graph.add(Node::if_(cond, 0.9));
    let body = graph.add(Node::begin());
    let body_end = graph.add(Node::end());
    let exit = graph.add(Node::loop_exit());
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(
        &graph,
        &[
            &[start, entry_end],
            &[header, branch],
            &[body, body_end],
            &[exit, ret],
        ],
        &[(0, 1), (1, 2), (1, 3), (2, 1)],
    );

    let result = earliest(&graph, &cfg);
    assert_eq!(result.block_lists[0], vec![start, zero, one, entry_end]);
    assert_eq!(result.block_lists[1], vec![header, i, cond, next, branch]);
    assert_eq!(result.node_to_block[next.index()], Some(b(1)));
}

/// The result of an invoke only exists on its normal successor.
#[test]
fn invoke_results_move_to_the_normal_successor() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let call = graph.add(Node::invoke([]));
    let normal = graph.add(Node::begin());
    let result_use = graph.add(Node::value("use", [call]));
    let consume = graph.add(Node::sink([result_use]));
    let ret = graph.add(Node::ret(None));
    let unwind = graph.add(Node::begin());
    let deopt = graph.add(Node::deoptimize());
    let cfg = make_cfg(
        &graph,
        &[&[start, call], &[normal, consume, ret], &[unwind, deopt]],
        &[(0, 1), (0, 2)],
    );

    let result = earliest(&graph, &cfg);
    assert_eq!(result.block_lists[0], vec![start, call]);
    assert_eq!(result.block_lists[1], vec![normal, result_use, consume, ret]);
    assert_eq!(result.node_to_block[result_use.index()], Some(b(1)));
}

#[test]
fn floating_node_after_if_is_rejected() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let c = graph.add(Node::constant("c"));
    let branch = graph.add(Node::if_(c, 0.5));
    let after = graph.add(Node::value("after", [branch]));
    let left = graph.add(Node::begin());
    let consume = graph.add(Node::sink([after]));
    let left_ret = graph.add(Node::ret(None));
    let right = graph.add(Node::begin());
    let right_ret = graph.add(Node::ret(None));
    let cfg = make_cfg(
        &graph,
        &[
            &[start, branch],
            &[left, consume, left_ret],
            &[right, right_ret],
        ],
        &[(0, 1), (0, 2)],
    );

    let err = schedule_earliest(&graph, &cfg, &verifying(SchedulingStrategy::Earliest));
    assert_eq!(
        err.map(|_| ()),
        Err(ScheduleError::FloatingAfterSplit {
            split: branch,
            node: after,
        })
    );
}

#[test]
fn dependency_cycle_is_rejected() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let a = graph.add(Node::value("a", []));
    let c = graph.add(Node::value("c", [a]));
    graph.add_input(a, c);
    let ret = graph.add(Node::ret(Some(c)));
    let cfg = make_cfg(&graph, &[&[start, ret]], &[]);

    let err = schedule_earliest(&graph, &cfg, &verifying(SchedulingStrategy::Earliest));
    assert_eq!(err.map(|_| ()), Err(ScheduleError::DependencyCycle { node: c }));
}

#[test]
fn input_from_unplaced_fixed_node_is_rejected() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let orphan = graph.add(Node::sink([]));
    let v = graph.add(Node::value("v", [orphan]));
    let ret = graph.add(Node::ret(Some(v)));
    let cfg = make_cfg(&graph, &[&[start, ret]], &[]);

    let err = schedule_earliest(&graph, &cfg, &verifying(SchedulingStrategy::Earliest));
    assert_eq!(
        err.map(|_| ()),
        Err(ScheduleError::UnreachableInput {
            node: v,
            input: orphan,
        })
    );
}

/// Guards of the same micro-block: with guard ordering, high-priority
/// guards (and what they depend on) come first; without it, guards keep
/// their creation order.
#[test]
fn guards_are_ordered_by_priority() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let x = graph.add(Node::constant("x"));
    let y = graph.add(Node::constant("y"));
    let z = graph.add(Node::constant("z"));
    let low = graph.add(Node::guard(GuardPriority::Normal, [x]));
    let low2 = graph.add(Node::guard(GuardPriority::Normal, [z]));
    let high = graph.add(Node::guard(GuardPriority::Speculation, [low]));
    let high2 = graph.add(Node::guard(GuardPriority::Speculation, [y]));
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(&graph, &[&[start, ret]], &[]);

    let ordered = earliest_with(&graph, &cfg, SchedulingStrategy::EarliestWithGuardOrder);
    assert_eq!(
        ordered.block_lists[0],
        vec![start, x, low, high, y, high2, z, low2, ret]
    );

    let plain = earliest(&graph, &cfg);
    assert_eq!(
        plain.block_lists[0],
        vec![start, x, low, z, low2, high, y, high2, ret]
    );

    let mut config = verifying(SchedulingStrategy::EarliestWithGuardOrder);
    config.guard_priorities = false;
    let unordered = schedule_earliest(&graph, &cfg, &config).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(unordered.block_lists[0], plain.block_lists[0]);
}
