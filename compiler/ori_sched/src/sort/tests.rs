use ori_son::{LocationIdentity, Node};
use pretty_assertions::assert_eq;

use super::*;
use crate::config::SchedulingStrategy::{Latest, LatestOutOfLoops};
use crate::test_helpers::{b, make_cfg, schedule, F1, F2};

/// Inputs are pulled in depth first just ahead of their first usage.
#[test]
fn inputs_precede_their_usages() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let c = graph.add(Node::constant("c"));
    let v1 = graph.add(Node::value("v1", [c]));
    let v2 = graph.add(Node::value("v2", [v1]));
    let v3 = graph.add(Node::value("v3", [v2, c]));
    let consume = graph.add(Node::sink([v3]));
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(&graph, &[&[start, consume, ret]], &[]);

    let late = schedule(&graph, &cfg, Latest);
    assert_eq!(late.nodes(b(0)), &[start, c, v1, v2, v3, consume, ret]);
}

/// A read of `F1` is emitted just before the write to `F1`; a read of `F2`
/// is free to wait for its usage.
#[test]
fn watched_reads_precede_the_kill() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let p = graph.add(Node::constant("p"));
    let killed = graph.add(Node::read(F1, p, Some(start), []));
    let untouched = graph.add(Node::read(F2, p, Some(start), []));
    let store = graph.add(Node::write(F1, []));
    let consume = graph.add(Node::sink([killed, untouched]));
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(&graph, &[&[start, store, consume, ret]], &[]);

    let late = schedule(&graph, &cfg, Latest);
    assert_eq!(
        late.nodes(b(0)),
        &[start, p, killed, store, untouched, consume, ret]
    );
}

/// Phis come right after their merge and proxies right after their loop
/// exit; the loop's back-edge value sinks into the body.
#[test]
fn phis_and_proxies_follow_their_begin() {
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
    let result = graph.add(Node::proxy(exit, i));
    let ret = graph.add(Node::ret(Some(result)));
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

    let late = schedule(&graph, &cfg, LatestOutOfLoops);
    assert_eq!(late.nodes(b(0)), &[start, zero, one, entry_end]);
    assert_eq!(late.nodes(b(1)), &[header, i, cond, branch]);
    assert_eq!(late.nodes(b(2)), &[body, next, body_end]);
    assert_eq!(late.nodes(b(3)), &[exit, result, ret]);
}

/// A call that may write anything.
fn clobber_any() -> Node {
    Node::fixed(ControlKind::Plain, "Clobber").with_kill(MemoryKill::Single(LocationIdentity::Any))
}

#[test]
fn any_kill_flushes_every_watched_read() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let p = graph.add(Node::constant("p"));
    let first = graph.add(Node::read(F1, p, Some(start), []));
    let second = graph.add(Node::read(F2, p, Some(start), []));
    let call = graph.add(clobber_any());
    let consume = graph.add(Node::sink([first, second]));
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(&graph, &[&[start, call, consume, ret]], &[]);

    let late = schedule(&graph, &cfg, Latest);
    assert_eq!(
        late.nodes(b(0)),
        &[start, p, first, second, call, consume, ret]
    );
}

/// Only the reads whose locations the kill lists are emitted ahead of it.
#[test]
fn multi_kill_flushes_the_reads_it_overlaps() {
    let f3 = LocationIdentity::Field(3);
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let p = graph.add(Node::constant("p"));
    let first = graph.add(Node::read(F1, p, Some(start), []));
    let second = graph.add(Node::read(F2, p, Some(start), []));
    let third = graph.add(Node::read(f3, p, Some(start), []));
    let clobber = graph.add(
        Node::fixed(ControlKind::Plain, "Clobber")
            .with_kill(MemoryKill::Multi([F1, f3].into_iter().collect())),
    );
    let consume = graph.add(Node::sink([first, second, third]));
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(&graph, &[&[start, clobber, consume, ret]], &[]);

    let late = schedule(&graph, &cfg, Latest);
    assert_eq!(
        late.nodes(b(0)),
        &[start, p, first, third, clobber, second, consume, ret]
    );
}

/// A read sunk from `B0` into the arm that calls out is emitted before
/// the call.
#[test]
fn sunk_read_precedes_an_any_kill() {
    let mut graph = Graph::new();
    let start = graph.add(Node::start());
    let c = graph.add(Node::constant("c"));
    let branch = graph.add(Node::if_(c, 0.5));
    let p = graph.add(Node::constant("p"));
    let read = graph.add(Node::read(F1, p, Some(start), []));
    let left = graph.add(Node::begin());
    let call = graph.add(clobber_any());
    let use_read = graph.add(Node::sink([read]));
    let left_end = graph.add(Node::end());
    let right = graph.add(Node::begin());
    let right_end = graph.add(Node::end());
    let merge = graph.add(Node::merge());
    let ret = graph.add(Node::ret(None));
    let cfg = make_cfg(
        &graph,
        &[
            &[start, branch],
            &[left, call, use_read, left_end],
            &[right, right_end],
            &[merge, ret],
        ],
        &[(0, 1), (0, 2), (1, 3), (2, 3)],
    );

    let late = schedule(&graph, &cfg, Latest);
    assert_eq!(late.block_of(read), Some(b(1)));
    assert_eq!(late.nodes(b(1)), &[left, p, read, call, use_read, left_end]);
}
