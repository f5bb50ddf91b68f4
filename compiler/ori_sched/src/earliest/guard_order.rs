//! Priority ordering of guards within a micro-block.
//!
//! A guard's priority is propagated to every node of the same micro-block
//! it transitively depends on (keeping the highest priority seen), so a
//! high-priority guard pulls its inputs forward with it. The micro-block is
//! then topologically re-sorted, always picking the ready node with the
//! smallest `(propagated priority, own priority, node id)` key.

use std::collections::BTreeSet;

use ori_son::{GuardPriority, Graph, NodeId};
use rustc_hash::FxHashMap;

/// Sort key rank: higher priorities first, non-guards last.
fn rank(priority: Option<GuardPriority>) -> u8 {
    priority.map_or(u8::MAX, |p| p as u8)
}

/// Re-sort `nodes` (one micro-block, in dependency order) by guard
/// priority. Returns `None` when every guard has the same priority and the
/// order is left as is.
pub(super) fn resort_guards(graph: &Graph, nodes: &[NodeId]) -> Option<Vec<NodeId>> {
    let own: Vec<Option<GuardPriority>> = nodes
        .iter()
        .map(|&node| graph.node(node).guard_role().map(|g| g.priority))
        .collect();
    let mut distinct = own.iter().flatten();
    let first = distinct.next()?;
    if distinct.all(|p| p == first) {
        return None;
    }

    let position: FxHashMap<NodeId, usize> =
        nodes.iter().enumerate().map(|(i, &node)| (node, i)).collect();

    // Usages always follow their inputs, so one backward sweep propagates
    // transitively.
    let mut propagated = own.clone();
    for i in (0..nodes.len()).rev() {
        let Some(priority) = propagated[i] else {
            continue;
        };
        for input in graph.inputs(nodes[i]) {
            if let Some(&j) = position.get(input) {
                propagated[j] = Some(propagated[j].map_or(priority, |p| p.min(priority)));
            }
        }
    }

    let mut pending = vec![0usize; nodes.len()];
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, &node) in nodes.iter().enumerate() {
        let mut seen = Vec::new();
        for input in graph.inputs(node) {
            if let Some(&j) = position.get(input) {
                if !seen.contains(&j) {
                    seen.push(j);
                    pending[i] += 1;
                    users[j].push(i);
                }
            }
        }
    }

    let key = |i: usize| (rank(propagated[i]), rank(own[i]), nodes[i]);
    let mut ready: BTreeSet<(u8, u8, NodeId)> = (0..nodes.len())
        .filter(|&i| pending[i] == 0)
        .map(key)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.pop_first() {
        let node = next.2;
        order.push(node);
        let Some(&i) = position.get(&node) else {
            continue;
        };
        for &user in &users[i] {
            pending[user] -= 1;
            if pending[user] == 0 {
                ready.insert(key(user));
            }
        }
    }

    debug_assert_eq!(order.len(), nodes.len(), "cycle inside a micro-block");
    (order.len() == nodes.len()).then_some(order)
}
