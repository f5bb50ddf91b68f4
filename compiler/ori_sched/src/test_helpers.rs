//! Shared test utilities for the scheduling passes.
//!
//! Graph construction goes through `ori_son`'s node shorthands; these
//! helpers cover the CFG wiring and running the phase with the verifier
//! on. Only compiled in test builds.

use ori_son::{BlockId, CfgBuilder, ControlFlowGraph, Graph, LocationIdentity, NodeId};

use crate::config::{ScheduleConfig, SchedulingStrategy};
use crate::error::ScheduleError;
use crate::phase::SchedulePhase;
use crate::schedule::Schedule;

pub(crate) const F1: LocationIdentity = LocationIdentity::Field(1);
pub(crate) const F2: LocationIdentity = LocationIdentity::Field(2);

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Build a CFG from block contents (block `i` is `blocks[i]`) and
/// `(from, to)` edges, added in order.
pub(crate) fn make_cfg(
    graph: &Graph,
    blocks: &[&[NodeId]],
    edges: &[(u32, u32)],
) -> ControlFlowGraph {
    let mut builder = CfgBuilder::new();
    for nodes in blocks {
        builder.add_block(nodes.iter().copied());
    }
    for &(from, to) in edges {
        builder.add_edge(b(from), b(to));
    }
    builder.build(graph).unwrap_or_else(|e| panic!("{e}"))
}

/// Default configuration for `strategy`, with the verifier on.
pub(crate) fn verifying(strategy: SchedulingStrategy) -> ScheduleConfig {
    ScheduleConfig {
        verify: true,
        ..ScheduleConfig::with_strategy(strategy)
    }
}

/// Schedule without mutating the graph; the verifier runs.
pub(crate) fn try_schedule(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    strategy: SchedulingStrategy,
) -> Result<Schedule, ScheduleError> {
    SchedulePhase::new(verifying(strategy)).run_immutable(graph, cfg)
}

/// [`try_schedule`], panicking on failure.
pub(crate) fn schedule(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    strategy: SchedulingStrategy,
) -> Schedule {
    try_schedule(graph, cfg, strategy).unwrap_or_else(|e| panic!("{strategy}: {e}"))
}

/// Index of `node` within its block's order.
pub(crate) fn position(schedule: &Schedule, node: NodeId) -> usize {
    let block = schedule
        .block_of(node)
        .unwrap_or_else(|| panic!("{node} is not scheduled"));
    schedule
        .nodes(block)
        .iter()
        .position(|&n| n == node)
        .unwrap_or_else(|| panic!("{node} is missing from {block}"))
}
