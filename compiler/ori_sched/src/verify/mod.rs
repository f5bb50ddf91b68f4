//! Independent checks of a finished schedule.
//!
//! The verifier recomputes nothing from the scheduling passes. It checks
//! the schedule against the graph and the CFG alone:
//!
//! - **Placement**: every scheduled node appears exactly once, in the block
//!   the node→block map names, and the fixed nodes of each block appear in
//!   CFG order with the terminator last.
//! - **Inputs**: a same-block input comes earlier; any other input's block
//!   dominates the user's block (for phis, the matching predecessor).
//! - **Loop exits**: with value proxies, no value defined inside a loop is
//!   used outside it except through a proxy.
//! - **Memory**: no read is separated from its memory anchor by an
//!   overlapping kill on any path.
//!
//! # Memory check
//!
//! Blocks are walked in reverse postorder, tracking the reads whose anchor
//! has executed but which have not executed yet. At a merge the incoming
//! set is the intersection over forward predecessors; a loop header also
//! drops reads the loop (or one of its memory phis) may kill. A kill drops
//! the reads it overlaps; a read that is no longer tracked when it executes
//! has been invalidated.

use ori_son::{
    BlockId, ControlFlowGraph, Graph, LocationIdentity, MemoryAccess, NodeId,
};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::error::ScheduleError;
use crate::schedule::Schedule;

/// Check every schedule invariant. Returns the first violation found.
pub fn verify_schedule(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    schedule: &Schedule,
) -> Result<(), ScheduleError> {
    let positions = position_map(graph, schedule)?;
    check_fixed_nodes(graph, cfg, schedule)?;
    check_inputs(graph, cfg, schedule, &positions)?;
    if graph.has_value_proxies() {
        check_loop_exits(graph, cfg, schedule, &positions)?;
    }
    check_memory(graph, cfg, schedule)?;

    tracing::debug!(
        strategy = %schedule.strategy(),
        nodes = schedule.len(),
        "schedule verified"
    );
    Ok(())
}

/// Block and index of every scheduled node.
type Positions = Vec<Option<(BlockId, usize)>>;

fn position_map(graph: &Graph, schedule: &Schedule) -> Result<Positions, ScheduleError> {
    let mut positions: Positions = vec![None; graph.len()];
    for (block, nodes) in schedule.blocks() {
        for (i, &node) in nodes.iter().enumerate() {
            let slot = positions
                .get_mut(node.index())
                .ok_or(ScheduleError::NodeNotScheduled { node })?;
            if slot.is_some() || schedule.block_of(node) != Some(block) {
                return Err(ScheduleError::NodeNotScheduled { node });
            }
            *slot = Some((block, i));
        }
    }
    if let Some(node) = graph
        .ids()
        .find(|&node| schedule.block_of(node).is_some() && positions[node.index()].is_none())
    {
        return Err(ScheduleError::NodeNotScheduled { node });
    }
    Ok(positions)
}

fn check_fixed_nodes(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    schedule: &Schedule,
) -> Result<(), ScheduleError> {
    for block in cfg.blocks() {
        let id = block.id();
        let nodes = schedule.nodes(id);
        let fixed: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&node| graph.node(node).is_fixed())
            .collect();
        if fixed != block.nodes() {
            let misplaced = block
                .nodes()
                .iter()
                .zip(&fixed)
                .find(|(expected, found)| expected != found)
                .map(|(_, &found)| found)
                .or_else(|| fixed.get(block.nodes().len()).copied())
                .unwrap_or(block.end_node());
            return Err(ScheduleError::FixedNodeMisplaced {
                node: misplaced,
                block: id,
            });
        }

        let end = block.end_node();
        let terminator = graph.node(end).control().is_some_and(|c| c.is_block_end());
        if terminator && nodes.last() != Some(&end) {
            return Err(ScheduleError::FixedNodeMisplaced { node: end, block: id });
        }
    }
    Ok(())
}

fn check_inputs(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    schedule: &Schedule,
    positions: &Positions,
) -> Result<(), ScheduleError> {
    for (block, nodes) in schedule.blocks() {
        for (i, &node) in nodes.iter().enumerate() {
            let input_blocks = input_blocks(graph, cfg, node, block);
            for (&input, use_block) in graph.inputs(node).iter().zip(input_blocks) {
                let Some((input_block, input_pos)) = positions[input.index()] else {
                    return Err(ScheduleError::NodeNotScheduled { node: input });
                };
                if use_block == block && input_block == block && !is_phi(graph, node) {
                    if input_pos >= i {
                        return Err(ScheduleError::InputNotScheduledBefore { node, input, block });
                    }
                } else if !cfg.dominates(input_block, use_block) {
                    return Err(ScheduleError::InputDoesNotDominate {
                        node,
                        input,
                        block: use_block,
                        input_block,
                    });
                }
            }
        }
    }
    Ok(())
}

fn is_phi(graph: &Graph, node: NodeId) -> bool {
    graph.node(node).phi_role().is_some()
}

/// For each input of `node`, the block the input must be available in:
/// the matching merge predecessor for phis, `block` otherwise.
fn input_blocks(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    node: NodeId,
    block: BlockId,
) -> SmallVec<[BlockId; 4]> {
    let count = graph.inputs(node).len();
    let preds = graph
        .node(node)
        .phi_role()
        .and_then(|phi| cfg.block_of(phi.merge))
        .map(|merge| cfg.block(merge).predecessors());
    (0..count)
        .map(|i| {
            preds
                .and_then(|preds| preds.get(i).copied())
                .unwrap_or(block)
        })
        .collect()
}

fn check_loop_exits(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    schedule: &Schedule,
    positions: &Positions,
) -> Result<(), ScheduleError> {
    for (block, nodes) in schedule.blocks() {
        for &node in nodes {
            let n = graph.node(node);
            if n.proxy_role().is_some() {
                continue;
            }
            let anchor = n.floating_read().and_then(|access| access.last_access);
            let input_blocks = input_blocks(graph, cfg, node, block);
            for (&input, use_block) in graph.inputs(node).iter().zip(input_blocks) {
                if graph.node(input).is_fixed() || Some(input) == anchor {
                    continue;
                }
                let Some((input_block, _)) = positions[input.index()] else {
                    continue;
                };
                let Some(lp) = cfg.block(input_block).loop_id() else {
                    continue;
                };
                if !cfg.loop_contains(lp, use_block) {
                    return Err(ScheduleError::LoopExitBypassed { node, input });
                }
            }
        }
    }
    Ok(())
}

/// A read whose memory anchor is tracked by the memory check.
fn tracked_read(graph: &Graph, node: NodeId) -> Option<&MemoryAccess> {
    graph
        .node(node)
        .floating_read()
        .filter(|access| access.location.is_mutable() && access.last_access.is_some())
}

fn read_location(graph: &Graph, read: NodeId) -> LocationIdentity {
    graph
        .node(read)
        .floating_read()
        .map_or(LocationIdentity::Immutable, |access| access.location)
}

fn check_memory(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    schedule: &Schedule,
) -> Result<(), ScheduleError> {
    let mut exit_sets: Vec<Option<FxHashSet<NodeId>>> = vec![None; cfg.blocks().len()];

    for &block_id in cfg.reverse_postorder() {
        let block = cfg.block(block_id);

        let mut live: Option<FxHashSet<NodeId>> = None;
        for &pred in block.predecessors() {
            if cfg.is_back_edge(pred, block_id) {
                continue;
            }
            let Some(incoming) = &exit_sets[pred.index()] else {
                continue;
            };
            match &mut live {
                None => live = Some(incoming.clone()),
                Some(current) => current.retain(|read| incoming.contains(read)),
            }
        }
        let mut live = live.unwrap_or_default();

        if block.is_loop_header() {
            let phi_locations: SmallVec<[LocationIdentity; 4]> = graph
                .phis(block.begin_node())
                .iter()
                .filter_map(|&phi| graph.node(phi).phi_role().and_then(|p| p.memory))
                .collect();
            let loop_kills = block.loop_id().map(|lp| cfg.loop_(lp).kills());
            live.retain(|&read| {
                let location = read_location(graph, read);
                !phi_locations.iter().any(|phi| phi.overlaps(location))
                    && !loop_kills.is_some_and(|kills| kills.can_kill(location))
            });
        }

        for &node in schedule.nodes(block_id) {
            if let Some(kill) = graph.node(node).memory_kill() {
                live.retain(|&read| !kill.kills(read_location(graph, read)));
            }
            for &usage in graph.usages(node) {
                let anchored_here = tracked_read(graph, usage)
                    .is_some_and(|access| access.last_access == Some(node));
                if anchored_here && schedule.block_of(usage).is_some() {
                    live.insert(usage);
                }
            }
            if tracked_read(graph, node).is_some() && !live.remove(&node) {
                return Err(ScheduleError::ReadAfterKill {
                    read: node,
                    block: block_id,
                });
            }
        }
        exit_sets[block_id.index()] = Some(live);
    }
    Ok(())
}
