//! Latest placement of floating nodes.
//!
//! The second pass for the latest strategies. Each floating node moves
//! from its earliest block down to the common dominator of its usages,
//! then back up as far as memory ordering, loop hoisting and implicit null
//! checks require.
//!
//! Blocks are visited in postorder and each earliest list back to front,
//! so every usage has its final block before the node it uses.
//!
//! # Memory reads
//!
//! A read may not sink past a kill of its location. The dominator chain
//! between the earliest and the candidate block is checked with the
//! per-block, per-loop and between-block kill summaries of the CFG. A read
//! may still end up in a block that kills its location; it is then put on
//! that block's watch list so the sorter emits it ahead of the kill.

use ori_son::{BlockId, ControlFlowGraph, ControlKind, Graph, LocationIdentity, NodeId};

use crate::config::ScheduleConfig;
use crate::earliest::EarliestSchedule;
use crate::error::ScheduleError;

#[derive(Debug)]
pub(crate) struct LatestSchedule {
    /// Final block of every scheduled node.
    pub(crate) node_to_block: Vec<Option<BlockId>>,
    /// Floating nodes per final block, in processing order.
    pub(crate) buckets: Vec<Vec<NodeId>>,
    /// Reads moved into a block that can kill their location.
    pub(crate) watch_lists: Vec<Vec<NodeId>>,
}

pub(crate) fn schedule_latest(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    earliest: &EarliestSchedule,
    config: &ScheduleConfig,
) -> Result<LatestSchedule, ScheduleError> {
    let blocks = cfg.blocks().len();
    let mut ctx = LatestContext {
        graph,
        cfg,
        config,
        node_to_block: earliest.node_to_block.clone(),
        buckets: vec![Vec::new(); blocks],
        watch_lists: vec![Vec::new(); blocks],
        moved: 0,
    };

    for &block in cfg.reverse_postorder().iter().rev() {
        for &node in earliest.block_lists[block.index()].iter().rev() {
            let n = graph.node(node);
            if n.is_fixed() || n.is_pinned() {
                continue;
            }
            ctx.schedule_node(node, block)?;
        }
    }

    tracing::debug!(
        strategy = %config.strategy,
        moved = ctx.moved,
        "latest schedule"
    );
    Ok(LatestSchedule {
        node_to_block: ctx.node_to_block,
        buckets: ctx.buckets,
        watch_lists: ctx.watch_lists,
    })
}

struct LatestContext<'a> {
    graph: &'a Graph,
    cfg: &'a ControlFlowGraph,
    config: &'a ScheduleConfig,
    node_to_block: Vec<Option<BlockId>>,
    buckets: Vec<Vec<NodeId>>,
    watch_lists: Vec<Vec<NodeId>>,
    moved: usize,
}

impl LatestContext<'_> {
    fn schedule_node(&mut self, node: NodeId, earliest: BlockId) -> Result<(), ScheduleError> {
        let (graph, cfg) = (self.graph, self.cfg);
        let n = graph.node(node);
        let mutable_read = n
            .floating_read()
            .map(|access| access.location)
            .filter(|location| location.is_mutable());

        let pinned = n.is_virtual_state()
            || cfg.block(earliest).dominated().is_empty()
            || mutable_read.is_some_and(|location| cfg.block(earliest).can_kill(location));

        let latest = match self.usage_block(node) {
            Some(latest) if !pinned => {
                if !cfg.dominates(earliest, latest) {
                    return Err(ScheduleError::LatestNotDominated {
                        node,
                        earliest,
                        latest,
                    });
                }
                self.select_latest(node, mutable_read, earliest, latest)
            }
            _ => earliest,
        };

        if latest != earliest {
            self.moved += 1;
        }
        tracing::trace!(node = %node, earliest = %earliest, latest = %latest, "latest");

        self.node_to_block[node.index()] = Some(latest);
        self.buckets[latest.index()].push(node);
        if let Some(location) = mutable_read {
            if latest != earliest && cfg.block(latest).can_kill(location) {
                self.watch_lists[latest.index()].push(node);
            }
        }
        Ok(())
    }

    /// Common dominator of the blocks where `node` is used.
    fn usage_block(&self, node: NodeId) -> Option<BlockId> {
        let (graph, cfg) = (self.graph, self.cfg);
        let mut result: Option<BlockId> = None;
        let mut add = |block: BlockId| {
            result = Some(result.map_or(block, |current| cfg.common_dominator(current, block)));
        };

        for &usage in graph.usages(node) {
            let u = graph.node(usage);
            if !u.is_fixed() && self.node_to_block[usage.index()].is_none() {
                continue;
            }
            if let Some(phi) = u.phi_role() {
                // The value flows in from the predecessor at each index
                // where it appears.
                let Some(merge) = cfg.block_of(phi.merge) else {
                    continue;
                };
                let preds = cfg.block(merge).predecessors();
                for (i, &input) in graph.inputs(usage).iter().enumerate() {
                    if input == node {
                        if let Some(&pred) = preds.get(i) {
                            add(pred);
                        }
                    }
                }
            } else if let Some(proxy) = u.proxy_role() {
                if let Some(exit) = cfg.block_of(proxy.loop_exit) {
                    add(exit);
                }
            } else if let Some(control) = u.control() {
                let Some(block) = cfg.block_of(usage) else {
                    continue;
                };
                if control.is_begin() {
                    add(cfg.block(block).dominator().unwrap_or(block));
                } else {
                    add(block);
                }
            } else if let Some(block) = self.node_to_block[usage.index()] {
                add(block);
            }
        }
        result
    }

    fn select_latest(
        &self,
        node: NodeId,
        mutable_read: Option<LocationIdentity>,
        earliest: BlockId,
        mut latest: BlockId,
    ) -> BlockId {
        let (graph, cfg) = (self.graph, self.cfg);
        let strategy = self.config.strategy;

        if let Some(location) = mutable_read {
            if latest != earliest {
                latest = check_kills_between(cfg, earliest, latest, location);
            }
        }

        if strategy.considers_loops() && latest != earliest {
            latest = self.hoist_out_of_loops(earliest, latest);
        }

        if strategy.considers_implicit_null_checks()
            && latest != earliest
            && is_implicit_null_opportunity(graph, cfg, self.config, node, earliest)
            && cfg.block(earliest).frequency()
                < cfg.block(latest).frequency() * self.config.implicit_null_check_frequency_ratio
        {
            tracing::trace!(node = %node, block = %earliest, "kept at implicit null check");
            latest = earliest;
        }
        latest
    }

    /// Walk up from `latest` towards `earliest`, moving to a loop's
    /// preheader whenever it runs less often (or unconditionally when
    /// values leave loops through proxies).
    fn hoist_out_of_loops(&self, earliest: BlockId, mut latest: BlockId) -> BlockId {
        let cfg = self.cfg;
        let earliest_block = cfg.block(earliest);
        let value_proxies = self.graph.has_value_proxies();

        let mut current = latest;
        while cfg.block(current).loop_depth() > earliest_block.loop_depth()
            && Some(current) != earliest_block.dominator()
        {
            let previous = current;
            let Some(dominator) = cfg.block(current).dominator() else {
                break;
            };
            current = dominator;
            if cfg.block(previous).is_loop_header()
                && (cfg.block(current).frequency() < cfg.block(latest).frequency()
                    || value_proxies)
            {
                latest = current;
            }
        }
        latest
    }
}

/// The deepest block on the dominator chain from `earliest` to `latest`
/// that a read of `location` can be placed in without crossing a kill.
fn check_kills_between(
    cfg: &ControlFlowGraph,
    earliest: BlockId,
    latest: BlockId,
    location: LocationIdentity,
) -> BlockId {
    debug_assert!(cfg.strictly_dominates(earliest, latest));

    // Blocks from `latest` upwards. A block that kills the location can
    // still hold the read (ahead of the kill), but nothing below it can.
    let mut chain = vec![latest];
    let mut current = cfg.block(latest).dominator();
    while let Some(block) = current {
        if block == earliest {
            break;
        }
        if cfg.block(block).can_kill(location) {
            chain.clear();
        }
        chain.push(block);
        current = cfg.block(block).dominator();
    }

    let mut last = earliest;
    for &block_id in chain.iter().rev() {
        let block = cfg.block(block_id);
        if block.loop_depth() > cfg.block(last).loop_depth() {
            // Entering a loop: the loop must not kill the location.
            let loop_kills = block
                .loop_id()
                .is_some_and(|lp| cfg.loop_(lp).can_kill(location));
            if loop_kills {
                break;
            }
        }
        if block.can_kill_between_this_and_dominator(location) {
            break;
        }
        last = block_id;
    }

    let last_block = cfg.block(last);
    if last != earliest && last_block.begin_kills().can_kill(location) {
        last = last_block.dominator().unwrap_or(earliest);
    }
    last
}

/// Can `read` in `block` double as the null check guarding `block`?
///
/// True when `block` is the non-null successor of an `If` testing the
/// read's base for null, and the null edge is (almost) never taken.
pub(crate) fn is_implicit_null_opportunity(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    config: &ScheduleConfig,
    read: NodeId,
    block: BlockId,
) -> bool {
    let Some(base) = graph.node(read).floating_read().and_then(|access| access.base) else {
        return false;
    };
    let &[pred] = cfg.block(block).predecessors() else {
        return false;
    };
    let pred_block = cfg.block(pred);
    let branch = pred_block.end_node();
    let Some(ControlKind::If { true_probability }) = graph.node(branch).control() else {
        return false;
    };
    if pred_block.successors().get(1) != Some(&block)
        || true_probability > config.null_check_probability_threshold
    {
        return false;
    }
    let Some(&condition) = graph.inputs(branch).first() else {
        return false;
    };
    if !graph.node(condition).is_null_test() {
        return false;
    }
    graph
        .inputs(condition)
        .first()
        .is_some_and(|&tested| graph.unproxify(tested) == graph.unproxify(base))
}
