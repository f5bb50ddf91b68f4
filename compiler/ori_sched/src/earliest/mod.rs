//! Earliest placement of floating nodes.
//!
//! The first scheduling pass. Every fixed node owns a micro-block, and
//! every floating node reachable from a fixed node is put in the
//! micro-block of its latest-computed input (see [`micro_block`]). The
//! result is the shallowest legal block for each node plus, per block, a
//! list that interleaves fixed nodes with the floating nodes computable
//! right after them.
//!
//! # Algorithm
//!
//! 1. Guards are resolved first (in priority buckets when guard ordering
//!    is on), then the inputs of every fixed node in reverse postorder.
//!    Resolution walks a node's data dependencies with an explicit stack
//!    of `(node, next input)` frames.
//! 2. A phi is pinned to its merge's micro-block without being appended to
//!    it; only its forward inputs are resolved, later. A proxy is pinned to
//!    its loop exit's micro-block and its value is resolved later.
//! 3. Loop phi back-edge values are resolved last, repeating until no
//!    newly reached loop phi remains.
//! 4. Floating nodes computed after a split move to the split's primary
//!    successor; a split without one must have nothing after it.
//! 5. Per-block lists are materialized: each fixed node, followed by its
//!    micro-block. Phis and proxies follow the begin node.
//!
//! Nodes never reached are dead and reported to the caller.

mod guard_order;
mod micro_block;

use ori_son::{BlockId, ControlFlowGraph, Graph, NodeId};

use self::micro_block::{MicroBlockId, MicroBlocks};
use crate::config::ScheduleConfig;
use crate::error::ScheduleError;

/// Output of the earliest pass.
#[derive(Debug)]
pub(crate) struct EarliestSchedule {
    /// Earliest block of every reached node.
    pub(crate) node_to_block: Vec<Option<BlockId>>,
    /// Per block: fixed nodes interleaved with their floating nodes.
    pub(crate) block_lists: Vec<Vec<NodeId>>,
    /// Live nodes not reachable from any fixed node.
    pub(crate) dead: Vec<NodeId>,
}

pub(crate) fn schedule_earliest(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    config: &ScheduleConfig,
) -> Result<EarliestSchedule, ScheduleError> {
    let order_guards = config.guard_priorities && config.strategy.orders_guards();

    let mut ctx = EarliestContext::new(graph, cfg);
    ctx.schedule_guards(order_guards)?;
    ctx.schedule_fixed_inputs()?;
    ctx.schedule_loop_phis()?;
    let dead = ctx.dead_nodes();
    ctx.move_past_splits()?;
    if order_guards {
        ctx.order_guards();
    }
    let result = ctx.materialize(dead);

    tracing::debug!(
        blocks = result.block_lists.len(),
        nodes = result.node_to_block.iter().flatten().count(),
        dead = result.dead.len(),
        "earliest schedule"
    );
    Ok(result)
}

/// A pending dependency walk step.
struct Frame {
    node: NodeId,
    next_input: usize,
}

struct EarliestContext<'a> {
    graph: &'a Graph,
    cfg: &'a ControlFlowGraph,
    micro_blocks: MicroBlocks,
    /// Micro-block of every reached node. Fixed nodes own theirs.
    node_micro: Vec<Option<MicroBlockId>>,
    on_stack: Vec<bool>,
    /// Deferred `(user, node)` resolutions: phi forward inputs, proxy values.
    deferred: Vec<(NodeId, NodeId)>,
    /// Micro-block of the start node.
    entry: Option<MicroBlockId>,
}

impl<'a> EarliestContext<'a> {
    fn new(graph: &'a Graph, cfg: &'a ControlFlowGraph) -> Self {
        let mut micro_blocks = MicroBlocks::default();
        let mut node_micro = vec![None; graph.len()];
        let mut entry = None;
        for &block in cfg.reverse_postorder() {
            for &fixed in cfg.block(block).nodes() {
                let mb = micro_blocks.create(block);
                entry.get_or_insert(mb);
                node_micro[fixed.index()] = Some(mb);
            }
        }
        Self {
            graph,
            cfg,
            micro_blocks,
            node_micro,
            on_stack: vec![false; graph.len()],
            deferred: Vec::new(),
            entry,
        }
    }

    #[inline]
    fn micro(&self, node: NodeId) -> Option<MicroBlockId> {
        self.node_micro[node.index()]
    }

    // ── Roots ───────────────────────────────────────────────────────

    fn schedule_guards(&mut self, by_priority: bool) -> Result<(), ScheduleError> {
        let graph = self.graph;
        let mut guards: Vec<NodeId> = graph.guards().collect();
        if by_priority {
            guards.sort_by_key(|&guard| (graph.node(guard).guard_role().map(|g| g.priority), guard));
        }
        for guard in guards {
            self.resolve(guard, guard)?;
        }
        Ok(())
    }

    fn schedule_fixed_inputs(&mut self) -> Result<(), ScheduleError> {
        let (graph, cfg) = (self.graph, self.cfg);
        for &block in cfg.reverse_postorder() {
            for &fixed in cfg.block(block).nodes() {
                for &input in graph.inputs(fixed) {
                    self.resolve(fixed, input)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve back-edge values of reached loop phis until no new loop phi
    /// is reached.
    fn schedule_loop_phis(&mut self) -> Result<(), ScheduleError> {
        let (graph, cfg) = (self.graph, self.cfg);
        let mut visited = vec![false; graph.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for &block_id in cfg.reverse_postorder() {
                let block = cfg.block(block_id);
                if !block.is_loop_header() {
                    continue;
                }
                for &phi in graph.phis(block.begin_node()) {
                    if self.micro(phi).is_none() || visited[phi.index()] {
                        continue;
                    }
                    visited[phi.index()] = true;
                    changed = true;
                    for (i, &pred) in block.predecessors().iter().enumerate() {
                        if !cfg.is_back_edge(pred, block_id) {
                            continue;
                        }
                        if let Some(&value) = graph.inputs(phi).get(i) {
                            self.resolve(phi, value)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ── Dependency walk ─────────────────────────────────────────────

    fn resolve(&mut self, user: NodeId, root: NodeId) -> Result<(), ScheduleError> {
        self.deferred.push((user, root));
        while let Some((user, node)) = self.deferred.pop() {
            self.resolve_one(user, node)?;
        }
        Ok(())
    }

    fn resolve_one(&mut self, user: NodeId, root: NodeId) -> Result<(), ScheduleError> {
        if self.micro(root).is_some() || !self.enter(user, root)? {
            return Ok(());
        }
        let graph = self.graph;
        self.on_stack[root.index()] = true;
        let mut stack = vec![Frame {
            node: root,
            next_input: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let node = frame.node;
            let inputs = graph.inputs(node);
            if let Some(&input) = inputs.get(frame.next_input) {
                frame.next_input += 1;
                if self.micro(input).is_none() && self.enter(node, input)? {
                    self.on_stack[input.index()] = true;
                    stack.push(Frame {
                        node: input,
                        next_input: 0,
                    });
                }
                continue;
            }

            stack.pop();
            self.on_stack[node.index()] = false;
            let target = inputs
                .iter()
                .filter_map(|&input| self.micro(input))
                .max()
                .or(self.entry);
            let Some(target) = target else {
                return Err(ScheduleError::UnreachableInput { node, input: node });
            };
            self.micro_blocks.push(target, node);
            self.node_micro[node.index()] = Some(target);
            tracing::trace!(node = %node, block = %self.micro_blocks.block(target), "earliest");
        }
        Ok(())
    }

    /// Prepare an unscheduled `node` reached from `user`. Pinned nodes are
    /// placed immediately; returns `true` when `node` needs a walk frame.
    fn enter(&mut self, user: NodeId, node: NodeId) -> Result<bool, ScheduleError> {
        let (graph, cfg) = (self.graph, self.cfg);
        let n = graph.node(node);
        if n.is_fixed() {
            return Err(ScheduleError::UnreachableInput { node: user, input: node });
        }

        if let Some(phi) = n.phi_role() {
            let (Some(mb), Some(merge_block)) = (self.micro(phi.merge), cfg.block_of(phi.merge))
            else {
                return Err(ScheduleError::UnreachableInput {
                    node,
                    input: phi.merge,
                });
            };
            self.node_micro[node.index()] = Some(mb);
            let preds = cfg.block(merge_block).predecessors();
            for (i, &value) in graph.inputs(node).iter().enumerate() {
                let back_edge = preds
                    .get(i)
                    .is_some_and(|&pred| cfg.is_back_edge(pred, merge_block));
                if !back_edge {
                    self.deferred.push((node, value));
                }
            }
            return Ok(false);
        }

        if let Some(proxy) = n.proxy_role() {
            let Some(mb) = self.micro(proxy.loop_exit) else {
                return Err(ScheduleError::UnreachableInput {
                    node,
                    input: proxy.loop_exit,
                });
            };
            self.node_micro[node.index()] = Some(mb);
            self.deferred.extend(graph.inputs(node).iter().map(|&value| (node, value)));
            return Ok(false);
        }

        if self.on_stack[node.index()] {
            return Err(ScheduleError::DependencyCycle { node });
        }
        Ok(true)
    }

    // ── Post-processing ─────────────────────────────────────────────

    fn dead_nodes(&self) -> Vec<NodeId> {
        self.graph
            .ids()
            .filter(|&node| self.micro(node).is_none())
            .collect()
    }

    /// Move floating nodes computed after a split into its primary
    /// successor.
    fn move_past_splits(&mut self) -> Result<(), ScheduleError> {
        let (graph, cfg) = (self.graph, self.cfg);
        for &block_id in cfg.reverse_postorder() {
            let block = cfg.block(block_id);
            let split = block.end_node();
            let Some(control) = graph.node(split).control().filter(|c| c.is_split()) else {
                continue;
            };
            let Some(mb) = self.micro(split) else {
                continue;
            };
            if self.micro_blocks.is_empty(mb) {
                continue;
            }

            let target = control
                .primary_successor()
                .and_then(|i| block.successors().get(i))
                .and_then(|&succ| self.micro(cfg.block(succ).begin_node()));
            let moved: Vec<NodeId> = self.micro_blocks.nodes(mb).collect();
            let Some(target) = target else {
                return Err(ScheduleError::FloatingAfterSplit {
                    split,
                    node: moved[0],
                });
            };
            for &node in &moved {
                self.node_micro[node.index()] = Some(target);
            }
            self.micro_blocks.prepend_into(mb, target);
            tracing::trace!(split = %split, moved = moved.len(), "moved past split");
        }
        Ok(())
    }

    fn order_guards(&mut self) {
        let graph = self.graph;
        let ids: Vec<MicroBlockId> = self.micro_blocks.ids().collect();
        for mb in ids {
            let nodes: Vec<NodeId> = self.micro_blocks.nodes(mb).collect();
            if !nodes.iter().any(|&node| graph.node(node).guard_role().is_some()) {
                continue;
            }
            if let Some(sorted) = guard_order::resort_guards(graph, &nodes) {
                self.micro_blocks.replace(mb, &sorted);
            }
        }
    }

    fn materialize(self, dead: Vec<NodeId>) -> EarliestSchedule {
        let graph = self.graph;
        let mut node_to_block = vec![None; graph.len()];
        let mut block_lists = Vec::with_capacity(self.cfg.blocks().len());

        for block in self.cfg.blocks() {
            let mut list = Vec::new();
            for &fixed in block.nodes() {
                list.push(fixed);
                if fixed == block.begin_node() {
                    let pinned = graph.phis(fixed).iter().chain(graph.proxies(fixed));
                    list.extend(pinned.filter(|&&node| self.micro(node).is_some()));
                }
                if let Some(mb) = self.micro(fixed) {
                    list.reserve(self.micro_blocks.len(mb));
                    list.extend(self.micro_blocks.nodes(mb));
                }
            }
            for &node in &list {
                node_to_block[node.index()] = Some(block.id());
            }
            block_lists.push(list);
        }

        EarliestSchedule {
            node_to_block,
            block_lists,
            dead,
        }
    }
}

#[cfg(test)]
mod tests;
