//! Ordering of nodes within each final block.
//!
//! The sorter follows the block's earliest list so fixed nodes keep their
//! program order. Emitting any node first emits its unemitted same-block
//! floating inputs, depth first. Reads that must precede a kill sit on a
//! watch list and are emitted just before the first overlapping kill.
//! Everything else assigned to the block is appended before the
//! terminator.

use ori_son::{Block, BlockId, ControlFlowGraph, ControlKind, Graph, MemoryKill, NodeId};

use crate::config::ScheduleConfig;
use crate::earliest::EarliestSchedule;
use crate::latest::{is_implicit_null_opportunity, LatestSchedule};

pub(crate) fn sort_blocks(
    graph: &Graph,
    cfg: &ControlFlowGraph,
    earliest: &EarliestSchedule,
    latest: &LatestSchedule,
    config: &ScheduleConfig,
) -> Vec<Vec<NodeId>> {
    let mut sorter = BlockSorter {
        graph,
        cfg,
        config,
        earliest,
        latest,
        emitted: vec![false; graph.len()],
    };
    cfg.blocks()
        .iter()
        .map(|block| sorter.sort_block(block))
        .collect()
}

struct BlockSorter<'a> {
    graph: &'a Graph,
    cfg: &'a ControlFlowGraph,
    config: &'a ScheduleConfig,
    earliest: &'a EarliestSchedule,
    latest: &'a LatestSchedule,
    emitted: Vec<bool>,
}

impl BlockSorter<'_> {
    fn sort_block(&mut self, block: &Block) -> Vec<NodeId> {
        let (graph, earliest, latest) = (self.graph, self.earliest, self.latest);
        let id = block.id();
        let mut order = Vec::with_capacity(latest.buckets[id.index()].len() + block.nodes().len());

        let begin = block.begin_node();
        self.emit(begin, id, &mut order);
        for &phi in graph.phis(begin) {
            if self.block_of(phi) == Some(id) {
                self.mark(phi, &mut order);
            }
        }
        for &proxy in graph.proxies(begin) {
            if self.block_of(proxy) != Some(id) {
                continue;
            }
            if let Some(&value) = graph.inputs(proxy).first() {
                if self.is_pullable(value, id) {
                    self.emit(value, id, &mut order);
                }
            }
            self.mark(proxy, &mut order);
        }

        let end = block.end_node();
        let terminator = graph
            .node(end)
            .control()
            .is_some_and(ControlKind::is_block_end);
        let mut watch = latest.watch_lists[id.index()].clone();

        for &node in &earliest.block_lists[id.index()] {
            if self.emitted[node.index()] {
                continue;
            }
            let n = graph.node(node);
            if n.is_fixed() {
                if node == end && terminator {
                    continue;
                }
                if let Some(kill) = n.memory_kill() {
                    self.check_watch_list(kill, &mut watch, id, &mut order);
                }
                self.emit(node, id, &mut order);
            } else if let Some(access) = n.floating_read() {
                if self.block_of(node) != Some(id) {
                    continue;
                }
                let implicit_null_check = self.config.strategy.considers_implicit_null_checks()
                    && is_implicit_null_opportunity(graph, self.cfg, self.config, node, id);
                if implicit_null_check {
                    self.emit(node, id, &mut order);
                } else if block.can_kill(access.location) {
                    watch.push(node);
                }
            }
        }

        for &node in latest.buckets[id.index()].iter().rev() {
            if node != end {
                self.emit(node, id, &mut order);
            }
        }
        if terminator {
            self.emit(end, id, &mut order);
        }
        order
    }

    /// Emit the watched reads that `kill` invalidates.
    fn check_watch_list(
        &mut self,
        kill: &MemoryKill,
        watch: &mut Vec<NodeId>,
        block: BlockId,
        order: &mut Vec<NodeId>,
    ) {
        let graph = self.graph;
        let (hit, keep): (Vec<NodeId>, Vec<NodeId>) = watch.iter().partition(|&&read| {
            graph
                .node(read)
                .floating_read()
                .is_some_and(|access| kill.kills(access.location))
        });
        *watch = keep;
        for read in hit {
            self.emit(read, block, order);
        }
    }

    #[inline]
    fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.latest.node_to_block[node.index()]
    }

    /// Unemitted floating node of `block` that may be pulled in as an input.
    fn is_pullable(&self, node: NodeId, block: BlockId) -> bool {
        let n = self.graph.node(node);
        !self.emitted[node.index()]
            && n.is_floating()
            && !n.is_pinned()
            && self.block_of(node) == Some(block)
    }

    fn mark(&mut self, node: NodeId, order: &mut Vec<NodeId>) {
        if !self.emitted[node.index()] {
            self.emitted[node.index()] = true;
            order.push(node);
        }
    }

    /// Emit `root` after its pullable inputs.
    fn emit(&mut self, root: NodeId, block: BlockId, order: &mut Vec<NodeId>) {
        if self.emitted[root.index()] {
            return;
        }
        let graph = self.graph;
        // (node, next input)
        let mut stack = vec![(root, 0usize)];
        while let Some((node, next_input)) = stack.last_mut() {
            let node = *node;
            if let Some(&input) = graph.inputs(node).get(*next_input) {
                *next_input += 1;
                if self.is_pullable(input, block) {
                    stack.push((input, 0));
                }
                continue;
            }
            stack.pop();
            self.mark(node, order);
        }
    }
}

#[cfg(test)]
mod tests;
