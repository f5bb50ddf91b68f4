//! Control-flow graph over the fixed nodes of a [`Graph`].
//!
//! A [`ControlFlowGraph`] is built by [`CfgBuilder`] from an explicit list
//! of blocks (each a run of fixed nodes, begin node first) and edges. On
//! build it validates the description and computes:
//!
//! - reverse postorder over the reachable blocks,
//! - the dominator tree (immediate dominator, children, depth),
//! - natural loops with nesting, and each block's innermost loop,
//! - relative block frequencies from branch probabilities and local loop
//!   frequencies,
//! - memory kill summaries: per block, per loop, and for the region
//!   strictly between each block and its immediate dominator.
//!
//! # Algorithm
//!
//! Dominators use the Cooper-Harvey-Kennedy iterative algorithm over
//! reverse postorder. A back edge is an edge whose target dominates its
//! source; the natural loop of a header is the header plus every block
//! that reaches one of its back edges without passing through the header.
//!
//! The between-summary of a block `b` with dominator `d` unions, for each
//! forward predecessor `p`, the kills of `p` and of every block on the
//! dominator chain from `p` up to (excluding) `d`, reusing the summaries
//! already computed for those blocks. Loop headers also include everything
//! their loop kills.
//!
//! # References
//!
//! - Cooper, Harvey, Kennedy: "A Simple, Fast Dominance Algorithm" (2001)

use std::fmt;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::graph::Graph;
use crate::location::{KillSet, LocationIdentity};
use crate::node::{ControlKind, NodeId};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Block ID within a [`ControlFlowGraph`]. The entry block is always 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Loop ID. Loops are numbered in reverse postorder of their headers, so
/// an outer loop always has a smaller ID than the loops nested in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LoopId(u32);

impl LoopId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "block counts fit in u32"
)]
fn block_id(idx: usize) -> BlockId {
    BlockId::new(idx as u32)
}

// ── Errors ──────────────────────────────────────────────────────────

/// A block description that does not form a valid control-flow graph.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CfgError {
    #[error("block {0} has no nodes")]
    EmptyBlock(BlockId),
    #[error("block {block} lists {node}, which is not a live node of the graph")]
    UnknownNode { block: BlockId, node: NodeId },
    #[error("block {block} lists floating node {node}")]
    NotFixed { block: BlockId, node: NodeId },
    #[error("{0} is listed in more than one block")]
    NodeInMultipleBlocks(NodeId),
    #[error("block {block} starts with {node}, which is not a begin node")]
    BeginNotFirst { block: BlockId, node: NodeId },
    #[error("{node} in block {block} is a begin or terminator in the wrong position")]
    MisplacedControl { block: BlockId, node: NodeId },
    #[error("invalid edge {from} -> {to}")]
    InvalidEdge { from: BlockId, to: BlockId },
    #[error("block {block} ends in a node expecting {expected} successors, found {found}")]
    SuccessorCount {
        block: BlockId,
        expected: usize,
        found: usize,
    },
    #[error("phi {phi} has {found} inputs, its merge has {expected} predecessors")]
    PhiArity {
        phi: NodeId,
        expected: usize,
        found: usize,
    },
    #[error("block {0} is not reachable from the entry")]
    UnreachableBlock(BlockId),
}

// ── Blocks and loops ────────────────────────────────────────────────

/// A basic block: a maximal run of fixed nodes.
#[derive(Clone, Debug)]
pub struct Block {
    id: BlockId,
    nodes: Vec<NodeId>,
    predecessors: SmallVec<[BlockId; 2]>,
    successors: SmallVec<[BlockId; 2]>,
    dominator: Option<BlockId>,
    dominated: Vec<BlockId>,
    dominator_depth: u32,
    loop_id: Option<LoopId>,
    loop_depth: u32,
    is_loop_header: bool,
    frequency: f64,
    kills: KillSet,
    begin_kills: KillSet,
    kills_between: KillSet,
}

impl Block {
    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Fixed nodes in program order.
    #[inline]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    #[inline]
    pub fn begin_node(&self) -> NodeId {
        self.nodes[0]
    }

    #[inline]
    pub fn end_node(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    /// Predecessors in phi input order.
    #[inline]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Successors in edge order; for an `If`, successor 0 is the true edge.
    #[inline]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Immediate dominator; `None` for the entry block.
    #[inline]
    pub fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    /// Blocks immediately dominated by this one, in ID order.
    #[inline]
    pub fn dominated(&self) -> &[BlockId] {
        &self.dominated
    }

    #[inline]
    pub fn dominator_depth(&self) -> u32 {
        self.dominator_depth
    }

    /// Innermost loop containing this block.
    #[inline]
    pub fn loop_id(&self) -> Option<LoopId> {
        self.loop_id
    }

    #[inline]
    pub fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    #[inline]
    pub fn is_loop_header(&self) -> bool {
        self.is_loop_header
    }

    /// Relative execution frequency.
    #[inline]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Everything killed by the nodes of this block.
    #[inline]
    pub fn kills(&self) -> &KillSet {
        &self.kills
    }

    /// Locations killed by the begin node itself.
    #[inline]
    pub fn begin_kills(&self) -> &KillSet {
        &self.begin_kills
    }

    /// Everything killed by blocks strictly between the dominator and this
    /// block, on any path.
    #[inline]
    pub fn kills_between(&self) -> &KillSet {
        &self.kills_between
    }

    #[inline]
    pub fn can_kill(&self, location: LocationIdentity) -> bool {
        self.kills.can_kill(location)
    }

    #[inline]
    pub fn can_kill_between_this_and_dominator(&self, location: LocationIdentity) -> bool {
        self.kills_between.can_kill(location)
    }
}

/// A natural loop.
#[derive(Clone, Debug)]
pub struct Loop {
    id: LoopId,
    header: BlockId,
    /// Member blocks, sorted by ID.
    blocks: Vec<BlockId>,
    parent: Option<LoopId>,
    depth: u32,
    kills: KillSet,
}

impl Loop {
    #[inline]
    pub fn id(&self) -> LoopId {
        self.id
    }

    #[inline]
    pub fn header(&self) -> BlockId {
        self.header
    }

    #[inline]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    #[inline]
    pub fn parent(&self) -> Option<LoopId> {
        self.parent
    }

    /// Nesting depth; outermost loops have depth 1.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn kills(&self) -> &KillSet {
        &self.kills
    }

    #[inline]
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.binary_search(&block).is_ok()
    }

    #[inline]
    pub fn can_kill(&self, location: LocationIdentity) -> bool {
        self.kills.can_kill(location)
    }
}

// ── Control-flow graph ──────────────────────────────────────────────

/// Blocks, dominator tree, loops and kill summaries of one graph.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    blocks: Vec<Block>,
    loops: Vec<Loop>,
    reverse_postorder: Vec<BlockId>,
    node_to_block: Vec<Option<BlockId>>,
}

impl ControlFlowGraph {
    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// All blocks in ID order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn reverse_postorder(&self) -> &[BlockId] {
        &self.reverse_postorder
    }

    /// Block containing the fixed node `node`.
    #[inline]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.node_to_block.get(node.index()).copied().flatten()
    }

    #[inline]
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    #[inline]
    pub fn loop_(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    /// Does `a` dominate `b`? A block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let target_depth = self.block(a).dominator_depth;
        let mut current = b;
        while self.block(current).dominator_depth > target_depth {
            match self.block(current).dominator {
                Some(dom) => current = dom,
                None => return false,
            }
        }
        current == a
    }

    #[inline]
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Deepest block dominating both `a` and `b`.
    pub fn common_dominator(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            let depth_a = self.block(a).dominator_depth;
            let depth_b = self.block(b).dominator_depth;
            let next_a = if depth_a >= depth_b { self.block(a).dominator } else { Some(a) };
            let next_b = if depth_b >= depth_a { self.block(b).dominator } else { Some(b) };
            match (next_a, next_b) {
                (Some(x), Some(y)) => {
                    a = x;
                    b = y;
                }
                _ => return self.entry(),
            }
        }
        a
    }

    /// Is `from -> to` a loop back edge?
    pub fn is_back_edge(&self, from: BlockId, to: BlockId) -> bool {
        self.block(to).is_loop_header && self.dominates(to, from)
    }

    /// Is `block` inside `loop_id` (directly or through a nested loop)?
    #[inline]
    pub fn loop_contains(&self, loop_id: LoopId, block: BlockId) -> bool {
        self.loop_(loop_id).contains(block)
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Per-block neighbour indices.
type Adjacency = Vec<Vec<usize>>;

/// Explicit block description, validated and analysed by [`build`](Self::build).
#[derive(Clone, Debug, Default)]
pub struct CfgBuilder {
    blocks: Vec<Vec<NodeId>>,
    frequencies: Vec<Option<f64>>,
    edges: Vec<(BlockId, BlockId)>,
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block. The first block added is the entry.
    pub fn add_block(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> BlockId {
        let id = block_id(self.blocks.len());
        self.blocks.push(nodes.into_iter().collect());
        self.frequencies.push(None);
        id
    }

    /// Add an edge. Successor order per block and predecessor order per
    /// block both follow the order edges are added in.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.edges.push((from, to));
    }

    /// Override the relative frequency of `block`. The override replaces
    /// the computed value and propagates to the blocks after it.
    pub fn set_frequency(&mut self, block: BlockId, frequency: f64) {
        if let Some(slot) = self.frequencies.get_mut(block.index()) {
            *slot = Some(frequency);
        }
    }

    pub fn build(self, graph: &Graph) -> Result<ControlFlowGraph, CfgError> {
        let n = self.blocks.len();
        if n == 0 {
            return Err(CfgError::EmptyBlock(BlockId::new(0)));
        }
        let node_to_block = self.validate_nodes(graph)?;
        let (predecessors, successors) = self.link_edges()?;
        check_successor_counts(graph, &self.blocks, &successors)?;

        let postorder = compute_postorder(&successors);
        if postorder.len() < n {
            let mut reached = vec![false; n];
            for &b in &postorder {
                reached[b] = true;
            }
            if let Some(unreachable) = reached.iter().position(|&r| !r) {
                return Err(CfgError::UnreachableBlock(block_id(unreachable)));
            }
        }
        let rpo: Vec<usize> = postorder.into_iter().rev().collect();
        check_phi_arity(graph, &self.blocks, &predecessors)?;

        let idom = compute_dominators(&predecessors, &rpo);
        let mut depth = vec![0u32; n];
        for &b in &rpo[1..] {
            depth[b] = depth[idom[b]] + 1;
        }
        let mut dominated: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        for b in 1..n {
            dominated[idom[b]].push(block_id(b));
        }

        let dominates = |a: usize, mut b: usize| -> bool {
            while depth[b] > depth[a] {
                b = idom[b];
            }
            a == b
        };

        // Block kills.
        let mut kills = vec![KillSet::default(); n];
        let mut begin_kills = vec![KillSet::default(); n];
        for (idx, nodes) in self.blocks.iter().enumerate() {
            for (pos, &node) in nodes.iter().enumerate() {
                if let Some(kill) = graph.node(node).memory_kill() {
                    kills[idx].add_kill(kill);
                    if pos == 0 {
                        begin_kills[idx].add_kill(kill);
                    }
                }
            }
        }

        // An invoke's kill takes effect at the begin of its normal successor.
        for (idx, nodes) in self.blocks.iter().enumerate() {
            let Some(&end) = nodes.last() else { continue };
            let end_node = graph.node(end);
            if let (Some(ControlKind::Invoke), Some(kill)) =
                (end_node.control(), end_node.memory_kill())
            {
                if let Some(&normal) = successors[idx].first() {
                    begin_kills[normal].add_kill(kill);
                }
            }
        }

        let loops = find_loops(&predecessors, &rpo, &dominates, &kills);
        let mut innermost: Vec<Option<LoopId>> = vec![None; n];
        for lp in &loops {
            // Inner loops come later, so the last writer wins.
            for &b in &lp.blocks {
                innermost[b.index()] = Some(lp.id);
            }
        }
        let loop_depth: Vec<u32> = innermost
            .iter()
            .map(|lp| lp.map_or(0, |id| loops[id.index()].depth))
            .collect();
        let is_header: Vec<bool> = (0..n)
            .map(|b| loops.iter().any(|lp| lp.header.index() == b))
            .collect();

        let kills_between = compute_kills_between(
            &predecessors,
            &rpo,
            &idom,
            &kills,
            &innermost,
            &is_header,
            &loops,
            &dominates,
        );

        let probability =
            |from: usize, to: usize| edge_probability(graph, &self.blocks, &successors, from, to);
        let frequencies = compute_frequencies(
            &predecessors,
            &rpo,
            &loops,
            &self.frequencies,
            &probability,
        );

        let mut blocks = Vec::with_capacity(n);
        let mut kills_between = kills_between.into_iter();
        for (idx, nodes) in self.blocks.into_iter().enumerate() {
            blocks.push(Block {
                id: block_id(idx),
                nodes,
                predecessors: predecessors[idx].iter().map(|&p| block_id(p)).collect(),
                successors: successors[idx].iter().map(|&s| block_id(s)).collect(),
                dominator: (idx != 0).then(|| block_id(idom[idx])),
                dominated: std::mem::take(&mut dominated[idx]),
                dominator_depth: depth[idx],
                loop_id: innermost[idx],
                loop_depth: loop_depth[idx],
                is_loop_header: is_header[idx],
                frequency: frequencies[idx],
                kills: std::mem::take(&mut kills[idx]),
                begin_kills: std::mem::take(&mut begin_kills[idx]),
                kills_between: kills_between.next().unwrap_or(KillSet::Any),
            });
        }

        tracing::debug!(
            blocks = blocks.len(),
            loops = loops.len(),
            "built control-flow graph"
        );

        Ok(ControlFlowGraph {
            blocks,
            loops,
            reverse_postorder: rpo.into_iter().map(block_id).collect(),
            node_to_block,
        })
    }

    /// Check block contents and map each fixed node to its block.
    fn validate_nodes(&self, graph: &Graph) -> Result<Vec<Option<BlockId>>, CfgError> {
        let mut node_to_block = vec![None; graph.len()];
        for (idx, nodes) in self.blocks.iter().enumerate() {
            let block = block_id(idx);
            if nodes.is_empty() {
                return Err(CfgError::EmptyBlock(block));
            }
            let last = nodes.len() - 1;
            for (pos, &node) in nodes.iter().enumerate() {
                if node.index() >= graph.len() || !graph.is_live(node) {
                    return Err(CfgError::UnknownNode { block, node });
                }
                let Some(control) = graph.node(node).control() else {
                    return Err(CfgError::NotFixed { block, node });
                };
                let slot = &mut node_to_block[node.index()];
                if slot.is_some() {
                    return Err(CfgError::NodeInMultipleBlocks(node));
                }
                *slot = Some(block);

                if pos == 0 && !control.is_begin() {
                    return Err(CfgError::BeginNotFirst { block, node });
                }
                if (pos > 0 && control.is_begin()) || (pos < last && control.is_block_end()) {
                    return Err(CfgError::MisplacedControl { block, node });
                }
            }
        }
        Ok(node_to_block)
    }

    /// Predecessor and successor index lists, in edge order.
    fn link_edges(&self) -> Result<(Adjacency, Adjacency), CfgError> {
        let n = self.blocks.len();
        let mut predecessors: Adjacency = vec![Vec::new(); n];
        let mut successors: Adjacency = vec![Vec::new(); n];
        let mut seen = FxHashSet::default();
        for &(from, to) in &self.edges {
            let (f, t) = (from.index(), to.index());
            if f >= n || t >= n || t == 0 || !seen.insert((f, t)) {
                return Err(CfgError::InvalidEdge { from, to });
            }
            successors[f].push(t);
            predecessors[t].push(f);
        }
        Ok((predecessors, successors))
    }
}

fn check_successor_counts(
    graph: &Graph,
    blocks: &[Vec<NodeId>],
    successors: &[Vec<usize>],
) -> Result<(), CfgError> {
    for (idx, nodes) in blocks.iter().enumerate() {
        let Some(&end) = nodes.last() else { continue };
        let expected = match graph.node(end).control() {
            Some(ControlKind::If { .. } | ControlKind::Invoke) => 2,
            Some(ControlKind::Return | ControlKind::Deoptimize) => 0,
            // `End` and fall-through blocks continue into one successor.
            _ => 1,
        };
        let found = successors[idx].len();
        if found != expected {
            return Err(CfgError::SuccessorCount {
                block: block_id(idx),
                expected,
                found,
            });
        }
    }
    Ok(())
}

fn check_phi_arity(
    graph: &Graph,
    blocks: &[Vec<NodeId>],
    predecessors: &[Vec<usize>],
) -> Result<(), CfgError> {
    for (idx, nodes) in blocks.iter().enumerate() {
        let expected = predecessors[idx].len();
        for &phi in graph.phis(nodes[0]) {
            let found = graph.inputs(phi).len();
            if found != expected {
                return Err(CfgError::PhiArity {
                    phi,
                    expected,
                    found,
                });
            }
        }
    }
    Ok(())
}

// ── Analyses ────────────────────────────────────────────────────────

/// Postorder from block 0 with an explicit stack.
fn compute_postorder(successors: &[Vec<usize>]) -> Vec<usize> {
    let mut visited = vec![false; successors.len()];
    let mut postorder = Vec::with_capacity(successors.len());

    // (block, children_done)
    let mut stack: Vec<(usize, bool)> = vec![(0, false)];
    while let Some(&mut (block, ref mut children_done)) = stack.last_mut() {
        if *children_done {
            postorder.push(block);
            stack.pop();
            continue;
        }
        *children_done = true;
        if visited[block] {
            stack.pop();
            continue;
        }
        visited[block] = true;
        // Reversed so the first successor is explored first.
        for &succ in successors[block].iter().rev() {
            if !visited[succ] {
                stack.push((succ, false));
            }
        }
    }
    postorder
}

/// Immediate dominators (CHK). `idom[entry] == entry`.
fn compute_dominators(predecessors: &[Vec<usize>], rpo: &[usize]) -> Vec<usize> {
    let n = predecessors.len();
    let mut rpo_pos = vec![0usize; n];
    for (pos, &b) in rpo.iter().enumerate() {
        rpo_pos[b] = pos;
    }

    let mut idom: Vec<Option<usize>> = vec![None; n];
    idom[0] = Some(0);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo[1..] {
            let mut new_idom: Option<usize> = None;
            for &pred in &predecessors[b] {
                if idom[pred].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(pred, current, &idom, &rpo_pos),
                });
            }
            if new_idom.is_some() && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }

    idom.into_iter().map(|dom| dom.unwrap_or(0)).collect()
}

/// CHK intersect: walk two fingers upward until they meet.
fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
    while a != b {
        while rpo_pos[a] > rpo_pos[b] {
            let Some(next) = idom[a] else {
                debug_assert!(false, "intersect: broken idom chain at {a}");
                return a;
            };
            a = next;
        }
        while rpo_pos[b] > rpo_pos[a] {
            let Some(next) = idom[b] else {
                debug_assert!(false, "intersect: broken idom chain at {b}");
                return b;
            };
            b = next;
        }
    }
    a
}

/// Natural loops ordered by header reverse postorder.
fn find_loops(
    predecessors: &[Vec<usize>],
    rpo: &[usize],
    dominates: &dyn Fn(usize, usize) -> bool,
    kills: &[KillSet],
) -> Vec<Loop> {
    let mut loops: Vec<Loop> = Vec::new();
    for &header in rpo {
        let latches: Vec<usize> = predecessors[header]
            .iter()
            .copied()
            .filter(|&pred| dominates(header, pred))
            .collect();
        if latches.is_empty() {
            continue;
        }

        let mut members = FxHashSet::default();
        members.insert(header);
        let mut worklist = latches;
        while let Some(b) = worklist.pop() {
            if members.insert(b) {
                worklist.extend(predecessors[b].iter().copied());
            }
        }
        let mut blocks: Vec<BlockId> = members.into_iter().map(block_id).collect();
        blocks.sort_unstable();

        // Smallest enclosing loop found so far is the parent.
        let parent = loops
            .iter()
            .filter(|outer| outer.contains(block_id(header)))
            .min_by_key(|outer| outer.blocks.len())
            .map(|outer| outer.id);
        let depth = parent.map_or(1, |p| loops[p.index()].depth + 1);

        let mut loop_kills = KillSet::default();
        for b in &blocks {
            loop_kills.add_all(&kills[b.index()]);
        }

        #[expect(
            clippy::cast_possible_truncation,
            reason = "loop counts fit in u32"
        )]
        let id = LoopId::new(loops.len() as u32);
        loops.push(Loop {
            id,
            header: block_id(header),
            blocks,
            parent,
            depth,
            kills: loop_kills,
        });
    }
    loops
}

// ── Frequencies ─────────────────────────────────────────────────────

/// Smallest relative frequency a block can have.
const MIN_FREQUENCY: f64 = 1e-150;
/// Largest relative frequency a block can have.
const MAX_FREQUENCY: f64 = 1e150;
/// Probability of taking an invoke's exceptional successor.
const EXCEPTION_PROBABILITY: f64 = 1e-4;

/// Probability that control leaving `from` continues in `to`.
fn edge_probability(
    graph: &Graph,
    blocks: &[Vec<NodeId>],
    successors: &[Vec<usize>],
    from: usize,
    to: usize,
) -> f64 {
    let Some(index) = successors[from].iter().position(|&s| s == to) else {
        return 0.0;
    };
    let end = blocks[from].last().and_then(|&node| graph.node(node).control());
    match (end, index) {
        (Some(ControlKind::If { true_probability }), 0) => true_probability.clamp(0.0, 1.0),
        (Some(ControlKind::If { true_probability }), _) => 1.0 - true_probability.clamp(0.0, 1.0),
        (Some(ControlKind::Invoke), 0) => 1.0 - EXCEPTION_PROBABILITY,
        (Some(ControlKind::Invoke), _) => EXCEPTION_PROBABILITY,
        _ => 1.0,
    }
}

/// Relative block frequencies.
///
/// The first pass computes local loop frequencies, inner loops first:
/// with the header running once, the probability `p` of reaching the back
/// edges gives `1 / (1 - p)` iterations per entry. The second pass walks
/// reverse postorder from the entry (frequency 1), summing each forward
/// predecessor's frequency times its edge probability and scaling loop
/// headers by their local loop frequency. An override replaces a block's
/// value before its successors read it.
fn compute_frequencies(
    predecessors: &[Vec<usize>],
    rpo: &[usize],
    loops: &[Loop],
    overrides: &[Option<f64>],
    probability: &dyn Fn(usize, usize) -> f64,
) -> Vec<f64> {
    let n = predecessors.len();
    let mut header_of: Vec<Option<LoopId>> = vec![None; n];
    for lp in loops {
        header_of[lp.header.index()] = Some(lp.id);
    }
    let is_back_edge = |pred: usize, b: usize| {
        header_of[b].is_some_and(|id| loops[id.index()].contains(block_id(pred)))
    };
    let incoming = |b: usize, frequency: &[f64], loop_frequency: &[f64]| -> f64 {
        let mut sum = 0.0;
        for &pred in &predecessors[b] {
            if !is_back_edge(pred, b) {
                sum += frequency[pred] * probability(pred, b);
            }
        }
        let scaled = match header_of[b] {
            Some(id) => sum * loop_frequency[id.index()],
            None => sum,
        };
        scaled.clamp(MIN_FREQUENCY, MAX_FREQUENCY)
    };

    let mut frequency = vec![0.0; n];
    let mut loop_frequency = vec![1.0; loops.len()];
    for lp in loops.iter().rev() {
        let header = lp.header.index();
        for &b in rpo.iter().filter(|&&b| lp.contains(block_id(b))) {
            frequency[b] = if b == header {
                1.0
            } else {
                incoming(b, &frequency, &loop_frequency)
            };
        }
        let mut back_edges = 0.0;
        for &latch in &predecessors[header] {
            if lp.contains(block_id(latch)) {
                back_edges += frequency[latch] * probability(latch, header);
            }
        }
        let back_edges = back_edges.clamp(MIN_FREQUENCY, 1.0);
        loop_frequency[lp.id.index()] = if back_edges >= 1.0 {
            MAX_FREQUENCY
        } else {
            (1.0 / (1.0 - back_edges)).min(MAX_FREQUENCY)
        };
    }

    frequency.fill(0.0);
    for &b in rpo {
        let computed = if b == 0 {
            1.0
        } else {
            incoming(b, &frequency, &loop_frequency)
        };
        frequency[b] = overrides.get(b).copied().flatten().unwrap_or(computed);
    }
    frequency
}

/// Kill summary of the blocks strictly between each block and its
/// immediate dominator.
#[expect(
    clippy::too_many_arguments,
    reason = "intermediate analysis results are passed explicitly"
)]
fn compute_kills_between(
    predecessors: &[Vec<usize>],
    rpo: &[usize],
    idom: &[usize],
    kills: &[KillSet],
    innermost: &[Option<LoopId>],
    is_header: &[bool],
    loops: &[Loop],
    dominates: &dyn Fn(usize, usize) -> bool,
) -> Vec<KillSet> {
    let n = predecessors.len();
    let mut between: Vec<Option<KillSet>> = vec![None; n];
    between[0] = Some(KillSet::None);

    for &b in &rpo[1..] {
        let stop = idom[b];
        let mut result = KillSet::default();
        if is_header[b] {
            if let Some(lp) = innermost[b] {
                result.add_all(&loops[lp.index()].kills);
            }
        }
        for &pred in &predecessors[b] {
            if pred == stop || result.is_any() {
                continue;
            }
            if is_header[b] && dominates(b, pred) {
                // Back edge, covered by the loop summary.
                continue;
            }
            result.add_all(&kills[pred]);
            let mut x = pred;
            while x != stop && !result.is_any() {
                match &between[x] {
                    Some(set) => result.add_all(set),
                    None => result = KillSet::Any,
                }
                let dom = idom[x];
                if dom == stop || dom == x {
                    break;
                }
                result.add_all(&kills[dom]);
                x = dom;
            }
        }
        between[b] = Some(result);
    }

    between
        .into_iter()
        .map(|set| set.unwrap_or(KillSet::Any))
        .collect()
}
