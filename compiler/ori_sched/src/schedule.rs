//! The result of scheduling.

use std::fmt;

use ori_son::{BlockId, Graph, NodeId};

use crate::config::SchedulingStrategy;

/// Final placement of every scheduled node: a node→block map and, per
/// block, the order nodes execute in.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    strategy: SchedulingStrategy,
    node_to_block: Vec<Option<BlockId>>,
    block_to_nodes: Vec<Vec<NodeId>>,
}

impl Schedule {
    pub(crate) fn from_parts(
        strategy: SchedulingStrategy,
        node_to_block: Vec<Option<BlockId>>,
        block_to_nodes: Vec<Vec<NodeId>>,
    ) -> Self {
        Self {
            strategy,
            node_to_block,
            block_to_nodes,
        }
    }

    #[inline]
    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Block `node` is scheduled in; `None` for dead nodes.
    #[inline]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.node_to_block.get(node.index()).copied().flatten()
    }

    /// Nodes of `block` in execution order.
    #[inline]
    pub fn nodes(&self, block: BlockId) -> &[NodeId] {
        self.block_to_nodes
            .get(block.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Every block with its node order, in block ID order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &[NodeId])> + '_ {
        self.block_to_nodes.iter().enumerate().map(|(idx, nodes)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "block counts fit in u32"
            )]
            let block = BlockId::new(idx as u32);
            (block, nodes.as_slice())
        })
    }

    /// Number of scheduled nodes.
    pub fn len(&self) -> usize {
        self.block_to_nodes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dump with node labels.
    pub fn display<'a>(&'a self, graph: &'a Graph) -> ScheduleDisplay<'a> {
        ScheduleDisplay {
            schedule: self,
            graph,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "schedule ({})", self.strategy)?;
        for (block, nodes) in self.blocks() {
            write!(f, "{block}:")?;
            for node in nodes {
                write!(f, " {node}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// [`Schedule`] dump that names each node by its label.
pub struct ScheduleDisplay<'a> {
    schedule: &'a Schedule,
    graph: &'a Graph,
}

impl fmt::Display for ScheduleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "schedule ({})", self.schedule.strategy)?;
        for (block, nodes) in self.schedule.blocks() {
            writeln!(f, "{block}:")?;
            for &node in nodes {
                let n = self.graph.node(node);
                write!(f, "  {node} = {}", n.label)?;
                for (i, input) in n.inputs.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { ", " })?;
                    write!(f, "{input}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
