//! Scheduling failures.
//!
//! Every variant is an internal invariant violation: the input graph was
//! malformed, or a pass produced an illegal schedule. Nothing is retried.

use ori_son::{BlockId, NodeId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("dependency cycle through {node}")]
    DependencyCycle { node: NodeId },

    #[error("{node} depends on fixed node {input}, which is in no block")]
    UnreachableInput { node: NodeId, input: NodeId },

    #[error("floating {node} is scheduled after split {split}, which has no primary successor")]
    FloatingAfterSplit { split: NodeId, node: NodeId },

    #[error("latest block {latest} of {node} is not dominated by its earliest block {earliest}")]
    LatestNotDominated {
        node: NodeId,
        earliest: BlockId,
        latest: BlockId,
    },

    #[error("read {read} in {block} is scheduled after a kill of its location")]
    ReadAfterKill { read: NodeId, block: BlockId },

    #[error("input {input} of {node} is not scheduled before it in {block}")]
    InputNotScheduledBefore {
        node: NodeId,
        input: NodeId,
        block: BlockId,
    },

    #[error("input {input} of {node} is in {input_block}, which does not dominate {block}")]
    InputDoesNotDominate {
        node: NodeId,
        input: NodeId,
        block: BlockId,
        input_block: BlockId,
    },

    #[error("fixed node {node} is out of place in {block}")]
    FixedNodeMisplaced { node: NodeId, block: BlockId },

    #[error("{node} is not scheduled exactly once in its block")]
    NodeNotScheduled { node: NodeId },

    #[error("{node} uses {input} from inside a loop without a proxy")]
    LoopExitBypassed { node: NodeId, input: NodeId },
}
