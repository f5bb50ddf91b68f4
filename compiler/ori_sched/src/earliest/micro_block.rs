//! Micro-blocks: per-fixed-node buckets of floating nodes.
//!
//! Every fixed node owns one micro-block holding the floating nodes that
//! become computable right after it. Micro-block IDs are handed out in
//! reverse postorder of blocks and program order within a block, so the
//! ID is a total precedence: a floating node belongs in the micro-block of
//! its input with the highest ID.
//!
//! All micro-blocks share one arena of list entries. Appending is O(1),
//! and so is prepending one whole micro-block into another, which is how
//! nodes after a split move into its primary successor.

use ori_son::{BlockId, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub(super) struct MicroBlockId(u32);

impl MicroBlockId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    node: NodeId,
    next: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
struct MicroBlock {
    block: BlockId,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

#[derive(Debug, Default)]
pub(super) struct MicroBlocks {
    blocks: Vec<MicroBlock>,
    entries: Vec<Entry>,
}

impl MicroBlocks {
    /// Create an empty micro-block in `block`. IDs are increasing.
    pub(super) fn create(&mut self, block: BlockId) -> MicroBlockId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "micro-block counts are bounded by node counts"
        )]
        let id = MicroBlockId(self.blocks.len() as u32);
        self.blocks.push(MicroBlock {
            block,
            head: None,
            tail: None,
            len: 0,
        });
        id
    }

    /// All micro-blocks in precedence order.
    pub(super) fn ids(&self) -> impl Iterator<Item = MicroBlockId> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "micro-block counts are bounded by node counts"
        )]
        let count = self.blocks.len() as u32;
        (0..count).map(MicroBlockId)
    }

    #[inline]
    pub(super) fn block(&self, id: MicroBlockId) -> BlockId {
        self.blocks[id.index()].block
    }

    #[inline]
    pub(super) fn is_empty(&self, id: MicroBlockId) -> bool {
        self.blocks[id.index()].len == 0
    }

    #[inline]
    pub(super) fn len(&self, id: MicroBlockId) -> usize {
        self.blocks[id.index()].len
    }

    pub(super) fn push(&mut self, id: MicroBlockId, node: NodeId) {
        let entry = self.entries.len();
        self.entries.push(Entry { node, next: None });
        let mb = &mut self.blocks[id.index()];
        match mb.tail {
            Some(tail) => self.entries[tail].next = Some(entry),
            None => mb.head = Some(entry),
        }
        mb.tail = Some(entry);
        mb.len += 1;
    }

    /// Move every node of `from` to the front of `into`, leaving `from`
    /// empty.
    pub(super) fn prepend_into(&mut self, from: MicroBlockId, into: MicroBlockId) {
        if from == into {
            return;
        }
        let source = self.blocks[from.index()];
        let (Some(head), Some(tail)) = (source.head, source.tail) else {
            return;
        };
        let target = &mut self.blocks[into.index()];
        self.entries[tail].next = target.head;
        if target.tail.is_none() {
            target.tail = Some(tail);
        }
        target.head = Some(head);
        target.len += source.len;

        let source = &mut self.blocks[from.index()];
        source.head = None;
        source.tail = None;
        source.len = 0;
    }

    /// Nodes of `id` in order.
    pub(super) fn nodes(&self, id: MicroBlockId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cursor = self.blocks[id.index()].head;
        std::iter::from_fn(move || {
            let entry = self.entries[cursor?];
            cursor = entry.next;
            Some(entry.node)
        })
    }

    /// Replace the contents of `id` with `nodes`.
    pub(super) fn replace(&mut self, id: MicroBlockId, nodes: &[NodeId]) {
        let mb = &mut self.blocks[id.index()];
        mb.head = None;
        mb.tail = None;
        mb.len = 0;
        for &node in nodes {
            self.push(id, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn n(raw: u32) -> NodeId {
        NodeId::new(raw)
    }

    #[test]
    fn ids_follow_creation_order() {
        let mut mbs = MicroBlocks::default();
        let a = mbs.create(BlockId::new(0));
        let b = mbs.create(BlockId::new(1));
        assert!(a < b);
        assert_eq!(mbs.block(b), BlockId::new(1));
        assert!(mbs.is_empty(a));
    }

    /// Prepending keeps both orders and empties the source.
    #[test]
    fn prepend_into_keeps_order() {
        let mut mbs = MicroBlocks::default();
        let split = mbs.create(BlockId::new(0));
        let succ = mbs.create(BlockId::new(1));
        mbs.push(split, n(1));
        mbs.push(split, n(2));
        mbs.push(succ, n(3));
        mbs.prepend_into(split, succ);

        assert_eq!(mbs.nodes(succ).collect::<Vec<_>>(), vec![n(1), n(2), n(3)]);
        assert_eq!(mbs.len(succ), 3);
        assert!(mbs.is_empty(split));
        assert_eq!(mbs.nodes(split).count(), 0);

        // Appending after a prepend into an empty target still works.
        let empty = mbs.create(BlockId::new(2));
        let other = mbs.create(BlockId::new(2));
        mbs.push(other, n(4));
        mbs.prepend_into(other, empty);
        mbs.push(empty, n(5));
        assert_eq!(mbs.nodes(empty).collect::<Vec<_>>(), vec![n(4), n(5)]);
    }

    #[test]
    fn replace_resets_contents() {
        let mut mbs = MicroBlocks::default();
        let a = mbs.create(BlockId::new(0));
        mbs.push(a, n(1));
        mbs.push(a, n(2));
        mbs.replace(a, &[n(2), n(1)]);
        assert_eq!(mbs.nodes(a).collect::<Vec<_>>(), vec![n(2), n(1)]);
    }
}
