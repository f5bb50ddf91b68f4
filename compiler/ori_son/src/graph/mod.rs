//! Node storage with usage tracking.
//!
//! [`Graph`] is an append-only arena of [`Node`]s. Every input edge is
//! mirrored by a usage edge so passes can walk both directions, and phis
//! and proxies are indexed by the fixed node they are pinned to.
//!
//! Nodes are never moved; [`Graph::delete`] only marks a node dead and
//! unlinks its edges, so [`NodeId`]s stay valid as indices for the lifetime
//! of the graph.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::node::{Node, NodeId};

/// Sea-of-nodes graph.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    live: Vec<bool>,
    /// Distinct users of each node, in first-use order.
    usages: Vec<SmallVec<[NodeId; 4]>>,
    /// Phis per merge node, in insertion order.
    phis: FxHashMap<NodeId, SmallVec<[NodeId; 4]>>,
    /// Proxies per loop exit node, in insertion order.
    proxies: FxHashMap<NodeId, SmallVec<[NodeId; 4]>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and link its inputs. All inputs must already exist.
    pub fn add(&mut self, node: Node) -> NodeId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "node counts fit in u32"
        )]
        let id = NodeId::new(self.nodes.len() as u32);

        for &input in &node.inputs {
            debug_assert!(input.index() < self.nodes.len(), "{id}: unknown input {input}");
            self.link(input, id);
        }
        if let Some(phi) = node.phi_role() {
            self.phis.entry(phi.merge).or_default().push(id);
        }
        if let Some(proxy) = node.proxy_role() {
            self.proxies.entry(proxy.loop_exit).or_default().push(id);
        }

        self.nodes.push(node);
        self.live.push(true);
        self.usages.push(SmallVec::new());
        id
    }

    /// Append `input` to the inputs of `node`.
    ///
    /// Used to close loop phi back edges, whose values are created after
    /// the phi itself.
    pub fn add_input(&mut self, node: NodeId, input: NodeId) {
        self.nodes[node.index()].inputs.push(input);
        self.link(input, node);
    }

    fn link(&mut self, input: NodeId, user: NodeId) {
        let users = &mut self.usages[input.index()];
        if !users.contains(&user) {
            users.push(user);
        }
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].inputs
    }

    /// Distinct live users of `id`.
    #[inline]
    pub fn usages(&self, id: NodeId) -> &[NodeId] {
        &self.usages[id.index()]
    }

    /// Phis pinned to `merge`, in insertion order.
    pub fn phis(&self, merge: NodeId) -> &[NodeId] {
        self.phis.get(&merge).map_or(&[], |phis| phis.as_slice())
    }

    /// Proxies pinned to `loop_exit`, in insertion order.
    pub fn proxies(&self, loop_exit: NodeId) -> &[NodeId] {
        self.proxies.get(&loop_exit).map_or(&[], |proxies| proxies.as_slice())
    }

    /// Does the graph keep values proxied at loop exits?
    ///
    /// When it does, a value defined inside a loop is only visible outside
    /// through a proxy, which changes both hoisting and verification.
    pub fn has_value_proxies(&self) -> bool {
        self.proxies.values().any(|proxies| !proxies.is_empty())
    }

    #[inline]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.live[id.index()]
    }

    /// Size of the ID space, including deleted nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live node IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter(|&(_, &live)| live)
            .map(|(idx, _)| {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "node counts fit in u32"
                )]
                let raw = idx as u32;
                NodeId::new(raw)
            })
    }

    /// Live floating guards in ascending ID order.
    pub fn guards(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(|&id| self.node(id).guard_role().is_some())
    }

    /// Follow proxies back to the value they re-anchor.
    pub fn unproxify(&self, mut id: NodeId) -> NodeId {
        while self.node(id).proxy_role().is_some() {
            match self.inputs(id).first() {
                Some(&value) => id = value,
                None => break,
            }
        }
        id
    }

    /// Delete a node: unlink its inputs and drop it from the phi and proxy
    /// indexes.
    ///
    /// Users of `id` keep their input edge; callers delete a node together
    /// with every node that uses it.
    pub fn delete(&mut self, id: NodeId) {
        if !self.live[id.index()] {
            return;
        }
        self.live[id.index()] = false;

        let inputs = std::mem::take(&mut self.nodes[id.index()].inputs);
        for input in inputs {
            self.usages[input.index()].retain(|user| *user != id);
        }

        let node = &self.nodes[id.index()];
        if let Some(phi) = node.phi_role() {
            if let Some(phis) = self.phis.get_mut(&phi.merge) {
                phis.retain(|phi| *phi != id);
            }
        }
        if let Some(proxy) = node.proxy_role() {
            if let Some(proxies) = self.proxies.get_mut(&proxy.loop_exit) {
                proxies.retain(|proxy| *proxy != id);
            }
        }

        tracing::trace!(node = %id, label = node.label, "deleted node");
    }
}
