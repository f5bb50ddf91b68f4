//! IR nodes and their capability roles.
//!
//! # Fixed vs floating
//!
//! A [`Fixed`](NodeKind::Fixed) node already has a position in the
//! control-flow graph; its [`ControlKind`] says whether it begins a block,
//! ends one, or sits in the middle. A [`Floating`](NodeKind::Floating) node
//! has no position until the scheduler gives it one.
//!
//! # Roles
//!
//! Node behaviour relevant to scheduling is expressed as a closed set of
//! capabilities ([`Roles`]) rather than as concrete node types:
//!
//! | Role | Meaning |
//! |------|---------|
//! | [`MemoryKill`] | invalidates reads of overlapping locations |
//! | [`MemoryAccess`] | reads a location; on a floating node this is a *floating read* |
//! | [`PhiRole`] | per-predecessor value selector pinned to a merge |
//! | [`ProxyRole`] | re-anchors a value at a loop exit |
//! | [`GuardRole`] | floating safety check with a priority |
//! | [`NodeFlags::VIRTUAL_STATE`] | deoptimization snapshot, never moved |
//! | [`NodeFlags::NULL_TEST`] | tests its first input against null |
//!
//! Roles that reference other nodes (a read's anchor and base, an `If`'s
//! condition, a proxy's value) always reference an entry of `inputs`, so
//! dependency walks only ever look at `inputs`. The exceptions are a phi's
//! merge and a proxy's loop exit, which are fixed nodes the phi or proxy is
//! pinned to rather than depends on.

use std::fmt;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::location::{LocationIdentity, MemoryKill};

// ── ID newtype ──────────────────────────────────────────────────────

/// Node ID within a [`Graph`](crate::Graph).
///
/// IDs are allocated sequentially starting from 0 and are never reused,
/// even after the node is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a new node ID from a raw index.
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

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ── Control kinds ───────────────────────────────────────────────────

/// The control-flow behaviour of a fixed node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlKind {
    /// Entry of the function; begins the entry block.
    Start,
    /// Begins a block with a single predecessor.
    Begin,
    /// Begins a block where several forward edges join. Owns phis.
    Merge,
    /// Begins a loop header. Owns loop phis.
    LoopBegin,
    /// Begins a block that is the target of a loop exit edge. Owns proxies.
    LoopExit,
    /// An ordinary fixed node in the middle of a block (write, call, sink).
    Plain,
    /// Two-way branch on `inputs[0]`. Successor 0 is taken when the
    /// condition holds, with probability `true_probability`.
    If { true_probability: f64 },
    /// Call with a normal (successor 0) and exceptional (successor 1)
    /// continuation. Its result only exists on the normal path.
    Invoke,
    /// Jump to a merge or loop header.
    End,
    /// Function return.
    Return,
    /// Leave compiled code.
    Deoptimize,
}

impl ControlKind {
    /// Does this node begin a block?
    pub fn is_begin(self) -> bool {
        matches!(
            self,
            Self::Start | Self::Begin | Self::Merge | Self::LoopBegin | Self::LoopExit
        )
    }

    /// Does this node begin a block with phis?
    pub fn is_merge(self) -> bool {
        matches!(self, Self::Merge | Self::LoopBegin)
    }

    /// Does this node transfer control (and must therefore end its block)?
    pub fn is_block_end(self) -> bool {
        matches!(
            self,
            Self::If { .. } | Self::Invoke | Self::End | Self::Return | Self::Deoptimize
        )
    }

    /// Does this node branch to more than one successor?
    pub fn is_split(self) -> bool {
        matches!(self, Self::If { .. } | Self::Invoke)
    }

    /// For a split, the successor index on which values produced by the
    /// split are exclusively needed.
    pub fn primary_successor(self) -> Option<usize> {
        match self {
            Self::Invoke => Some(0),
            _ => None,
        }
    }
}

/// Fixed-or-floating tag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    Fixed(ControlKind),
    Floating,
}

// ── Roles ───────────────────────────────────────────────────────────

/// Priority of a floating guard, declared from highest to lowest.
///
/// The derived `Ord` sorts higher priorities first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuardPriority {
    /// Guards a speculation; failing it invalidates compiled code.
    Speculation,
    /// Guards a profile-based assumption.
    Profile,
    /// Any other check.
    Normal,
}

impl GuardPriority {
    /// Strictly higher priority than `other`?
    #[inline]
    pub fn is_higher_than(self, other: GuardPriority) -> bool {
        self < other
    }
}

/// A memory read (or, on a fixed node, any memory access).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryAccess {
    /// Location read.
    pub location: LocationIdentity,
    /// Base pointer of the address, if the address is object-relative.
    pub base: Option<NodeId>,
    /// Last memory state known to be safe for this read: the kill, memory
    /// phi, or start node whose memory the read observes.
    pub last_access: Option<NodeId>,
}

/// Phi pinned to a merge.
///
/// The phi's `inputs` hold one value per predecessor of the merge block,
/// in predecessor order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhiRole {
    /// The merge or loop begin node.
    pub merge: NodeId,
    /// Set for memory phis: the location whose state is merged.
    pub memory: Option<LocationIdentity>,
}

/// Proxy pinned to a loop exit. The proxied value is `inputs[0]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProxyRole {
    /// The loop exit node.
    pub loop_exit: NodeId,
}

/// Floating guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GuardRole {
    pub priority: GuardPriority,
}

bitflags! {
    /// Boolean node capabilities.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct NodeFlags: u8 {
        /// Deoptimization snapshot; never moved away from its earliest block.
        const VIRTUAL_STATE = 1 << 0;
        /// Tests `inputs[0]` against null; `true` means null.
        const NULL_TEST = 1 << 1;
    }
}

/// The capability roles of a node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Roles {
    pub kill: Option<MemoryKill>,
    pub access: Option<MemoryAccess>,
    pub phi: Option<PhiRole>,
    pub proxy: Option<ProxyRole>,
    pub guard: Option<GuardRole>,
    pub flags: NodeFlags,
}

// ── Nodes ───────────────────────────────────────────────────────────

/// A node of the sea-of-nodes graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub inputs: SmallVec<[NodeId; 4]>,
    pub roles: Roles,
    /// Mnemonic used in dumps.
    pub label: &'static str,
}

impl Node {
    /// A fixed node with no inputs and no roles.
    pub fn fixed(control: ControlKind, label: &'static str) -> Self {
        Self {
            kind: NodeKind::Fixed(control),
            inputs: SmallVec::new(),
            roles: Roles::default(),
            label,
        }
    }

    /// A floating node with no inputs and no roles.
    pub fn floating(label: &'static str) -> Self {
        Self {
            kind: NodeKind::Floating,
            inputs: SmallVec::new(),
            roles: Roles::default(),
            label,
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    #[must_use]
    pub fn with_kill(mut self, kill: MemoryKill) -> Self {
        self.roles.kill = Some(kill);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.roles.flags |= flags;
        self
    }

    // ── Shorthands ──────────────────────────────────────────────────

    pub fn start() -> Self {
        Self::fixed(ControlKind::Start, "Start")
    }

    pub fn begin() -> Self {
        Self::fixed(ControlKind::Begin, "Begin")
    }

    pub fn merge() -> Self {
        Self::fixed(ControlKind::Merge, "Merge")
    }

    pub fn loop_begin() -> Self {
        Self::fixed(ControlKind::LoopBegin, "LoopBegin")
    }

    pub fn loop_exit() -> Self {
        Self::fixed(ControlKind::LoopExit, "LoopExit")
    }

    pub fn end() -> Self {
        Self::fixed(ControlKind::End, "End")
    }

    pub fn deoptimize() -> Self {
        Self::fixed(ControlKind::Deoptimize, "Deoptimize")
    }

    pub fn ret(value: Option<NodeId>) -> Self {
        Self::fixed(ControlKind::Return, "Return").with_inputs(value)
    }

    /// Branch on `condition`; successor 0 is the `true` edge.
    pub fn if_(condition: NodeId, true_probability: f64) -> Self {
        Self::fixed(ControlKind::If { true_probability }, "If").with_inputs([condition])
    }

    /// A call that may write any memory.
    pub fn invoke(args: impl IntoIterator<Item = NodeId>) -> Self {
        Self::fixed(ControlKind::Invoke, "Invoke")
            .with_inputs(args)
            .with_kill(MemoryKill::Single(LocationIdentity::Any))
    }

    /// A fixed store to `location`.
    pub fn write(location: LocationIdentity, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        Self::fixed(ControlKind::Plain, "Write")
            .with_inputs(inputs)
            .with_kill(MemoryKill::Single(location))
    }

    /// A fixed node that consumes values (a call argument, a side exit).
    pub fn sink(inputs: impl IntoIterator<Item = NodeId>) -> Self {
        Self::fixed(ControlKind::Plain, "Sink").with_inputs(inputs)
    }

    /// A floating leaf (constant or parameter).
    pub fn constant(label: &'static str) -> Self {
        Self::floating(label)
    }

    /// A pure floating value.
    pub fn value(label: &'static str, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        Self::floating(label).with_inputs(inputs)
    }

    /// Floating `value == null` test.
    pub fn is_null(value: NodeId) -> Self {
        Self::floating("IsNull")
            .with_inputs([value])
            .with_flags(NodeFlags::NULL_TEST)
    }

    /// A floating read of `location` at `base`, observing the memory state
    /// produced by `last_access`. Extra inputs (guards, the anchoring begin
    /// of a null check) are appended after the address and memory inputs.
    pub fn read(
        location: LocationIdentity,
        base: NodeId,
        last_access: Option<NodeId>,
        extra: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        let mut node = Self::floating("Read")
            .with_inputs([base])
            .with_inputs(last_access)
            .with_inputs(extra);
        node.roles.access = Some(MemoryAccess {
            location,
            base: Some(base),
            last_access,
        });
        node
    }

    /// Value phi at `merge`, one value per predecessor.
    pub fn phi(merge: NodeId, values: impl IntoIterator<Item = NodeId>) -> Self {
        let mut node = Self::floating("Phi").with_inputs(values);
        node.roles.phi = Some(PhiRole {
            merge,
            memory: None,
        });
        node
    }

    /// Memory phi merging the state of `location` at `merge`.
    pub fn memory_phi(
        merge: NodeId,
        location: LocationIdentity,
        states: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        let mut node = Self::floating("MemoryPhi").with_inputs(states);
        node.roles.phi = Some(PhiRole {
            merge,
            memory: Some(location),
        });
        node
    }

    /// Proxy of `value` at `loop_exit`.
    pub fn proxy(loop_exit: NodeId, value: NodeId) -> Self {
        let mut node = Self::floating("Proxy").with_inputs([value]);
        node.roles.proxy = Some(ProxyRole { loop_exit });
        node
    }

    /// Floating guard with the given priority.
    pub fn guard(priority: GuardPriority, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        let mut node = Self::floating("Guard").with_inputs(inputs);
        node.roles.guard = Some(GuardRole { priority });
        node
    }

    /// Deoptimization state capturing `values`.
    pub fn virtual_state(values: impl IntoIterator<Item = NodeId>) -> Self {
        Self::floating("FrameState")
            .with_inputs(values)
            .with_flags(NodeFlags::VIRTUAL_STATE)
    }

    // ── Role queries ────────────────────────────────────────────────

    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, NodeKind::Fixed(_))
    }

    #[inline]
    pub fn is_floating(&self) -> bool {
        matches!(self.kind, NodeKind::Floating)
    }

    /// Control kind of a fixed node.
    #[inline]
    pub fn control(&self) -> Option<ControlKind> {
        match self.kind {
            NodeKind::Fixed(control) => Some(control),
            NodeKind::Floating => None,
        }
    }

    #[inline]
    pub fn memory_kill(&self) -> Option<&MemoryKill> {
        self.roles.kill.as_ref()
    }

    #[inline]
    pub fn memory_access(&self) -> Option<&MemoryAccess> {
        self.roles.access.as_ref()
    }

    /// The memory access of a floating read.
    #[inline]
    pub fn floating_read(&self) -> Option<&MemoryAccess> {
        if self.is_floating() {
            self.roles.access.as_ref()
        } else {
            None
        }
    }

    #[inline]
    pub fn phi_role(&self) -> Option<&PhiRole> {
        self.roles.phi.as_ref()
    }

    #[inline]
    pub fn proxy_role(&self) -> Option<&ProxyRole> {
        self.roles.proxy.as_ref()
    }

    #[inline]
    pub fn guard_role(&self) -> Option<&GuardRole> {
        self.roles.guard.as_ref()
    }

    #[inline]
    pub fn is_virtual_state(&self) -> bool {
        self.roles.flags.contains(NodeFlags::VIRTUAL_STATE)
    }

    #[inline]
    pub fn is_null_test(&self) -> bool {
        self.roles.flags.contains(NodeFlags::NULL_TEST)
    }

    /// Phis and proxies are floating but pinned to a fixed node.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.roles.phi.is_some() || self.roles.proxy.is_some()
    }
}
