//! Sea-of-nodes IR for the Ori optimizing backend.
//!
//! This crate provides the two structures the scheduler consumes:
//!
//! - **Node graph** ([`Graph`], [`Node`]): a "sea of nodes" where only
//!   [`Fixed`](NodeKind::Fixed) nodes have a control-flow position. Every
//!   other node [`Floats`](NodeKind::Floating) and is ordered only by its
//!   data and memory dependencies. What a node *does* is described by a
//!   small closed set of capability roles ([`Roles`]): memory kill, memory
//!   access, phi, proxy, guard, plus boolean [`NodeFlags`]. Passes query
//!   roles, never concrete node types.
//!
//! - **Control-flow graph** ([`ControlFlowGraph`], [`Block`], [`Loop`]):
//!   the blocks formed by the fixed nodes, with dominator tree, natural
//!   loops, relative frequencies and memory kill summaries. Built by
//!   [`CfgBuilder`] from an explicit block description.
//!
//! Memory is modelled with [`LocationIdentity`] tokens: a [`MemoryKill`]
//! invalidates prior reads of every overlapping location, and [`KillSet`]
//! aggregates kills per block and per loop.
//!
//! # Crate Dependencies
//!
//! `ori_son` has no dependency on other Ori crates. Scheduling lives in
//! `ori_sched`, which only reads these structures (and deletes dead nodes
//! through [`Graph::delete`]).

pub mod cfg;
pub mod graph;
pub mod location;
pub mod node;

pub use cfg::{Block, BlockId, CfgBuilder, CfgError, ControlFlowGraph, Loop, LoopId};
pub use graph::Graph;
pub use location::{KillSet, LocationIdentity, MemoryKill};
pub use node::{
    ControlKind, GuardPriority, GuardRole, MemoryAccess, Node, NodeFlags, NodeId, NodeKind,
    PhiRole, ProxyRole, Roles,
};
