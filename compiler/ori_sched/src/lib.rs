//! Global code motion and instruction scheduling for the Ori sea-of-nodes
//! backend.
//!
//! Given a [`Graph`](ori_son::Graph) and its
//! [`ControlFlowGraph`](ori_son::ControlFlowGraph), [`SchedulePhase`]
//! assigns every floating node a block and every block a total order of
//! nodes. The result is a [`Schedule`].
//!
//! # Passes
//!
//! - **Earliest**: each floating node goes to the shallowest block where
//!   all its inputs are available. Always runs; its per-block lists carry
//!   the program order of fixed nodes into the later passes.
//! - **Latest**: for the latest strategies, each floating node sinks to the
//!   common dominator of its usages and is pulled back up past memory
//!   kills, out of loops, and to implicit null checks.
//! - **Sort**: orders each block so inputs come first and reads precede
//!   the kills that would invalidate them.
//! - **Verify**: [`verify_schedule`] re-checks the finished schedule
//!   independently. Runs when [`ScheduleConfig::verify`] is set.
//!
//! The [`SchedulingStrategy`] picks which passes run and what they may do.
//!
//! # Crate Dependencies
//!
//! `ori_sched` depends only on `ori_son` for the graph and CFG. The graph is
//! read-only except for [`SchedulePhase::run`], which deletes nodes that no
//! fixed node depends on.

mod config;
mod earliest;
mod error;
mod latest;
mod phase;
mod schedule;
mod sort;
mod verify;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use config::{ScheduleConfig, SchedulingStrategy, UnknownStrategy};
pub use error::ScheduleError;
pub use phase::SchedulePhase;
pub use schedule::{Schedule, ScheduleDisplay};
pub use verify::verify_schedule;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=ori_sched=debug`, or
/// `RUST_LOG=ori_sched=trace` for per-node placement decisions.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
