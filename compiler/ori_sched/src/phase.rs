//! The scheduling phase: earliest pass, optional latest pass and sort,
//! optional verification.

use ori_son::{ControlFlowGraph, Graph, NodeId};

use crate::config::ScheduleConfig;
use crate::earliest::schedule_earliest;
use crate::error::ScheduleError;
use crate::latest::schedule_latest;
use crate::schedule::Schedule;
use crate::sort::sort_blocks;
use crate::verify::verify_schedule;

/// Computes a [`Schedule`] for a graph over its control-flow graph.
#[derive(Clone, Debug, Default)]
pub struct SchedulePhase {
    config: ScheduleConfig,
}

impl SchedulePhase {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Schedule `graph` and delete the nodes no fixed node depends on.
    #[tracing::instrument(level = "debug", skip_all, fields(strategy = %self.config.strategy))]
    pub fn run(
        &self,
        graph: &mut Graph,
        cfg: &ControlFlowGraph,
    ) -> Result<Schedule, ScheduleError> {
        let (schedule, dead) = self.compute(graph, cfg)?;
        for &node in &dead {
            graph.delete(node);
        }
        if !dead.is_empty() {
            tracing::debug!(dead = dead.len(), "deleted unreachable nodes");
        }
        Ok(schedule)
    }

    /// Schedule `graph` without touching it. Unreachable nodes are left in
    /// the graph and map to no block.
    #[tracing::instrument(level = "debug", skip_all, fields(strategy = %self.config.strategy))]
    pub fn run_immutable(
        &self,
        graph: &Graph,
        cfg: &ControlFlowGraph,
    ) -> Result<Schedule, ScheduleError> {
        self.compute(graph, cfg).map(|(schedule, _)| schedule)
    }

    fn compute(
        &self,
        graph: &Graph,
        cfg: &ControlFlowGraph,
    ) -> Result<(Schedule, Vec<NodeId>), ScheduleError> {
        let config = &self.config;
        let earliest = schedule_earliest(graph, cfg, config)?;

        let (node_to_block, block_to_nodes) = if config.strategy.is_earliest() {
            (earliest.node_to_block, earliest.block_lists)
        } else {
            let latest = schedule_latest(graph, cfg, &earliest, config)?;
            let sorted = sort_blocks(graph, cfg, &earliest, &latest, config);
            (latest.node_to_block, sorted)
        };
        let schedule = Schedule::from_parts(config.strategy, node_to_block, block_to_nodes);

        if config.verify {
            verify_schedule(graph, cfg, &schedule)?;
        }

        tracing::debug!(
            blocks = cfg.blocks().len(),
            nodes = schedule.len(),
            dead = earliest.dead.len(),
            "scheduled"
        );
        Ok((schedule, earliest.dead))
    }
}
