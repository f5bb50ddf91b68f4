//! Scheduling strategy and phase configuration.

use std::fmt;
use std::str::FromStr;

/// Where floating nodes are placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SchedulingStrategy {
    /// Shallowest legal block; no second pass.
    Earliest,
    /// Earliest placement with guards reordered by priority.
    EarliestWithGuardOrder,
    /// Deepest legal block (common dominator of all usages).
    Latest,
    /// Latest placement, hoisted out of loops where profitable.
    LatestOutOfLoops,
    /// Latest out of loops, keeping reads that can serve as implicit null
    /// checks at the null check. This is the schedule used for code
    /// generation.
    #[default]
    LatestOutOfLoopsImplicitNullChecks,
}

impl SchedulingStrategy {
    /// The strategy used for the final schedule before code generation.
    pub const FINAL_SCHEDULE: Self = Self::LatestOutOfLoopsImplicitNullChecks;

    pub const ALL: [Self; 5] = [
        Self::Earliest,
        Self::EarliestWithGuardOrder,
        Self::Latest,
        Self::LatestOutOfLoops,
        Self::LatestOutOfLoopsImplicitNullChecks,
    ];

    #[inline]
    pub fn is_earliest(self) -> bool {
        matches!(self, Self::Earliest | Self::EarliestWithGuardOrder)
    }

    #[inline]
    pub fn is_latest(self) -> bool {
        !self.is_earliest()
    }

    /// Does the strategy hoist nodes out of loops?
    #[inline]
    pub fn considers_loops(self) -> bool {
        matches!(
            self,
            Self::LatestOutOfLoops | Self::LatestOutOfLoopsImplicitNullChecks
        )
    }

    #[inline]
    pub fn considers_implicit_null_checks(self) -> bool {
        self == Self::LatestOutOfLoopsImplicitNullChecks
    }

    /// Are guards reordered by priority within a block?
    #[inline]
    pub fn orders_guards(self) -> bool {
        self == Self::EarliestWithGuardOrder
    }

    /// Kebab-case name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::EarliestWithGuardOrder => "earliest-with-guard-order",
            Self::Latest => "latest",
            Self::LatestOutOfLoops => "latest-out-of-loops",
            Self::LatestOutOfLoopsImplicitNullChecks => "latest-out-of-loops-implicit-null-checks",
        }
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An unrecognized strategy name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown scheduling strategy `{0}`")]
pub struct UnknownStrategy(pub String);

impl FromStr for SchedulingStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| UnknownStrategy(s.to_owned()))
    }
}

/// Configuration for [`SchedulePhase`](crate::SchedulePhase).
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleConfig {
    pub strategy: SchedulingStrategy,
    /// Resolve and order guards by priority.
    pub guard_priorities: bool,
    /// Run the schedule verifier after scheduling.
    pub verify: bool,
    /// A read stays at an implicit null check when the check's block runs
    /// less often than `ratio` times the block it would otherwise sink to.
    pub implicit_null_check_frequency_ratio: f64,
    /// Maximum probability of the null edge for a null check to count as an
    /// implicit null check opportunity.
    pub null_check_probability_threshold: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::FINAL_SCHEDULE,
            guard_priorities: true,
            verify: cfg!(debug_assertions),
            implicit_null_check_frequency_ratio: 2.0,
            null_check_probability_threshold: 1e-6,
        }
    }
}

impl ScheduleConfig {
    /// Default configuration with `strategy`.
    pub fn with_strategy(strategy: SchedulingStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Default configuration overlaid with the `ORI_SCHED_*` environment
    /// switches.
    ///
    /// - `ORI_SCHED_STRATEGY=<name>` selects a strategy by its kebab-case name.
    /// - `ORI_SCHED_VERIFY` (any value) enables the verifier.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(name) = lookup("ORI_SCHED_STRATEGY") {
            match name.parse() {
                Ok(strategy) => self.strategy = strategy,
                Err(err) => tracing::warn!(%err, "ignoring ORI_SCHED_STRATEGY"),
            }
        }
        if lookup("ORI_SCHED_VERIFY").is_some() {
            self.verify = true;
        }
        self
    }
}
