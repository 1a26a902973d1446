//! Monte Carlo aggregation over many independent trials.
//!
//! Trial `i` always draws from the stream derived from `(master_seed, i)` and
//! results are gathered in trial order, so statistics are identical whether
//! trials run sequentially or across any number of workers.
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EXPERIMENTS;
use crate::numbers::ratio;
use crate::policy::{ConfigError, PullPolicyConfig};
use crate::rng::{TrialRng, entropy_seed};
use crate::runner::{ExperimentResult, PullModel, SimulationError};
use crate::stats::{FrequencyTable, Summary, Tally};
use crate::worker::TrialPool;

/// A policy plus the parameters of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    #[serde(flatten)]
    pub policy: PullPolicyConfig,
    #[serde(default = "ExperimentPlan::default_experiments_count")]
    pub experiments_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_width: Option<u64>,
}

impl ExperimentPlan {
    const fn default_experiments_count() -> u64 {
        DEFAULT_EXPERIMENTS
    }

    #[must_use]
    pub const fn new(policy: PullPolicyConfig) -> Self {
        Self {
            policy,
            experiments_count: DEFAULT_EXPERIMENTS,
            seed: None,
            bin_width: None,
        }
    }

    /// Check the run parameters; the policy validated itself on construction.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroValue`] for a zero trial count or bin width.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiments_count == 0 {
            return Err(ConfigError::ZeroValue {
                field: "experiments_count",
            });
        }
        if let Some(0) = self.bin_width {
            return Err(ConfigError::ZeroValue { field: "bin_width" });
        }
        Ok(())
    }

    /// Parse and validate a JSON plan document (policy fields plus run options).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and the matching
    /// invariant error otherwise.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let plan: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Bucket width used for frequency tables.
    #[must_use]
    pub fn effective_bin_width(&self) -> u64 {
        self.bin_width
            .or_else(|| self.policy.pulls_per_set().map(u64::from))
            .unwrap_or(1)
    }
}

/// How trials are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Execution {
    Sequential,
    /// `threads: None` sizes the pool from the machine.
    Parallel { threads: Option<usize> },
}

impl Default for Execution {
    fn default() -> Self {
        Self::Parallel { threads: None }
    }
}

/// Reduced statistics of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub policy_name: String,
    pub experiments: u64,
    pub master_seed: u64,
    pub total_pulls: Summary,
    /// Absent when no trial obtained a rate-up.
    pub first_rate_up_pull: Option<Summary>,
    pub total_pulls_histogram: FrequencyTable,
    pub first_rate_up_histogram: FrequencyTable,
    pub lost_first_split: u64,
    pub lost_first_split_rate: f64,
    /// Pulls between hits implied by the curve alone.
    pub expected_pulls_per_hit: f64,
}

/// Statistics plus the raw per-trial sequences, in trial order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentBatch {
    pub statistics: AggregateStatistics,
    pub total_pulls: Vec<u64>,
    pub first_rate_up_pulls: Vec<Option<u64>>,
    pub results: Vec<ExperimentResult>,
}

#[derive(Debug, Clone)]
struct Tallies {
    total: Tally,
    first: Tally,
    lost_first_split: u64,
}

impl Tallies {
    fn new(bin_width: u64) -> Self {
        Self {
            total: Tally::new(bin_width),
            first: Tally::new(bin_width),
            lost_first_split: 0,
        }
    }

    fn ingest(mut self, result: &ExperimentResult) -> Self {
        self.total.ingest(result.total_pulls);
        if let Some(first) = result.first_rate_up_pull {
            self.first.ingest(first);
        }
        if result.lost_first_split {
            self.lost_first_split += 1;
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            total: self.total.merge(other.total),
            first: self.first.merge(other.first),
            lost_first_split: self.lost_first_split + other.lost_first_split,
        }
    }
}

/// Runs a plan's trials and reduces them.
#[derive(Debug, Clone)]
pub struct Aggregator {
    plan: ExperimentPlan,
    model: PullModel,
    execution: Execution,
}

impl Aggregator {
    /// # Errors
    ///
    /// Returns the plan's validation error, if any.
    pub fn new(plan: ExperimentPlan, execution: Execution) -> Result<Self, ConfigError> {
        plan.validate()?;
        let model = PullModel::new(plan.policy.clone());
        Ok(Self {
            plan,
            model,
            execution,
        })
    }

    #[must_use]
    pub const fn plan(&self) -> &ExperimentPlan {
        &self.plan
    }

    /// Run every trial and reduce the results.
    ///
    /// # Errors
    ///
    /// Returns a failing trial's [`SimulationError`] (the lowest-indexed one
    /// when sequential), or a pool error in parallel mode.
    pub fn run(&self) -> Result<ExperimentBatch, SimulationError> {
        let master_seed = self.plan.seed.unwrap_or_else(entropy_seed);
        let count = self.plan.experiments_count;
        let bin_width = self.plan.effective_bin_width();
        debug!(
            "running {count} trials of `{}` ({:?}, seed {master_seed:#x})",
            self.plan.policy.name(),
            self.execution
        );

        let (results, tallies) = match self.execution {
            Execution::Sequential => {
                let results = (0..count)
                    .map(|trial| self.run_one(master_seed, trial))
                    .collect::<Result<Vec<_>, _>>()?;
                let tallies = results
                    .iter()
                    .fold(Tallies::new(bin_width), Tallies::ingest);
                (results, tallies)
            }
            Execution::Parallel { threads } => {
                let pool = TrialPool::new(threads)?;
                debug!("parallel run on {} threads", pool.thread_count());
                pool.execute(|| -> Result<_, SimulationError> {
                    let results = (0..count)
                        .into_par_iter()
                        .map(|trial| self.run_one(master_seed, trial))
                        .collect::<Result<Vec<_>, _>>()?;
                    let tallies = results
                        .par_iter()
                        .fold(|| Tallies::new(bin_width), Tallies::ingest)
                        .reduce(|| Tallies::new(bin_width), Tallies::merge);
                    Ok((results, tallies))
                })??
            }
        };

        Ok(self.finish(master_seed, results, tallies))
    }

    fn run_one(&self, master_seed: u64, trial: u64) -> Result<ExperimentResult, SimulationError> {
        self.model
            .run_trial(trial, TrialRng::for_trial(master_seed, trial))
    }

    fn finish(
        &self,
        master_seed: u64,
        results: Vec<ExperimentResult>,
        tallies: Tallies,
    ) -> ExperimentBatch {
        let total_pulls: Vec<u64> = results.iter().map(|r| r.total_pulls).collect();
        let first_rate_up_pulls: Vec<Option<u64>> =
            results.iter().map(|r| r.first_rate_up_pull).collect();

        let mut sorted_total = total_pulls.clone();
        sorted_total.sort_unstable();
        let mut sorted_first: Vec<u64> = first_rate_up_pulls.iter().flatten().copied().collect();
        sorted_first.sort_unstable();

        let experiments = tallies.total.count;
        let statistics = AggregateStatistics {
            policy_name: self.plan.policy.name().to_string(),
            experiments,
            master_seed,
            total_pulls: Summary::from_parts(&tallies.total, &sorted_total)
                .unwrap_or_default(),
            first_rate_up_pull: Summary::from_parts(&tallies.first, &sorted_first),
            total_pulls_histogram: tallies.total.histogram,
            first_rate_up_histogram: tallies.first.histogram,
            lost_first_split: tallies.lost_first_split,
            lost_first_split_rate: ratio(tallies.lost_first_split, experiments),
            expected_pulls_per_hit: self.model.curve().expected_pulls_per_hit(),
        };

        ExperimentBatch {
            statistics,
            total_pulls,
            first_rate_up_pulls,
            results,
        }
    }
}
