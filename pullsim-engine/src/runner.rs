//! Drives a single trial from the first pull to the target rate-up count.
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curve::PityCurve;
use crate::guarantee::{GuaranteeStateMachine, HitClass, Trigger};
use crate::policy::PullPolicyConfig;
use crate::rng::RollSource;
use crate::state::PullState;

/// Errors raised while trials execute.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("trial {trial} exceeded the pull cap of {cap} (stopped at {pulls} pulls)")]
    RunawayTrial { trial: u64, pulls: u64, cap: u64 },
    #[error("trial {trial} was stepped after it terminated")]
    AlreadyTerminated { trial: u64 },
    #[error("trial worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("failed to build trial worker pool: {0}")]
    PoolBuild(String),
}

/// Where a runner is within the current pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerPhase {
    Accumulating,
    HitResolution,
    Terminated,
}

/// Everything that happened on one pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullEvent {
    /// One-based pull index.
    pub pull: u64,
    /// Pity value the hit was rolled at, before the reset.
    pub pity_at_hit: Option<u32>,
    pub hit: Option<HitClass>,
    pub triggers: Vec<Trigger>,
    pub rate_up_count: u32,
    pub phase: RunnerPhase,
}

impl PullEvent {
    #[must_use]
    pub fn terminated(&self) -> bool {
        self.phase == RunnerPhase::Terminated
    }
}

/// Outcome of one completed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub total_pulls: u64,
    pub first_rate_up_pull: Option<u64>,
    pub lost_first_split: bool,
    pub hits: u32,
    pub off_banner_hits: u32,
}

/// A policy compiled into its curve and guarantee rules, shared by every trial.
#[derive(Debug, Clone, PartialEq)]
pub struct PullModel {
    policy: PullPolicyConfig,
    curve: PityCurve,
    machine: GuaranteeStateMachine,
    runaway_cap: u64,
}

impl PullModel {
    #[must_use]
    pub fn new(policy: PullPolicyConfig) -> Self {
        Self {
            curve: PityCurve::from_policy(&policy),
            machine: GuaranteeStateMachine::from_policy(&policy),
            runaway_cap: policy.runaway_cap(),
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &PullPolicyConfig {
        &self.policy
    }

    #[must_use]
    pub const fn curve(&self) -> &PityCurve {
        &self.curve
    }

    #[must_use]
    pub const fn runaway_cap(&self) -> u64 {
        self.runaway_cap
    }

    /// Fresh runner for trial `trial` drawing from `rng`.
    #[must_use]
    pub fn runner<S: RollSource>(&self, trial: u64, rng: S) -> ExperimentRunner<'_, S> {
        ExperimentRunner {
            model: self,
            state: PullState::new(&self.policy),
            rng,
            trial,
            phase: RunnerPhase::Accumulating,
        }
    }

    /// Run trial `trial` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::RunawayTrial`] when the trial hits the pull cap.
    pub fn run_trial<S: RollSource>(
        &self,
        trial: u64,
        rng: S,
    ) -> Result<ExperimentResult, SimulationError> {
        self.runner(trial, rng).run()
    }
}

/// Per-trial driver owning the mutable state and random stream.
#[derive(Debug)]
pub struct ExperimentRunner<'a, S> {
    model: &'a PullModel,
    state: PullState,
    rng: S,
    trial: u64,
    phase: RunnerPhase,
}

impl<S: RollSource> ExperimentRunner<'_, S> {
    #[must_use]
    pub const fn state(&self) -> &PullState {
        &self.state
    }

    #[must_use]
    pub const fn phase(&self) -> RunnerPhase {
        self.phase
    }

    #[must_use]
    pub const fn rng(&self) -> &S {
        &self.rng
    }

    fn target(&self) -> u32 {
        self.model.policy.target_rate_ups()
    }

    fn target_reached(&self) -> bool {
        self.state.rate_up_count >= self.target()
    }

    fn hit_probability(&self) -> f64 {
        if let (Some(window), Some(counter)) =
            (self.model.policy.hit_window(), self.state.secondary_counter)
            && counter >= window
        {
            return 1.0;
        }
        self.model.curve.probability(self.state.pity)
    }

    /// Execute exactly one pull.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::RunawayTrial`] once the pull cap is reached and
    /// [`SimulationError::AlreadyTerminated`] when called after termination.
    pub fn step(&mut self) -> Result<PullEvent, SimulationError> {
        if self.phase == RunnerPhase::Terminated {
            return Err(SimulationError::AlreadyTerminated { trial: self.trial });
        }
        let cap = self.model.runaway_cap;
        if self.state.pulls >= cap {
            warn!(
                "trial {} aborted at {} pulls with {} of {} rate-ups",
                self.trial,
                self.state.pulls,
                self.state.rate_up_count,
                self.target()
            );
            return Err(SimulationError::RunawayTrial {
                trial: self.trial,
                pulls: self.state.pulls,
                cap,
            });
        }

        self.state.advance();
        self.phase = RunnerPhase::Accumulating;

        let mut triggers = Vec::new();
        let mut preempted = false;
        while !self.target_reached() {
            let Some(trigger) = self.model.machine.next_trigger(&mut self.state) else {
                break;
            };
            self.state.credit_rate_up();
            preempted |= trigger.preempts_roll();
            triggers.push(trigger);
        }

        let mut hit = None;
        let mut pity_at_hit = None;
        if !preempted && !self.target_reached() {
            let probability = self.hit_probability();
            if probability >= 1.0 || self.rng.roll() < probability {
                self.phase = RunnerPhase::HitResolution;
                pity_at_hit = Some(self.state.pity);
                self.state.register_hit();
                let class = self.model.machine.classify_hit(&mut self.state, &mut self.rng);
                if class.is_rate_up() {
                    self.state.credit_rate_up();
                    self.state.rate_up_hit = true;
                } else {
                    self.state.off_banner_hits = self.state.off_banner_hits.saturating_add(1);
                }
                self.state.note_first_hit(class.is_rate_up());
                hit = Some(class);
            }
        }

        self.phase = if self.target_reached() {
            trace!(
                "trial {} finished after {} pulls",
                self.trial, self.state.pulls
            );
            RunnerPhase::Terminated
        } else {
            RunnerPhase::Accumulating
        };

        Ok(PullEvent {
            pull: self.state.pulls,
            pity_at_hit,
            hit,
            triggers,
            rate_up_count: self.state.rate_up_count,
            phase: self.phase,
        })
    }

    /// Pull in sets until the target is reached.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by [`Self::step`].
    pub fn run(mut self) -> Result<ExperimentResult, SimulationError> {
        let set_size = self.model.policy.pulls_per_set().unwrap_or(1);
        'sets: while self.phase != RunnerPhase::Terminated {
            for _ in 0..set_size {
                if self.step()?.terminated() {
                    break 'sets;
                }
            }
        }
        Ok(self.result())
    }

    /// Snapshot of the trial outcome so far.
    #[must_use]
    pub const fn result(&self) -> ExperimentResult {
        ExperimentResult {
            total_pulls: self.state.pulls,
            first_rate_up_pull: self.state.first_rate_up_pull,
            lost_first_split: self.state.lost_first_split,
            hits: self.state.hits,
            off_banner_hits: self.state.off_banner_hits,
        }
    }
}
