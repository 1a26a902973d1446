//! Guarantee state machine: classifies hits and fires pull-index triggers.
//!
//! The machine holds only the rules. Everything that changes during a trial
//! (pending flags, armed triggers, the remaining schedule) lives in
//! [`PullState`], so one machine can serve every trial of a run.
use serde::{Deserialize, Serialize};

use crate::policy::{GuaranteeKind, PullPolicyConfig};
use crate::rng::RollSource;
use crate::state::PullState;

/// Why a hit counted as rate-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUpCause {
    /// Won the independent split roll.
    Roll,
    /// A previous loss made this hit a guaranteed rate-up.
    Carryover,
    /// First hit at or after the rate-up-from threshold.
    RateUpFrom,
}

/// Classification of a confirmed hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitClass {
    RateUp(RateUpCause),
    OffBanner,
}

impl HitClass {
    #[must_use]
    pub const fn is_rate_up(self) -> bool {
        matches!(self, Self::RateUp(_))
    }
}

/// A rate-up granted by the pull index alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    AbsoluteFirst,
    Scheduled,
}

impl Trigger {
    /// Whether this trigger replaces the hit roll of its pull.
    #[must_use]
    pub const fn preempts_roll(self) -> bool {
        matches!(self, Self::AbsoluteFirst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AbsoluteRule {
    pull_index: u64,
    waived_by_earlier_rate_up: bool,
}

/// Immutable guarantee rules compiled from a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GuaranteeStateMachine {
    rate_up_share: f64,
    carryover: bool,
    rate_up_from: Option<u64>,
    absolute: Option<AbsoluteRule>,
}

impl GuaranteeStateMachine {
    #[must_use]
    pub fn from_policy(policy: &PullPolicyConfig) -> Self {
        let mut machine = Self {
            rate_up_share: policy.rate_up_share(),
            carryover: false,
            rate_up_from: None,
            absolute: None,
        };
        for kind in policy.guarantees() {
            match kind {
                GuaranteeKind::CarryoverOnLoss => machine.carryover = true,
                GuaranteeKind::RateUpFrom { pull_index } => {
                    machine.rate_up_from = Some(*pull_index);
                }
                GuaranteeKind::AbsoluteFirstAt {
                    pull_index,
                    waived_by_earlier_rate_up,
                } => {
                    machine.absolute = Some(AbsoluteRule {
                        pull_index: *pull_index,
                        waived_by_earlier_rate_up: *waived_by_earlier_rate_up,
                    });
                }
                GuaranteeKind::None | GuaranteeKind::ScheduledSet { .. } => {}
            }
        }
        machine
    }

    /// Fire and consume the next trigger due on the current pull, if any.
    ///
    /// The absolute trigger is reported before any scheduled bonus on the
    /// same pull. Callers credit the returned rate-up themselves.
    pub fn next_trigger(&self, state: &mut PullState) -> Option<Trigger> {
        if let Some(rule) = self.absolute
            && state.absolute_armed
        {
            if rule.waived_by_earlier_rate_up && state.rate_up_hit {
                state.absolute_armed = false;
            } else if state.pulls == rule.pull_index {
                state.absolute_armed = false;
                state.reset_secondary();
                return Some(Trigger::AbsoluteFirst);
            }
        }
        if state.pending_schedule.remove(&state.pulls) {
            return Some(Trigger::Scheduled);
        }
        None
    }

    /// Decide whether a confirmed hit is a rate-up and update guarantee flags.
    pub fn classify_hit<S: RollSource + ?Sized>(
        &self,
        state: &mut PullState,
        rng: &mut S,
    ) -> HitClass {
        if state.guarantee_pending {
            state.guarantee_pending = false;
            return HitClass::RateUp(RateUpCause::Carryover);
        }
        if let Some(from) = self.rate_up_from
            && state.rate_up_from_armed
            && state.pulls >= from
        {
            state.rate_up_from_armed = false;
            return HitClass::RateUp(RateUpCause::RateUpFrom);
        }
        let won = self.rate_up_share >= 1.0 || rng.roll() < self.rate_up_share;
        if won {
            HitClass::RateUp(RateUpCause::Roll)
        } else {
            if self.carryover {
                state.guarantee_pending = true;
            }
            HitClass::OffBanner
        }
    }
}
