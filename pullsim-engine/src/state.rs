//! Mutable per-trial bookkeeping.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::policy::{GuaranteeKind, PullPolicyConfig};

/// State owned by exactly one running trial and dropped when it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullState {
    /// Cumulative pulls made so far.
    pub pulls: u64,
    /// Pulls since the last hit.
    pub pity: u32,
    /// Nested guaranteed-hit window counter, present for windowed policies.
    pub secondary_counter: Option<u32>,
    pub rate_up_count: u32,
    /// A hit has been classified rate-up. Bonus triggers never set this.
    pub rate_up_hit: bool,
    /// A lost roll must be compensated on the next hit.
    pub guarantee_pending: bool,
    pub first_rate_up_pull: Option<u64>,
    /// Scheduled bonus indices that have not fired yet.
    pub pending_schedule: BTreeSet<u64>,
    /// The absolute first-rate-up trigger is still available.
    pub absolute_armed: bool,
    /// The rate-up-from guarantee is still available.
    pub rate_up_from_armed: bool,
    pub hits: u32,
    pub off_banner_hits: u32,
    pub first_hit_resolved: bool,
    pub lost_first_split: bool,
}

impl PullState {
    #[must_use]
    pub fn new(policy: &PullPolicyConfig) -> Self {
        let mut state = Self {
            pulls: 0,
            pity: 0,
            secondary_counter: policy.hit_window().map(|_| 0),
            rate_up_count: 0,
            rate_up_hit: false,
            guarantee_pending: false,
            first_rate_up_pull: None,
            pending_schedule: BTreeSet::new(),
            absolute_armed: false,
            rate_up_from_armed: false,
            hits: 0,
            off_banner_hits: 0,
            first_hit_resolved: false,
            lost_first_split: false,
        };
        for kind in policy.guarantees() {
            match kind {
                GuaranteeKind::ScheduledSet { indices } => {
                    state.pending_schedule.extend(indices.iter().copied());
                }
                GuaranteeKind::AbsoluteFirstAt { .. } => state.absolute_armed = true,
                GuaranteeKind::RateUpFrom { .. } => state.rate_up_from_armed = true,
                GuaranteeKind::None | GuaranteeKind::CarryoverOnLoss => {}
            }
        }
        state
    }

    /// Start a new pull: bump the pull, pity and window counters.
    pub fn advance(&mut self) {
        self.pulls = self.pulls.saturating_add(1);
        self.pity = self.pity.saturating_add(1);
        if let Some(counter) = self.secondary_counter.as_mut() {
            *counter = counter.saturating_add(1);
        }
    }

    /// Any hit, rate-up or not, clears pity and the hit window.
    pub fn register_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
        self.pity = 0;
        self.reset_secondary();
    }

    pub fn reset_secondary(&mut self) {
        if let Some(counter) = self.secondary_counter.as_mut() {
            *counter = 0;
        }
    }

    /// Count one rate-up; the first one stamps `first_rate_up_pull`.
    pub fn credit_rate_up(&mut self) {
        self.rate_up_count = self.rate_up_count.saturating_add(1);
        if self.first_rate_up_pull.is_none() {
            self.first_rate_up_pull = Some(self.pulls);
        }
    }

    /// Record the outcome of the trial's first hit.
    pub fn note_first_hit(&mut self, rate_up: bool) {
        if !self.first_hit_resolved {
            self.first_hit_resolved = true;
            self.lost_first_split = !rate_up;
        }
    }
}
