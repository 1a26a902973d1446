//! Pity curve: pulls since the last hit mapped to the hit probability of the
//! current pull.
use crate::policy::{Breakpoint, PullPolicyConfig, RampShape};

#[derive(Debug, Clone, PartialEq)]
enum Ramp {
    Linear { increment: f64 },
    Piecewise { breakpoints: Vec<Breakpoint> },
}

/// Pure probability curve derived from a validated policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PityCurve {
    base_rate: f64,
    soft_pity_start: u32,
    hard_pity: u32,
    ramp: Ramp,
}

impl PityCurve {
    #[must_use]
    pub fn from_policy(policy: &PullPolicyConfig) -> Self {
        let base_rate = policy.base_rate();
        let soft = policy.soft_pity_start();
        let hard = policy.hard_pity();
        let ramp = match policy.ramp_shape() {
            RampShape::Linear { increment } => Ramp::Linear {
                increment: increment
                    .unwrap_or_else(|| (1.0 - base_rate) / f64::from(hard - soft)),
            },
            RampShape::Piecewise { breakpoints } => Ramp::Piecewise {
                breakpoints: breakpoints.clone(),
            },
        };
        Self {
            base_rate,
            soft_pity_start: soft,
            hard_pity: hard,
            ramp,
        }
    }

    /// Hit probability for a pull made at `pity`, always within [0, 1].
    #[must_use]
    pub fn probability(&self, pity: u32) -> f64 {
        if pity >= self.hard_pity {
            return 1.0;
        }
        if pity < self.soft_pity_start {
            return self.base_rate.clamp(0.0, 1.0);
        }
        let raw = match &self.ramp {
            Ramp::Linear { increment } => {
                self.base_rate + f64::from(pity - self.soft_pity_start) * increment
            }
            Ramp::Piecewise { breakpoints } => {
                if pity >= self.hard_pity - 1 {
                    return 1.0;
                }
                self.base_rate
                    + breakpoints
                        .iter()
                        .map(|bp| bp.slope * f64::from(pity.saturating_sub(bp.threshold)))
                        .sum::<f64>()
            }
        };
        raw.clamp(0.0, 1.0)
    }

    /// Smallest pity value at which a hit is certain.
    #[must_use]
    pub fn first_certain_pity(&self) -> u32 {
        (0..self.hard_pity)
            .find(|&pity| self.probability(pity) >= 1.0)
            .unwrap_or(self.hard_pity)
    }

    /// Expected pulls between consecutive hits implied by the curve alone.
    #[must_use]
    pub fn expected_pulls_per_hit(&self) -> f64 {
        let mut survival = 1.0;
        let mut expected = 0.0;
        for pity in 1..=self.hard_pity {
            let p = self.probability(pity);
            expected += f64::from(pity) * survival * p;
            survival *= 1.0 - p;
            if p >= 1.0 {
                break;
            }
        }
        expected
    }

    #[must_use]
    pub const fn hard_pity(&self) -> u32 {
        self.hard_pity
    }
}
