//! Declarative pull policy: curve shape, guarantee variants and stop condition.
//!
//! A [`PullPolicyConfig`] is validated once, when it is built (directly or via
//! serde), so no invalid parameter can reach a running trial.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::constants::RUNAWAY_CAP_FACTOR;
use crate::numbers::ceil_f64_to_u64;

/// One `(threshold, slope)` pair of a piecewise ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub threshold: u32,
    pub slope: f64,
}

impl Breakpoint {
    #[must_use]
    pub const fn new(threshold: u32, slope: f64) -> Self {
        Self { threshold, slope }
    }
}

/// How hit probability grows between soft and hard pity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RampShape {
    /// Constant step per pull. Without an explicit increment the step is
    /// chosen so the curve lands on 1.0 exactly at hard pity.
    Linear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        increment: Option<f64>,
    },
    /// Slopes accumulate as each threshold is passed.
    Piecewise { breakpoints: Vec<Breakpoint> },
}

impl Default for RampShape {
    fn default() -> Self {
        Self::Linear { increment: None }
    }
}

/// Guarantee mechanics attached to a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuaranteeKind {
    /// Every hit is an independent rate-up roll.
    #[default]
    None,
    /// Losing a roll makes the next hit a guaranteed rate-up.
    CarryoverOnLoss,
    /// The first rate-up is granted outright when the pull counter reaches
    /// `pull_index`, pre-empting that pull's hit roll.
    AbsoluteFirstAt {
        pull_index: u64,
        /// Drop the trigger once any rate-up was obtained before it fires.
        #[serde(default)]
        waived_by_earlier_rate_up: bool,
    },
    /// One bonus rate-up at each listed absolute pull index.
    ScheduledSet { indices: Vec<u64> },
    /// The first hit at or after `pull_index` is forced to rate-up.
    RateUpFrom { pull_index: u64 },
}

impl GuaranteeKind {
    /// Stable snake-case label, matching the serialized tag.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CarryoverOnLoss => "carryover_on_loss",
            Self::AbsoluteFirstAt { .. } => "absolute_first_at",
            Self::ScheduledSet { .. } => "scheduled_set",
            Self::RateUpFrom { .. } => "rate_up_from",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::None | Self::CarryoverOnLoss => Ok(()),
            Self::AbsoluteFirstAt { pull_index, .. } | Self::RateUpFrom { pull_index } => {
                if *pull_index == 0 {
                    return Err(ConfigError::ZeroValue {
                        field: "guarantee_kind.pull_index",
                    });
                }
                Ok(())
            }
            Self::ScheduledSet { indices } => {
                if indices.is_empty() {
                    return Err(ConfigError::ScheduleEmpty);
                }
                let mut seen = BTreeSet::new();
                for &index in indices {
                    if index == 0 {
                        return Err(ConfigError::ZeroValue {
                            field: "guarantee_kind.indices",
                        });
                    }
                    if !seen.insert(index) {
                        return Err(ConfigError::ScheduleDuplicate { index });
                    }
                }
                Ok(())
            }
        }
    }

    /// Highest absolute pull index this guarantee can act on.
    fn last_trigger_index(&self) -> u64 {
        match self {
            Self::AbsoluteFirstAt { pull_index, .. } | Self::RateUpFrom { pull_index } => {
                *pull_index
            }
            Self::ScheduledSet { indices } => indices.iter().copied().max().unwrap_or(0),
            Self::None | Self::CarryoverOnLoss => 0,
        }
    }
}

/// Errors raised when policy or plan invariants are violated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be in (0, 1] (got {value})")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },
    #[error("soft_pity_start {soft} must be below hard_pity {hard}")]
    PityOrder { soft: u32, hard: u32 },
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error("linear ramp increment must be finite and non-negative (got {value})")]
    RampIncrement { value: f64 },
    #[error("piecewise ramp needs at least one breakpoint")]
    BreakpointsEmpty,
    #[error(
        "breakpoint threshold {threshold} must lie in [soft_pity_start {soft}, hard_pity {hard})"
    )]
    BreakpointOutOfRange { threshold: u32, soft: u32, hard: u32 },
    #[error("breakpoint thresholds must increase strictly ({previous} then {threshold})")]
    BreakpointOrder { previous: u32, threshold: u32 },
    #[error("breakpoint slope at {threshold} must be finite and non-negative (got {slope})")]
    BreakpointSlope { threshold: u32, slope: f64 },
    #[error("scheduled guarantee needs at least one pull index")]
    ScheduleEmpty,
    #[error("scheduled pull index {index} is listed more than once")]
    ScheduleDuplicate { index: u64 },
    #[error("guarantee `{kind}` is configured more than once")]
    DuplicateGuarantee { kind: &'static str },
    #[error("guarantee `none` cannot be combined with other guarantees")]
    NoneStacked,
    #[error("invalid policy document: {0}")]
    Parse(String),
}

/// Flat, unvalidated policy parameters as they appear in a policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyParams {
    #[serde(default = "PolicyParams::default_name")]
    pub name: String,
    pub base_rate: f64,
    pub soft_pity_start: u32,
    pub hard_pity: u32,
    #[serde(default)]
    pub ramp_shape: RampShape,
    pub rate_up_share: f64,
    #[serde(default)]
    pub guarantee_kind: GuaranteeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_guarantees: Vec<GuaranteeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_window: Option<u32>,
    pub target_rate_ups: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulls_per_set: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pulls_per_trial: Option<u64>,
}

impl PolicyParams {
    fn default_name() -> String {
        String::from("custom")
    }

    /// Check every parameter invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("base_rate", self.base_rate)?;
        check_probability("rate_up_share", self.rate_up_share)?;
        if self.soft_pity_start >= self.hard_pity {
            return Err(ConfigError::PityOrder {
                soft: self.soft_pity_start,
                hard: self.hard_pity,
            });
        }
        if self.target_rate_ups == 0 {
            return Err(ConfigError::ZeroValue {
                field: "target_rate_ups",
            });
        }
        check_non_zero("hit_window", self.hit_window)?;
        check_non_zero("pulls_per_set", self.pulls_per_set)?;
        check_non_zero("max_pulls_per_trial", self.max_pulls_per_trial)?;
        self.validate_ramp()?;
        self.validate_guarantees()
    }

    fn validate_ramp(&self) -> Result<(), ConfigError> {
        match &self.ramp_shape {
            RampShape::Linear { increment } => match increment {
                Some(value) if !value.is_finite() || *value < 0.0 => {
                    Err(ConfigError::RampIncrement { value: *value })
                }
                _ => Ok(()),
            },
            RampShape::Piecewise { breakpoints } => {
                if breakpoints.is_empty() {
                    return Err(ConfigError::BreakpointsEmpty);
                }
                let mut previous: Option<u32> = None;
                for bp in breakpoints {
                    if bp.threshold < self.soft_pity_start || bp.threshold >= self.hard_pity {
                        return Err(ConfigError::BreakpointOutOfRange {
                            threshold: bp.threshold,
                            soft: self.soft_pity_start,
                            hard: self.hard_pity,
                        });
                    }
                    if let Some(prev) = previous
                        && bp.threshold <= prev
                    {
                        return Err(ConfigError::BreakpointOrder {
                            previous: prev,
                            threshold: bp.threshold,
                        });
                    }
                    if !bp.slope.is_finite() || bp.slope < 0.0 {
                        return Err(ConfigError::BreakpointSlope {
                            threshold: bp.threshold,
                            slope: bp.slope,
                        });
                    }
                    previous = Some(bp.threshold);
                }
                Ok(())
            }
        }
    }

    fn validate_guarantees(&self) -> Result<(), ConfigError> {
        let mut labels: BTreeSet<&'static str> = BTreeSet::new();
        let stacked = !self.additional_guarantees.is_empty();
        for kind in self.guarantees() {
            if stacked && matches!(kind, GuaranteeKind::None) {
                return Err(ConfigError::NoneStacked);
            }
            if !labels.insert(kind.label()) {
                return Err(ConfigError::DuplicateGuarantee { kind: kind.label() });
            }
            kind.validate()?;
        }
        Ok(())
    }

    fn guarantees(&self) -> impl Iterator<Item = &GuaranteeKind> {
        std::iter::once(&self.guarantee_kind).chain(self.additional_guarantees.iter())
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange { field, value })
    }
}

fn check_non_zero<T>(field: &'static str, value: Option<T>) -> Result<(), ConfigError>
where
    T: PartialEq + Default,
{
    match value {
        Some(v) if v == T::default() => Err(ConfigError::ZeroValue { field }),
        _ => Ok(()),
    }
}

/// Validated, immutable pull policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicyParams", into = "PolicyParams")]
pub struct PullPolicyConfig {
    params: PolicyParams,
}

impl PullPolicyConfig {
    /// Validate `params` and freeze it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first violated invariant.
    pub fn new(params: PolicyParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Parse and validate a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and the matching
    /// invariant error for invalid parameters.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: PolicyParams =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::new(params)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.params.name
    }

    #[must_use]
    pub const fn base_rate(&self) -> f64 {
        self.params.base_rate
    }

    #[must_use]
    pub const fn soft_pity_start(&self) -> u32 {
        self.params.soft_pity_start
    }

    #[must_use]
    pub const fn hard_pity(&self) -> u32 {
        self.params.hard_pity
    }

    #[must_use]
    pub const fn ramp_shape(&self) -> &RampShape {
        &self.params.ramp_shape
    }

    #[must_use]
    pub const fn rate_up_share(&self) -> f64 {
        self.params.rate_up_share
    }

    #[must_use]
    pub const fn guarantee_kind(&self) -> &GuaranteeKind {
        &self.params.guarantee_kind
    }

    /// Primary guarantee followed by any stacked ones.
    pub fn guarantees(&self) -> impl Iterator<Item = &GuaranteeKind> {
        self.params.guarantees()
    }

    #[must_use]
    pub const fn hit_window(&self) -> Option<u32> {
        self.params.hit_window
    }

    #[must_use]
    pub const fn target_rate_ups(&self) -> u32 {
        self.params.target_rate_ups
    }

    #[must_use]
    pub const fn pulls_per_set(&self) -> Option<u32> {
        self.params.pulls_per_set
    }

    /// Pull ceiling after which a trial is treated as runaway.
    #[must_use]
    pub fn runaway_cap(&self) -> u64 {
        if let Some(cap) = self.params.max_pulls_per_trial {
            return cap;
        }
        let hits_per_rate_up = ceil_f64_to_u64(1.0 / self.params.rate_up_share).max(1);
        let derived = RUNAWAY_CAP_FACTOR
            .saturating_mul(u64::from(self.params.hard_pity))
            .saturating_mul(u64::from(self.params.target_rate_ups))
            .saturating_mul(hits_per_rate_up);
        let last_trigger = self
            .guarantees()
            .map(GuaranteeKind::last_trigger_index)
            .max()
            .unwrap_or(0);
        derived.saturating_add(last_trigger)
    }

    /// The unvalidated parameter view, e.g. for re-serialization.
    #[must_use]
    pub const fn params(&self) -> &PolicyParams {
        &self.params
    }
}

impl TryFrom<PolicyParams> for PullPolicyConfig {
    type Error = ConfigError;

    fn try_from(params: PolicyParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<PullPolicyConfig> for PolicyParams {
    fn from(config: PullPolicyConfig) -> Self {
        config.params
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn base_params() -> PolicyParams {
        PolicyParams {
            name: "test".to_string(),
            base_rate: 0.006,
            soft_pity_start: 74,
            hard_pity: 90,
            ramp_shape: RampShape::default(),
            rate_up_share: 0.5,
            guarantee_kind: GuaranteeKind::CarryoverOnLoss,
            additional_guarantees: Vec::new(),
            hit_window: None,
            target_rate_ups: 1,
            pulls_per_set: None,
            max_pulls_per_trial: None,
        }
    }

    #[test]
    fn accepts_reasonable_policy() {
        let config = PullPolicyConfig::new(base_params()).expect("valid policy");
        assert_eq!(config.hard_pity(), 90);
        assert_eq!(config.guarantees().count(), 1);
    }

    #[test]
    fn rejects_rates_outside_unit_interval() {
        for value in [0.0, -0.1, 1.5, f64::NAN] {
            let params = PolicyParams {
                base_rate: value,
                ..base_params()
            };
            assert!(matches!(
                PullPolicyConfig::new(params),
                Err(ConfigError::ProbabilityOutOfRange {
                    field: "base_rate",
                    ..
                })
            ));
        }
        let params = PolicyParams {
            rate_up_share: 0.0,
            ..base_params()
        };
        assert!(matches!(
            PullPolicyConfig::new(params),
            Err(ConfigError::ProbabilityOutOfRange {
                field: "rate_up_share",
                ..
            })
        ));
        let params = PolicyParams {
            base_rate: 1.0,
            rate_up_share: 1.0,
            ..base_params()
        };
        assert!(PullPolicyConfig::new(params).is_ok());
    }

    #[test]
    fn rejects_inverted_pity_and_zero_target() {
        let params = PolicyParams {
            soft_pity_start: 90,
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::PityOrder { soft: 90, hard: 90 })
        );
        let params = PolicyParams {
            target_rate_ups: 0,
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::ZeroValue {
                field: "target_rate_ups"
            })
        );
    }

    #[test]
    fn rejects_breakpoints_beyond_hard_pity() {
        let params = PolicyParams {
            ramp_shape: RampShape::Piecewise {
                breakpoints: vec![Breakpoint::new(80, 0.1), Breakpoint::new(95, 0.2)],
            },
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::BreakpointOutOfRange {
                threshold: 80,
                soft: 74,
                hard: 90
            })
        );
        let params = PolicyParams {
            ramp_shape: RampShape::Piecewise {
                breakpoints: vec![Breakpoint::new(80, 0.1), Breakpoint::new(90, 0.2)],
            },
            ..base_params()
        };
        assert!(matches!(
            PullPolicyConfig::new(params),
            Err(ConfigError::BreakpointOutOfRange { threshold: 90, .. })
        ));
    }

    #[test]
    fn rejects_unsorted_or_negative_breakpoints() {
        let params = PolicyParams {
            ramp_shape: RampShape::Piecewise {
                breakpoints: vec![Breakpoint::new(80, 0.1), Breakpoint::new(76, 0.2)],
            },
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::BreakpointOrder {
                previous: 80,
                threshold: 76
            })
        );
        let params = PolicyParams {
            ramp_shape: RampShape::Piecewise {
                breakpoints: vec![Breakpoint::new(80, -0.1)],
            },
            ..base_params()
        };
        assert!(matches!(
            PullPolicyConfig::new(params),
            Err(ConfigError::BreakpointSlope { threshold: 80, .. })
        ));
        let params = PolicyParams {
            ramp_shape: RampShape::Piecewise {
                breakpoints: Vec::new(),
            },
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::BreakpointsEmpty)
        );
    }

    #[test]
    fn rejects_bad_linear_increment() {
        let params = PolicyParams {
            ramp_shape: RampShape::Linear {
                increment: Some(-0.01),
            },
            ..base_params()
        };
        assert!(matches!(
            PullPolicyConfig::new(params),
            Err(ConfigError::RampIncrement { .. })
        ));
    }

    #[test]
    fn rejects_bad_guarantee_parameters() {
        let params = PolicyParams {
            guarantee_kind: GuaranteeKind::ScheduledSet {
                indices: vec![180, 340, 180],
            },
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::ScheduleDuplicate { index: 180 })
        );
        let params = PolicyParams {
            guarantee_kind: GuaranteeKind::ScheduledSet {
                indices: Vec::new(),
            },
            ..base_params()
        };
        assert_eq!(PullPolicyConfig::new(params), Err(ConfigError::ScheduleEmpty));
        let params = PolicyParams {
            guarantee_kind: GuaranteeKind::AbsoluteFirstAt {
                pull_index: 0,
                waived_by_earlier_rate_up: false,
            },
            ..base_params()
        };
        assert!(matches!(
            PullPolicyConfig::new(params),
            Err(ConfigError::ZeroValue { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_or_none_stacking() {
        let params = PolicyParams {
            additional_guarantees: vec![GuaranteeKind::CarryoverOnLoss],
            ..base_params()
        };
        assert_eq!(
            PullPolicyConfig::new(params),
            Err(ConfigError::DuplicateGuarantee {
                kind: "carryover_on_loss"
            })
        );
        let params = PolicyParams {
            guarantee_kind: GuaranteeKind::None,
            additional_guarantees: vec![GuaranteeKind::RateUpFrom { pull_index: 150 }],
            ..base_params()
        };
        assert_eq!(PullPolicyConfig::new(params), Err(ConfigError::NoneStacked));
    }

    #[test]
    fn rejects_zero_optional_counts() {
        for (params, field) in [
            (
                PolicyParams {
                    hit_window: Some(0),
                    ..base_params()
                },
                "hit_window",
            ),
            (
                PolicyParams {
                    pulls_per_set: Some(0),
                    ..base_params()
                },
                "pulls_per_set",
            ),
            (
                PolicyParams {
                    max_pulls_per_trial: Some(0),
                    ..base_params()
                },
                "max_pulls_per_trial",
            ),
        ] {
            assert_eq!(
                PullPolicyConfig::new(params),
                Err(ConfigError::ZeroValue { field })
            );
        }
    }

    #[test]
    fn parses_json_documents_through_validation() {
        let json = r#"{
            "name": "wuwa",
            "base_rate": 0.008,
            "soft_pity_start": 65,
            "hard_pity": 80,
            "ramp_shape": {
                "type": "piecewise",
                "breakpoints": [
                    { "threshold": 65, "slope": 0.04 },
                    { "threshold": 70, "slope": 0.04 },
                    { "threshold": 75, "slope": 0.02 }
                ]
            },
            "rate_up_share": 0.5,
            "guarantee_kind": { "type": "carryover_on_loss" },
            "target_rate_ups": 5
        }"#;
        let config = PullPolicyConfig::from_json_str(json).expect("valid document");
        assert_eq!(config.name(), "wuwa");
        assert_eq!(config.guarantee_kind(), &GuaranteeKind::CarryoverOnLoss);

        let invalid = json.replace("\"hard_pity\": 80", "\"hard_pity\": 60");
        assert!(matches!(
            PullPolicyConfig::from_json_str(&invalid),
            Err(ConfigError::PityOrder { .. })
        ));
        assert!(matches!(
            PullPolicyConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn serde_roundtrip_revalidates() {
        let config = PullPolicyConfig::new(base_params()).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: PullPolicyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn runaway_cap_scales_with_share_and_triggers() {
        let config = PullPolicyConfig::new(base_params()).unwrap();
        assert_eq!(config.runaway_cap(), RUNAWAY_CAP_FACTOR * 90 * 2);

        let params = PolicyParams {
            guarantee_kind: GuaranteeKind::ScheduledSet {
                indices: vec![180, 820],
            },
            ..base_params()
        };
        let config = PullPolicyConfig::new(params).unwrap();
        assert_eq!(config.runaway_cap(), RUNAWAY_CAP_FACTOR * 90 * 2 + 820);

        let params = PolicyParams {
            max_pulls_per_trial: Some(500),
            ..base_params()
        };
        assert_eq!(PullPolicyConfig::new(params).unwrap().runaway_cap(), 500);
    }
}
