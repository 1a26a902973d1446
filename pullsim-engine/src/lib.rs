//! Pullsim Engine
//!
//! Monte Carlo simulation of pity-driven gacha pull processes. A validated
//! [`PullPolicyConfig`] describes the hit curve, guarantees and stop condition;
//! [`ExperimentRunner`] plays one trial and [`Aggregator`] reduces many of them
//! into [`AggregateStatistics`]. The crate performs no I/O.

pub mod aggregate;
pub mod constants;
pub mod curve;
pub mod guarantee;
pub mod numbers;
pub mod policy;
pub mod presets;
pub mod rng;
pub mod runner;
pub mod state;
pub mod stats;
pub mod worker;

// Re-export commonly used types
pub use aggregate::{AggregateStatistics, Aggregator, Execution, ExperimentBatch, ExperimentPlan};
pub use curve::PityCurve;
pub use guarantee::{GuaranteeStateMachine, HitClass, RateUpCause, Trigger};
pub use policy::{Breakpoint, ConfigError, GuaranteeKind, PolicyParams, PullPolicyConfig, RampShape};
pub use presets::{Preset, UnknownPreset};
pub use rng::{CountingRng, RollSource, TrialRng, derive_trial_seed};
pub use runner::{
    ExperimentResult, ExperimentRunner, PullEvent, PullModel, RunnerPhase, SimulationError,
};
pub use state::PullState;
pub use stats::{FrequencyTable, Summary, Tally, percentile};
pub use worker::TrialPool;
