//! Engine-wide tuning constants.

/// Trials run by an aggregation when a plan does not say otherwise.
pub const DEFAULT_EXPERIMENTS: u64 = 10_000;

/// Multiplier applied to `hard_pity × target_rate_ups × ⌈1 / rate_up_share⌉`
/// to derive the per-trial pull ceiling.
pub const RUNAWAY_CAP_FACTOR: u64 = 64;

/// Lower summary percentile reported for every distribution.
pub const LOW_PERCENTILE: f64 = 5.0;

/// Upper summary percentile reported for every distribution.
pub const HIGH_PERCENTILE: f64 = 95.0;

/// Domain tag mixed into per-trial seed derivation.
pub const TRIAL_SEED_DOMAIN: &[u8] = b"pullsim-trial";

/// Cores left free when the worker pool sizes itself.
pub const WORKER_RESERVED_CORES: usize = 1;

/// Stack size for worker threads.
pub const WORKER_STACK_BYTES: usize = 4 * 1024 * 1024;
