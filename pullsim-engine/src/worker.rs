//! Thread pool that runs independent trials.
use log::{debug, error};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};

use crate::constants::{WORKER_RESERVED_CORES, WORKER_STACK_BYTES};
use crate::runner::SimulationError;

/// Rayon pool dedicated to one aggregation run.
pub struct TrialPool {
    pool: ThreadPool,
    num_threads: usize,
}

impl TrialPool {
    /// Build a pool with `requested` threads, or size it from the machine's
    /// available parallelism minus the reserved cores.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::PoolBuild`] when rayon cannot spawn the pool.
    pub fn new(requested: Option<usize>) -> Result<Self, SimulationError> {
        let num_threads = requested
            .filter(|&threads| threads > 0)
            .unwrap_or_else(default_thread_count);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("pullsim-trial-{index}"))
            .stack_size(WORKER_STACK_BYTES)
            .panic_handler(|err| {
                error!("trial worker panicked: {}", panic_message(err.as_ref()));
            })
            .build()
            .map_err(|err| SimulationError::PoolBuild(err.to_string()))?;
        debug!("trial pool ready with {num_threads} threads");
        Ok(Self { pool, num_threads })
    }

    /// Run `f` inside the pool, turning a panic into an error.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::WorkerPanicked`] when `f` panics.
    pub fn execute<F, R>(&self, f: F) -> Result<R, SimulationError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool
            .install(|| panic::catch_unwind(AssertUnwindSafe(f)))
            .map_err(|err| SimulationError::WorkerPanicked(panic_message(err.as_ref())))
    }

    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.num_threads
    }
}

fn default_thread_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4);
    cores.saturating_sub(WORKER_RESERVED_CORES).max(1)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
