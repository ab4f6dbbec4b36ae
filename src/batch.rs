//! Parallel simulations.
//!
//! A [`Batch`] holds independent `(Portfolio, SimulationOptions)` jobs and runs them on the
//! rayon pool, one [`Simulator`] per job. Jobs are split into one chunk per CPU.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::engine::{Portfolio, SimulationOptions, SimulationResult, Simulator};
use crate::errors::Result;

use rayon::prelude::*;

/// Independent simulations run in parallel.
#[derive(Debug, Default)]
pub struct Batch {
    jobs: Vec<(Portfolio, SimulationOptions)>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job.
    pub fn push(&mut self, portfolio: Portfolio, options: SimulationOptions) {
        self.jobs.push((portfolio, options));
    }

    /// Shares a cancellation flag with every simulator of the batch.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the number of jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns `true` if there is no job.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs every job.
    ///
    /// ### Returns
    /// One result per job, in insertion order. A failing job does not stop the others.
    pub fn run(&self) -> Vec<Result<SimulationResult>> {
        let num_cpus = num_cpus::get();
        let chunk_size = self.jobs.len().div_ceil(num_cpus).max(1);

        self.jobs
            .par_chunks(chunk_size)
            .map(|par_jobs| {
                par_jobs
                    .iter()
                    .map(|(portfolio, options)| {
                        let mut simulator = Simulator::new(portfolio.clone(), options.clone());
                        if let Some(cancel) = &self.cancel {
                            simulator = simulator.with_cancellation(Arc::clone(cancel));
                        }
                        simulator.simulate()
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }
}
