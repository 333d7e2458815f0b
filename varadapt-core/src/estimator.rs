//! Variance estimation over the union of every rank's observations.

use crate::comm::Communicator;
use crate::errors::{check_dimension, AdaptError, AdaptResult};
use crate::stats::{merge_payload, RunningStats};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Owns the local observations of one warm-up window and merges them with
/// the matching window on every other rank when asked for a variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedVarianceEstimator {
    stats: RunningStats,
}

impl DistributedVarianceEstimator {
    pub fn new(n_params: usize) -> Self {
        Self {
            stats: RunningStats::new(n_params),
        }
    }

    pub fn n_params(&self) -> usize {
        self.stats.n_params()
    }

    /// Local statistics, not merged with any other rank.
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Add one local observation. Local only, never blocks.
    pub fn add_sample(&mut self, sample: ArrayView1<'_, f64>) -> AdaptResult<()> {
        self.stats.update(sample)
    }

    /// Merge the local statistics of every rank in `comm`.
    ///
    /// This is a collective: all ranks must call it in the same logical step.
    pub fn merged_stats<C: Communicator + ?Sized>(&self, comm: &C) -> AdaptResult<RunningStats> {
        let reduced = comm.all_reduce(&self.stats.to_payload(), merge_payload)?;
        RunningStats::from_payload(self.n_params(), &reduced)
    }

    /// Write the Bessel-corrected variance of all ranks' observations into
    /// `out_var` and return the global observation count.
    ///
    /// This is a collective, see [`Self::merged_stats`]. Fails with
    /// [`AdaptError::InsufficientData`] when the global count is at most one;
    /// `out_var` is not modified in that case. The length of `out_var` is
    /// checked before entering the collective.
    pub fn sample_variance<C: Communicator + ?Sized>(
        &self,
        out_var: &mut Array1<f64>,
        comm: &C,
    ) -> AdaptResult<usize> {
        check_dimension(self.n_params(), out_var.len())?;

        let merged = self.merged_stats(comm)?;
        let variance = merged
            .sample_variance()
            .ok_or(AdaptError::InsufficientData(merged.count()))?;
        out_var.assign(&variance);
        Ok(merged.count())
    }

    /// Discard the local observations. Local only, not a collective.
    pub fn restart(&mut self) {
        self.stats.restart();
    }
}
