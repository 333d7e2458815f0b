//! Per-process running statistics.
//!
//! [`RunningStats`] keeps the count, mean and sum of squared deviations of a
//! stream of observations using Welford's single-pass update, so that the
//! variance of a long warm-up window can be recovered without storing the
//! window or subtracting large sums of squares.
//!
//! Two accumulators are combined with the pairwise update of Chan et al.:
//!
//! ```text
//! n     = n_a + n_b
//! delta = mean_b - mean_a
//! mean  = mean_a + delta * n_b / n
//! M2    = M2_a + M2_b + delta^2 * n_a * n_b / n
//! ```
//!
//! The same formula is exposed over the flat `2P + 1` payload layout
//! (`[count, mean_0..P, M2_0..P]`) as [`merge_payload`], which is the reduction
//! operator handed to a [`Communicator`](crate::comm::Communicator).

use crate::errors::{check_dimension, AdaptError, AdaptResult};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Running count, mean and sum of squared deviations for `n_params` dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    count: usize,
    mean: Array1<f64>,
    sum_sq_dev: Array1<f64>,
}

impl RunningStats {
    /// Create an empty accumulator for `n_params` dimensions.
    pub fn new(n_params: usize) -> Self {
        Self {
            count: 0,
            mean: Array1::zeros(n_params),
            sum_sq_dev: Array1::zeros(n_params),
        }
    }

    /// Number of dimensions of each observation.
    pub fn n_params(&self) -> usize {
        self.mean.len()
    }

    /// Number of observations since the last restart.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    /// Sum of squared deviations from the mean (often called `M2`).
    pub fn sum_sq_dev(&self) -> ArrayView1<'_, f64> {
        self.sum_sq_dev.view()
    }

    /// Incorporate a single observation.
    ///
    /// Returns [`AdaptError::DimensionMismatch`] if `sample` does not have
    /// exactly `n_params` entries; the accumulator is left untouched in that case.
    pub fn update(&mut self, sample: ArrayView1<'_, f64>) -> AdaptResult<()> {
        check_dimension(self.n_params(), sample.len())?;

        self.count += 1;
        let n = self.count as f64;
        Zip::from(&mut self.mean)
            .and(&mut self.sum_sq_dev)
            .and(sample)
            .for_each(|mean, m2, &x| {
                let delta = x - *mean;
                *mean += delta / n;
                *m2 += delta * (x - *mean);
            });
        Ok(())
    }

    /// Reset to the empty state.
    pub fn restart(&mut self) {
        self.count = 0;
        self.mean.fill(0.0);
        self.sum_sq_dev.fill(0.0);
    }

    /// Fold the observations summarised by `other` into `self`.
    pub fn merge(&mut self, other: &RunningStats) -> AdaptResult<()> {
        check_dimension(self.n_params(), other.n_params())?;

        let mut acc = self.to_payload();
        merge_payload(&other.to_payload(), &mut acc);
        *self = Self::from_payload(self.n_params(), &acc)?;
        Ok(())
    }

    /// Bessel-corrected variance of the local observations.
    ///
    /// `None` when fewer than two observations have been seen.
    pub fn sample_variance(&self) -> Option<Array1<f64>> {
        if self.count <= 1 {
            return None;
        }
        Some(&self.sum_sq_dev / (self.count - 1) as f64)
    }

    /// Length of the flat payload for `n_params` dimensions.
    pub fn payload_len(n_params: usize) -> usize {
        2 * n_params + 1
    }

    /// Flatten into `[count, mean_0..P, M2_0..P]`.
    pub fn to_payload(&self) -> Vec<f64> {
        let mut payload = Vec::with_capacity(Self::payload_len(self.n_params()));
        payload.push(self.count as f64);
        payload.extend(self.mean.iter());
        payload.extend(self.sum_sq_dev.iter());
        payload
    }

    /// Rebuild an accumulator from a payload produced by [`Self::to_payload`]
    /// or by a reduction over such payloads.
    pub fn from_payload(n_params: usize, payload: &[f64]) -> AdaptResult<Self> {
        check_dimension(Self::payload_len(n_params), payload.len())?;

        let count = payload[0];
        if !(count >= 0.0) || count.fract() != 0.0 {
            return Err(AdaptError::Communication(format!(
                "payload count must be a non-negative integer, got {}",
                count
            )));
        }

        Ok(Self {
            count: count as usize,
            mean: Array1::from(payload[1..=n_params].to_vec()),
            sum_sq_dev: Array1::from(payload[n_params + 1..].to_vec()),
        })
    }
}

/// Reduction operator over flat payloads: folds `incoming` into `acc`.
///
/// Associative and commutative up to floating-point rounding. An empty side
/// contributes nothing, so merging into an empty accumulator copies `incoming`
/// exactly. Both slices must have the same `2P + 1` length.
pub fn merge_payload(incoming: &[f64], acc: &mut [f64]) {
    debug_assert_eq!(incoming.len(), acc.len());
    if acc.is_empty() {
        return;
    }

    let n_b = incoming[0];
    if n_b == 0.0 {
        return;
    }
    let n_a = acc[0];
    if n_a == 0.0 {
        acc.copy_from_slice(incoming);
        return;
    }

    let n_params = (acc.len() - 1) / 2;
    let n = n_a + n_b;
    let (mean_a, m2_a) = acc[1..].split_at_mut(n_params);
    let (mean_b, m2_b) = incoming[1..].split_at(n_params);
    for i in 0..n_params {
        let delta = mean_b[i] - mean_a[i];
        mean_a[i] += delta * n_b / n;
        m2_a[i] += m2_b[i] + delta * delta * n_a * n_b / n;
    }
    acc[0] = n;
}
