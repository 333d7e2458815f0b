//! Windowed variance adaptation with shrinkage.
//!
//! [`WindowedVarianceAdaptation`] owns one [`DistributedVarianceEstimator`]
//! per warm-up window. At a window boundary the driver calls
//! [`WindowedVarianceAdaptation::learn_variance`], which merges the window
//! across all ranks, regularises the result and restarts every window.
//!
//! The raw sample variance $v$ of $n$ observations is shrunk towards a flat
//! target:
//!
//! $$ \hat{v} = \frac{n}{n + 5} v + \frac{5}{n + 5} 10^{-3} $$
//!
//! so the estimate approaches $v$ for long windows and the flat prior for
//! short ones, and is always strictly positive.

use crate::comm::Communicator;
use crate::config::{AdaptationConfig, WindowSchedule};
use crate::errors::{check_dimension, AdaptError, AdaptResult};
use crate::estimator::DistributedVarianceEstimator;
use log::{debug, trace};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Variance the estimate is shrunk towards.
pub const SHRINKAGE_TARGET: f64 = 1e-3;

/// Strength of the shrinkage target, in observations.
pub const SHRINKAGE_PSEUDO_COUNT: f64 = 5.0;

/// Blend a raw sample variance of `n` observations with [`SHRINKAGE_TARGET`].
pub fn shrink_variance(sample_var: ArrayView1<'_, f64>, n: usize) -> Array1<f64> {
    let n = n as f64;
    let data_weight = n / (n + SHRINKAGE_PSEUDO_COUNT);
    let prior_weight = SHRINKAGE_PSEUDO_COUNT / (n + SHRINKAGE_PSEUDO_COUNT);
    sample_var.mapv(|v| data_weight * v + SHRINKAGE_TARGET * prior_weight)
}

/// Fixed pool of warm-up windows sharing one parameter dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedVarianceAdaptation {
    n_params: usize,
    estimators: Box<[DistributedVarianceEstimator]>,
}

impl WindowedVarianceAdaptation {
    /// Allocate `max_num_windows` empty windows of dimension `n_params`.
    pub fn new(n_params: usize, max_num_windows: usize) -> AdaptResult<Self> {
        if n_params == 0 {
            return Err(AdaptError::InvalidConfiguration(
                "at least one parameter is required".to_string(),
            ));
        }
        let max_num_windows = WindowSchedule::Fixed { max_num_windows }.max_num_windows()?;

        Ok(Self {
            n_params,
            estimators: (0..max_num_windows)
                .map(|_| DistributedVarianceEstimator::new(n_params))
                .collect(),
        })
    }

    /// Allocate one window per complete block of `window_size` iterations.
    ///
    /// The window count is `num_iterations / window_size` with integer
    /// division. Remainder iterations are deliberately not given a window.
    pub fn from_schedule(
        n_params: usize,
        num_iterations: usize,
        window_size: usize,
    ) -> AdaptResult<Self> {
        let schedule = WindowSchedule::Derived {
            num_iterations,
            window_size,
        };
        Self::new(n_params, schedule.max_num_windows()?)
    }

    pub fn from_config(config: &AdaptationConfig) -> AdaptResult<Self> {
        Self::new(config.n_params, config.max_num_windows()?)
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn num_windows(&self) -> usize {
        self.estimators.len()
    }

    /// # Panics
    ///
    /// Panics if `win` is not a valid window index.
    pub fn estimator(&self, win: usize) -> &DistributedVarianceEstimator {
        self.check_window(win);
        &self.estimators[win]
    }

    /// # Panics
    ///
    /// Panics if `win` is not a valid window index.
    pub fn estimator_mut(&mut self, win: usize) -> &mut DistributedVarianceEstimator {
        self.check_window(win);
        &mut self.estimators[win]
    }

    /// Add a local observation to window `win`.
    ///
    /// # Panics
    ///
    /// Panics if `win` is not a valid window index.
    pub fn add_sample(&mut self, win: usize, sample: ArrayView1<'_, f64>) -> AdaptResult<()> {
        self.estimator_mut(win).add_sample(sample)
    }

    /// Add a local observation to every window.
    pub fn add_sample_to_all(&mut self, sample: ArrayView1<'_, f64>) -> AdaptResult<()> {
        check_dimension(self.n_params, sample.len())?;
        for estimator in self.estimators.iter_mut() {
            estimator.add_sample(sample)?;
        }
        Ok(())
    }

    /// Finalise window `win`: merge it across `comm`, write the shrunk
    /// variance into `out_var` and restart every window.
    ///
    /// This is a collective; every rank must call it with the same `win`.
    /// Returns the global observation count used for shrinkage, which is zero
    /// when fewer than two observations were available across all ranks. In
    /// that case `out_var` is exactly [`SHRINKAGE_TARGET`] everywhere.
    ///
    /// A communication failure is returned as an error and leaves the windows
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if `win` is not a valid window index.
    pub fn learn_variance<C: Communicator + ?Sized>(
        &mut self,
        out_var: &mut Array1<f64>,
        win: usize,
        comm: &C,
    ) -> AdaptResult<usize> {
        self.check_window(win);
        check_dimension(self.n_params, out_var.len())?;

        let mut sample_var = Array1::zeros(self.n_params);
        let n = match self.estimators[win].sample_variance(&mut sample_var, comm) {
            Ok(n) => n,
            Err(AdaptError::InsufficientData(count)) => {
                debug!(
                    "window {} has {} observation(s) across {} rank(s); using the flat prior",
                    win,
                    count,
                    comm.size()
                );
                0
            }
            Err(e) => return Err(e),
        };

        out_var.assign(&shrink_variance(sample_var.view(), n));
        debug!(
            "rank {} learned variance for window {} from {} observation(s)",
            comm.rank(),
            win,
            n
        );

        self.restart();
        Ok(n)
    }

    /// Empty every window on this rank. Local only, not a collective.
    pub fn restart(&mut self) {
        trace!("restarting {} window(s)", self.estimators.len());
        for estimator in self.estimators.iter_mut() {
            estimator.restart();
        }
    }

    fn check_window(&self, win: usize) {
        assert!(
            win < self.estimators.len(),
            "window index {} is out of range for {} window(s)",
            win,
            self.estimators.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SelfCommunicator;
    use approx::assert_relative_eq;
    use is_close::is_close;
    use ndarray::array;

    #[test]
    fn test_shrink_at_zero_is_flat_prior() {
        let shrunk = shrink_variance(array![0.0, 12.0].view(), 0);
        assert_eq!(shrunk, array![SHRINKAGE_TARGET, SHRINKAGE_TARGET]);
    }

    #[test]
    fn test_shrink_is_strictly_positive() {
        let raw = array![0.0, 1e-300, 1.0, 1e300];
        for n in [0, 1, 2, 5, 100, 1_000_000, usize::MAX / 2] {
            let shrunk = shrink_variance(raw.view(), n);
            assert!(
                shrunk.iter().all(|&v| v > 0.0),
                "non-positive variance for n={}: {:?}",
                n,
                shrunk
            );
        }
    }

    #[test]
    fn test_shrink_converges_to_sample_variance() {
        let v = 2.5;
        let shrunk = shrink_variance(array![v].view(), 10_000);
        // Prior weight is 5 / 10005
        assert_relative_eq!(shrunk[0], v, epsilon = v * 5.0 / 10_005.0);
        assert!(shrunk[0] < v);
    }

    #[test]
    fn test_shrink_six_observations() {
        let shrunk = shrink_variance(array![3.5].view(), 6);
        assert!(is_close!(shrunk[0], 6.0 / 11.0 * 3.5 + 5.0 / 11.0 * 1e-3));
        assert_relative_eq!(shrunk[0], 1.909_545_454_545, epsilon = 1e-9);
    }

    #[test]
    fn test_new_validates() {
        assert!(WindowedVarianceAdaptation::new(0, 1).is_err());
        assert!(WindowedVarianceAdaptation::new(1, 0).is_err());

        let adaptation = WindowedVarianceAdaptation::new(3, 4).unwrap();
        assert_eq!(adaptation.n_params(), 3);
        assert_eq!(adaptation.num_windows(), 4);
        for win in 0..4 {
            assert!(adaptation.estimator(win).stats().is_empty());
            assert_eq!(adaptation.estimator(win).n_params(), 3);
        }
    }

    #[test]
    fn test_from_schedule_truncates_remainder() {
        // 250 iterations in windows of 100 gives 2 windows, the last 50 are dropped
        let adaptation = WindowedVarianceAdaptation::from_schedule(2, 250, 100).unwrap();
        assert_eq!(adaptation.num_windows(), 2);

        let exact = WindowedVarianceAdaptation::from_schedule(2, 300, 100).unwrap();
        assert_eq!(exact.num_windows(), 3);

        assert!(WindowedVarianceAdaptation::from_schedule(2, 99, 100).is_err());
        assert!(WindowedVarianceAdaptation::from_schedule(2, 100, 0).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = AdaptationConfig {
            n_params: 2,
            windows: WindowSchedule::Derived {
                num_iterations: 40,
                window_size: 15,
            },
        };
        let adaptation = WindowedVarianceAdaptation::from_config(&config).unwrap();
        assert_eq!(adaptation.n_params(), 2);
        assert_eq!(adaptation.num_windows(), 2);
    }

    #[test]
    fn test_learn_variance_without_data() {
        let mut adaptation = WindowedVarianceAdaptation::new(3, 1).unwrap();
        let mut out_var = Array1::zeros(3);

        let n = adaptation
            .learn_variance(&mut out_var, 0, &SelfCommunicator)
            .unwrap();

        assert_eq!(n, 0);
        assert_eq!(out_var, Array1::from_elem(3, 1e-3));
        assert!(adaptation.estimator(0).stats().is_empty());
    }

    #[test]
    fn test_learn_variance_single_observation_uses_prior() {
        let mut adaptation = WindowedVarianceAdaptation::new(1, 1).unwrap();
        adaptation.add_sample(0, array![100.0].view()).unwrap();

        let mut out_var = Array1::zeros(1);
        let n = adaptation
            .learn_variance(&mut out_var, 0, &SelfCommunicator)
            .unwrap();

        assert_eq!(n, 0);
        assert_eq!(out_var, array![SHRINKAGE_TARGET]);
    }

    #[test]
    fn test_learn_variance_restarts_all_windows() {
        let mut adaptation = WindowedVarianceAdaptation::new(1, 3).unwrap();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            adaptation.add_sample_to_all(array![x].view()).unwrap();
        }
        assert!((0..3).all(|win| adaptation.estimator(win).stats().count() == 6));

        let mut out_var = Array1::zeros(1);
        let n = adaptation
            .learn_variance(&mut out_var, 1, &SelfCommunicator)
            .unwrap();

        assert_eq!(n, 6);
        assert_relative_eq!(
            out_var[0],
            6.0 / 11.0 * 3.5 + 5.0 / 11.0 * 1e-3,
            epsilon = 1e-12
        );
        assert!((0..3).all(|win| adaptation.estimator(win).stats().is_empty()));
    }

    #[test]
    fn test_window_reuse_has_no_leakage() {
        let mut adaptation = WindowedVarianceAdaptation::new(1, 1).unwrap();
        let mut out_var = Array1::zeros(1);

        for x in [-1000.0, 1000.0, 0.0] {
            adaptation.add_sample(0, array![x].view()).unwrap();
        }
        adaptation
            .learn_variance(&mut out_var, 0, &SelfCommunicator)
            .unwrap();

        for x in [1.0, 2.0, 3.0] {
            adaptation.add_sample(0, array![x].view()).unwrap();
        }
        let n = adaptation
            .learn_variance(&mut out_var, 0, &SelfCommunicator)
            .unwrap();

        assert_eq!(n, 3);
        assert_relative_eq!(out_var[0], 3.0 / 8.0 * 1.0 + 5.0 / 8.0 * 1e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_explicit_restart_abandons_window() {
        let mut adaptation = WindowedVarianceAdaptation::new(2, 2).unwrap();
        adaptation.add_sample(0, array![1.0, 2.0].view()).unwrap();
        adaptation.add_sample(1, array![3.0, 4.0].view()).unwrap();
        adaptation.restart();

        assert!(adaptation.estimator(0).stats().is_empty());
        assert!(adaptation.estimator(1).stats().is_empty());
    }

    #[test]
    fn test_dimension_mismatches() {
        let mut adaptation = WindowedVarianceAdaptation::new(2, 2).unwrap();
        adaptation.add_sample(0, array![1.0, 2.0].view()).unwrap();

        assert!(matches!(
            adaptation.add_sample(0, array![1.0].view()),
            Err(AdaptError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            adaptation.add_sample_to_all(array![1.0, 2.0, 3.0].view()),
            Err(AdaptError::DimensionMismatch { .. })
        ));
        // No window saw a partial update
        assert_eq!(adaptation.estimator(0).stats().count(), 1);
        assert_eq!(adaptation.estimator(1).stats().count(), 0);

        let mut out_var = Array1::zeros(5);
        assert!(matches!(
            adaptation.learn_variance(&mut out_var, 0, &SelfCommunicator),
            Err(AdaptError::DimensionMismatch { .. })
        ));
        // A rejected call must not restart the windows
        assert_eq!(adaptation.estimator(0).stats().count(), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_window_out_of_range_panics() {
        let mut adaptation = WindowedVarianceAdaptation::new(1, 2).unwrap();
        let mut out_var = Array1::zeros(1);
        let _ = adaptation.learn_variance(&mut out_var, 2, &SelfCommunicator);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut adaptation = WindowedVarianceAdaptation::new(2, 2).unwrap();
        adaptation.add_sample(1, array![0.5, -0.5].view()).unwrap();

        let json = serde_json::to_string(&adaptation).unwrap();
        let restored: WindowedVarianceAdaptation = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, adaptation);
    }
}
