//! Distributed windowed variance adaptation for gradient-based MCMC warm-up.
//!
//! During warm-up a Hamiltonian sampler tunes a diagonal metric from the
//! variance of recent draws. When the chain is simulated cooperatively by a
//! group of processes, each process only sees its own draws. This crate keeps
//! a numerically stable running summary per process and window, merges the
//! summaries of every process with a collective reduction, and shrinks the
//! merged variance towards a small flat prior before handing it back.
//!
//! # Module Organisation
//!
//! - `stats`: per-process running count, mean and sum of squared deviations
//! - `comm`: the [`Communicator`](comm::Communicator) abstraction and in-process groups
//! - `estimator`: merging one window across all ranks
//! - `adaptation`: the fixed pool of windows, shrinkage and restart
//! - `config`: serde configuration of the window schedule
//!
//! # Example
//!
//! ```
//! use ndarray::{array, Array1};
//! use varadapt_core::adaptation::WindowedVarianceAdaptation;
//! use varadapt_core::comm::SelfCommunicator;
//!
//! let mut adaptation = WindowedVarianceAdaptation::new(1, 1).unwrap();
//! for x in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
//!     adaptation.add_sample(0, array![x].view()).unwrap();
//! }
//!
//! let mut variance = Array1::zeros(1);
//! let n = adaptation
//!     .learn_variance(&mut variance, 0, &SelfCommunicator)
//!     .unwrap();
//!
//! assert_eq!(n, 6);
//! assert!((variance[0] - 1.909_545).abs() < 1e-6);
//! ```

pub mod adaptation;
pub mod comm;
pub mod config;
pub mod estimator;
#[cfg(feature = "python")]
pub mod python;
pub mod stats;

pub mod errors;

pub use adaptation::WindowedVarianceAdaptation;
pub use comm::{Communicator, SelfCommunicator, ThreadCommunicator};
pub use errors::{AdaptError, AdaptResult};
pub use estimator::DistributedVarianceEstimator;
pub use stats::RunningStats;
