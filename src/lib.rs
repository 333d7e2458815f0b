//! Distributed windowed variance adaptation.
//!
//! Re-exports the engine from `varadapt-core`. With the `python` feature the
//! crate also builds the `_lib` Python extension module.

pub use varadapt_core::{adaptation, comm, config, errors, estimator, stats};
pub use varadapt_core::{
    AdaptError, AdaptResult, Communicator, DistributedVarianceEstimator, RunningStats,
    SelfCommunicator, ThreadCommunicator, WindowedVarianceAdaptation,
};

#[cfg(feature = "python")]
mod python;
