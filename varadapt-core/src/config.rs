//! Configuration of the warm-up windows.
//!
//! Configurations are plain serde structs and can be read from TOML:
//!
//! ```
//! use varadapt_core::config::AdaptationConfig;
//!
//! let config = AdaptationConfig::from_toml_str(
//!     r#"
//!     n_params = 3
//!
//!     [windows]
//!     type = "derived"
//!     num_iterations = 1050
//!     window_size = 100
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.n_params, 3);
//! assert_eq!(config.max_num_windows().unwrap(), 10);
//! ```

use crate::errors::{AdaptError, AdaptResult};
use serde::{Deserialize, Serialize};

/// How many windows to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowSchedule {
    /// An explicit number of windows
    Fixed { max_num_windows: usize },
    /// One window per complete block of `window_size` iterations
    Derived {
        num_iterations: usize,
        window_size: usize,
    },
}

impl WindowSchedule {
    /// Resolve the number of windows.
    ///
    /// For [`WindowSchedule::Derived`] this is `num_iterations / window_size`
    /// using integer division: iterations that do not fill a whole window are
    /// not adapted on.
    pub fn max_num_windows(&self) -> AdaptResult<usize> {
        let windows = match *self {
            WindowSchedule::Fixed { max_num_windows } => max_num_windows,
            WindowSchedule::Derived {
                num_iterations,
                window_size,
            } => {
                if window_size == 0 {
                    return Err(AdaptError::InvalidConfiguration(
                        "window_size must be greater than zero".to_string(),
                    ));
                }
                num_iterations / window_size
            }
        };

        if windows == 0 {
            return Err(AdaptError::InvalidConfiguration(format!(
                "{:?} does not provide a single window",
                self
            )));
        }
        Ok(windows)
    }
}

/// Parameters of a [`WindowedVarianceAdaptation`](crate::adaptation::WindowedVarianceAdaptation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Number of sampled parameters (length of every sample)
    pub n_params: usize,
    pub windows: WindowSchedule,
}

impl AdaptationConfig {
    pub fn from_toml_str(contents: &str) -> AdaptResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn max_num_windows(&self) -> AdaptResult<usize> {
        self.windows.max_num_windows()
    }
}
