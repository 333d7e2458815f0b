use thiserror::Error;

/// Error type for invalid adaptation operations.
#[derive(Error, Debug)]
pub enum AdaptError {
    #[error("Dimension mismatch. Expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Insufficient data to estimate a variance. Global count={0}, at least 2 observations are required")]
    InsufficientData(usize),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Collective communication failed: {0}")]
    Communication(String),
    #[error("Could not parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Convenience type for `Result<T, AdaptError>`.
pub type AdaptResult<T> = Result<T, AdaptError>;

/// Returns a [`AdaptError::DimensionMismatch`] unless `got == expected`.
pub(crate) fn check_dimension(expected: usize, got: usize) -> AdaptResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(AdaptError::DimensionMismatch { expected, got })
    }
}
