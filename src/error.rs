use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// Weight magnitude exploded (or became NaN) after an update.
    ///
    /// This is fatal: the build is aborted, the attempt is not retried.
    #[error(
        "numerical instability in attempt {attempt}, epoch {epoch}: weight vector magnitude {magnitude}"
    )]
    NumericalInstability {
        attempt: usize,
        epoch: usize,
        magnitude: f64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
