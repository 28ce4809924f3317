use thiserror::Error;

/// Startup and configuration failures.
///
/// None of these can happen once the estimator and control loops are running;
/// a flight controller that hits one of them must not take off.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A tuning or timing constant is outside of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A task was configured outside of an async runtime.
    #[error("no runtime available to spawn the {0} task")]
    NoRuntime(&'static str),

    /// A task was started twice.
    #[error("the {0} task is already running")]
    AlreadyRunning(&'static str),
}

/// Numerical degeneracy detected in the frame transformation math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// The vector has (almost) zero length or non-finite components.
    #[error("cannot normalize a zero-length vector")]
    ZeroLength,

    /// The vectors point in opposite directions so the rotation axis is undefined.
    #[error("vectors are anti-parallel, rotation axis is undefined")]
    AntiParallel,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
