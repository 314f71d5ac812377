//! Error and result types shared by the graph assembly, optimizer and plotting code.

use thiserror::Error;

use crate::mapping::key::{PoseKey, TrajectoryId};

pub type UwbResult<T> = Result<T, UwbError>;

#[derive(Debug, Error)]
pub enum UwbError {
    #[error("pose key {0} already has a value")]
    DuplicateKey(PoseKey),

    #[error("trajectory {0} is already registered in this graph")]
    TrajectoryCollision(TrajectoryId),

    #[error("pose key {0} not found")]
    KeyNotFound(PoseKey),

    /// A factor references a key that has no initial estimate.
    #[error("no initial estimate for pose key {0}")]
    MissingInitialEstimate(PoseKey),

    #[error("noise model has dimension {actual}, factor expects {expected}")]
    NoiseDimension { expected: usize, actual: usize },

    #[error("invalid sigma {0}: sigmas must be finite and strictly positive")]
    InvalidSigma(f64),

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("invalid trajectory {id}: {reason}")]
    InvalidTrajectory { id: TrajectoryId, reason: String },

    #[error("linear system is not positive definite")]
    IndefiniteSystem,

    #[error("plotting error: {0}")]
    Plot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
