//! Scheduler error types.

use thiserror::Error;

use taskexec_core::{ClusterError, DiscoveryError, ImageError, UnitError};

/// Errors that abort a job's construction or a whole tick.
///
/// Scheduling failures are not errors; they are reported as warnings.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("base job template has no {0} container")]
    MissingContainer(String),

    #[error("job details have no algorithm name")]
    MissingAlgorithmName,

    #[error("algorithm {0} has no algorithm image")]
    MissingAlgorithmImage(String),

    #[error("no template for algorithm {0}")]
    UnknownTemplate(String),

    #[error("unit error: {0}")]
    Unit(#[from] UnitError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
