use thiserror::Error;

use crate::image::ImageError;
use crate::units::UnitError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unit error: {0}")]
    Unit(#[from] UnitError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failure talking to the cluster API.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    #[error("cluster request failed: {0}")]
    Request(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Failure reading from or writing to the discovery store.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
