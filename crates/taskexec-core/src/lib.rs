pub mod config;
pub mod error;
pub mod image;
pub mod k8s;
pub mod raw;
pub mod report;
pub mod resources;
pub mod traits;
pub mod types;
pub mod units;
pub mod warning;

pub use config::{ExecutorConfig, PressureRatios};
pub use error::*;
pub use image::{ImageError, ImageRef};
pub use k8s::{ALGORITHM_NAME_LABEL, WORKER_POD_TYPE};
pub use report::{AlgorithmReport, ReconcileReport, WorkerCommand, WorkerCommandKind};
pub use resources::*;
pub use traits::{ClusterApi, CreateJobResponse, Discovery, epoch_millis};
pub use types::*;
pub use units::{Quantity, UnitError};
pub use warning::{Warning, WarningCode};
