//! Collaborator interfaces the reconciler reads from and writes to.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{ClusterResult, DiscoveryResult};
use crate::k8s::KubeJob;
use crate::raw::{RawJob, RawNode, RawPod, RawRequestBatch, RawWorker};
use crate::report::{ReconcileReport, WorkerCommand};
use crate::types::{ClusterInventory, Registry, TemplateStore, Versions};

/// Response of a job creation call. Rejections are carried in the status,
/// not as errors, so that they can be turned into warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobResponse {
    pub status: u16,
    pub message: Option<String>,
}

impl CreateJobResponse {
    pub fn created() -> Self {
        Self {
            status: 201,
            message: None,
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self {
            status: 422,
            message: Some(message.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_nodes(&self) -> ClusterResult<Vec<RawNode>>;

    async fn list_pods(&self) -> ClusterResult<Vec<RawPod>>;

    /// Worker jobs, selected by the `type=worker` label.
    async fn list_jobs(&self) -> ClusterResult<Vec<RawJob>>;

    async fn inventory(&self) -> ClusterResult<ClusterInventory>;

    async fn create_job(&self, job: &KubeJob) -> ClusterResult<CreateJobResponse>;
}

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Ordered upstream request stream.
    async fn algorithm_requests(&self) -> DiscoveryResult<Vec<RawRequestBatch>>;

    /// Registered workers keyed by registry path.
    async fn workers(&self) -> DiscoveryResult<BTreeMap<String, RawWorker>>;

    async fn templates(&self) -> DiscoveryResult<TemplateStore>;

    async fn versions(&self) -> DiscoveryResult<Option<Versions>>;

    async fn registry(&self) -> DiscoveryResult<Option<Registry>>;

    async fn send_command(&self, command: &WorkerCommand) -> DiscoveryResult<()>;

    async fn write_report(&self, report: &ReconcileReport) -> DiscoveryResult<()>;
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
