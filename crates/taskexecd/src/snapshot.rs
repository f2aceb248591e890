//! File-backed cluster for dry runs.
//!
//! Nodes, pods and the object inventory come from a JSON snapshot. Jobs the
//! reconciler creates are kept in memory as active jobs, so the following
//! ticks see them as pending until a worker registers for them.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use taskexec_core::k8s::KubeJob;
use taskexec_core::raw::{ObjectMeta, RawJob, RawJobStatus, RawNode, RawPod};
use taskexec_core::{ClusterApi, ClusterError, ClusterInventory, ClusterResult, CreateJobResponse};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotFile {
    pub nodes: Vec<RawNode>,
    pub pods: Vec<RawPod>,
    pub jobs: Vec<RawJob>,
    pub inventory: ClusterInventory,
}

pub struct SnapshotCluster {
    nodes: Vec<RawNode>,
    pods: Vec<RawPod>,
    inventory: ClusterInventory,
    jobs: Mutex<Vec<RawJob>>,
}

impl SnapshotCluster {
    pub fn new(snapshot: SnapshotFile) -> Self {
        Self {
            nodes: snapshot.nodes,
            pods: snapshot.pods,
            inventory: snapshot.inventory,
            jobs: Mutex::new(snapshot.jobs),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read snapshot {}: {e}", path.display()))?;
        let snapshot: SnapshotFile = serde_json::from_str(&text)?;
        info!(
            path = %path.display(),
            nodes = snapshot.nodes.len(),
            pods = snapshot.pods.len(),
            jobs = snapshot.jobs.len(),
            "cluster snapshot loaded"
        );
        Ok(Self::new(snapshot))
    }

    fn lock_jobs(&self) -> ClusterResult<std::sync::MutexGuard<'_, Vec<RawJob>>> {
        self.jobs
            .lock()
            .map_err(|_| ClusterError::Unreachable("snapshot job list poisoned".to_string()))
    }
}

#[async_trait]
impl ClusterApi for SnapshotCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<RawNode>> {
        Ok(self.nodes.clone())
    }

    async fn list_pods(&self) -> ClusterResult<Vec<RawPod>> {
        Ok(self.pods.clone())
    }

    async fn list_jobs(&self) -> ClusterResult<Vec<RawJob>> {
        Ok(self.lock_jobs()?.clone())
    }

    async fn inventory(&self) -> ClusterResult<ClusterInventory> {
        Ok(self.inventory.clone())
    }

    async fn create_job(&self, job: &KubeJob) -> ClusterResult<CreateJobResponse> {
        let mut jobs = self.lock_jobs()?;
        if jobs.iter().any(|j| j.metadata.name == job.name()) {
            return Ok(CreateJobResponse {
                status: 409,
                message: Some(format!("jobs.batch \"{}\" already exists", job.name())),
            });
        }
        jobs.push(RawJob {
            metadata: ObjectMeta {
                name: job.name().to_string(),
                labels: job.metadata.labels.clone(),
                annotations: job.metadata.annotations.clone(),
            },
            status: RawJobStatus {
                active: Some(1),
                ..Default::default()
            },
        });
        debug!(job = %job.name(), "job recorded in snapshot");
        Ok(CreateJobResponse::created())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use taskexec_core::k8s::{JobSpec, Metadata};

    fn make_job(name: &str, algorithm: &str) -> KubeJob {
        KubeJob {
            api_version: "batch/v1".to_string(),
            kind: "Job".to_string(),
            metadata: Metadata {
                name: name.to_string(),
                labels: BTreeMap::from([("algorithm-name".to_string(), algorithm.to_string())]),
                ..Default::default()
            },
            spec: JobSpec::default(),
        }
    }

    #[test]
    fn snapshot_file_fields_are_optional() {
        let snapshot: SnapshotFile = serde_json::from_str(r#"{"nodes":[{"metadata":{"name":"n1"}}]}"#).unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(snapshot.pods.is_empty());
        assert!(snapshot.inventory.pvcs.is_empty());
    }

    #[tokio::test]
    async fn created_jobs_are_listed_as_active() {
        let cluster = SnapshotCluster::new(SnapshotFile::default());
        let response = cluster.create_job(&make_job("green-alg-1a2b3", "green-alg")).await.unwrap();
        assert!(response.is_success());

        let jobs = cluster.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status.active, Some(1));
        assert_eq!(jobs[0].metadata.labels["algorithm-name"], "green-alg");
    }

    #[tokio::test]
    async fn duplicate_job_name_conflicts() {
        let cluster = SnapshotCluster::new(SnapshotFile::default());
        cluster.create_job(&make_job("green-alg-1a2b3", "green-alg")).await.unwrap();
        let response = cluster.create_job(&make_job("green-alg-1a2b3", "green-alg")).await.unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(cluster.list_jobs().await.unwrap().len(), 1);
    }
}
