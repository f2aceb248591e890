//! Domain records shared across the task executor crates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resources::{ContainerResources, ResourceAmounts, ResourceOverride};
use crate::units::Quantity;

// ── Requests ──────────────────────────────────────────────────────

/// Session semantics of a streaming algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateType {
    Stateful,
    Stateless,
}

/// How a request is prioritized: batch work, or one of the streaming kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    Batch,
    Stateful,
    Stateless,
}

impl RequestType {
    pub fn is_streaming(self) -> bool {
        !matches!(self, RequestType::Batch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Batch => "batch",
            RequestType::Stateful => "stateful",
            RequestType::Stateless => "stateless",
        }
    }
}

impl From<Option<StateType>> for RequestType {
    fn from(state: Option<StateType>) -> Self {
        match state {
            None => RequestType::Batch,
            Some(StateType::Stateful) => RequestType::Stateful,
            Some(StateType::Stateless) => RequestType::Stateless,
        }
    }
}

/// One unit of demand for a worker of an algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmRequest {
    pub algorithm_name: String,
    #[serde(default)]
    pub hot_worker: bool,
    pub request_type: RequestType,
    #[serde(default)]
    pub is_requisite: bool,
}

impl AlgorithmRequest {
    pub fn new(algorithm_name: &str, request_type: RequestType) -> Self {
        Self {
            algorithm_name: algorithm_name.to_string(),
            hot_worker: false,
            request_type,
            is_requisite: false,
        }
    }

    pub fn batch(algorithm_name: &str) -> Self {
        Self::new(algorithm_name, RequestType::Batch)
    }
}

// ── Templates ─────────────────────────────────────────────────────

/// Node selector value: a single label value or a set of accepted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorValue {
    One(String),
    AnyOf(Vec<String>),
}

impl SelectorValue {
    pub fn matches(&self, label: &str) -> bool {
        match self {
            SelectorValue::One(v) => v == label,
            SelectorValue::AnyOf(values) => values.iter().any(|v| v == label),
        }
    }

    pub fn values(&self) -> Vec<String> {
        match self {
            SelectorValue::One(v) => vec![v.clone()],
            SelectorValue::AnyOf(values) => values.clone(),
        }
    }
}

impl fmt::Display for SelectorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorValue::One(v) => f.write_str(v),
            SelectorValue::AnyOf(values) => f.write_str(&values.join(",")),
        }
    }
}

impl From<&str> for SelectorValue {
    fn from(value: &str) -> Self {
        SelectorValue::One(value.to_string())
    }
}

pub type NodeSelector = BTreeMap<String, SelectorValue>;

/// Kind of volume backing a template mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MountKind {
    #[default]
    PersistentVolumeClaim,
    ConfigMap,
    EmptyDir,
}

/// Shorthand mount: a claim or config map mounted into the algorithm container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub pvc_name: String,
    pub path: String,
    #[serde(default)]
    pub volume_type: MountKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRef {
    pub claim_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub secret_name: String,
}

/// Pod volume in cluster object shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volume {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<NameRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

/// Extra container run next to the worker and algorithm containers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SideCarContainer {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub resources: ResourceOverride,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SideCar {
    pub container: SideCarContainer,
    pub volume_mounts: Vec<VolumeMount>,
    pub environments: BTreeMap<String, String>,
}

/// Vendor queue scheduling metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KaiObject {
    pub queue: Option<String>,
    pub memory: Option<String>,
    pub fraction: Option<f64>,
}

/// Static per-algorithm configuration, read-only to the scheduler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlgorithmTemplate {
    pub name: String,
    pub algorithm_image: String,
    pub worker_image: Option<String>,
    pub version: Option<String>,
    pub cpu: Option<f64>,
    /// Memory request; bare numbers are MiB.
    pub mem: Option<Quantity>,
    pub gpu: Option<f64>,
    pub max_workers: Option<u32>,
    pub quota_guarantee: Option<u32>,
    pub state_type: Option<StateType>,
    pub min_hot_workers: u32,
    pub node_selector: NodeSelector,
    /// Runtime language of the algorithm (`"java"`, `"python"`, ...).
    pub env: Option<String>,
    pub algorithm_env: BTreeMap<String, String>,
    pub worker_env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub entry_point: Option<String>,
    pub reserved_memory: Option<Quantity>,
    pub mounts: Vec<Mount>,
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
    pub side_cars: Vec<SideCar>,
    pub worker_custom_resources: Option<ResourceOverride>,
    pub kai_object: Option<KaiObject>,
}

impl AlgorithmTemplate {
    pub fn request_type(&self) -> RequestType {
        RequestType::from(self.state_type)
    }

    pub fn is_batch(&self) -> bool {
        self.state_type.is_none()
    }
}

/// Templates keyed by algorithm name.
pub type TemplateStore = BTreeMap<String, AlgorithmTemplate>;

// ── Workers and jobs ──────────────────────────────────────────────

pub const STATUS_READY: &str = "ready";
pub const STATUS_BOOTSTRAP: &str = "bootstrap";
pub const STATUS_EXIT: &str = "exit";

/// Cluster batch job backing (at most) one worker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    pub algorithm_name: String,
    pub active: bool,
    pub start_time: Option<String>,
    /// Node of the pod running this job, when one is scheduled.
    pub node_name: Option<String>,
}

/// A registered worker process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: String,
    pub algorithm_name: String,
    pub worker_status: Option<String>,
    pub worker_paused: bool,
    pub pod_name: Option<String>,
    pub hot_worker: bool,
    pub worker_image: Option<String>,
    pub algorithm_image: Option<String>,
    pub algorithm_version: Option<String>,
    /// Backing job, filled in when workers are merged with jobs.
    pub job: Option<Job>,
}

impl Worker {
    pub fn status_is(&self, status: &str) -> bool {
        self.worker_status.as_deref() == Some(status)
    }

    pub fn is_ready(&self) -> bool {
        self.status_is(STATUS_READY)
    }

    pub fn is_bootstrap(&self) -> bool {
        self.status_is(STATUS_BOOTSTRAP)
    }

    pub fn node_name(&self) -> Option<&str> {
        self.job.as_ref().and_then(|j| j.node_name.as_deref())
    }
}

// ── Versions / registry / inventory ───────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectVersion {
    pub project: String,
    pub tag: Option<String>,
}

/// Pinned tags for untagged images, keyed by repository name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Versions {
    #[serde(default)]
    pub versions: Vec<ProjectVersion>,
}

impl Versions {
    pub fn tag_for(&self, project: &str) -> Option<&str> {
        self.versions
            .iter()
            .find(|v| v.project == project)
            .and_then(|v| v.tag.as_deref())
    }
}

/// Private registry that replaces the registry part of every image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registry {
    pub registry: String,
}

/// Names of cluster objects that templates may reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterInventory {
    pub pvcs: BTreeSet<String>,
    pub config_maps: BTreeSet<String>,
    pub secrets: BTreeSet<String>,
    pub queues: BTreeSet<String>,
}

// ── Job details ───────────────────────────────────────────────────

/// A sidecar with its requests and limits already resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSideCar {
    pub side_car: SideCar,
    pub resources: ContainerResources,
}

/// A volume reference that must exist in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VolumeRef {
    Claim(String),
    ConfigMap(String),
    Secret(String),
}

impl VolumeRef {
    pub fn name(&self) -> &str {
        match self {
            VolumeRef::Claim(n) | VolumeRef::ConfigMap(n) | VolumeRef::Secret(n) => n,
        }
    }

    pub fn exists_in(&self, inventory: &ClusterInventory) -> bool {
        match self {
            VolumeRef::Claim(n) => inventory.pvcs.contains(n),
            VolumeRef::ConfigMap(n) => inventory.config_maps.contains(n),
            VolumeRef::Secret(n) => inventory.secrets.contains(n),
        }
    }
}

/// Fully resolved intent for one new worker job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    pub algorithm_name: String,
    pub algorithm_image: String,
    pub algorithm_version: Option<String>,
    pub worker_image: String,
    pub request_type: Option<RequestType>,
    pub hot_worker: bool,
    pub is_requisite: bool,
    pub resource_requests: ContainerResources,
    pub worker_resource_requests: ContainerResources,
    /// Worker resources after custom overrides; replaces the defaults when set.
    pub worker_custom_resources: Option<ContainerResources>,
    pub side_cars: Vec<ResolvedSideCar>,
    pub node_selector: NodeSelector,
    pub env: Option<String>,
    pub algorithm_env: BTreeMap<String, String>,
    pub worker_env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub entry_point: Option<String>,
    /// Reserved cache memory in MiB.
    pub reserved_memory: Option<f64>,
    pub mounts: Vec<Mount>,
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
    pub kai_object: Option<KaiObject>,
    /// Node chosen at admission.
    pub node: Option<String>,
}

impl JobDetails {
    pub fn request_type(&self) -> RequestType {
        self.request_type.unwrap_or(RequestType::Batch)
    }

    /// Worker container resources in effect.
    pub fn worker_resources(&self) -> ContainerResources {
        self.worker_custom_resources
            .unwrap_or(self.worker_resource_requests)
    }

    /// Requests of every container in the pod: algorithm, worker and sidecars.
    pub fn total_requested(&self) -> ResourceAmounts {
        let mut total = self.resource_requests.requests;
        let worker = self.worker_resources().requests;
        total.cpu += worker.cpu;
        total.memory += worker.memory;
        for side_car in &self.side_cars {
            total.cpu += side_car.resources.requests.cpu;
            total.memory += side_car.resources.requests.memory;
        }
        total
    }

    /// Claims, config maps and secrets referenced by volumes and mounts.
    pub fn referenced_volumes(&self) -> Vec<VolumeRef> {
        let mut refs = BTreeSet::new();
        for volume in &self.volumes {
            if let Some(claim) = &volume.persistent_volume_claim {
                refs.insert(VolumeRef::Claim(claim.claim_name.clone()));
            }
            if let Some(map) = &volume.config_map {
                refs.insert(VolumeRef::ConfigMap(map.name.clone()));
            }
            if let Some(secret) = &volume.secret {
                refs.insert(VolumeRef::Secret(secret.secret_name.clone()));
            }
        }
        for mount in &self.mounts {
            match mount.volume_type {
                MountKind::PersistentVolumeClaim => {
                    refs.insert(VolumeRef::Claim(mount.pvc_name.clone()));
                }
                MountKind::ConfigMap => {
                    refs.insert(VolumeRef::ConfigMap(mount.pvc_name.clone()));
                }
                MountKind::EmptyDir => {}
            }
        }
        refs.into_iter().collect()
    }
}
