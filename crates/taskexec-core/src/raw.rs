//! Wire shapes read from the cluster API and the discovery store.
//!
//! Every field is optional on the wire; missing pieces deserialize to
//! defaults so normalization never fails on partial input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::units::Quantity;

// ── Discovery ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRequestEntry {
    pub name: String,
}

/// One batch of the upstream request stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRequestBatch {
    pub data: Vec<RawRequestEntry>,
}

/// Worker record as registered by the worker process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawWorker {
    pub algorithm_name: String,
    pub worker_status: Option<String>,
    pub worker_paused: bool,
    pub pod_name: Option<String>,
    pub hot_worker: bool,
    pub worker_image: Option<String>,
    pub algorithm_image: Option<String>,
    pub algorithm_version: Option<String>,
}

// ── Cluster objects ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawJobStatus {
    pub active: Option<u32>,
    pub succeeded: Option<u32>,
    pub failed: Option<u32>,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawJob {
    pub metadata: ObjectMeta,
    pub status: RawJobStatus,
}

impl RawJob {
    pub fn is_finished(&self) -> bool {
        self.status.succeeded.unwrap_or(0) > 0 || self.status.failed.unwrap_or(0) > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResourceRequirements {
    pub requests: BTreeMap<String, Quantity>,
    pub limits: BTreeMap<String, Quantity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawContainer {
    pub name: String,
    pub resources: RawResourceRequirements,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPodSpec {
    pub node_name: Option<String>,
    pub containers: Vec<RawContainer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPodStatus {
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPod {
    pub metadata: ObjectMeta,
    pub spec: RawPodSpec,
    pub status: RawPodStatus,
}

impl RawPod {
    /// Pods in these phases hold node resources.
    pub fn holds_resources(&self) -> bool {
        matches!(self.status.phase.as_deref(), Some("Running") | Some("Pending"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTaint {
    pub key: String,
    pub effect: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNodeSpec {
    pub taints: Vec<RawTaint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNodeStatus {
    pub allocatable: BTreeMap<String, Quantity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawNode {
    pub metadata: ObjectMeta,
    pub spec: RawNodeSpec,
    pub status: RawNodeStatus,
}

impl RawNode {
    pub fn is_unschedulable(&self) -> bool {
        self.spec.taints.iter().any(|t| t.effect == "NoSchedule")
    }
}
