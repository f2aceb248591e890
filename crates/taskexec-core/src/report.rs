//! Worker commands and the per-tick reconcile report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resources::ResourceAmounts;
use crate::warning::Warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerCommandKind {
    Exit,
    WarmUp,
    CoolDown,
    StopProcessing,
    StartProcessing,
}

/// Command addressed to one worker through the discovery channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCommand {
    pub worker_id: String,
    pub algorithm_name: String,
    pub pod_name: Option<String>,
    pub command: WorkerCommandKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of one tick for one algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmReport {
    pub required: usize,
    pub idle: usize,
    pub paused: usize,
    pub created: usize,
    pub skipped: usize,
    pub resumed: usize,
    pub active: usize,
}

/// Worker counts for one algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub count: usize,
    pub hot_workers: usize,
    /// Count per worker status; workers without status are `unknown`.
    pub status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub total: ResourceAmounts,
    pub requests: ResourceAmounts,
    pub other: ResourceAmounts,
    pub workers_total: ResourceAmounts,
    pub workers: BTreeMap<String, WorkerStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureReport {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub timestamp: u64,
    pub algorithms: BTreeMap<String, AlgorithmReport>,
    pub unscheduled: BTreeMap<String, Warning>,
    pub ignored_unscheduled: BTreeMap<String, Warning>,
    pub workers: BTreeMap<String, WorkerStats>,
    pub total_workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_pressure: Option<PressureReport>,
    pub nodes: Vec<NodeStats>,
}
