//! Resource amounts, container resource shapes, and per-node snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::units::{Quantity, UnitError};

/// CPU (cores), memory (MiB) and GPU (count) as one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmounts {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
}

impl ResourceAmounts {
    pub fn new(cpu: f64, memory: f64, gpu: f64) -> Self {
        Self { cpu, memory, gpu }
    }

    /// Clamp every dimension at zero.
    pub fn non_negative(self) -> Self {
        Self {
            cpu: self.cpu.max(0.0),
            memory: self.memory.max(0.0),
            gpu: self.gpu.max(0.0),
        }
    }

    /// True while any dimension is still positive.
    pub fn any_positive(&self) -> bool {
        self.cpu > 0.0 || self.memory > 0.0 || self.gpu > 0.0
    }

    /// Per-dimension ratio `self / total`, zero where the total is zero.
    pub fn ratio_of(&self, total: &ResourceAmounts) -> ResourceAmounts {
        let div = |a: f64, b: f64| if b > 0.0 { a / b } else { 0.0 };
        ResourceAmounts {
            cpu: div(self.cpu, total.cpu),
            memory: div(self.memory, total.memory),
            gpu: div(self.gpu, total.gpu),
        }
    }
}

impl Add for ResourceAmounts {
    type Output = ResourceAmounts;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.cpu + rhs.cpu, self.memory + rhs.memory, self.gpu + rhs.gpu)
    }
}

impl AddAssign for ResourceAmounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for ResourceAmounts {
    type Output = ResourceAmounts;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.cpu - rhs.cpu, self.memory - rhs.memory, self.gpu - rhs.gpu)
    }
}

impl SubAssign for ResourceAmounts {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// One resource dimension, named the way warnings report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Mem,
    Gpu,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Mem => "mem",
            ResourceKind::Gpu => "gpu",
        };
        f.write_str(name)
    }
}

/// Requests and limits of a single container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResources {
    pub requests: ResourceAmounts,
    pub limits: ResourceAmounts,
}

/// Default CPU request when a shape leaves it unset.
pub const DEFAULT_CPU: f64 = 0.1;
/// Default memory request (MiB) when a shape leaves it unset.
pub const DEFAULT_MEM: f64 = 4.0;
/// Limits are this multiple of requests.
pub const LIMIT_FACTOR: f64 = 2.0;

impl ContainerResources {
    /// Build requests from a `(cpu, mem, gpu)` shape with limits at twice the
    /// request. GPU is not scaled.
    pub fn from_shape(cpu: Option<f64>, mem: Option<f64>, gpu: Option<f64>) -> Self {
        let cpu = cpu.unwrap_or(DEFAULT_CPU);
        let mem = mem.unwrap_or(DEFAULT_MEM);
        let gpu = gpu.unwrap_or(0.0);
        Self {
            requests: ResourceAmounts::new(cpu, mem, gpu),
            limits: ResourceAmounts::new(cpu * LIMIT_FACTOR, mem * LIMIT_FACTOR, gpu),
        }
    }

    /// Overlay explicit values from `custom` on top of `self`.
    pub fn merged_with(&self, custom: &ResourceOverride) -> Result<Self, UnitError> {
        let mut merged = *self;
        if let Some(cpu) = &custom.requests.cpu {
            merged.requests.cpu = cpu.cores()?;
        }
        if let Some(memory) = &custom.requests.memory {
            merged.requests.memory = memory.mebibytes()?;
        }
        if let Some(cpu) = &custom.limits.cpu {
            merged.limits.cpu = cpu.cores()?;
        }
        if let Some(memory) = &custom.limits.memory {
            merged.limits.memory = memory.mebibytes()?;
        }
        Ok(merged)
    }
}

/// Partially specified cpu/memory values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceQuantities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
}

/// User supplied container resources overriding computed defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceOverride {
    pub requests: ResourceQuantities,
    pub limits: ResourceQuantities,
}

// ── Nodes ─────────────────────────────────────────────────────────

/// A worker pod observed on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeWorker {
    pub pod_name: String,
    pub algorithm_name: Option<String>,
    pub resources: ResourceAmounts,
}

/// Resource snapshot of one schedulable node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResources {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub total: ResourceAmounts,
    pub requests: ResourceAmounts,
    pub limits: ResourceAmounts,
    pub free: ResourceAmounts,
    pub ratio: ResourceAmounts,
    /// Actual requests of pods labelled as workers.
    pub workers_total: ResourceAmounts,
    /// Actual requests of every other pod.
    pub other: ResourceAmounts,
    pub workers: Vec<NodeWorker>,
}

impl NodeResources {
    /// A node with the given capacity and nothing scheduled on it.
    pub fn with_capacity(name: &str, total: ResourceAmounts) -> Self {
        Self {
            name: name.to_string(),
            total,
            free: total,
            ..Default::default()
        }
    }

    /// Record an admission: move `amounts` from free to requested.
    pub fn allocate(&mut self, amounts: ResourceAmounts) {
        self.requests += amounts;
        self.free = (self.free - amounts).non_negative();
        self.ratio = self.requests.ratio_of(&self.total);
    }

    /// Return `amounts` to the free pool.
    pub fn release(&mut self, amounts: ResourceAmounts) {
        self.requests = (self.requests - amounts).non_negative();
        self.free += amounts;
        self.ratio = self.requests.ratio_of(&self.total);
    }
}

/// Cluster-wide aggregate of the node list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub total: ResourceAmounts,
    pub requests: ResourceAmounts,
    pub limits: ResourceAmounts,
    pub free: ResourceAmounts,
    pub ratio: ResourceAmounts,
}

/// Per-tick view of schedulable capacity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResources {
    pub all_nodes: ResourceSummary,
    pub node_list: Vec<NodeResources>,
}

impl ClusterResources {
    /// Build from a node list, computing the aggregate.
    pub fn from_nodes(node_list: Vec<NodeResources>) -> Self {
        let mut summary = ResourceSummary::default();
        for node in &node_list {
            summary.total += node.total;
            summary.requests += node.requests;
            summary.limits += node.limits;
            summary.free += node.free;
        }
        summary.ratio = summary.requests.ratio_of(&summary.total);
        Self {
            all_nodes: summary,
            node_list,
        }
    }

    pub fn node(&self, name: &str) -> Option<&NodeResources> {
        self.node_list.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut NodeResources> {
        self.node_list.iter_mut().find(|n| n.name == name)
    }

    /// Apply an admission to a node and to the aggregate.
    pub fn allocate(&mut self, node_name: &str, amounts: ResourceAmounts) {
        if let Some(node) = self.node_mut(node_name) {
            node.allocate(amounts);
            self.all_nodes.requests += amounts;
            self.all_nodes.free = (self.all_nodes.free - amounts).non_negative();
            self.all_nodes.ratio = self.all_nodes.requests.ratio_of(&self.all_nodes.total);
        }
    }
}
