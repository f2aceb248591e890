//! Node fit checks under resource pressure.
//!
//! Only `total * ratio` of each node is schedulable: effective free space
//! is the node's free amount minus the reserved `total * (1 - ratio)`
//! margin, and no single request may exceed `total * ratio` either.

use std::collections::BTreeMap;

use taskexec_core::units::round2;
use taskexec_core::{NodeResources, NodeSelector, PressureRatios, ResourceAmounts, ResourceKind};

/// Tolerance for GPU comparisons, absorbing fractional rounding.
const GPU_TOLERANCE: f64 = 0.01;

/// One boolean per resource dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFlags {
    pub cpu: bool,
    pub mem: bool,
    pub gpu: bool,
}

impl ResourceFlags {
    pub fn all(&self) -> bool {
        self.cpu && self.mem && self.gpu
    }

    pub fn any(&self) -> bool {
        self.cpu || self.mem || self.gpu
    }

    /// Dimensions whose flag equals `value`, in cpu, mem, gpu order.
    pub fn kinds(&self, value: bool) -> Vec<ResourceKind> {
        [
            (ResourceKind::Cpu, self.cpu),
            (ResourceKind::Mem, self.mem),
            (ResourceKind::Gpu, self.gpu),
        ]
        .into_iter()
        .filter(|(_, flag)| *flag == value)
        .map(|(kind, _)| kind)
        .collect()
    }
}

/// Result of checking one request against one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFit {
    pub node_name: String,
    pub available: bool,
    /// Which dimensions fit.
    pub details: ResourceFlags,
    /// Which dimensions exceed the node's schedulable capacity outright.
    pub max_capacity: ResourceFlags,
    /// Shortfall for dimensions that do not fit, two-decimal precision.
    pub amounts_missing: BTreeMap<ResourceKind, f64>,
}

const NO_PRESSURE: PressureRatios = PressureRatios {
    cpu: 1.0,
    memory: 1.0,
    gpu: 1.0,
};

/// Check whether `requested` fits on `node`, applying `pressure` when given.
pub fn find_node_for_schedule(
    node: &NodeResources,
    requested: &ResourceAmounts,
    pressure: Option<&PressureRatios>,
) -> NodeFit {
    let ratios = pressure.unwrap_or(&NO_PRESSURE);
    let total = node.total;
    let effective = ResourceAmounts {
        cpu: node.free.cpu - total.cpu * (1.0 - ratios.cpu),
        memory: node.free.memory - total.memory * (1.0 - ratios.memory),
        gpu: node.free.gpu - total.gpu * (1.0 - ratios.gpu),
    };

    let details = ResourceFlags {
        cpu: requested.cpu <= effective.cpu,
        mem: requested.memory <= effective.memory,
        gpu: requested.gpu == 0.0 || effective.gpu - requested.gpu > -GPU_TOLERANCE,
    };
    let max_capacity = ResourceFlags {
        cpu: requested.cpu > total.cpu * ratios.cpu,
        mem: requested.memory > total.memory * ratios.memory,
        gpu: requested.gpu > 0.0 && requested.gpu > total.gpu * ratios.gpu,
    };

    let mut amounts_missing = BTreeMap::new();
    if !details.cpu {
        amounts_missing.insert(ResourceKind::Cpu, round2(requested.cpu - effective.cpu.max(0.0)));
    }
    if !details.mem {
        amounts_missing.insert(ResourceKind::Mem, round2(requested.memory - effective.memory.max(0.0)));
    }
    if !details.gpu {
        amounts_missing.insert(ResourceKind::Gpu, round2(requested.gpu - effective.gpu.max(0.0)));
    }

    NodeFit {
        node_name: node.name.clone(),
        available: details.all(),
        details,
        max_capacity,
        amounts_missing,
    }
}

/// Exact match on every selector key. Multi-valued entries accept any of
/// their values. An empty selector matches every node.
pub fn node_selector_filter(labels: &BTreeMap<String, String>, selector: &NodeSelector) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key).is_some_and(|label| value.matches(label)))
}
