//! Conversion of raw node and pod lists into per-node resource snapshots.

use std::collections::BTreeMap;

use tracing::warn;

use taskexec_core::raw::{RawContainer, RawNode, RawPod};
use taskexec_core::units::{GPU_RESOURCE, Quantity, UnitError};
use taskexec_core::{
    ALGORITHM_NAME_LABEL, ClusterResources, NodeResources, NodeWorker, ResourceAmounts, WORKER_POD_TYPE,
};

fn lenient(value: Result<f64, UnitError>, context: &str) -> f64 {
    value.unwrap_or_else(|e| {
        warn!(error = %e, context, "unparseable resource quantity, counting as zero");
        0.0
    })
}

fn amounts_from(map: &BTreeMap<String, Quantity>, context: &str) -> ResourceAmounts {
    ResourceAmounts {
        cpu: map.get("cpu").map_or(0.0, |q| lenient(q.cores(), context)),
        memory: map.get("memory").map_or(0.0, |q| lenient(q.mebibytes(), context)),
        gpu: map.get(GPU_RESOURCE).map_or(0.0, |q| lenient(q.count(), context)),
    }
}

/// Requests and limits of one container. GPU falls back to the limit when
/// it is not requested.
fn container_amounts(container: &RawContainer) -> (ResourceAmounts, ResourceAmounts) {
    let mut requests = amounts_from(&container.resources.requests, "requests");
    let limits = amounts_from(&container.resources.limits, "limits");
    if requests.gpu == 0.0 {
        requests.gpu = limits.gpu;
    }
    (requests, limits)
}

/// Pick the limit over the request for every dimension that has one.
fn prefer_limits(requests: ResourceAmounts, limits: ResourceAmounts) -> ResourceAmounts {
    let pick = |r: f64, l: f64| if l > 0.0 { l } else { r };
    ResourceAmounts {
        cpu: pick(requests.cpu, limits.cpu),
        memory: pick(requests.memory, limits.memory),
        gpu: pick(requests.gpu, limits.gpu),
    }
}

fn node_from_raw(node: &RawNode) -> NodeResources {
    let total = amounts_from(&node.status.allocatable, "allocatable");
    let mut resources = NodeResources::with_capacity(&node.metadata.name, total);
    resources.labels = node.metadata.labels.clone();
    resources
}

fn account_pod(node: &mut NodeResources, pod: &RawPod, use_resource_limits: bool) {
    let mut actual = ResourceAmounts::default();
    let mut counted = ResourceAmounts::default();
    let mut limits = ResourceAmounts::default();
    for container in &pod.spec.containers {
        let (req, lim) = container_amounts(container);
        actual += req;
        limits += lim;
        counted += if use_resource_limits { prefer_limits(req, lim) } else { req };
    }

    node.requests += counted;
    node.limits += limits;

    let is_worker = pod.metadata.labels.get("type").map(String::as_str) == Some(WORKER_POD_TYPE);
    if is_worker {
        node.workers_total += actual;
        node.workers.push(NodeWorker {
            pod_name: pod.metadata.name.clone(),
            algorithm_name: pod.metadata.labels.get(ALGORITHM_NAME_LABEL).cloned(),
            resources: actual,
        });
    } else {
        node.other += actual;
    }
}

/// Build the per-tick resource view from allocatable node capacity and the
/// pods occupying it.
///
/// Nodes tainted `NoSchedule` are left out. Only pods in `Running` or
/// `Pending` phase hold resources.
pub fn normalize_resources(nodes: &[RawNode], pods: &[RawPod], use_resource_limits: bool) -> ClusterResources {
    let mut node_list: Vec<NodeResources> = nodes
        .iter()
        .filter(|n| !n.is_unschedulable())
        .map(node_from_raw)
        .collect();

    for pod in pods.iter().filter(|p| p.holds_resources()) {
        let Some(node_name) = pod.spec.node_name.as_deref() else {
            continue;
        };
        if let Some(node) = node_list.iter_mut().find(|n| n.name == node_name) {
            account_pod(node, pod, use_resource_limits);
        }
    }

    for node in &mut node_list {
        node.free = (node.total - node.requests).non_negative();
        node.ratio = node.requests.ratio_of(&node.total);
    }

    ClusterResources::from_nodes(node_list)
}
