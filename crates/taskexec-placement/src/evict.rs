//! Choosing running workers to stop so that starved requests can fit.

use tracing::debug;

use taskexec_core::{ClusterResources, PressureRatios, ResourceAmounts, WarningCode};

use crate::fit::{find_node_for_schedule, node_selector_filter};
use crate::placer::SkippedJob;

/// A running worker that may be stopped to free its resources.
#[derive(Debug, Clone, PartialEq)]
pub struct StopCandidate {
    pub worker_id: String,
    pub algorithm_name: String,
    pub pod_name: Option<String>,
    pub node_name: Option<String>,
    /// Requests the worker's algorithm container holds.
    pub resources: ResourceAmounts,
}

/// Pick workers to stop so that requests skipped for lack of resources fit.
///
/// Each skipped request is tried on its selector-matching nodes, largest free
/// capacity first. On a node, candidates of other algorithms are released one
/// by one until the request fits; a node where it never fits is left
/// untouched. A committed eviction also reserves the request's resources so
/// later requests cannot claim the same space.
pub fn pause_according_to_resources(
    candidates: &[StopCandidate],
    resources: &ClusterResources,
    skipped: &[SkippedJob],
    pressure: &PressureRatios,
) -> Vec<StopCandidate> {
    let mut working = resources.clone();
    let mut pool: Vec<StopCandidate> = candidates.to_vec();
    let mut to_stop = Vec::new();

    for job in skipped.iter().filter(|s| s.code() == Some(WarningCode::Resources)) {
        let requested = job.details.total_requested();
        let mut nodes: Vec<_> = working
            .node_list
            .iter()
            .filter(|n| node_selector_filter(&n.labels, &job.details.node_selector))
            .map(|n| (n.name.clone(), n.free))
            .collect();
        nodes.sort_by(|a, b| {
            b.1.cpu
                .total_cmp(&a.1.cpu)
                .then(b.1.memory.total_cmp(&a.1.memory))
                .then(b.1.gpu.total_cmp(&a.1.gpu))
        });

        for (node_name, _) in nodes {
            let Some(node) = working.node(&node_name) else {
                continue;
            };
            let mut trial = node.clone();
            let mut chosen = Vec::new();
            let mut fits = false;
            for (index, candidate) in pool.iter().enumerate() {
                if candidate.node_name.as_deref() != Some(node_name.as_str())
                    || candidate.algorithm_name == job.details.algorithm_name
                {
                    continue;
                }
                trial.release(candidate.resources);
                chosen.push(index);
                if find_node_for_schedule(&trial, &requested, Some(pressure)).available {
                    fits = true;
                    break;
                }
            }
            if !fits {
                continue;
            }

            debug!(
                algorithm_name = %job.details.algorithm_name,
                node = %node_name,
                evicted = chosen.len(),
                "stopping workers to make room"
            );
            if let Some(slot) = working.node_mut(&node_name) {
                *slot = trial;
            }
            working.allocate(&node_name, requested);
            for index in chosen.into_iter().rev() {
                to_stop.push(pool.remove(index));
            }
            break;
        }
    }

    to_stop
}
