//! Per-tick statistics written alongside the reconcile report.

use std::collections::BTreeMap;

use tracing::{debug, info};

use taskexec_core::report::{NodeStats, WorkerStats};
use taskexec_core::{AlgorithmReport, ClusterResources, PressureRatios, Worker};
use taskexec_placement::{SkippedJob, StopCandidate};

use crate::jobs::CreatedJob;

/// Worker counts per algorithm, by status.
pub fn aggregate_worker_stats<'a>(workers: impl IntoIterator<Item = &'a Worker>) -> BTreeMap<String, WorkerStats> {
    let mut stats: BTreeMap<String, WorkerStats> = BTreeMap::new();
    for worker in workers {
        let entry = stats.entry(worker.algorithm_name.clone()).or_default();
        entry.count += 1;
        let status = worker.worker_status.as_deref().unwrap_or("unknown");
        *entry.status.entry(status.to_string()).or_default() += 1;
        if worker.hot_worker {
            entry.hot_workers += 1;
        }
    }
    stats
}

/// Node capacity figures together with stats of the workers whose pods run there.
pub fn build_node_stats(resources: &ClusterResources, workers: &[Worker]) -> Vec<NodeStats> {
    resources
        .node_list
        .iter()
        .map(|node| {
            let on_node = workers.iter().filter(|w| {
                w.pod_name
                    .as_deref()
                    .is_some_and(|pod| node.workers.iter().any(|nw| nw.pod_name == pod))
            });
            NodeStats {
                name: node.name.clone(),
                labels: node.labels.clone(),
                total: node.total,
                requests: node.requests,
                other: node.other,
                workers_total: node.workers_total,
                workers: aggregate_worker_stats(on_node),
            }
        })
        .collect()
}

/// Log when cluster-wide cpu or memory usage is above its pressure ratio.
pub fn check_resource_pressure(resources: &ClusterResources, pressure: &PressureRatios) -> bool {
    let ratio = resources.all_nodes.ratio;
    let cpu = ratio.cpu > pressure.cpu;
    let memory = ratio.memory > pressure.memory;
    if cpu || memory {
        debug!(
            cpu_pressure = cpu,
            memory_pressure = memory,
            cpu_ratio = ratio.cpu,
            memory_ratio = ratio.memory,
            "cluster under resource pressure"
        );
    }
    cpu || memory
}

/// Fold this tick's outcome into the per-algorithm report and log every
/// algorithm that saw activity.
pub fn complete_algorithm_reports(
    algorithms: &mut BTreeMap<String, AlgorithmReport>,
    created: &[CreatedJob],
    skipped: &[SkippedJob],
    to_stop: &[StopCandidate],
    to_resume: &[Worker],
    worker_stats: &BTreeMap<String, WorkerStats>,
) {
    for job in created {
        algorithms.entry(job.details.algorithm_name.clone()).or_default().created += 1;
    }
    for job in skipped {
        algorithms.entry(job.details.algorithm_name.clone()).or_default().skipped += 1;
    }
    for worker in to_stop {
        algorithms.entry(worker.algorithm_name.clone()).or_default().paused += 1;
    }
    for worker in to_resume {
        algorithms.entry(worker.algorithm_name.clone()).or_default().resumed += 1;
    }
    for (algorithm, stats) in worker_stats {
        algorithms.entry(algorithm.clone()).or_default().active = stats.count;
    }

    for (algorithm, report) in algorithms.iter() {
        if report.created + report.skipped + report.paused + report.resumed + report.required > 0 {
            info!(
                algorithm_name = %algorithm,
                required = report.required,
                created = report.created,
                skipped = report.skipped,
                paused = report.paused,
                resumed = report.resumed,
                "reconcile result"
            );
        }
    }
}
