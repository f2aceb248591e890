//! Raw discovery and cluster snapshots into domain records.
//!
//! Nothing here fails: partial or missing input yields fewer records.

use std::collections::BTreeMap;

use tracing::debug;

use taskexec_core::image::{resolve_algorithm_image, resolve_worker_image};
use taskexec_core::raw::{RawJob, RawPod, RawRequestBatch, RawWorker};
use taskexec_core::{
    ALGORITHM_NAME_LABEL, AlgorithmRequest, AlgorithmTemplate, Job, Registry, STATUS_EXIT, TemplateStore, Versions,
    Worker,
};

/// Worker id is the last segment of its registry path.
fn worker_id(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub fn normalize_workers(workers: &BTreeMap<String, RawWorker>) -> Vec<Worker> {
    workers
        .iter()
        .map(|(path, raw)| Worker {
            id: worker_id(path).to_string(),
            algorithm_name: raw.algorithm_name.clone(),
            worker_status: raw.worker_status.clone(),
            worker_paused: raw.worker_paused,
            pod_name: raw.pod_name.clone(),
            hot_worker: raw.hot_worker,
            worker_image: raw.worker_image.clone(),
            algorithm_image: raw.algorithm_image.clone(),
            algorithm_version: raw.algorithm_version.clone(),
            job: None,
        })
        .collect()
}

/// Unfinished worker jobs, each with the node of the pod running it.
pub fn normalize_jobs(jobs: &[RawJob], pods: &[RawPod]) -> Vec<Job> {
    jobs.iter()
        .filter(|j| !j.is_finished())
        .map(|j| {
            let name = j.metadata.name.clone();
            let node_name = pods
                .iter()
                .find(|p| p.metadata.name.starts_with(&name))
                .and_then(|p| p.spec.node_name.clone());
            Job {
                algorithm_name: j
                    .metadata
                    .labels
                    .get(ALGORITHM_NAME_LABEL)
                    .cloned()
                    .unwrap_or_default(),
                active: j.status.active == Some(1),
                start_time: j.status.start_time.clone(),
                node_name,
                name,
            }
        })
        .collect()
}

/// Attach each worker to the job whose name prefixes its pod name.
///
/// Returns the merged workers and the jobs no worker claimed.
pub fn merge_workers(workers: Vec<Worker>, jobs: &[Job]) -> (Vec<Worker>, Vec<Job>) {
    let mut claimed = vec![false; jobs.len()];
    let merged = workers
        .into_iter()
        .map(|mut worker| {
            let found = worker
                .pod_name
                .as_deref()
                .and_then(|pod| jobs.iter().position(|j| pod.starts_with(&j.name)));
            if let Some(index) = found {
                claimed[index] = true;
                worker.job = Some(jobs[index].clone());
            }
            worker
        })
        .collect();
    let extra = jobs
        .iter()
        .zip(claimed)
        .filter(|(_, claimed)| !claimed)
        .map(|(job, _)| job.clone())
        .collect();
    (merged, extra)
}

/// Flatten the request stream, dropping algorithms without a template.
pub fn normalize_requests(batches: &[RawRequestBatch], templates: &TemplateStore) -> Vec<AlgorithmRequest> {
    let requests: Vec<AlgorithmRequest> = batches
        .iter()
        .flat_map(|b| b.data.iter())
        .filter_map(|entry| {
            templates
                .get(&entry.name)
                .map(|t| AlgorithmRequest::new(&entry.name, t.request_type()))
        })
        .collect();
    debug!(requests = requests.len(), "normalized requests");
    requests
}

/// Flag the first `min_hot_workers` requests of each hot template and move
/// them to the front, adding synthetic requests when too few exist.
///
/// Only templates accepted by `include` are considered. `headroom` holds the
/// slots left under `max_workers` for capped algorithms; every synthetic
/// request takes one and none is added once it reaches zero.
pub fn normalize_hot_requests(
    requests: Vec<AlgorithmRequest>,
    templates: &TemplateStore,
    headroom: &mut BTreeMap<String, usize>,
    include: impl Fn(&AlgorithmTemplate) -> bool,
) -> Vec<AlgorithmRequest> {
    let mut hot = Vec::new();
    let mut rest = requests;
    for (name, template) in templates.iter().filter(|(_, t)| t.min_hot_workers > 0 && include(t)) {
        let wanted = template.min_hot_workers as usize;
        let mut taken = 0;
        let mut remaining = Vec::with_capacity(rest.len());
        for mut request in rest {
            if taken < wanted && request.algorithm_name == *name {
                request.hot_worker = true;
                hot.push(request);
                taken += 1;
            } else {
                remaining.push(request);
            }
        }
        rest = remaining;
        for _ in taken..wanted {
            if let Some(slots) = headroom.get_mut(name) {
                if *slots == 0 {
                    debug!(algorithm_name = %name, "hot requests stopped at max workers");
                    break;
                }
                *slots -= 1;
            }
            let mut request = AlgorithmRequest::new(name, template.request_type());
            request.hot_worker = true;
            hot.push(request);
        }
    }
    hot.extend(rest);
    hot
}

fn group_by_algorithm(workers: &[Worker]) -> BTreeMap<&str, Vec<&Worker>> {
    let mut groups: BTreeMap<&str, Vec<&Worker>> = BTreeMap::new();
    for worker in workers {
        groups.entry(worker.algorithm_name.as_str()).or_default().push(worker);
    }
    groups
}

/// Workers to turn hot so each algorithm reaches its `min_hot_workers`.
pub fn workers_to_warm_up(workers: &[Worker], templates: &TemplateStore) -> Vec<Worker> {
    let mut warm = Vec::new();
    for (algorithm, group) in group_by_algorithm(workers) {
        let Some(template) = templates.get(algorithm) else {
            continue;
        };
        let hot = group.iter().filter(|w| w.hot_worker).count();
        let missing = (template.min_hot_workers as usize).saturating_sub(hot);
        warm.extend(group.into_iter().filter(|w| !w.hot_worker).take(missing).cloned());
    }
    warm
}

/// Hot workers beyond their algorithm's `min_hot_workers`.
pub fn workers_to_cool_down(workers: &[Worker], templates: &TemplateStore) -> Vec<Worker> {
    let mut cool = Vec::new();
    for (algorithm, group) in group_by_algorithm(workers) {
        let keep = templates.get(algorithm).map_or(0, |t| t.min_hot_workers as usize);
        cool.extend(group.into_iter().filter(|w| w.hot_worker).skip(keep).cloned());
    }
    cool
}

/// Workers running an image other than the one a new job would get.
///
/// Workers already exiting and workers without a template are left alone.
pub fn workers_to_exit(
    workers: &[Worker],
    templates: &TemplateStore,
    versions: Option<&Versions>,
    registry: Option<&Registry>,
) -> Vec<Worker> {
    let mut expected: BTreeMap<&str, Option<(String, String)>> = BTreeMap::new();
    let mut exit = Vec::new();
    for worker in workers.iter().filter(|w| !w.status_is(STATUS_EXIT)) {
        let Some(template) = templates.get(&worker.algorithm_name) else {
            continue;
        };
        let images = expected.entry(worker.algorithm_name.as_str()).or_insert_with(|| {
            match (
                resolve_algorithm_image(template, versions, registry),
                resolve_worker_image(template, versions, registry),
            ) {
                (Ok(algorithm), Ok(worker)) => Some((algorithm, worker)),
                (Err(e), _) | (_, Err(e)) => {
                    debug!(algorithm_name = %template.name, error = %e, "cannot resolve images");
                    None
                }
            }
        });
        let Some((algorithm_image, worker_image)) = images.as_ref() else {
            continue;
        };
        let drifted = worker.algorithm_image.as_ref().is_some_and(|i| i != algorithm_image)
            || worker.worker_image.as_ref().is_some_and(|i| i != worker_image);
        if drifted {
            exit.push(worker.clone());
        }
    }
    exit
}
