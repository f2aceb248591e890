//! Worker lifecycle view for one tick.
//!
//! Built fresh from the registry and the cluster jobs every tick. Workers
//! are merged with their backing jobs, drifted workers are set aside to
//! exit, and the rest are sorted into mutually exclusive categories.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use taskexec_core::raw::{RawJob, RawPod, RawWorker};
use taskexec_core::{Job, Registry, TemplateStore, Versions, Worker, WorkerCommand, WorkerCommandKind};

use crate::normalize::{
    merge_workers, normalize_jobs, normalize_workers, workers_to_cool_down, workers_to_exit, workers_to_warm_up,
};

/// Existing capacity, by lifecycle state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerCategories {
    /// Ready and not paused.
    pub idle: Vec<Worker>,
    /// Working: neither ready, paused nor bootstrapping.
    pub active: Vec<Worker>,
    /// Ready but paused.
    pub paused: Vec<Worker>,
    pub bootstrap: Vec<Worker>,
    /// Jobs whose worker has not registered yet.
    pub pending: Vec<Job>,
}

impl WorkerCategories {
    pub fn categorize(workers: &[Worker], pending: Vec<Job>) -> Self {
        let mut categories = WorkerCategories {
            pending,
            ..Default::default()
        };
        for worker in workers {
            let bucket = if worker.is_bootstrap() {
                &mut categories.bootstrap
            } else if worker.is_ready() && !worker.worker_paused {
                &mut categories.idle
            } else if worker.is_ready() {
                &mut categories.paused
            } else if !worker.worker_paused {
                &mut categories.active
            } else {
                // paused while not ready: neither usable nor working
                continue;
            };
            bucket.push(worker.clone());
        }
        categories
    }

    /// Workers and pending jobs per algorithm, over every category.
    pub fn running_per_algorithm(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let workers = self
            .idle
            .iter()
            .chain(&self.active)
            .chain(&self.paused)
            .chain(&self.bootstrap)
            .map(|w| w.algorithm_name.as_str());
        for algorithm in workers.chain(self.pending.iter().map(|j| j.algorithm_name.as_str())) {
            *counts.entry(algorithm.to_string()).or_default() += 1;
        }
        counts
    }
}

/// Command addressed to `worker`.
pub fn command_for(worker: &Worker, command: WorkerCommandKind, message: Option<&str>) -> WorkerCommand {
    WorkerCommand {
        worker_id: worker.id.clone(),
        algorithm_name: worker.algorithm_name.clone(),
        pod_name: worker.pod_name.clone(),
        command,
        message: message.map(str::to_string),
    }
}

#[derive(Debug, Clone)]
pub struct WorkersStateManager {
    /// Every registered worker, before merging.
    pub normalized: Vec<Worker>,
    /// Workers merged with their jobs, minus those told to exit.
    pub merged: Vec<Worker>,
    pub exit: Vec<Worker>,
    pub warm_up: Vec<Worker>,
    pub cool_down: Vec<Worker>,
    pub categories: WorkerCategories,
    /// Names of every unfinished worker job.
    pub job_names: BTreeSet<String>,
}

impl WorkersStateManager {
    pub fn new(
        workers: &BTreeMap<String, RawWorker>,
        jobs: &[RawJob],
        pods: &[RawPod],
        templates: &TemplateStore,
        versions: Option<&Versions>,
        registry: Option<&Registry>,
    ) -> Self {
        let normalized = normalize_workers(workers);
        let jobs = normalize_jobs(jobs, pods);
        let job_names = jobs.iter().map(|j| j.name.clone()).collect();
        let (merged, extra_jobs) = merge_workers(normalized.clone(), &jobs);

        let exit = workers_to_exit(&normalized, templates, versions, registry);
        let merged: Vec<Worker> = merged
            .into_iter()
            .filter(|w| !exit.iter().any(|e| e.id == w.id))
            .collect();

        let warm_up = workers_to_warm_up(&merged, templates);
        let cool_down = workers_to_cool_down(&merged, templates);
        let categories = WorkerCategories::categorize(&merged, extra_jobs);

        debug!(
            workers = normalized.len(),
            idle = categories.idle.len(),
            active = categories.active.len(),
            paused = categories.paused.len(),
            bootstrap = categories.bootstrap.len(),
            pending = categories.pending.len(),
            exit = exit.len(),
            "categorized workers"
        );

        Self {
            normalized,
            merged,
            exit,
            warm_up,
            cool_down,
            categories,
            job_names,
        }
    }

    /// Idle and active workers of batch algorithms.
    pub fn count_batch_workers(&self, templates: &TemplateStore) -> usize {
        let is_batch = |w: &&Worker| templates.get(&w.algorithm_name).is_none_or(|t| t.is_batch());
        self.categories.idle.iter().filter(is_batch).count() + self.categories.active.iter().filter(is_batch).count()
    }

    /// Exit, warm up and cool down commands derived from the registry.
    pub fn lifecycle_commands(&self) -> Vec<WorkerCommand> {
        let exit = self
            .exit
            .iter()
            .map(|w| command_for(w, WorkerCommandKind::Exit, Some("image changed")));
        let warm = self
            .warm_up
            .iter()
            .map(|w| command_for(w, WorkerCommandKind::WarmUp, None));
        let cool = self
            .cool_down
            .iter()
            .map(|w| command_for(w, WorkerCommandKind::CoolDown, None));
        exit.chain(warm).chain(cool).collect()
    }
}
