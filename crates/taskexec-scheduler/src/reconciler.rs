//! The reconcile tick and the loop that drives it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use taskexec_core::report::PressureReport;
use taskexec_core::{
    ClusterApi, Discovery, ExecutorConfig, ReconcileReport, RequestType, WorkerCommand, WorkerCommandKind,
    epoch_millis,
};
use taskexec_placement::{ResourceMatcher, normalize_resources};

use crate::error::{SchedulerError, SchedulerResult};
use crate::job_spec::JobSpecBuilder;
use crate::jobs::{CreateOutcome, JobsManager, JobsPlan, PlanContext};
use crate::normalize::normalize_requests;
use crate::requests::RequestsManager;
use crate::stats::{aggregate_worker_stats, build_node_stats, check_resource_pressure, complete_algorithm_reports};
use crate::workers::{WorkersStateManager, command_for};

/// Configuration and collaborators of a reconciler.
#[derive(Clone)]
pub struct ReconcilerContext {
    pub config: ExecutorConfig,
    pub cluster: Arc<dyn ClusterApi>,
    pub discovery: Arc<dyn Discovery>,
}

/// Result of a completed tick. `errors` holds the failures that did not
/// abort it: construction errors and failed side effects.
#[derive(Debug)]
pub struct TickOutcome {
    pub report: ReconcileReport,
    pub errors: Vec<SchedulerError>,
}

struct TickState {
    requests: RequestsManager,
    jobs: JobsManager,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    context: ReconcilerContext,
    in_flight: AtomicBool,
    state: Mutex<TickState>,
}

impl Reconciler {
    pub fn new(context: ReconcilerContext) -> Self {
        let config = &context.config;
        let matcher = ResourceMatcher::new(config.pressure, config.reconcile.max_jobs_per_tick);
        let builder = JobSpecBuilder::new(config.resources.clone(), config.cluster.clone());
        let state = TickState {
            requests: RequestsManager::new(config.capacity.clone()),
            jobs: JobsManager::new(matcher, builder, config.resources.clone()),
        };
        Self {
            context,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    /// Current smoothed batch capacity.
    pub async fn capacity(&self) -> f64 {
        self.state.lock().await.requests.capacity()
    }

    /// Run one reconcile pass. Returns `None` when another pass is still
    /// running; ticks never overlap.
    pub async fn tick(&self) -> SchedulerResult<Option<TickOutcome>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("previous tick still running, skipping");
            return Ok(None);
        }
        let _in_flight = InFlight(&self.in_flight);
        let mut state = self.state.lock().await;
        self.reconcile(&mut state).await.map(Some)
    }

    async fn reconcile(&self, state: &mut TickState) -> SchedulerResult<TickOutcome> {
        let config = &self.context.config;
        let cluster = self.context.cluster.as_ref();
        let discovery = self.context.discovery.as_ref();

        let (cluster_reads, discovery_reads, versions, registry) = tokio::join!(
            async { tokio::try_join!(cluster.list_nodes(), cluster.list_pods(), cluster.list_jobs(), cluster.inventory()) },
            async { tokio::try_join!(discovery.algorithm_requests(), discovery.workers(), discovery.templates()) },
            discovery.versions(),
            discovery.registry(),
        );
        let (nodes, pods, jobs, inventory) = cluster_reads?;
        let (raw_requests, raw_workers, templates) = discovery_reads?;
        let versions = versions.unwrap_or_else(|e| {
            warn!(error = %e, "cannot read versions, resolving images without them");
            None
        });
        let registry = registry.unwrap_or_else(|e| {
            warn!(error = %e, "cannot read registry, resolving images without it");
            None
        });

        let now = epoch_millis();
        state.jobs.clear_created_jobs(config.reconcile.created_jobs_ttl_ms, now);
        let resources = normalize_resources(&nodes, &pods, config.resources.use_resource_limits);
        check_resource_pressure(&resources, &config.pressure);

        let workers =
            WorkersStateManager::new(&raw_workers, &jobs, &pods, &templates, versions.as_ref(), registry.as_ref());
        let batch_workers = workers.count_batch_workers(&templates) + state.jobs.created_count(RequestType::Batch);
        state.requests.update_capacity(batch_workers);

        let requests = normalize_requests(&raw_requests, &templates);
        let requests = state
            .requests
            .prepare(requests, &templates, &workers.merged, &workers.categories);

        let context = PlanContext {
            templates: &templates,
            versions: versions.as_ref(),
            registry: registry.as_ref(),
            resources: &resources,
            inventory: &inventory,
            pods: &pods,
            job_names: &workers.job_names,
        };
        let JobsPlan {
            jobs_to_request,
            mut skipped,
            to_stop,
            to_resume,
            mut algorithms,
            mut errors,
        } = state.jobs.plan(&requests, &workers.categories, context);

        let mut commands = workers.lifecycle_commands();
        commands.extend(to_stop.iter().map(|candidate| WorkerCommand {
            worker_id: candidate.worker_id.clone(),
            algorithm_name: candidate.algorithm_name.clone(),
            pod_name: candidate.pod_name.clone(),
            command: WorkerCommandKind::StopProcessing,
            message: None,
        }));
        commands.extend(
            to_resume
                .iter()
                .map(|w| command_for(w, WorkerCommandKind::StartProcessing, None)),
        );

        let (creation, sent) = tokio::join!(
            state.jobs.create_jobs(cluster, jobs_to_request, now),
            join_all(commands.iter().map(|command| discovery.send_command(command))),
        );
        for (command, result) in commands.iter().zip(sent) {
            if let Err(e) = result {
                warn!(
                    worker_id = %command.worker_id,
                    command = ?command.command,
                    error = %e,
                    "failed to send worker command"
                );
                errors.push(e.into());
            }
        }
        let CreateOutcome {
            created,
            failed,
            errors: create_errors,
        } = creation;
        errors.extend(create_errors);
        skipped.extend(failed);

        state.jobs.finish(&created, &skipped, &requests, &templates);

        let worker_stats = aggregate_worker_stats(&workers.normalized);
        complete_algorithm_reports(&mut algorithms, &created, &skipped, &to_stop, &to_resume, &worker_stats);
        let report = ReconcileReport {
            timestamp: now,
            algorithms,
            unscheduled: state.jobs.unscheduled().clone(),
            ignored_unscheduled: state.jobs.ignored_unscheduled().clone(),
            total_workers: workers.normalized.len(),
            workers: worker_stats,
            resource_pressure: Some(PressureReport {
                cpu: config.pressure.cpu,
                memory: config.pressure.memory,
                gpu: config.pressure.gpu,
            }),
            nodes: build_node_stats(&resources, &workers.normalized),
        };
        if let Err(e) = discovery.write_report(&report).await {
            warn!(error = %e, "failed to write reconcile report");
            errors.push(e.into());
        }

        debug!(
            requests = requests.len(),
            created = created.len(),
            skipped = skipped.len(),
            stopped = to_stop.len(),
            resumed = to_resume.len(),
            commands = commands.len(),
            errors = errors.len(),
            "tick complete"
        );
        Ok(TickOutcome { report, errors })
    }

    /// Tick every `interval` until `shutdown` changes.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "reconciler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(Some(outcome)) if !outcome.errors.is_empty() => {
                            warn!(errors = outcome.errors.len(), "tick completed with errors");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "reconcile tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}
