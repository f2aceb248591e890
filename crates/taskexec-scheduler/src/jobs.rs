//! Jobs manager: serves prepared requests from existing capacity, plans new
//! jobs against cluster resources, picks workers to stop and creates the
//! admitted jobs.
//!
//! Carried across ticks: the recently created jobs (per request type, pruned
//! by TTL) and the unscheduled / ignored-unscheduled warning maps.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use futures::future::join_all;
use tracing::{debug, warn};

use taskexec_core::config::ResourcesConfig;
use taskexec_core::image::{resolve_algorithm_image, resolve_worker_image};
use taskexec_core::raw::RawPod;
use taskexec_core::{
    AlgorithmReport, AlgorithmRequest, AlgorithmTemplate, ClusterApi, ClusterInventory, ClusterResources,
    ContainerResources, JobDetails, Registry, RequestType, ResolvedSideCar, ResourceAmounts, TemplateStore, Versions,
    Warning, WarningCode, Worker,
};
use taskexec_placement::warning as warnings;
use taskexec_placement::{
    ResourceMatcher, SkippedJob, StopCandidate, group_create_details, pause_according_to_resources,
};

use crate::error::{SchedulerError, SchedulerResult};
use crate::job_spec::JobSpecBuilder;
use crate::workers::WorkerCategories;

/// Status the cluster API answers with when it rejects a job spec.
const UNPROCESSABLE_ENTITY: u16 = 422;

/// A job confirmed by the cluster API, remembered until its pod shows up or
/// its TTL runs out.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedJob {
    pub job_name: String,
    pub details: JobDetails,
    pub created_at: u64,
}

/// Everything that does not change while one tick is planned.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub templates: &'a TemplateStore,
    pub versions: Option<&'a Versions>,
    pub registry: Option<&'a Registry>,
    pub resources: &'a ClusterResources,
    pub inventory: &'a ClusterInventory,
    pub pods: &'a [RawPod],
    /// Names of every unfinished worker job listed this tick.
    pub job_names: &'a BTreeSet<String>,
}

/// Decisions taken for one tick, before any side effect runs.
#[derive(Debug, Default)]
pub struct JobsPlan {
    pub jobs_to_request: Vec<JobDetails>,
    pub skipped: Vec<SkippedJob>,
    pub to_stop: Vec<StopCandidate>,
    pub to_resume: Vec<Worker>,
    pub algorithms: BTreeMap<String, AlgorithmReport>,
    pub errors: Vec<SchedulerError>,
}

#[derive(Debug, Default)]
pub struct CreateOutcome {
    pub created: Vec<CreatedJob>,
    /// Jobs the cluster API refused, with their warnings.
    pub failed: Vec<SkippedJob>,
    pub errors: Vec<SchedulerError>,
}

/// Resolve a request against its template into the details of a new job.
pub fn job_details_for(
    request: &AlgorithmRequest,
    template: &AlgorithmTemplate,
    versions: Option<&Versions>,
    registry: Option<&Registry>,
    config: &ResourcesConfig,
) -> SchedulerResult<JobDetails> {
    if request.algorithm_name.is_empty() {
        return Err(SchedulerError::MissingAlgorithmName);
    }
    if template.algorithm_image.is_empty() {
        return Err(SchedulerError::MissingAlgorithmImage(request.algorithm_name.clone()));
    }
    let algorithm_image = resolve_algorithm_image(template, versions, registry)?;
    let worker_image = resolve_worker_image(template, versions, registry)?;

    let resource_requests = template_resources(template)?;
    let worker_resource_requests =
        ContainerResources::from_shape(Some(config.worker.cpu), Some(config.worker.mem), None);
    let worker_custom_resources = template
        .worker_custom_resources
        .as_ref()
        .map(|custom| worker_resource_requests.merged_with(custom))
        .transpose()?;

    let side_cars = template
        .side_cars
        .iter()
        .map(|side_car| {
            let requests = &side_car.container.resources.requests;
            let cpu = requests.cpu.as_ref().map(|q| q.cores()).transpose()?;
            let mem = requests.memory.as_ref().map(|q| q.mebibytes()).transpose()?;
            let defaults = ContainerResources::from_shape(
                Some(cpu.unwrap_or(config.sidecar.cpu)),
                Some(mem.unwrap_or(config.sidecar.mem)),
                None,
            );
            Ok(ResolvedSideCar {
                side_car: side_car.clone(),
                resources: defaults.merged_with(&side_car.container.resources)?,
            })
        })
        .collect::<SchedulerResult<Vec<_>>>()?;

    let reserved_memory = template
        .reserved_memory
        .as_ref()
        .map(|q| q.mebibytes())
        .transpose()?;

    Ok(JobDetails {
        algorithm_name: request.algorithm_name.clone(),
        algorithm_image,
        algorithm_version: template.version.clone(),
        worker_image,
        request_type: Some(template.request_type()),
        hot_worker: request.hot_worker,
        is_requisite: request.is_requisite,
        resource_requests,
        worker_resource_requests,
        worker_custom_resources,
        side_cars,
        node_selector: template.node_selector.clone(),
        env: template.env.clone(),
        algorithm_env: template.algorithm_env.clone(),
        worker_env: template.worker_env.clone(),
        labels: template.labels.clone(),
        annotations: template.annotations.clone(),
        entry_point: template.entry_point.clone(),
        reserved_memory,
        mounts: template.mounts.clone(),
        volumes: template.volumes.clone(),
        volume_mounts: template.volume_mounts.clone(),
        kai_object: template.kai_object.clone(),
        node: None,
    })
}

/// The algorithm container shape a template asks for.
fn template_resources(template: &AlgorithmTemplate) -> SchedulerResult<ContainerResources> {
    let mem = template.mem.as_ref().map(|q| q.mebibytes()).transpose()?;
    Ok(ContainerResources::from_shape(template.cpu, mem, template.gpu))
}

fn take_first<T>(pool: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> Option<T> {
    let index = pool.iter().position(matches)?;
    Some(pool.remove(index))
}

pub struct JobsManager {
    matcher: ResourceMatcher,
    builder: JobSpecBuilder,
    resources: ResourcesConfig,
    created_jobs: BTreeMap<RequestType, Vec<CreatedJob>>,
    unscheduled: BTreeMap<String, Warning>,
    ignored_unscheduled: BTreeMap<String, Warning>,
}

impl JobsManager {
    pub fn new(matcher: ResourceMatcher, builder: JobSpecBuilder, resources: ResourcesConfig) -> Self {
        Self {
            matcher,
            builder,
            resources,
            created_jobs: BTreeMap::new(),
            unscheduled: BTreeMap::new(),
            ignored_unscheduled: BTreeMap::new(),
        }
    }

    pub fn matcher(&self) -> &ResourceMatcher {
        &self.matcher
    }

    pub fn unscheduled(&self) -> &BTreeMap<String, Warning> {
        &self.unscheduled
    }

    pub fn ignored_unscheduled(&self) -> &BTreeMap<String, Warning> {
        &self.ignored_unscheduled
    }

    /// Recently created jobs of one request type.
    pub fn created_count(&self, request_type: RequestType) -> usize {
        self.created_jobs.get(&request_type).map_or(0, Vec::len)
    }

    /// Forget created jobs older than `ttl_ms`.
    pub fn clear_created_jobs(&mut self, ttl_ms: u64, now: u64) {
        let mut removed = 0;
        for jobs in self.created_jobs.values_mut() {
            let before = jobs.len();
            jobs.retain(|job| now.saturating_sub(job.created_at) < ttl_ms);
            removed += before - jobs.len();
        }
        if removed > 0 {
            debug!(removed, "expired created jobs");
        }
    }

    fn created(&self) -> impl Iterator<Item = &CreatedJob> {
        self.created_jobs.values().flatten()
    }

    /// Serve every request from existing capacity where possible, admit new
    /// jobs for the rest and choose workers to stop for what does not fit.
    pub fn plan(
        &self,
        requests: &[AlgorithmRequest],
        categories: &WorkerCategories,
        context: PlanContext<'_>,
    ) -> JobsPlan {
        let mut plan = JobsPlan::default();
        let mut idle = categories.idle.clone();
        let mut pending = categories.pending.clone();
        let mut paused = categories.paused.clone();
        let mut bootstrap = categories.bootstrap.clone();
        let mut created: Vec<&CreatedJob> = self
            .created()
            .filter(|job| !context.job_names.contains(&job.job_name))
            .collect();
        let mut backlog = Vec::new();

        for request in requests {
            let name = request.algorithm_name.as_str();
            if take_first(&mut idle, |w| w.algorithm_name == name).is_some() {
                plan.algorithms.entry(name.to_string()).or_default().idle += 1;
                continue;
            }
            if take_first(&mut pending, |j| j.algorithm_name == name).is_some()
                || take_first(&mut created, |j| j.details.algorithm_name == name).is_some()
            {
                continue;
            }
            if let Some(worker) = take_first(&mut paused, |w| w.algorithm_name == name) {
                plan.to_resume.push(worker);
                continue;
            }
            if take_first(&mut bootstrap, |w| w.algorithm_name == name).is_some() {
                continue;
            }

            let Some(template) = context.templates.get(name) else {
                plan.errors.push(SchedulerError::UnknownTemplate(name.to_string()));
                continue;
            };
            match job_details_for(request, template, context.versions, context.registry, &self.resources) {
                Ok(details) => {
                    backlog.push(details);
                    plan.algorithms.entry(name.to_string()).or_default().required += 1;
                }
                Err(error) => {
                    warn!(algorithm_name = %name, %error, "cannot build job details");
                    plan.errors.push(error);
                }
            }
        }
        if !backlog.is_empty() {
            debug!(backlog = backlog.len(), requests = requests.len(), "jobs to create");
        }

        let already_scheduled: Vec<JobDetails> = self
            .created()
            .filter(|job| !context.pods.iter().any(|p| p.metadata.name.starts_with(&job.job_name)))
            .map(|job| job.details.clone())
            .collect();
        let groups = group_create_details(backlog);
        let outcome = self
            .matcher
            .match_jobs_to_resources(&groups, context.resources, &already_scheduled, context.inventory);

        let candidates = find_workers_to_stop(&outcome.skipped, &idle, &categories.active, context.templates);
        let to_stop =
            pause_according_to_resources(&candidates, context.resources, &outcome.skipped, self.matcher.pressure());
        plan.to_stop = filter_workers_to_stop(to_stop, &plan.to_resume);

        plan.jobs_to_request = outcome.jobs_to_request;
        plan.skipped = outcome.skipped;
        plan
    }

    /// Build and submit every admitted job concurrently.
    pub async fn create_jobs(&self, cluster: &dyn ClusterApi, jobs: Vec<JobDetails>, now: u64) -> CreateOutcome {
        let mut outcome = CreateOutcome::default();
        let mut built = Vec::with_capacity(jobs.len());
        for details in jobs {
            match self.builder.build(&details) {
                Ok(spec) => built.push((details, spec)),
                Err(error) => {
                    warn!(algorithm_name = %details.algorithm_name, %error, "cannot build job spec");
                    outcome.errors.push(error);
                }
            }
        }

        let responses = join_all(built.iter().map(|(_, spec)| cluster.create_job(spec))).await;
        for ((details, spec), response) in built.into_iter().zip(responses) {
            match response {
                Ok(response) if response.is_success() => outcome.created.push(CreatedJob {
                    job_name: spec.name().to_string(),
                    details,
                    created_at: now,
                }),
                Ok(response) => {
                    let warning = if response.status == UNPROCESSABLE_ENTITY {
                        let containers: Vec<String> =
                            spec.pod_spec().containers.iter().map(|c| c.name.clone()).collect();
                        let message = response.message.as_deref().unwrap_or_default();
                        warnings::job_creation_failed(&details, message, &containers)
                    } else {
                        warnings::unknown(&details, response.message.as_deref())
                    };
                    warn!(
                        algorithm_name = %details.algorithm_name,
                        job = %spec.name(),
                        status = response.status,
                        "job creation rejected"
                    );
                    outcome.failed.push(SkippedJob {
                        details,
                        warning: Some(warning),
                    });
                }
                Err(error) => {
                    warn!(algorithm_name = %details.algorithm_name, job = %spec.name(), %error, "job creation failed");
                    outcome.errors.push(error.into());
                }
            }
        }
        if !outcome.created.is_empty() || !outcome.failed.is_empty() {
            debug!(created = outcome.created.len(), failed = outcome.failed.len(), "created jobs");
        }
        outcome
    }

    /// Remember this tick's creations and update the unscheduled maps.
    pub fn finish(
        &mut self,
        created: &[CreatedJob],
        skipped: &[SkippedJob],
        requests: &[AlgorithmRequest],
        templates: &TemplateStore,
    ) {
        for job in created {
            self.created_jobs
                .entry(job.details.request_type())
                .or_default()
                .push(job.clone());
        }
        self.check_unscheduled(created, skipped, requests, templates);
    }

    fn check_unscheduled(
        &mut self,
        created: &[CreatedJob],
        skipped: &[SkippedJob],
        requests: &[AlgorithmRequest],
        templates: &TemplateStore,
    ) {
        for job in skipped {
            if let Some(warning) = &job.warning
                && !self.unscheduled.contains_key(&job.details.algorithm_name)
            {
                self.unscheduled
                    .insert(job.details.algorithm_name.clone(), warning.clone());
            }
        }

        let created: BTreeSet<&str> = created.iter().map(|j| j.details.algorithm_name.as_str()).collect();
        let requested: BTreeSet<&str> = requests.iter().map(|r| r.algorithm_name.as_str()).collect();
        let resolved: Vec<String> = self
            .unscheduled
            .keys()
            .filter(|alg| {
                created.contains(alg.as_str()) || !requested.contains(alg.as_str()) || !templates.contains_key(*alg)
            })
            .cloned()
            .collect();
        for algorithm in resolved {
            if let Some(warning) = self.unscheduled.remove(&algorithm) {
                debug!(algorithm_name = %algorithm, "unscheduled algorithm resolved");
                self.ignored_unscheduled.insert(algorithm, warning);
            }
        }
    }
}

/// Candidates to stop for requests refused for lack of resources: idle
/// workers first, then active workers of algorithms not starving, then
/// active workers of the starving ones. Taken greedily until each request's
/// shortfall is covered.
fn find_workers_to_stop(
    skipped: &[SkippedJob],
    idle: &[Worker],
    active: &[Worker],
    templates: &TemplateStore,
) -> Vec<StopCandidate> {
    let starving: Vec<&SkippedJob> = skipped
        .iter()
        .filter(|s| s.code() == Some(WarningCode::Resources))
        .collect();
    if starving.is_empty() {
        return Vec::new();
    }
    let starving_algorithms: BTreeSet<&str> = starving.iter().map(|s| s.details.algorithm_name.as_str()).collect();
    let (used, not_used): (Vec<&Worker>, Vec<&Worker>) = active
        .iter()
        .partition(|w| starving_algorithms.contains(w.algorithm_name.as_str()));
    let mut queue: VecDeque<&Worker> = idle.iter().chain(not_used).chain(used).collect();

    let mut candidates = Vec::new();
    for job in starving {
        let mut needed = job.details.total_requested();
        while needed.any_positive() {
            let Some(worker) = queue.pop_front() else {
                break;
            };
            let candidate = stop_candidate(worker, templates);
            needed -= candidate.resources;
            candidates.push(candidate);
        }
    }
    if !candidates.is_empty() {
        debug!(candidates = candidates.len(), "workers that could be stopped");
    }
    candidates
}

fn stop_candidate(worker: &Worker, templates: &TemplateStore) -> StopCandidate {
    let resources = templates
        .get(&worker.algorithm_name)
        .and_then(|t| template_resources(t).ok())
        .map_or_else(ResourceAmounts::default, |r| r.requests);
    StopCandidate {
        worker_id: worker.id.clone(),
        algorithm_name: worker.algorithm_name.clone(),
        pod_name: worker.pod_name.clone(),
        node_name: worker.node_name().map(str::to_string),
        resources,
    }
}

/// Each resume of an algorithm cancels one stop of the same algorithm.
fn filter_workers_to_stop(to_stop: Vec<StopCandidate>, to_resume: &[Worker]) -> Vec<StopCandidate> {
    let mut resumes: BTreeMap<&str, usize> = BTreeMap::new();
    for worker in to_resume {
        *resumes.entry(worker.algorithm_name.as_str()).or_default() += 1;
    }
    to_stop
        .into_iter()
        .filter(|candidate| match resumes.get_mut(candidate.algorithm_name.as_str()) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use taskexec_core::config::{ClusterConfig, PressureRatios};
    use taskexec_core::k8s::KubeJob;
    use taskexec_core::raw::{RawJob, RawNode};
    use taskexec_core::resources::ResourceOverride;
    use taskexec_core::{ClusterError, ClusterResult, CreateJobResponse, Job, NodeResources, SideCar, SideCarContainer};

    fn make_template(name: &str, cpu: f64) -> AlgorithmTemplate {
        AlgorithmTemplate {
            name: name.into(),
            algorithm_image: format!("hkube/{name}"),
            cpu: Some(cpu),
            mem: Some(256.0.into()),
            ..Default::default()
        }
    }

    fn store(templates: Vec<AlgorithmTemplate>) -> TemplateStore {
        templates.into_iter().map(|t| (t.name.clone(), t)).collect()
    }

    fn worker(id: &str, alg: &str, node: &str) -> Worker {
        Worker {
            id: id.into(),
            algorithm_name: alg.into(),
            worker_status: Some("ready".into()),
            pod_name: Some(format!("{id}-pod")),
            job: Some(Job {
                name: format!("{id}-job"),
                algorithm_name: alg.into(),
                active: true,
                node_name: Some(node.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn cluster_of(nodes: Vec<(&str, f64)>) -> ClusterResources {
        ClusterResources::from_nodes(
            nodes
                .into_iter()
                .map(|(name, cpu)| NodeResources::with_capacity(name, ResourceAmounts::new(cpu, 16384.0, 0.0)))
                .collect(),
        )
    }

    fn manager() -> JobsManager {
        let resources = ResourcesConfig::default();
        JobsManager::new(
            ResourceMatcher::new(PressureRatios::default(), 100),
            JobSpecBuilder::new(resources.clone(), ClusterConfig::default()),
            resources,
        )
    }

    struct Fixture {
        templates: TemplateStore,
        resources: ClusterResources,
        inventory: ClusterInventory,
        job_names: BTreeSet<String>,
    }

    impl Fixture {
        fn new(templates: TemplateStore, resources: ClusterResources) -> Self {
            Self {
                templates,
                resources,
                inventory: ClusterInventory::default(),
                job_names: BTreeSet::new(),
            }
        }

        fn context(&self) -> PlanContext<'_> {
            PlanContext {
                templates: &self.templates,
                versions: None,
                registry: None,
                resources: &self.resources,
                inventory: &self.inventory,
                pods: &[],
                job_names: &self.job_names,
            }
        }
    }

    #[test]
    fn requests_reuse_existing_capacity_first() {
        let fixture = Fixture::new(store(vec![make_template("a", 1.0)]), cluster_of(vec![("n1", 8.0)]));
        let mut paused = worker("p1", "a", "n1");
        paused.worker_paused = true;
        let categories = WorkerCategories {
            idle: vec![worker("i1", "a", "n1")],
            paused: vec![paused],
            pending: vec![Job { name: "a-00000".into(), algorithm_name: "a".into(), ..Default::default() }],
            ..Default::default()
        };
        let requests: Vec<_> = (0..4).map(|_| AlgorithmRequest::batch("a")).collect();

        let plan = manager().plan(&requests, &categories, fixture.context());
        assert_eq!(plan.algorithms["a"].idle, 1);
        assert_eq!(plan.to_resume.len(), 1);
        assert_eq!(plan.to_resume[0].id, "p1");
        assert_eq!(plan.algorithms["a"].required, 1);
        assert_eq!(plan.jobs_to_request.len(), 1);
        assert_eq!(plan.jobs_to_request[0].node.as_deref(), Some("n1"));
    }

    #[test]
    fn recently_created_jobs_serve_requests_until_listed() {
        let fixture = Fixture::new(store(vec![make_template("a", 1.0)]), cluster_of(vec![("n1", 8.0)]));
        let mut manager = manager();
        let details = job_details_for(
            &AlgorithmRequest::batch("a"),
            &fixture.templates["a"],
            None,
            None,
            &ResourcesConfig::default(),
        )
        .unwrap();
        let created = vec![CreatedJob {
            job_name: "a-12345".into(),
            details,
            created_at: 1_000,
        }];
        manager.finish(&created, &[], &[], &fixture.templates);
        assert_eq!(manager.created_count(RequestType::Batch), 1);

        let requests = vec![AlgorithmRequest::batch("a")];
        let plan = manager.plan(&requests, &WorkerCategories::default(), fixture.context());
        assert!(plan.jobs_to_request.is_empty());

        let mut listed = Fixture::new(fixture.templates.clone(), fixture.resources.clone());
        listed.job_names.insert("a-12345".into());
        let plan = manager.plan(&requests, &WorkerCategories::default(), listed.context());
        assert_eq!(plan.jobs_to_request.len(), 1);

        manager.clear_created_jobs(15_000, 16_000);
        assert_eq!(manager.created_count(RequestType::Batch), 0);
    }

    #[test]
    fn starving_requests_stop_other_algorithms() {
        let mut node = NodeResources::with_capacity("n1", ResourceAmounts::new(8.0, 16384.0, 0.0));
        node.allocate(ResourceAmounts::new(6.0, 1024.0, 0.0));
        let fixture = Fixture::new(
            store(vec![make_template("big", 2.0), make_template("small", 2.0)]),
            ClusterResources::from_nodes(vec![node]),
        );
        let mut busy = worker("w2", "small", "n1");
        busy.worker_status = Some("working".into());
        let categories = WorkerCategories {
            active: vec![busy],
            ..Default::default()
        };
        let requests = vec![AlgorithmRequest::batch("big")];

        let plan = manager().plan(&requests, &categories, fixture.context());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.to_stop.len(), 1);
        assert_eq!(plan.to_stop[0].worker_id, "w2");
        assert_eq!(plan.to_stop[0].resources.cpu, 2.0);
    }

    #[test]
    fn resume_cancels_a_stop_of_the_same_algorithm() {
        let stop = |id: &str, alg: &str| StopCandidate {
            worker_id: id.into(),
            algorithm_name: alg.into(),
            pod_name: None,
            node_name: None,
            resources: ResourceAmounts::default(),
        };
        let to_stop = vec![stop("s1", "a"), stop("s2", "a"), stop("s3", "b")];
        let to_resume = vec![worker("r1", "a", "n1")];
        let kept = filter_workers_to_stop(to_stop, &to_resume);
        let ids: Vec<_> = kept.iter().map(|s| s.worker_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[test]
    fn side_car_defaults_and_custom_worker_resources() {
        let mut template = make_template("a", 1.0);
        template.side_cars = vec![SideCar {
            container: SideCarContainer {
                name: "proxy".into(),
                image: "envoy".into(),
                resources: ResourceOverride {
                    limits: taskexec_core::resources::ResourceQuantities {
                        cpu: Some(1.0.into()),
                        memory: None,
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }];
        template.worker_custom_resources = Some(ResourceOverride {
            requests: taskexec_core::resources::ResourceQuantities {
                cpu: Some("500m".into()),
                memory: None,
            },
            ..Default::default()
        });
        let config = ResourcesConfig::default();
        let details = job_details_for(&AlgorithmRequest::batch("a"), &template, None, None, &config).unwrap();

        let side_car = &details.side_cars[0].resources;
        assert_eq!(side_car.requests.cpu, config.sidecar.cpu);
        assert_eq!(side_car.requests.memory, config.sidecar.mem);
        assert_eq!(side_car.limits.cpu, 1.0);
        assert_eq!(side_car.limits.memory, config.sidecar.mem * 2.0);

        let worker = details.worker_resources();
        assert_eq!(worker.requests.cpu, 0.5);
        assert_eq!(worker.requests.memory, config.worker.mem);
        assert_eq!(details.worker_image, "hkube/worker");
    }

    #[test]
    fn unscheduled_moves_to_ignored_once_resolved() {
        let templates = store(vec![make_template("a", 1.0), make_template("b", 1.0)]);
        let mut manager = manager();
        let skipped = |alg: &str| SkippedJob {
            details: JobDetails {
                algorithm_name: alg.into(),
                ..Default::default()
            },
            warning: Some(Warning::new(alg, WarningCode::Resources, "no room".into(), 1)),
        };
        let requests = vec![AlgorithmRequest::batch("a"), AlgorithmRequest::batch("b")];
        manager.finish(&[], &[skipped("a"), skipped("b")], &requests, &templates);
        assert_eq!(manager.unscheduled().len(), 2);

        // "a" is no longer requested.
        manager.finish(&[], &[], &requests[1..], &templates);
        assert!(manager.unscheduled().contains_key("b"));
        assert!(manager.ignored_unscheduled().contains_key("a"));
    }

    struct ScriptedCluster {
        responses: Mutex<Vec<ClusterResult<CreateJobResponse>>>,
    }

    #[async_trait]
    impl ClusterApi for ScriptedCluster {
        async fn list_nodes(&self) -> ClusterResult<Vec<RawNode>> {
            Ok(Vec::new())
        }

        async fn list_pods(&self) -> ClusterResult<Vec<RawPod>> {
            Ok(Vec::new())
        }

        async fn list_jobs(&self) -> ClusterResult<Vec<RawJob>> {
            Ok(Vec::new())
        }

        async fn inventory(&self) -> ClusterResult<ClusterInventory> {
            Ok(ClusterInventory::default())
        }

        async fn create_job(&self, _job: &KubeJob) -> ClusterResult<CreateJobResponse> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(CreateJobResponse::created())
            } else {
                responses.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn create_jobs_sorts_responses() {
        let template = make_template("a", 1.0);
        let details = job_details_for(&AlgorithmRequest::batch("a"), &template, None, None, &ResourcesConfig::default())
            .unwrap();
        let cluster = ScriptedCluster {
            responses: Mutex::new(vec![
                Ok(CreateJobResponse::created()),
                Ok(CreateJobResponse::rejected("Job.batch \"a-12345\" is invalid: quota exceeded")),
                Ok(CreateJobResponse {
                    status: 500,
                    message: None,
                }),
                Err(ClusterError::Unreachable("connection refused".into())),
            ]),
        };
        let outcome = manager()
            .create_jobs(&cluster, vec![details.clone(), details.clone(), details.clone(), details], 42)
            .await;

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].created_at, 42);
        assert!(outcome.created[0].job_name.starts_with("a-"));
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].code(), Some(WarningCode::JobCreationFailed));
        assert_eq!(outcome.failed[1].code(), Some(WarningCode::Unknown));
        assert_eq!(outcome.errors.len(), 1);
    }
}
