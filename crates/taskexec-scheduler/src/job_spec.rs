//! Job specification builder.
//!
//! Pure transformation of resolved [`JobDetails`] into a cluster [`KubeJob`]:
//! naming, images, env, resources, node placement, volumes and sidecars.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::warn;

use taskexec_core::config::{ClusterConfig, ResourcesConfig};
use taskexec_core::k8s::{
    Affinity, Container, EnvVar, JobSpec, KubeJob, LocalObjectReference, MatchExpression, Metadata, NodeAffinity,
    NodeSelectorTerm, NodeSelectorTerms, PodSpec, PodTemplateSpec, ResourceRequirements, SecurityContext,
};
use taskexec_core::units::{GPU_RESOURCE, format_cores, format_mib};
use taskexec_core::{
    ALGORITHM_NAME_LABEL, ClaimRef, ContainerResources, JobDetails, MountKind, NameRef, ResolvedSideCar, SelectorValue, Volume, VolumeMount,
};

use crate::error::{SchedulerError, SchedulerResult};

pub const WORKER_CONTAINER: &str = "worker";
pub const ALGORITHM_CONTAINER: &str = "algorunner";

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";
const KAI_QUEUE_LABEL: &str = "kai.scheduler/queue";
const KAI_MEMORY_ANNOTATION: &str = "gpu-memory";
const KAI_FRACTION_ANNOTATION: &str = "gpu-fraction";
const KAI_SCHEDULER: &str = "kai-scheduler";
const JAVA_ENV: &str = "java";
const JAVA_MEMORY_RATIO: f64 = 0.8;

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The job every worker job starts from: a worker container and an
/// algorithm container, never restarted.
pub fn worker_job_template() -> KubeJob {
    let labels = BTreeMap::from([
        ("type".to_string(), "worker".to_string()),
        ("group".to_string(), "hkube".to_string()),
        ("core".to_string(), "true".to_string()),
        (ALGORITHM_NAME_LABEL.to_string(), String::new()),
        ("metrics-group".to_string(), "workers".to_string()),
    ]);
    let mut pod_labels = labels.clone();
    pod_labels.remove("core");

    let worker = Container {
        name: WORKER_CONTAINER.to_string(),
        image: "hkube/worker:latest".to_string(),
        env: vec![
            EnvVar::plain("NODE_ENV", "production"),
            EnvVar::field("POD_ID", "metadata.uid"),
            EnvVar::field("POD_IP", "status.podIP"),
            EnvVar::field("POD_NAME", "metadata.name"),
            EnvVar::field("NAMESPACE", "metadata.namespace"),
        ],
        ..Default::default()
    };
    let algorithm = Container {
        name: ALGORITHM_CONTAINER.to_string(),
        image: "hkube/algorunner:latest".to_string(),
        env: vec![EnvVar::field("POD_NAME", "metadata.name")],
        ..Default::default()
    };

    KubeJob {
        api_version: "batch/v1".to_string(),
        kind: "Job".to_string(),
        metadata: Metadata {
            name: String::new(),
            labels,
            annotations: BTreeMap::new(),
        },
        spec: JobSpec {
            template: PodTemplateSpec {
                metadata: Metadata {
                    name: String::new(),
                    labels: pod_labels,
                    annotations: BTreeMap::new(),
                },
                spec: PodSpec {
                    service_account_name: Some("worker-serviceaccount".to_string()),
                    containers: vec![worker, algorithm],
                    restart_policy: "Never".to_string(),
                    ..Default::default()
                },
            },
            backoff_limit: Some(0),
        },
    }
}

/// `<algorithm>-<5 hex chars>`, unique per call within the process.
pub fn job_name(algorithm_name: &str) -> String {
    let sequence = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(algorithm_name.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{algorithm_name}-{}", &digest[..5])
}

#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    base: KubeJob,
    resources: ResourcesConfig,
    cluster: ClusterConfig,
}

impl JobSpecBuilder {
    pub fn new(resources: ResourcesConfig, cluster: ClusterConfig) -> Self {
        Self::with_base(worker_job_template(), resources, cluster)
    }

    pub fn with_base(base: KubeJob, resources: ResourcesConfig, cluster: ClusterConfig) -> Self {
        Self {
            base,
            resources,
            cluster,
        }
    }

    pub fn build(&self, details: &JobDetails) -> SchedulerResult<KubeJob> {
        if details.algorithm_name.is_empty() {
            return Err(SchedulerError::MissingAlgorithmName);
        }
        if details.algorithm_image.is_empty() {
            return Err(SchedulerError::MissingAlgorithmImage(details.algorithm_name.clone()));
        }
        let mut job = self.base.clone();
        for name in [WORKER_CONTAINER, ALGORITHM_CONTAINER] {
            if job.container(name).is_none() {
                return Err(SchedulerError::MissingContainer(name.to_string()));
            }
        }
        let algorithm_name = details.algorithm_name.as_str();

        job.metadata.name = job_name(algorithm_name);
        job.metadata
            .labels
            .insert(ALGORITHM_NAME_LABEL.to_string(), algorithm_name.to_string());
        job.spec
            .template
            .metadata
            .labels
            .insert(ALGORITHM_NAME_LABEL.to_string(), algorithm_name.to_string());

        let worker = container(&mut job, WORKER_CONTAINER)?;
        worker.image = details.worker_image.clone();
        worker.set_env("ALGORITHM_TYPE", algorithm_name);
        for (key, value) in &details.worker_env {
            worker.set_env(key, value.as_str());
        }
        worker.set_env("ALGORITHM_IMAGE", details.algorithm_image.as_str());
        if let Some(version) = &details.algorithm_version {
            worker.set_env("ALGORITHM_VERSION", version.as_str());
        }
        worker.set_env("WORKER_IMAGE", details.worker_image.as_str());
        if details.hot_worker {
            worker.set_env("HOT_WORKER", "true");
        }
        if self.resources.apply_worker_resources || details.worker_custom_resources.is_some() {
            worker.resources = Some(requirements(&details.worker_resources(), false));
        }
        if let Some(storage) = &self.cluster.default_storage {
            worker.set_env("DEFAULT_STORAGE", storage.as_str());
        }
        if self.cluster.is_privileged {
            worker.security_context = Some(SecurityContext { privileged: true });
        }

        let algorithm = container(&mut job, ALGORITHM_CONTAINER)?;
        algorithm.image = details.algorithm_image.clone();
        algorithm.set_env("ALGORITHM_TYPE", algorithm_name);
        for (key, value) in &details.algorithm_env {
            algorithm.set_env(key, value.as_str());
        }
        if details.env.as_deref() == Some(JAVA_ENV) {
            let derived = (details.resource_requests.limits.memory * JAVA_MEMORY_RATIO).round();
            algorithm.set_env("JAVA_DERIVED_MEMORY", format!("{derived}"));
        }
        if let Some(entry_point) = &details.entry_point {
            algorithm.set_env("ALGORITHM_ENTRY_POINT", entry_point.as_str());
        }
        if let Some(storage) = &self.cluster.default_storage {
            algorithm.set_env("DEFAULT_STORAGE", storage.as_str());
        }
        if let Some(reserved) = details.reserved_memory
            && reserved > 0.0
        {
            algorithm.set_env("DISCOVERY_MAX_CACHE_SIZE", format!("{}", reserved.trunc() as i64));
        }

        apply_algorithm_resources(&mut job, details)?;
        apply_node_selector(&mut job.spec.template.spec, details);
        apply_mounts(&mut job, details)?;
        if let Some(secret) = &self.cluster.image_pull_secret {
            job.spec.template.spec.image_pull_secrets.push(LocalObjectReference { name: secret.clone() });
        }
        apply_kai(&mut job, details);
        apply_key_values(&mut job.metadata.labels, &details.labels, "label");
        apply_key_values(&mut job.spec.template.metadata.labels, &details.labels, "label");
        apply_key_values(&mut job.metadata.annotations, &details.annotations, "annotation");
        apply_key_values(&mut job.spec.template.metadata.annotations, &details.annotations, "annotation");

        job.spec.template.spec.volumes.extend(details.volumes.iter().cloned());
        container(&mut job, ALGORITHM_CONTAINER)?
            .volume_mounts
            .extend(details.volume_mounts.iter().cloned());

        for side_car in &details.side_cars {
            job.spec.template.spec.containers.push(side_car_container(side_car));
        }
        Ok(job)
    }
}

fn container<'a>(job: &'a mut KubeJob, name: &str) -> SchedulerResult<&'a mut Container> {
    job.container_mut(name)
        .ok_or_else(|| SchedulerError::MissingContainer(name.to_string()))
}

fn requirements(resources: &ContainerResources, with_gpu: bool) -> ResourceRequirements {
    let mut requests = BTreeMap::from([
        ("cpu".to_string(), format_cores(resources.requests.cpu)),
        ("memory".to_string(), format_mib(resources.requests.memory)),
    ]);
    let mut limits = BTreeMap::from([
        ("cpu".to_string(), format_cores(resources.limits.cpu)),
        ("memory".to_string(), format_mib(resources.limits.memory)),
    ]);
    if with_gpu && resources.requests.gpu > 0.0 {
        requests.insert(GPU_RESOURCE.to_string(), format_cores(resources.requests.gpu));
        limits.insert(GPU_RESOURCE.to_string(), format_cores(resources.limits.gpu));
    }
    ResourceRequirements { requests, limits }
}

/// Whole GPUs go into the resource list. A fractional GPU is only
/// annotated, and the pod is pinned to the node it was admitted on.
fn apply_algorithm_resources(job: &mut KubeJob, details: &JobDetails) -> SchedulerResult<()> {
    let gpu = details.resource_requests.limits.gpu;
    let fractional = gpu > 0.0 && gpu.fract() != 0.0;
    if gpu > 0.0 {
        job.spec
            .template
            .metadata
            .annotations
            .insert(GPU_RESOURCE.to_string(), format_cores(gpu));
    }
    if fractional && let Some(node) = &details.node {
        job.spec
            .template
            .spec
            .node_selector
            .insert(HOSTNAME_LABEL.to_string(), node.clone());
    }
    container(job, ALGORITHM_CONTAINER)?.resources = Some(requirements(&details.resource_requests, !fractional));
    Ok(())
}

/// Single values become a node selector, value lists a required `In`
/// affinity term.
fn apply_node_selector(pod: &mut PodSpec, details: &JobDetails) {
    let mut expressions = Vec::new();
    for (key, value) in &details.node_selector {
        match value {
            SelectorValue::One(v) => {
                pod.node_selector.insert(key.clone(), v.clone());
            }
            SelectorValue::AnyOf(values) => expressions.push(MatchExpression {
                key: key.clone(),
                operator: "In".to_string(),
                values: values.clone(),
            }),
        }
    }
    if !expressions.is_empty() {
        pod.affinity = Some(Affinity {
            node_affinity: NodeAffinity {
                required: NodeSelectorTerms {
                    node_selector_terms: vec![NodeSelectorTerm {
                        match_expressions: expressions,
                    }],
                },
            },
        });
    }
}

fn apply_mounts(job: &mut KubeJob, details: &JobDetails) -> SchedulerResult<()> {
    for (index, mount) in details.mounts.iter().enumerate() {
        let name = format!("{}-{index}", mount.pvc_name);
        let mut volume = Volume {
            name: name.clone(),
            ..Default::default()
        };
        match mount.volume_type {
            MountKind::PersistentVolumeClaim => {
                volume.persistent_volume_claim = Some(ClaimRef {
                    claim_name: mount.pvc_name.clone(),
                })
            }
            MountKind::ConfigMap => {
                volume.config_map = Some(NameRef {
                    name: mount.pvc_name.clone(),
                })
            }
            MountKind::EmptyDir => volume.empty_dir = Some(BTreeMap::new()),
        }
        job.spec.template.spec.volumes.push(volume);
        container(job, ALGORITHM_CONTAINER)?.volume_mounts.push(VolumeMount {
            name,
            mount_path: mount.path.clone(),
            ..Default::default()
        });
    }
    Ok(())
}

fn apply_kai(job: &mut KubeJob, details: &JobDetails) {
    let Some(kai) = &details.kai_object else {
        return;
    };
    let mut labels = BTreeMap::new();
    if let Some(queue) = &kai.queue {
        labels.insert(KAI_QUEUE_LABEL.to_string(), queue.clone());
    }
    let mut annotations = BTreeMap::new();
    if let Some(memory) = &kai.memory {
        annotations.insert(KAI_MEMORY_ANNOTATION.to_string(), memory.clone());
    }
    if let Some(fraction) = kai.fraction {
        annotations.insert(KAI_FRACTION_ANNOTATION.to_string(), format!("{fraction}"));
    }
    apply_key_values(&mut job.metadata.labels, &labels, "label");
    apply_key_values(&mut job.spec.template.metadata.labels, &labels, "label");
    apply_key_values(&mut job.metadata.annotations, &annotations, "annotation");
    apply_key_values(&mut job.spec.template.metadata.annotations, &annotations, "annotation");
    job.spec.template.spec.scheduler_name = Some(KAI_SCHEDULER.to_string());
}

/// Add entries without touching keys already present.
fn apply_key_values(target: &mut BTreeMap<String, String>, values: &BTreeMap<String, String>, kind: &str) {
    for (key, value) in values {
        if target.contains_key(key) {
            warn!(%key, kind, "cannot apply reserved key");
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

fn side_car_container(resolved: &ResolvedSideCar) -> Container {
    let side_car = &resolved.side_car;
    let mut container = Container {
        name: side_car.container.name.clone(),
        image: side_car.container.image.clone(),
        command: side_car.container.command.clone(),
        args: side_car.container.args.clone(),
        resources: Some(requirements(&resolved.resources, false)),
        volume_mounts: side_car.volume_mounts.clone(),
        ..Default::default()
    };
    for (key, value) in &side_car.environments {
        container.set_env(key, value.as_str());
    }
    container
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskexec_core::{KaiObject, Mount, SideCar, SideCarContainer};

    fn builder() -> JobSpecBuilder {
        JobSpecBuilder::new(ResourcesConfig::default(), ClusterConfig::default())
    }

    fn details(alg: &str) -> JobDetails {
        JobDetails {
            algorithm_name: alg.into(),
            algorithm_image: format!("hkube/{alg}:v1"),
            algorithm_version: Some("v1".into()),
            worker_image: "hkube/worker:v2".into(),
            resource_requests: ContainerResources::from_shape(Some(1.0), Some(512.0), None),
            worker_resource_requests: ContainerResources::from_shape(Some(0.1), Some(512.0), None),
            ..Default::default()
        }
    }

    fn env<'a>(job: &'a KubeJob, container: &str, name: &str) -> Option<&'a str> {
        job.container(container).and_then(|c| c.env_value(name))
    }

    #[test]
    fn names_and_labels() {
        let job = builder().build(&details("green-alg")).unwrap();
        let suffix = job.name().strip_prefix("green-alg-").unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(job.metadata.labels["algorithm-name"], "green-alg");
        assert_eq!(job.spec.template.metadata.labels["algorithm-name"], "green-alg");

        let other = builder().build(&details("green-alg")).unwrap();
        assert_ne!(job.name(), other.name());
    }

    #[test]
    fn built_job_is_attributed_back_to_its_algorithm() {
        use crate::normalize::normalize_jobs;
        use taskexec_core::raw::{ObjectMeta, RawJob, RawJobStatus};

        let job = builder().build(&details("green-alg")).unwrap();
        let listed = RawJob {
            metadata: ObjectMeta {
                name: job.name().to_string(),
                labels: job.metadata.labels.clone(),
                ..Default::default()
            },
            status: RawJobStatus { active: Some(1), ..Default::default() },
        };
        let jobs = normalize_jobs(&[listed], &[]);
        assert_eq!(jobs[0].algorithm_name, "green-alg");
        assert_eq!(job.spec.template.metadata.labels[ALGORITHM_NAME_LABEL], "green-alg");
    }

    #[test]
    fn images_and_env() {
        let mut d = details("green-alg");
        d.hot_worker = true;
        d.entry_point = Some("main.py".into());
        d.worker_env = BTreeMap::from([("WORKER_X".into(), "1".into())]);
        d.algorithm_env = BTreeMap::from([("ALG_X".into(), "2".into())]);
        let job = builder().build(&d).unwrap();

        assert_eq!(job.container(WORKER_CONTAINER).unwrap().image, "hkube/worker:v2");
        assert_eq!(job.container(ALGORITHM_CONTAINER).unwrap().image, "hkube/green-alg:v1");
        assert_eq!(env(&job, WORKER_CONTAINER, "ALGORITHM_TYPE"), Some("green-alg"));
        assert_eq!(env(&job, ALGORITHM_CONTAINER, "ALGORITHM_TYPE"), Some("green-alg"));
        assert_eq!(env(&job, WORKER_CONTAINER, "ALGORITHM_IMAGE"), Some("hkube/green-alg:v1"));
        assert_eq!(env(&job, WORKER_CONTAINER, "ALGORITHM_VERSION"), Some("v1"));
        assert_eq!(env(&job, WORKER_CONTAINER, "WORKER_IMAGE"), Some("hkube/worker:v2"));
        assert_eq!(env(&job, WORKER_CONTAINER, "HOT_WORKER"), Some("true"));
        assert_eq!(env(&job, WORKER_CONTAINER, "WORKER_X"), Some("1"));
        assert_eq!(env(&job, ALGORITHM_CONTAINER, "ALG_X"), Some("2"));
        assert_eq!(env(&job, ALGORITHM_CONTAINER, "ALGORITHM_ENTRY_POINT"), Some("main.py"));
    }

    #[test]
    fn java_memory_and_cache_size() {
        let mut d = details("java-alg");
        d.env = Some("java".into());
        d.reserved_memory = Some(256.0);
        let job = builder().build(&d).unwrap();
        // Limit is 1024Mi, 80% rounded.
        assert_eq!(env(&job, ALGORITHM_CONTAINER, "JAVA_DERIVED_MEMORY"), Some("819"));
        assert_eq!(env(&job, ALGORITHM_CONTAINER, "DISCOVERY_MAX_CACHE_SIZE"), Some("256"));
    }

    #[test]
    fn algorithm_resources_always_worker_resources_on_demand() {
        let job = builder().build(&details("green-alg")).unwrap();
        let resources = job.container(ALGORITHM_CONTAINER).unwrap().resources.clone().unwrap();
        assert_eq!(resources.requests["cpu"], "1");
        assert_eq!(resources.requests["memory"], "512Mi");
        assert_eq!(resources.limits["cpu"], "2");
        assert_eq!(resources.limits["memory"], "1024Mi");
        assert!(job.container(WORKER_CONTAINER).unwrap().resources.is_none());

        let mut d = details("green-alg");
        d.worker_custom_resources = Some(ContainerResources::from_shape(Some(0.5), Some(256.0), None));
        let job = builder().build(&d).unwrap();
        let worker = job.container(WORKER_CONTAINER).unwrap().resources.clone().unwrap();
        assert_eq!(worker.requests["cpu"], "0.5");
        assert_eq!(worker.limits["memory"], "512Mi");
    }

    #[test]
    fn fractional_gpu_is_pinned_to_node() {
        let mut d = details("gpu-alg");
        d.resource_requests = ContainerResources::from_shape(Some(1.0), Some(512.0), Some(0.5));
        d.node = Some("node-1".into());
        let job = builder().build(&d).unwrap();
        let resources = job.container(ALGORITHM_CONTAINER).unwrap().resources.clone().unwrap();
        assert!(!resources.limits.contains_key(GPU_RESOURCE));
        assert_eq!(job.spec.template.metadata.annotations[GPU_RESOURCE], "0.5");
        assert_eq!(job.pod_spec().node_selector[HOSTNAME_LABEL], "node-1");

        d.resource_requests = ContainerResources::from_shape(Some(1.0), Some(512.0), Some(2.0));
        let job = builder().build(&d).unwrap();
        let resources = job.container(ALGORITHM_CONTAINER).unwrap().resources.clone().unwrap();
        assert_eq!(resources.limits[GPU_RESOURCE], "2");
        assert!(!job.pod_spec().node_selector.contains_key(HOSTNAME_LABEL));
    }

    #[test]
    fn selector_values_split_into_selector_and_affinity() {
        let mut d = details("green-alg");
        d.node_selector = BTreeMap::from([
            ("disk".to_string(), SelectorValue::from("ssd")),
            ("zone".to_string(), SelectorValue::AnyOf(vec!["a".into(), "b".into()])),
        ]);
        let job = builder().build(&d).unwrap();
        assert_eq!(job.pod_spec().node_selector["disk"], "ssd");
        let affinity = job.pod_spec().affinity.clone().unwrap();
        let expression = &affinity.node_affinity.required.node_selector_terms[0].match_expressions[0];
        assert_eq!(expression.key, "zone");
        assert_eq!(expression.operator, "In");
        assert_eq!(expression.values, vec!["a", "b"]);
    }

    #[test]
    fn mounts_become_volumes() {
        let mut d = details("green-alg");
        d.mounts = vec![
            Mount {
                pvc_name: "data".into(),
                path: "/data".into(),
                volume_type: MountKind::PersistentVolumeClaim,
            },
            Mount {
                pvc_name: "settings".into(),
                path: "/etc/settings".into(),
                volume_type: MountKind::ConfigMap,
            },
        ];
        let job = builder().build(&d).unwrap();
        let volumes = &job.pod_spec().volumes;
        assert_eq!(volumes[0].name, "data-0");
        assert_eq!(volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name, "data");
        assert_eq!(volumes[1].name, "settings-1");
        assert_eq!(volumes[1].config_map.as_ref().unwrap().name, "settings");
        let mounts = &job.container(ALGORITHM_CONTAINER).unwrap().volume_mounts;
        assert_eq!(mounts[1].mount_path, "/etc/settings");
    }

    #[test]
    fn reserved_labels_are_not_overwritten() {
        let mut d = details("green-alg");
        d.labels = BTreeMap::from([("type".to_string(), "custom".to_string()), ("team".to_string(), "a".to_string())]);
        let job = builder().build(&d).unwrap();
        assert_eq!(job.metadata.labels["type"], "worker");
        assert_eq!(job.metadata.labels["team"], "a");
        assert_eq!(job.spec.template.metadata.labels["team"], "a");
    }

    #[test]
    fn kai_queue_and_scheduler() {
        let mut d = details("green-alg");
        d.kai_object = Some(KaiObject {
            queue: Some("team-a".into()),
            memory: Some("4Gi".into()),
            fraction: Some(0.5),
        });
        let job = builder().build(&d).unwrap();
        assert_eq!(job.metadata.labels[KAI_QUEUE_LABEL], "team-a");
        assert_eq!(job.spec.template.metadata.annotations[KAI_MEMORY_ANNOTATION], "4Gi");
        assert_eq!(job.spec.template.metadata.annotations[KAI_FRACTION_ANNOTATION], "0.5");
        assert_eq!(job.pod_spec().scheduler_name.as_deref(), Some(KAI_SCHEDULER));
    }

    #[test]
    fn side_cars_and_cluster_options() {
        let mut d = details("green-alg");
        d.side_cars = vec![ResolvedSideCar {
            side_car: SideCar {
                container: SideCarContainer {
                    name: "proxy".into(),
                    image: "envoy:1".into(),
                    ..Default::default()
                },
                environments: BTreeMap::from([("MODE".to_string(), "sidecar".to_string())]),
                ..Default::default()
            },
            resources: ContainerResources::from_shape(Some(0.1), Some(128.0), None),
        }];
        let cluster = ClusterConfig {
            image_pull_secret: Some("regcred".into()),
            default_storage: Some("s3".into()),
            is_privileged: true,
        };
        let job = JobSpecBuilder::new(ResourcesConfig::default(), cluster).build(&d).unwrap();

        let proxy = job.container("proxy").unwrap();
        assert_eq!(proxy.env_value("MODE"), Some("sidecar"));
        assert_eq!(proxy.resources.as_ref().unwrap().limits["memory"], "256Mi");
        assert_eq!(job.pod_spec().image_pull_secrets[0].name, "regcred");
        assert_eq!(env(&job, WORKER_CONTAINER, "DEFAULT_STORAGE"), Some("s3"));
        assert_eq!(env(&job, ALGORITHM_CONTAINER, "DEFAULT_STORAGE"), Some("s3"));
        let worker = job.container(WORKER_CONTAINER).unwrap();
        assert!(worker.security_context.as_ref().unwrap().privileged);
    }

    #[test]
    fn construction_errors() {
        let mut d = details("green-alg");
        d.algorithm_image.clear();
        assert!(matches!(
            builder().build(&d),
            Err(SchedulerError::MissingAlgorithmImage(name)) if name == "green-alg"
        ));

        let d = JobDetails::default();
        assert!(matches!(builder().build(&d), Err(SchedulerError::MissingAlgorithmName)));

        let mut base = worker_job_template();
        base.spec.template.spec.containers.retain(|c| c.name != ALGORITHM_CONTAINER);
        let builder = JobSpecBuilder::with_base(base, ResourcesConfig::default(), ClusterConfig::default());
        assert!(matches!(
            builder.build(&details("green-alg")),
            Err(SchedulerError::MissingContainer(name)) if name == ALGORITHM_CONTAINER
        ));
    }
}
