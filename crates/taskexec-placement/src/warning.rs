//! Warning construction for each scheduling failure class.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use taskexec_core::warning::{NodeShortfall, ResourceDescriptor};
use taskexec_core::{JobDetails, ResourceAmounts, ResourceKind, Warning, WarningCode, epoch_millis};

use crate::fit::NodeFit;

const JOB_PREFIX: &str = r#"^Job\.\w+ "\S+""#;
const INVALID_PATH: &str = r"is invalid: ([^:]+):";
const CONTAINER_INDEX: &str = r"containers\[(\d+)\]";
const CONTAINER_PATH: &str = r"spec\.template\.spec\.containers\[\d+\]";
const QUOTED: &str = r#""([^"]+)""#;

/// Compiled patterns used to rewrite cluster validation errors.
struct CreationErrorPatterns {
    job_prefix: Regex,
    invalid_path: Regex,
    container_index: Regex,
    container_path: Regex,
    quoted: Regex,
}

impl CreationErrorPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            job_prefix: Regex::new(JOB_PREFIX)?,
            invalid_path: Regex::new(INVALID_PATH)?,
            container_index: Regex::new(CONTAINER_INDEX)?,
            container_path: Regex::new(CONTAINER_PATH)?,
            quoted: Regex::new(QUOTED)?,
        })
    }
}

static PATTERNS: LazyLock<Result<CreationErrorPatterns, regex::Error>> = LazyLock::new(CreationErrorPatterns::compile);

fn base(details: &JobDetails, code: WarningCode, message: String) -> Warning {
    Warning::new(&details.algorithm_name, code, message, epoch_millis())
}

/// No node could host the request.
///
/// `nodes` are the fit results for the nodes left after the selector filter,
/// `unmatched_by_selector` the number of nodes the selector excluded.
pub fn resources(
    details: &JobDetails,
    nodes: &[NodeFit],
    unmatched_by_selector: usize,
    requested: ResourceAmounts,
) -> Warning {
    let mut messages = Vec::new();
    let mut descriptor = ResourceDescriptor::default();

    let selectors: Vec<String> = details
        .node_selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    if unmatched_by_selector > 0 {
        descriptor.requested_selectors = selectors.clone();
        descriptor.num_unmatched_nodes_by_selector = unmatched_by_selector;
    }
    if nodes.is_empty() {
        messages.push(format!(
            "No nodes available for scheduling due to selector condition - '{}'",
            selectors.join(",")
        ));
    }

    let mut has_max_capacity = true;
    let mut over_capacity: BTreeMap<ResourceKind, usize> = BTreeMap::new();
    let mut insufficient: BTreeMap<ResourceKind, usize> = BTreeMap::new();
    for fit in nodes {
        let over = fit.max_capacity.kinds(true);
        if over.is_empty() {
            has_max_capacity = false;
        }
        for kind in &over {
            *over_capacity.entry(*kind).or_default() += 1;
        }
        for kind in fit.details.kinds(false) {
            *insufficient.entry(kind).or_default() += 1;
        }
        descriptor.nodes.push(NodeShortfall {
            node_name: fit.node_name.clone(),
            amounts_missing: fit.amounts_missing.clone(),
            requests_over_max_capacity: over,
        });
    }

    let counts = |map: &BTreeMap<ResourceKind, usize>| -> Vec<String> {
        map.iter().map(|(kind, n)| format!("{kind} ({n})")).collect()
    };
    if has_max_capacity && !over_capacity.is_empty() {
        messages.push(format!("Maximum capacity exceeded {}", counts(&over_capacity).join(" ")));
    } else if !insufficient.is_empty() {
        messages.push(format!("Insufficient {}", counts(&insufficient).join(", ")));
    }

    let mut warning = base(details, WarningCode::Resources, messages.join(", "));
    warning.surpass_timeout = has_max_capacity;
    warning.complex_resource_descriptor = Some(descriptor);
    warning.requested_resources = Some(requested);
    warning
}

/// Referenced claims, config maps or secrets do not exist.
pub fn invalid_volume(details: &JobDetails, missing: Vec<String>) -> Warning {
    let message = format!(
        "One or more volumes are missing or do not exist.\nMissing volumes: {}",
        missing.join(", ")
    );
    let mut warning = base(details, WarningCode::InvalidVolume, message);
    warning.is_error = true;
    warning.surpass_timeout = true;
    warning.missing_volumes = missing;
    warning
}

/// Vendor queue metadata failed validation.
pub fn kai(details: &JobDetails, reason: &str) -> Warning {
    let message = format!(
        "Kai object validation failed for algorithm {} version {}.\nError: {reason}",
        details.algorithm_name,
        details.algorithm_version.as_deref().unwrap_or("unknown"),
    );
    let mut warning = base(details, WarningCode::Kai, message);
    warning.algorithm_version = details.algorithm_version.clone();
    warning.surpass_timeout = true;
    warning.is_error = true;
    warning
}

/// The cluster API rejected the job spec.
pub fn job_creation_failed(details: &JobDetails, message: &str, container_names: &[String]) -> Warning {
    let mut warning = base(
        details,
        WarningCode::JobCreationFailed,
        format_creation_error(message, container_names),
    );
    warning.algorithm_version = details.algorithm_version.clone();
    warning.surpass_timeout = true;
    warning.is_error = true;
    warning
}

pub fn unknown(details: &JobDetails, message: Option<&str>) -> Warning {
    let message = format!(
        "Unknown warning or error occured, message: {}",
        message.unwrap_or("Unknown")
    );
    info!(algorithm_name = %details.algorithm_name, %message, "unknown scheduling failure");
    base(details, WarningCode::Unknown, message)
}

/// Make a cluster validation error readable: name the job generically,
/// replace the container index in the invalid field path with the
/// container name, and drop quoting.
pub fn format_creation_error(message: &str, container_names: &[String]) -> String {
    let patterns = match PATTERNS.as_ref() {
        Ok(patterns) => patterns,
        Err(error) => {
            warn!(%error, "creation error patterns failed to compile, message left as is");
            return message.to_string();
        }
    };

    let message = patterns.job_prefix.replace(message, "Kubernetes Job").into_owned();
    let Some(full_path) = patterns
        .invalid_path
        .captures(&message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    else {
        return message;
    };

    let container_name = patterns
        .container_index
        .captures(&full_path)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .and_then(|i| container_names.get(i));
    let formatted_path = match container_name {
        Some(name) => patterns.container_path.replace(&full_path, name.as_str()).into_owned(),
        None => full_path.clone(),
    };

    let message = message.replacen(&full_path, &formatted_path, 1);
    patterns.quoted.replace_all(&message, "$1").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ResourceFlags;
    use taskexec_core::SelectorValue;

    fn details() -> JobDetails {
        JobDetails {
            algorithm_name: "green-alg".into(),
            algorithm_version: Some("v1".into()),
            ..Default::default()
        }
    }

    fn short_fit(name: &str, cpu_missing: f64, over_capacity: bool) -> NodeFit {
        NodeFit {
            node_name: name.into(),
            available: false,
            details: ResourceFlags { cpu: false, mem: true, gpu: true },
            max_capacity: ResourceFlags { cpu: over_capacity, mem: false, gpu: false },
            amounts_missing: BTreeMap::from([(ResourceKind::Cpu, cpu_missing)]),
        }
    }

    #[test]
    fn insufficient_counts_nodes_per_resource() {
        let fits = vec![short_fit("n1", 1.3, false), short_fit("n2", 2.0, false)];
        let warning = resources(&details(), &fits, 0, ResourceAmounts::new(10.1, 516.0, 0.0));
        assert_eq!(warning.code, WarningCode::Resources);
        assert_eq!(warning.message, "Insufficient cpu (2)");
        assert!(!warning.surpass_timeout);
        let descriptor = warning.complex_resource_descriptor.unwrap();
        assert_eq!(descriptor.nodes.len(), 2);
        assert_eq!(descriptor.nodes[0].amounts_missing[&ResourceKind::Cpu], 1.3);
    }

    #[test]
    fn max_capacity_on_every_node_is_persistent() {
        let fits = vec![short_fit("n1", 5.0, true)];
        let warning = resources(&details(), &fits, 0, ResourceAmounts::default());
        assert_eq!(warning.message, "Maximum capacity exceeded cpu (1)");
        assert!(warning.surpass_timeout);
    }

    #[test]
    fn selector_excluding_all_nodes() {
        let mut details = details();
        details.node_selector.insert("disk".into(), SelectorValue::from("ssd"));
        details
            .node_selector
            .insert("zone".into(), SelectorValue::AnyOf(vec!["a".into(), "b".into()]));
        let warning = resources(&details, &[], 3, ResourceAmounts::default());
        assert_eq!(
            warning.message,
            "No nodes available for scheduling due to selector condition - 'disk=ssd,zone=a,b'"
        );
        let descriptor = warning.complex_resource_descriptor.unwrap();
        assert_eq!(descriptor.num_unmatched_nodes_by_selector, 3);
        assert_eq!(descriptor.requested_selectors, vec!["disk=ssd", "zone=a,b"]);
    }

    #[test]
    fn invalid_volume_lists_missing() {
        let warning = invalid_volume(&details(), vec!["data-pvc".into(), "creds".into()]);
        assert_eq!(
            warning.message,
            "One or more volumes are missing or do not exist.\nMissing volumes: data-pvc, creds"
        );
        assert!(warning.is_error);
        assert_eq!(warning.missing_volumes.len(), 2);
    }

    #[test]
    fn kai_message_names_version() {
        let warning = kai(&details(), "queue is required");
        assert_eq!(
            warning.message,
            "Kai object validation failed for algorithm green-alg version v1.\nError: queue is required"
        );
        assert!(warning.surpass_timeout);
    }

    #[test]
    fn creation_error_is_reformatted() {
        let raw = r#"Job.batch "green-alg-abcde" is invalid: spec.template.spec.containers[1].resources.requests: Invalid value: "2": must be less than or equal to cpu limit"#;
        let names = vec!["worker".to_string(), "algorunner".to_string()];
        assert_eq!(
            format_creation_error(raw, &names),
            "Kubernetes Job is invalid: algorunner.resources.requests: Invalid value: 2: must be less than or equal to cpu limit"
        );
    }

    #[test]
    fn creation_error_patterns_compile() {
        for pattern in [JOB_PREFIX, INVALID_PATH, CONTAINER_INDEX, CONTAINER_PATH, QUOTED] {
            assert!(Regex::new(pattern).is_ok(), "{pattern}");
        }
        assert!(PATTERNS.is_ok());
    }

    #[test]
    fn creation_error_without_path_only_renames_job() {
        let raw = r#"Job.batch "green-alg-abcde" already exists"#;
        assert_eq!(format_creation_error(raw, &[]), "Kubernetes Job already exists");
    }

    #[test]
    fn unknown_warning_default_message() {
        let warning = unknown(&details(), None);
        assert_eq!(warning.code, WarningCode::Unknown);
        assert_eq!(warning.message, "Unknown warning or error occured, message: Unknown");
    }
}
