//! Admission engine: decides which new jobs fit in this tick.
//!
//! Admissions are simulated against a working copy of the cluster view;
//! the snapshot passed in is never mutated.

use tracing::debug;

use taskexec_core::{
    ClusterInventory, ClusterResources, JobDetails, KaiObject, PressureRatios, ResourceAmounts, Warning, WarningCode,
};

use crate::fit::{NodeFit, find_node_for_schedule, node_selector_filter};
use crate::warning;

/// Admission decision for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub should_add: bool,
    /// Node the job was admitted onto.
    pub node: Option<String>,
    pub warning: Option<Warning>,
}

impl Admission {
    fn admitted(node: String) -> Self {
        Self {
            should_add: true,
            node: Some(node),
            warning: None,
        }
    }

    fn refused(warning: Option<Warning>) -> Self {
        Self {
            should_add: false,
            node: None,
            warning,
        }
    }
}

/// A bucket of identical jobs waiting to be admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDetails {
    pub number_of_new_jobs: usize,
    pub job_details: JobDetails,
}

/// Group job details into buckets keyed by algorithm, hot flag and requisite
/// flag, in order of first appearance.
pub fn group_create_details(details: Vec<JobDetails>) -> Vec<CreateDetails> {
    let mut buckets: Vec<CreateDetails> = Vec::new();
    for job in details {
        let existing = buckets.iter_mut().find(|b| {
            b.job_details.algorithm_name == job.algorithm_name
                && b.job_details.hot_worker == job.hot_worker
                && b.job_details.is_requisite == job.is_requisite
        });
        match existing {
            Some(bucket) => bucket.number_of_new_jobs += 1,
            None => buckets.push(CreateDetails {
                number_of_new_jobs: 1,
                job_details: job,
            }),
        }
    }
    buckets
}

/// A job that could not be admitted, with the reason when there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedJob {
    pub details: JobDetails,
    /// `None` when refused by the per-tick cap only.
    pub warning: Option<Warning>,
}

impl SkippedJob {
    pub fn code(&self) -> Option<WarningCode> {
        self.warning.as_ref().map(|w| w.code)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    /// Admitted jobs, each with its chosen node set.
    pub jobs_to_request: Vec<JobDetails>,
    pub skipped: Vec<SkippedJob>,
}

#[derive(Debug, Clone)]
pub struct ResourceMatcher {
    pressure: PressureRatios,
    max_jobs_per_tick: usize,
}

impl ResourceMatcher {
    pub fn new(pressure: PressureRatios, max_jobs_per_tick: usize) -> Self {
        Self {
            pressure,
            max_jobs_per_tick,
        }
    }

    pub fn pressure(&self) -> &PressureRatios {
        &self.pressure
    }

    /// Decide whether one job can be admitted and, if so, take its resources
    /// from the chosen node in `resources`.
    ///
    /// Checks run in order: per-tick cap, referenced volumes, vendor queue,
    /// then node fit (selector filter followed by first fit).
    pub fn should_add_job(
        &self,
        details: &JobDetails,
        resources: &mut ClusterResources,
        admitted_this_tick: usize,
        inventory: &ClusterInventory,
    ) -> Admission {
        if admitted_this_tick >= self.max_jobs_per_tick {
            return Admission::refused(None);
        }

        // A missing volume never resolves by waiting, so it is reported
        // ahead of any resource shortfall.
        let missing: Vec<String> = details
            .referenced_volumes()
            .into_iter()
            .filter(|v| !v.exists_in(inventory))
            .map(|v| v.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Admission::refused(Some(warning::invalid_volume(details, missing)));
        }

        if let Some(kai) = &details.kai_object {
            if let Err(reason) = validate_kai(kai, inventory) {
                return Admission::refused(Some(warning::kai(details, &reason)));
            }
        }

        let requested = details.total_requested();
        let mut unmatched = 0;
        let mut fits: Vec<NodeFit> = Vec::new();
        for node in &resources.node_list {
            if node_selector_filter(&node.labels, &details.node_selector) {
                fits.push(find_node_for_schedule(node, &requested, Some(&self.pressure)));
            } else {
                unmatched += 1;
            }
        }

        match fits.iter().find(|f| f.available) {
            Some(fit) => {
                let node = fit.node_name.clone();
                resources.allocate(&node, requested);
                Admission::admitted(node)
            }
            None => Admission::refused(Some(warning::resources(details, &fits, unmatched, requested))),
        }
    }

    /// Admit as many jobs as fit, interleaving buckets round robin so that no
    /// algorithm is exhausted before the next one gets a turn.
    ///
    /// Requisite buckets are swept to completion before the others.
    /// `already_scheduled` are jobs admitted in earlier ticks whose pods are
    /// not yet visible; their resources are reserved first.
    pub fn match_jobs_to_resources(
        &self,
        create_details: &[CreateDetails],
        resources: &ClusterResources,
        already_scheduled: &[JobDetails],
        inventory: &ClusterInventory,
    ) -> MatchOutcome {
        let mut working = resources.clone();
        for job in already_scheduled {
            if let Some(node) = job.node.as_deref() {
                working.allocate(node, job.total_requested());
            }
        }

        let mut outcome = MatchOutcome::default();
        let mut admitted = 0;
        let (requisite, normal): (Vec<_>, Vec<_>) = create_details.iter().partition(|c| c.job_details.is_requisite);
        for phase in [requisite, normal] {
            let mut remaining: Vec<usize> = phase.iter().map(|c| c.number_of_new_jobs).collect();
            loop {
                let mut attempted = 0;
                for (bucket, left) in phase.iter().zip(remaining.iter_mut()) {
                    if *left == 0 {
                        continue;
                    }
                    *left -= 1;
                    attempted += 1;
                    let admission = self.should_add_job(&bucket.job_details, &mut working, admitted, inventory);
                    if admission.should_add {
                        admitted += 1;
                        let mut job = bucket.job_details.clone();
                        job.node = admission.node;
                        outcome.jobs_to_request.push(job);
                    } else {
                        outcome.skipped.push(SkippedJob {
                            details: bucket.job_details.clone(),
                            warning: admission.warning,
                        });
                    }
                }
                if attempted == 0 {
                    break;
                }
            }
        }

        debug!(
            admitted = outcome.jobs_to_request.len(),
            skipped = outcome.skipped.len(),
            "matched jobs to resources"
        );
        outcome
    }
}

fn validate_kai(kai: &KaiObject, inventory: &ClusterInventory) -> Result<(), String> {
    let queue = kai.queue.as_deref().map(str::trim).unwrap_or_default();
    if queue.is_empty() {
        return Err("queue is required".to_string());
    }
    if !inventory.queues.contains(queue) {
        return Err(format!("queue {queue} does not exist"));
    }
    Ok(())
}

/// Sum of what a list of admitted jobs requests.
pub fn total_of(jobs: &[JobDetails]) -> ResourceAmounts {
    jobs.iter().fold(ResourceAmounts::default(), |acc, j| acc + j.total_requested())
}
