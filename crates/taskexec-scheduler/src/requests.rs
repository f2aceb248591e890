//! Request shaping: max-worker caps, quota guarantees, batch windowing and
//! proportional cutting.
//!
//! The only state carried between ticks is the smoothed capacity estimate,
//! which sizes the batch window and the per-algorithm shares.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use taskexec_core::config::CapacityConfig;
use taskexec_core::{AlgorithmRequest, RequestType, TemplateStore, Worker};

use crate::normalize::normalize_hot_requests;
use crate::workers::WorkerCategories;

#[derive(Debug, Clone)]
pub struct RequestsManager {
    capacity: f64,
    config: CapacityConfig,
}

impl RequestsManager {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            capacity: config.initial.clamp(config.min, config.max),
            config,
        }
    }

    /// Current smoothed capacity estimate.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Fold the observed number of running batch workers into the estimate.
    pub fn update_capacity(&mut self, algorithm_count: usize) {
        let smoothing = self.config.smoothing;
        let next = self.capacity * smoothing + algorithm_count as f64 * (1.0 - smoothing);
        self.capacity = next.clamp(self.config.min, self.config.max);
    }

    /// Produce this tick's ordered request list: requisites, then stateful and
    /// stateless streaming, then the windowed and cut batch requests.
    ///
    /// `workers` are the registered workers merged with their jobs; together
    /// with the pending jobs in `categories` they count toward `max_workers`.
    pub fn prepare(
        &self,
        requests: Vec<AlgorithmRequest>,
        templates: &TemplateStore,
        workers: &[Worker],
        categories: &WorkerCategories,
    ) -> Vec<AlgorithmRequest> {
        let (requests, mut headroom) = filter_by_max_workers(requests, templates, workers, categories);

        let (batch, streaming) = split_by_type(requests);
        let running = categories.running_per_algorithm();
        let (batch_requisites, batch) = extract_requisites(batch, templates, &running);
        let (streaming_requisites, streaming) = extract_requisites(streaming, templates, &running);

        // Requisites of all algorithms together stay within the capacity;
        // whatever does not fit goes back to the normal stream.
        let budget = self.capacity.round().max(1.0) as usize;
        let mut allocator = RequisiteAllocator::new(streaming_requisites, budget);
        let mut requisites: Vec<AlgorithmRequest> = allocator.by_ref().collect();
        let streaming: Vec<AlgorithmRequest> = allocator.into_remaining().into_iter().chain(streaming).collect();

        let mut allocator = RequisiteAllocator::new(batch_requisites, budget.saturating_sub(requisites.len()));
        requisites.extend(allocator.by_ref());
        let batch: Vec<AlgorithmRequest> = allocator.into_remaining().into_iter().chain(batch).collect();

        let streaming = normalize_hot_requests(streaming, templates, &mut headroom, |t| !t.is_batch());
        let batch = self.handle_batch(batch, templates, &mut headroom);

        let (stateful, stateless): (Vec<_>, Vec<_>) = streaming
            .into_iter()
            .partition(|r| r.request_type == RequestType::Stateful);

        debug!(
            requisite = requisites.len(),
            stateful = stateful.len(),
            stateless = stateless.len(),
            batch = batch.len(),
            capacity = self.capacity,
            "prepared requests"
        );
        requisites
            .into_iter()
            .chain(stateful)
            .chain(stateless)
            .chain(batch)
            .collect()
    }

    fn handle_batch(
        &self,
        requests: Vec<AlgorithmRequest>,
        templates: &TemplateStore,
        headroom: &mut BTreeMap<String, usize>,
    ) -> Vec<AlgorithmRequest> {
        let window = (self.capacity * self.config.window_factor).round() as usize;
        let total = requests.len();
        let mut requests = requests;
        requests.truncate(window);
        if total > requests.len() {
            debug!(removed = total - requests.len(), window, "batch window applied");
        }

        let before_hot = requests.len();
        let requests = normalize_hot_requests(requests, templates, headroom, |t| t.is_batch());
        if requests.len() > before_hot {
            debug!(added = requests.len() - before_hot, "hot batch requests added");
        }

        limit_by_capacity(requests, self.capacity)
    }
}

/// Drop requests for algorithms at `max_workers`, counting existing workers
/// first and then every accepted request.
///
/// Also returns the slots still free under the cap of every capped algorithm.
fn filter_by_max_workers(
    requests: Vec<AlgorithmRequest>,
    templates: &TemplateStore,
    workers: &[Worker],
    categories: &WorkerCategories,
) -> (Vec<AlgorithmRequest>, BTreeMap<String, usize>) {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    let existing = workers
        .iter()
        .map(|w| &w.algorithm_name)
        .chain(categories.pending.iter().map(|j| &j.algorithm_name));
    for algorithm in existing {
        *counts.entry(algorithm.clone()).or_default() += 1;
    }

    let total = requests.len();
    let filtered: Vec<AlgorithmRequest> = requests
        .into_iter()
        .filter(|request| {
            let Some(max) = templates.get(&request.algorithm_name).and_then(|t| t.max_workers) else {
                return true;
            };
            if max == 0 {
                return true;
            }
            let count = counts.entry(request.algorithm_name.clone()).or_default();
            if *count < max {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect();
    if total > filtered.len() {
        debug!(removed = total - filtered.len(), "requests over max workers dropped");
    }

    let headroom = templates
        .values()
        .filter_map(|t| {
            let max = t.max_workers.filter(|max| *max > 0)?;
            let used = counts.get(&t.name).copied().unwrap_or(0);
            Some((t.name.clone(), max.saturating_sub(used) as usize))
        })
        .collect();
    (filtered, headroom)
}

/// Split into batch and streaming, stateful ahead of stateless.
fn split_by_type(requests: Vec<AlgorithmRequest>) -> (Vec<AlgorithmRequest>, Vec<AlgorithmRequest>) {
    let (streaming, batch): (Vec<_>, Vec<_>) = requests.into_iter().partition(|r| r.request_type.is_streaming());
    let (mut stateful, stateless): (Vec<_>, Vec<_>) = streaming
        .into_iter()
        .partition(|r| r.request_type == RequestType::Stateful);
    stateful.extend(stateless);
    (batch, stateful)
}

/// Pull out up to `quota_guarantee - running` requests of every guaranteed
/// algorithm, grouped per algorithm in order of first appearance.
fn extract_requisites(
    requests: Vec<AlgorithmRequest>,
    templates: &TemplateStore,
    running: &BTreeMap<String, usize>,
) -> (Vec<(String, VecDeque<AlgorithmRequest>)>, Vec<AlgorithmRequest>) {
    let mut missing: BTreeMap<String, usize> = BTreeMap::new();
    let mut groups: Vec<(String, VecDeque<AlgorithmRequest>)> = Vec::new();
    let mut rest = Vec::with_capacity(requests.len());

    for mut request in requests {
        let name = request.algorithm_name.clone();
        let left = missing.entry(name.clone()).or_insert_with(|| {
            let quota = templates.get(&name).and_then(|t| t.quota_guarantee).unwrap_or(0) as usize;
            quota.saturating_sub(running.get(&name).copied().unwrap_or(0))
        });
        if *left == 0 {
            rest.push(request);
            continue;
        }
        *left -= 1;
        request.is_requisite = true;
        match groups.iter_mut().find(|(alg, _)| *alg == name) {
            Some((_, group)) => group.push_back(request),
            None => groups.push((name, VecDeque::from([request]))),
        }
    }

    let total: usize = groups.iter().map(|(_, g)| g.len()).sum();
    if total > 0 {
        debug!(requisite = total, algorithms = groups.len(), "requisite requests extracted");
    }
    (groups, rest)
}

/// Interleaves the requisite requests of several algorithms within a budget.
///
/// Each round hands every algorithm a share of the budget left in proportion
/// to its outstanding need, rounded, and at least one while the budget
/// allows. Algorithms with the most outstanding need go first within a
/// round. Allocation stops once the whole budget is handed out; the requests
/// it did not reach are returned by [`RequisiteAllocator::into_remaining`].
pub struct RequisiteAllocator {
    groups: Vec<(String, VecDeque<AlgorithmRequest>)>,
    remaining: usize,
    round: VecDeque<AlgorithmRequest>,
}

impl RequisiteAllocator {
    pub fn new(groups: Vec<(String, VecDeque<AlgorithmRequest>)>, budget: usize) -> Self {
        Self {
            groups,
            remaining: budget,
            round: VecDeque::new(),
        }
    }

    /// Requests left unallocated, no longer marked requisite.
    pub fn into_remaining(self) -> Vec<AlgorithmRequest> {
        self.round
            .into_iter()
            .chain(self.groups.into_iter().flat_map(|(_, group)| group))
            .map(|mut request| {
                request.is_requisite = false;
                request
            })
            .collect()
    }

    fn next_round(&mut self) {
        let outstanding: usize = self.groups.iter().map(|(_, g)| g.len()).sum();
        if outstanding == 0 || self.remaining == 0 {
            return;
        }
        let budget = outstanding.min(self.remaining);
        self.groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        let mut allotments: Vec<usize> = self
            .groups
            .iter()
            .map(|(_, group)| {
                let need = group.len();
                if need == 0 {
                    return 0;
                }
                let share = (need as f64 / outstanding as f64 * budget as f64).round() as usize;
                share.clamp(1, need)
            })
            .collect();
        fit_to_budget(&mut allotments, budget);

        for ((_, group), allotment) in self.groups.iter_mut().zip(&allotments) {
            self.round.extend(group.drain(..*allotment));
        }
        self.remaining -= allotments.iter().sum::<usize>();
    }
}

/// Shrink `allotments` until they sum to at most `budget`: the largest
/// shares give up one each first, then the smallest needs drop out.
fn fit_to_budget(allotments: &mut [usize], budget: usize) {
    let mut total: usize = allotments.iter().sum();
    while total > budget {
        let largest = allotments
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 1)
            .max_by_key(|(_, a)| **a)
            .map(|(i, _)| i);
        let index = match largest {
            Some(index) => index,
            None => match allotments.iter().rposition(|a| *a > 0) {
                Some(index) => index,
                None => return,
            },
        };
        allotments[index] -= 1;
        total -= 1;
    }
}

impl Iterator for RequisiteAllocator {
    type Item = AlgorithmRequest;

    fn next(&mut self) -> Option<AlgorithmRequest> {
        if self.round.is_empty() {
            self.next_round();
        }
        self.round.pop_front()
    }
}

/// Keep each algorithm's requests while its tally is below its share of
/// `capacity`, shares being proportional to request counts.
fn limit_by_capacity(requests: Vec<AlgorithmRequest>, capacity: f64) -> Vec<AlgorithmRequest> {
    let total = requests.len();
    if total == 0 {
        return requests;
    }
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for request in &requests {
        *counts.entry(request.algorithm_name.clone()).or_default() += 1;
    }
    let shares: BTreeMap<String, f64> = counts
        .into_iter()
        .map(|(alg, count)| (alg, count as f64 / total as f64 * capacity))
        .collect();

    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    let limited: Vec<AlgorithmRequest> = requests
        .into_iter()
        .filter(|request| {
            let share = shares.get(&request.algorithm_name).copied().unwrap_or(0.0);
            let taken = tally.entry(request.algorithm_name.clone()).or_default();
            if (*taken as f64) < share {
                *taken += 1;
                true
            } else {
                false
            }
        })
        .collect();
    if total > limited.len() {
        debug!(removed = total - limited.len(), capacity, "batch requests cut to capacity");
    }
    limited
}
