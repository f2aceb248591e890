//! Seed data loaded into the store by the daemon's `import` command.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use taskexec_core::raw::{RawRequestBatch, RawWorker};
use taskexec_core::{Registry, TemplateStore, Versions};

/// Full contents of a discovery store, as read from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub templates: TemplateStore,
    /// Registered workers keyed by registry path.
    pub workers: BTreeMap<String, RawWorker>,
    pub requests: Vec<RawRequestBatch>,
    pub versions: Option<Versions>,
    pub registry: Option<Registry>,
}

impl SeedData {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Registry path of a worker id.
pub fn worker_key(worker_id: &str) -> String {
    format!("/workers/{worker_id}")
}
