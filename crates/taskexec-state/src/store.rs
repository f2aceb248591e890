//! StateStore — redb-backed discovery store.
//!
//! Holds what the reconciler reads each tick (templates, workers, the
//! request stream, versions and registry) and what it writes back (worker
//! commands and reconcile reports). All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use taskexec_core::raw::{RawRequestBatch, RawWorker};
use taskexec_core::{
    AlgorithmTemplate, Discovery, DiscoveryResult, ReconcileReport, Registry, TemplateStore, Versions, WorkerCommand,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::SeedData;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Number of reconcile reports kept.
pub const REPORT_HISTORY: usize = 100;

/// Thread-safe discovery store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(TEMPLATES).map_err(map_err!(Table))?;
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.open_table(COMMANDS).map_err(map_err!(Table))?;
        txn.open_table(REPORTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic record access ──────────────────────────────────────

    fn put<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Every `(key, value)` pair whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(
        &self,
        def: JsonTable,
        prefix: &str,
    ) -> StateResult<Vec<(String, T)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push((key.value().to_string(), record));
            }
        }
        Ok(results)
    }

    fn remove(&self, def: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Templates ──────────────────────────────────────────────────

    /// Insert or replace an algorithm template.
    pub fn put_template(&self, template: &AlgorithmTemplate) -> StateResult<()> {
        self.put(TEMPLATES, &template.name, template)?;
        debug!(algorithm_name = %template.name, "template stored");
        Ok(())
    }

    pub fn get_template(&self, name: &str) -> StateResult<Option<AlgorithmTemplate>> {
        self.get(TEMPLATES, name)
    }

    pub fn list_templates(&self) -> StateResult<TemplateStore> {
        Ok(self.scan::<AlgorithmTemplate>(TEMPLATES, "")?.into_iter().collect())
    }

    /// Delete a template. Returns true if it existed.
    pub fn delete_template(&self, name: &str) -> StateResult<bool> {
        self.remove(TEMPLATES, name)
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Register or update a worker under its registry path.
    pub fn put_worker(&self, path: &str, worker: &RawWorker) -> StateResult<()> {
        self.put(WORKERS, path, worker)
    }

    pub fn list_workers(&self) -> StateResult<BTreeMap<String, RawWorker>> {
        Ok(self.scan(WORKERS, "")?.into_iter().collect())
    }

    /// Unregister a worker. Returns true if it existed.
    pub fn delete_worker(&self, path: &str) -> StateResult<bool> {
        self.remove(WORKERS, path)
    }

    // ── Requests, versions, registry ───────────────────────────────

    /// Replace the whole upstream request stream.
    pub fn set_requests(&self, requests: &[RawRequestBatch]) -> StateResult<()> {
        self.put(META, META_REQUESTS, &requests)
    }

    pub fn get_requests(&self) -> StateResult<Vec<RawRequestBatch>> {
        Ok(self.get(META, META_REQUESTS)?.unwrap_or_default())
    }

    pub fn set_versions(&self, versions: &Versions) -> StateResult<()> {
        self.put(META, META_VERSIONS, versions)
    }

    pub fn get_versions(&self) -> StateResult<Option<Versions>> {
        self.get(META, META_VERSIONS)
    }

    pub fn set_registry(&self, registry: &Registry) -> StateResult<()> {
        self.put(META, META_REGISTRY, registry)
    }

    pub fn get_registry(&self) -> StateResult<Option<Registry>> {
        self.get(META, META_REGISTRY)
    }

    // ── Commands ───────────────────────────────────────────────────

    /// Queue a command for a worker. The sequence counter is bumped in the
    /// same transaction, so keys stay ordered across reopen.
    pub fn push_command(&self, command: &WorkerCommand) -> StateResult<String> {
        let value = serde_json::to_vec(command).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let key;
        {
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let seq = meta
                .get(META_COMMAND_SEQ)
                .map_err(map_err!(Read))?
                .map(|guard| serde_json::from_slice::<u64>(guard.value()))
                .transpose()
                .map_err(map_err!(Deserialize))?
                .unwrap_or(0)
                + 1;
            let seq_bytes = serde_json::to_vec(&seq).map_err(map_err!(Serialize))?;
            meta.insert(META_COMMAND_SEQ, seq_bytes.as_slice())
                .map_err(map_err!(Write))?;

            key = format!("{}:{seq:012}", command.worker_id);
            let mut commands = txn.open_table(COMMANDS).map_err(map_err!(Table))?;
            commands
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, command = ?command.command, "worker command queued");
        Ok(key)
    }

    /// Commands queued for one worker, oldest first.
    pub fn commands_for(&self, worker_id: &str) -> StateResult<Vec<WorkerCommand>> {
        let prefix = format!("{worker_id}:");
        Ok(self.scan(COMMANDS, &prefix)?.into_iter().map(|(_, c)| c).collect())
    }

    /// Every queued command, grouped by worker.
    pub fn list_commands(&self) -> StateResult<Vec<WorkerCommand>> {
        Ok(self.scan(COMMANDS, "")?.into_iter().map(|(_, c)| c).collect())
    }

    /// Remove and return the commands queued for one worker.
    pub fn take_commands(&self, worker_id: &str) -> StateResult<Vec<WorkerCommand>> {
        let prefix = format!("{worker_id}:");
        let entries: Vec<(String, WorkerCommand)> = self.scan(COMMANDS, &prefix)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(COMMANDS).map_err(map_err!(Table))?;
            for (key, _) in &entries {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(entries.into_iter().map(|(_, c)| c).collect())
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Store a reconcile report, keeping the newest [`REPORT_HISTORY`].
    pub fn put_report(&self, report: &ReconcileReport) -> StateResult<()> {
        let key = format!("{:020}", report.timestamp);
        let value = serde_json::to_vec(report).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REPORTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let keys: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| entry.ok().map(|(k, _)| k.value().to_string()))
                .collect();
            let excess = keys.len().saturating_sub(REPORT_HISTORY);
            for old in keys.iter().take(excess) {
                table.remove(old.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn latest_report(&self) -> StateResult<Option<ReconcileReport>> {
        Ok(self.scan::<ReconcileReport>(REPORTS, "")?.pop().map(|(_, r)| r))
    }

    pub fn list_reports(&self) -> StateResult<Vec<ReconcileReport>> {
        Ok(self.scan(REPORTS, "")?.into_iter().map(|(_, r)| r).collect())
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Load seed data, replacing templates, workers and the request stream.
    pub fn import(&self, seed: &SeedData) -> StateResult<()> {
        for path in self.list_workers()?.keys() {
            self.delete_worker(path)?;
        }
        for template in seed.templates.values() {
            self.put_template(template)?;
        }
        for (path, worker) in &seed.workers {
            self.put_worker(path, worker)?;
        }
        self.set_requests(&seed.requests)?;
        if let Some(versions) = &seed.versions {
            self.set_versions(versions)?;
        }
        if let Some(registry) = &seed.registry {
            self.set_registry(registry)?;
        }
        debug!(
            templates = seed.templates.len(),
            workers = seed.workers.len(),
            "seed data imported"
        );
        Ok(())
    }

    /// Read a JSON seed file and import it.
    pub fn import_file(&self, path: &Path) -> StateResult<SeedData> {
        let text = std::fs::read_to_string(path).map_err(map_err!(Seed))?;
        let seed = SeedData::from_json(&text).map_err(map_err!(Deserialize))?;
        self.import(&seed)?;
        Ok(seed)
    }
}

#[async_trait]
impl Discovery for StateStore {
    async fn algorithm_requests(&self) -> DiscoveryResult<Vec<RawRequestBatch>> {
        Ok(self.get_requests()?)
    }

    async fn workers(&self) -> DiscoveryResult<BTreeMap<String, RawWorker>> {
        Ok(self.list_workers()?)
    }

    async fn templates(&self) -> DiscoveryResult<TemplateStore> {
        Ok(self.list_templates()?)
    }

    async fn versions(&self) -> DiscoveryResult<Option<Versions>> {
        Ok(self.get_versions()?)
    }

    async fn registry(&self) -> DiscoveryResult<Option<Registry>> {
        Ok(self.get_registry()?)
    }

    async fn send_command(&self, command: &WorkerCommand) -> DiscoveryResult<()> {
        self.push_command(command)?;
        Ok(())
    }

    async fn write_report(&self, report: &ReconcileReport) -> DiscoveryResult<()> {
        Ok(self.put_report(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskexec_core::raw::RawRequestEntry;
    use taskexec_core::{AlgorithmReport, ProjectVersion, WorkerCommandKind};

    use crate::types::worker_key;

    fn make_template(name: &str) -> AlgorithmTemplate {
        AlgorithmTemplate {
            name: name.to_string(),
            algorithm_image: format!("hkube/{name}"),
            cpu: Some(0.5),
            max_workers: Some(4),
            ..Default::default()
        }
    }

    fn worker(alg: &str, status: &str) -> RawWorker {
        RawWorker {
            algorithm_name: alg.to_string(),
            worker_status: Some(status.to_string()),
            pod_name: Some(format!("{alg}-abcde-xyz12")),
            ..Default::default()
        }
    }

    fn command(worker_id: &str, kind: WorkerCommandKind) -> WorkerCommand {
        WorkerCommand {
            worker_id: worker_id.to_string(),
            algorithm_name: "green-alg".to_string(),
            pod_name: None,
            command: kind,
            message: None,
        }
    }

    // ── Templates ──────────────────────────────────────────────────

    #[test]
    fn template_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let template = make_template("green-alg");

        store.put_template(&template).unwrap();
        assert_eq!(store.get_template("green-alg").unwrap(), Some(template));
        assert!(store.get_template("nope").unwrap().is_none());
    }

    #[test]
    fn template_list_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_template(&make_template("a")).unwrap();
        store.put_template(&make_template("b")).unwrap();

        let all = store.list_templates().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(store.delete_template("a").unwrap());
        assert!(!store.delete_template("a").unwrap());
        assert_eq!(store.list_templates().unwrap().len(), 1);
    }

    // ── Workers ────────────────────────────────────────────────────

    #[test]
    fn workers_keyed_by_path() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_worker(&worker_key("w1"), &worker("green-alg", "ready")).unwrap();
        store.put_worker(&worker_key("w2"), &worker("green-alg", "working")).unwrap();

        let workers = store.list_workers().unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers["/workers/w2"].worker_status.as_deref(), Some("working"));

        assert!(store.delete_worker("/workers/w1").unwrap());
        assert_eq!(store.list_workers().unwrap().len(), 1);
    }

    // ── Meta ───────────────────────────────────────────────────────

    #[test]
    fn requests_default_to_empty() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_requests().unwrap().is_empty());

        let stream = vec![RawRequestBatch {
            data: vec![RawRequestEntry { name: "green-alg".into() }, RawRequestEntry { name: "blue-alg".into() }],
        }];
        store.set_requests(&stream).unwrap();
        assert_eq!(store.get_requests().unwrap(), stream);
    }

    #[test]
    fn versions_and_registry() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_versions().unwrap().is_none());
        assert!(store.get_registry().unwrap().is_none());

        let versions = Versions {
            versions: vec![ProjectVersion { project: "worker".into(), tag: Some("v2.1.0".into()) }],
        };
        store.set_versions(&versions).unwrap();
        store.set_registry(&Registry { registry: "cloud.local:5000".into() }).unwrap();

        assert_eq!(store.get_versions().unwrap(), Some(versions));
        assert_eq!(store.get_registry().unwrap().unwrap().registry, "cloud.local:5000");
    }

    // ── Commands ───────────────────────────────────────────────────

    #[test]
    fn commands_queue_in_order_per_worker() {
        let store = StateStore::open_in_memory().unwrap();
        store.push_command(&command("w1", WorkerCommandKind::WarmUp)).unwrap();
        store.push_command(&command("w2", WorkerCommandKind::Exit)).unwrap();
        store.push_command(&command("w1", WorkerCommandKind::StopProcessing)).unwrap();

        let w1: Vec<_> = store.commands_for("w1").unwrap().into_iter().map(|c| c.command).collect();
        assert_eq!(w1, vec![WorkerCommandKind::WarmUp, WorkerCommandKind::StopProcessing]);
        assert_eq!(store.list_commands().unwrap().len(), 3);

        let taken = store.take_commands("w1").unwrap();
        assert_eq!(taken.len(), 2);
        assert!(store.commands_for("w1").unwrap().is_empty());
        assert_eq!(store.commands_for("w2").unwrap().len(), 1);
    }

    // ── Reports ────────────────────────────────────────────────────

    #[test]
    fn reports_keep_bounded_history() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.latest_report().unwrap().is_none());

        for ts in 0..(REPORT_HISTORY as u64 + 5) {
            let mut report = ReconcileReport {
                timestamp: 1_000 + ts,
                ..Default::default()
            };
            report
                .algorithms
                .insert("green-alg".into(), AlgorithmReport { required: ts as usize, ..Default::default() });
            store.put_report(&report).unwrap();
        }

        assert_eq!(store.list_reports().unwrap().len(), REPORT_HISTORY);
        let latest = store.latest_report().unwrap().unwrap();
        assert_eq!(latest.timestamp, 1_000 + REPORT_HISTORY as u64 + 4);
    }

    // ── Import ─────────────────────────────────────────────────────

    #[test]
    fn import_replaces_workers() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_worker(&worker_key("stale"), &worker("old-alg", "ready")).unwrap();

        let seed = SeedData::from_json(
            r#"{
                "templates": { "green-alg": { "name": "green-alg", "algorithmImage": "hkube/green-alg" } },
                "workers": { "/workers/w1": { "algorithmName": "green-alg", "workerStatus": "ready" } },
                "requests": [ { "data": [ { "name": "green-alg" } ] } ]
            }"#,
        )
        .unwrap();
        store.import(&seed).unwrap();

        let workers = store.list_workers().unwrap();
        assert_eq!(workers.keys().collect::<Vec<_>>(), vec!["/workers/w1"]);
        assert_eq!(store.list_templates().unwrap().len(), 1);
        assert_eq!(store.get_requests().unwrap()[0].data[0].name, "green-alg");
    }

    // ── Discovery ──────────────────────────────────────────────────

    #[tokio::test]
    async fn serves_discovery_reads_and_writes() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_template(&make_template("green-alg")).unwrap();
        store.put_worker(&worker_key("w1"), &worker("green-alg", "ready")).unwrap();

        let discovery: &dyn Discovery = &store;
        assert_eq!(discovery.templates().await.unwrap().len(), 1);
        assert_eq!(discovery.workers().await.unwrap().len(), 1);
        assert!(discovery.algorithm_requests().await.unwrap().is_empty());

        discovery.send_command(&command("w1", WorkerCommandKind::CoolDown)).await.unwrap();
        assert_eq!(store.commands_for("w1").unwrap()[0].command, WorkerCommandKind::CoolDown);

        discovery
            .write_report(&ReconcileReport { timestamp: 42, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(store.latest_report().unwrap().unwrap().timestamp, 42);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_template(&make_template("green-alg")).unwrap();
            store.push_command(&command("w1", WorkerCommandKind::Exit)).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_template("green-alg").unwrap().is_some());
        store.push_command(&command("w1", WorkerCommandKind::WarmUp)).unwrap();
        let kinds: Vec<_> = store.commands_for("w1").unwrap().into_iter().map(|c| c.command).collect();
        assert_eq!(kinds, vec![WorkerCommandKind::Exit, WorkerCommandKind::WarmUp]);
    }

    #[test]
    fn import_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, r#"{ "registry": { "registry": "cloud.local:5000" } }"#).unwrap();

        let store = StateStore::open_in_memory().unwrap();
        store.import_file(&path).unwrap();
        assert_eq!(store.get_registry().unwrap().unwrap().registry, "cloud.local:5000");

        assert!(matches!(
            store.import_file(&dir.path().join("missing.json")),
            Err(StateError::Seed(_))
        ));
    }
}
