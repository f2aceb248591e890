//! Daemon commands: assemble the store, the snapshot cluster and the
//! reconciler, then drive them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use taskexec_core::ExecutorConfig;
use taskexec_scheduler::{Reconciler, ReconcilerContext};
use taskexec_state::StateStore;

use crate::snapshot::SnapshotCluster;

const STORE_FILE: &str = "taskexec.redb";

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ExecutorConfig> {
    let config = match path {
        Some(path) => {
            let config = ExecutorConfig::from_file(path)?;
            info!(path = %path.display(), "configuration loaded");
            config
        }
        None => ExecutorConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn open_store(data_dir: &Path) -> anyhow::Result<Arc<StateStore>> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(STORE_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(Arc::new(store))
}

fn build_reconciler(config: ExecutorConfig, data_dir: &Path, snapshot: &Path) -> anyhow::Result<Reconciler> {
    let store = open_store(data_dir)?;
    let cluster = Arc::new(SnapshotCluster::load(snapshot)?);
    Ok(Reconciler::new(ReconcilerContext {
        config,
        cluster,
        discovery: store,
    }))
}

/// Tick until Ctrl-C.
pub async fn run(config: ExecutorConfig, data_dir: PathBuf, snapshot: PathBuf) -> anyhow::Result<()> {
    info!("task executor starting");
    let interval = Duration::from_millis(config.reconcile.interval_ms);
    let reconciler = Arc::new(build_reconciler(config, &data_dir, &snapshot)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.run(interval, shutdown_rx).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    loop_handle.await?;

    let capacity = reconciler.capacity().await;
    info!(capacity, "task executor stopped");
    Ok(())
}

/// Run one tick and print the report on stdout.
pub async fn run_once(config: ExecutorConfig, data_dir: PathBuf, snapshot: PathBuf) -> anyhow::Result<()> {
    let reconciler = build_reconciler(config, &data_dir, &snapshot)?;
    let Some(outcome) = reconciler.tick().await? else {
        anyhow::bail!("tick skipped");
    };
    for error in &outcome.errors {
        warn!(%error, "tick error");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    Ok(())
}

pub fn import(data_dir: PathBuf, file: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&data_dir)?;
    let seed = store.import_file(&file)?;
    info!(
        file = %file.display(),
        templates = seed.templates.len(),
        workers = seed.workers.len(),
        requests = seed.requests.iter().map(|b| b.data.len()).sum::<usize>(),
        "seed imported"
    );
    Ok(())
}

pub fn print_report(data_dir: PathBuf) -> anyhow::Result<()> {
    let store = open_store(&data_dir)?;
    match store.latest_report()? {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => warn!("no report stored yet"),
    }
    Ok(())
}
