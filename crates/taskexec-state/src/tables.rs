//! redb table definitions for the discovery store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Algorithm templates keyed by algorithm name.
pub const TEMPLATES: TableDefinition<&str, &[u8]> = TableDefinition::new("templates");

/// Registered workers keyed by registry path (`/workers/{id}`).
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

/// Singleton records: the request stream, versions, registry, counters.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Queued worker commands keyed by `{worker_id}:{seq}`.
pub const COMMANDS: TableDefinition<&str, &[u8]> = TableDefinition::new("commands");

/// Reconcile reports keyed by zero-padded timestamp.
pub const REPORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("reports");

pub const META_REQUESTS: &str = "requests";
pub const META_VERSIONS: &str = "versions";
pub const META_REGISTRY: &str = "registry";
pub const META_COMMAND_SEQ: &str = "command_seq";

/// Shape shared by every table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
