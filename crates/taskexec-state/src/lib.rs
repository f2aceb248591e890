//! taskexec-state — discovery store for the task executor.
//!
//! Backed by [redb](https://docs.rs/redb), holds algorithm templates, the
//! worker registry, the upstream request stream, image versions and the
//! private registry, plus the worker commands and reconcile reports the
//! reconciler writes back. [`StateStore`] implements
//! [`taskexec_core::Discovery`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{REPORT_HISTORY, StateStore};
pub use types::{SeedData, worker_key};
