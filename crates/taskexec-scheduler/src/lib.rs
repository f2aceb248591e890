//! taskexec-scheduler — the task executor's reconciliation loop.
//!
//! Every tick reads cluster and discovery state, decides how many worker
//! jobs each algorithm should have, and acts on the difference:
//!
//! - Shapes the raw request stream (max workers, quota guarantees, batch
//!   window, proportional cut)
//! - Serves requests from idle, pending, recently created, paused and
//!   bootstrapping workers before creating new jobs
//! - Admits new jobs against node capacity and stops workers when starved
//!   requests need room
//! - Sends lifecycle commands and writes a per-tick report
//!
//! # Architecture
//!
//! ```text
//! Reconciler (tick guard, run loop)
//!   ├── ClusterApi (nodes, pods, jobs, inventory, job creation)
//!   ├── Discovery (requests, workers, templates, commands, report)
//!   ├── WorkersStateManager (per tick, worker categories)
//!   ├── RequestsManager (capacity estimate, request shaping)
//!   └── JobsManager (reuse, admission, stop selection, creation)
//!       └── JobSpecBuilder (job details → cluster job)
//! ```

pub mod error;
pub mod job_spec;
pub mod jobs;
pub mod normalize;
pub mod reconciler;
pub mod requests;
pub mod stats;
pub mod workers;

pub use error::{SchedulerError, SchedulerResult};
pub use job_spec::{ALGORITHM_CONTAINER, JobSpecBuilder, WORKER_CONTAINER};
pub use jobs::{CreatedJob, JobsManager, job_details_for};
pub use reconciler::{Reconciler, ReconcilerContext, TickOutcome};
pub use requests::{RequestsManager, RequisiteAllocator};
pub use workers::{WorkerCategories, WorkersStateManager};
