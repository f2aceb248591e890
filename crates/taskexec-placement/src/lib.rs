//! Resource matching for the task executor.
//!
//! Turns raw cluster state into per-node capacity, decides which new worker
//! jobs fit this tick, explains the ones that do not, and picks running
//! workers to stop when starved requests need room.
//!
//! # Components
//!
//! - **`convert`** — Raw nodes and pods to per-node resource snapshots
//! - **`fit`** — Single node fit under pressure, selector filtering
//! - **`placer`** — Admission and round-robin matching
//! - **`evict`** — Workers to stop in favour of skipped requests
//! - **`warning`** — Warning construction per failure class

pub mod convert;
pub mod evict;
pub mod fit;
pub mod placer;
pub mod warning;

pub use convert::normalize_resources;
pub use evict::{StopCandidate, pause_according_to_resources};
pub use fit::{NodeFit, ResourceFlags, find_node_for_schedule, node_selector_filter};
pub use placer::{Admission, CreateDetails, MatchOutcome, ResourceMatcher, SkippedJob, group_create_details};
