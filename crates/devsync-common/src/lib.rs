//! Shared domain types for `devsync`.
//!
//! These types are deliberately inert data — no subprocess handles, no
//! trait objects, nothing that can't be constructed in a unit test or
//! serialized to the event log. The executable crate builds its behavior
//! (the job runner, the git state machines, the update orchestrator) on
//! top of these shapes.

pub mod config;
pub mod job;
pub mod repo;
pub mod sysupdate;

pub use config::Config;
pub use job::{Event, EventKind, JobStatus, Summary};
pub use repo::{
    CleanupOptions, CleanupPlan, CleanupResult, CleanupTarget, RepoInfo, RepoStatus,
    UpdateOptions, UpdateResult,
};
pub use sysupdate::{ManagerUpdateResult, PackageChange, UpdateStats};
