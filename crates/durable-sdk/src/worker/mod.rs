//! The workflow worker and activity worker: poll
//! loops that dispatch server-delivered work onto a running workflow instance
//! and onto registered [`Activity`] implementations, respectively.

mod activity;
mod activity_worker;
mod heartbeat;
mod options;
mod workflow_worker;

pub use activity::{Activity, ActivityContext, ActivityError, ActivityInfo, ActivityRegistry};
pub use activity_worker::ActivityWorker;
pub use options::WorkerOptions;
pub use workflow_worker::WorkflowWorker;

/// Re-exported so callers configuring activity scheduling don't need to
/// reach into [`crate::bridge`] directly.
pub use crate::bridge::{ActivityOptions, Priority, VersioningIntent};
