//! Background processing: job queue, pipeline worker and periodic cleanup

pub mod cleanup;
mod job_queue;
mod worker;

pub use cleanup::{run_cleanup, spawn_cleanup_task, sweep_collections, sweep_uploads, SweepReport};
pub use job_queue::{Job, JobQueue, SubmitOutcome};
pub use worker::ProcessingWorker;
