//! Bounded job queue with a per-filename status registry

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{DocumentProgress, ProcessingStatus};

/// A request to process one stored upload
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Storage filename in the uploads directory
    pub filename: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Result of [`JobQueue::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Job accepted
    Queued(Uuid),
    /// The filename is already queued or running
    AlreadyInProgress,
}

/// Job queue feeding the processing worker
pub struct JobQueue {
    /// Status per storage filename, kept for the process lifetime
    statuses: Arc<DashMap<String, DocumentProgress>>,
    /// Channel for sending jobs to the worker
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` pending jobs
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let queue = Self {
            statuses: Arc::new(DashMap::new()),
            sender,
        };

        (queue, receiver)
    }

    /// Mark `filename` started and enqueue it.
    ///
    /// A filename already queued or running is not enqueued twice. When the queue is
    /// full or the worker is gone the status is set to failed and an error returned.
    pub fn submit(&self, filename: &str) -> Result<SubmitOutcome> {
        match self.statuses.entry(filename.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status.is_in_flight() {
                    tracing::debug!("'{}' is already being processed", filename);
                    return Ok(SubmitOutcome::AlreadyInProgress);
                }
                entry.insert(DocumentProgress::new(filename));
            }
            Entry::Vacant(entry) => {
                entry.insert(DocumentProgress::new(filename));
            }
        }

        let job = Job::new(filename);
        let job_id = job.id;

        match self.sender.try_send(job) {
            Ok(()) => {
                tracing::info!("Queued job {} for '{}'", job_id, filename);
                Ok(SubmitOutcome::Queued(job_id))
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Processing queue full, rejecting '{}'", filename);
                self.fail(filename, Error::QueueFull.to_string());
                Err(Error::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("Processing worker has stopped, rejecting '{}'", filename);
                self.fail(filename, "Processing worker is not running");
                Err(Error::internal("Processing worker is not running"))
            }
        }
    }

    /// Current status of a filename
    pub fn status(&self, filename: &str) -> Option<DocumentProgress> {
        self.statuses.get(filename).map(|p| p.value().clone())
    }

    /// Record a stage transition
    pub fn advance(&self, filename: &str, status: ProcessingStatus) {
        match self.statuses.get_mut(filename) {
            Some(mut progress) => {
                progress.advance(status);
                tracing::debug!("'{}' -> {}", filename, status);
            }
            None => tracing::warn!("No status entry for '{}' (stage {})", filename, status),
        }
    }

    /// Record a failure
    pub fn fail(&self, filename: &str, error: impl Into<String>) {
        let error = error.into();
        self.statuses
            .entry(filename.to_string())
            .or_insert_with(|| DocumentProgress::new(filename))
            .fail(error);
    }
}
