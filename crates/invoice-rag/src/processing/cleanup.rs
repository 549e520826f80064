//! Periodic removal of expired uploads and collections

use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::server::state::AppState;

/// Outcome of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Names removed
    pub removed: Vec<String>,
    /// Names that could not be inspected or removed, with the reason
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.removed.extend(other.removed);
        self.failed.extend(other.failed);
    }
}

/// Whether `modified` lies more than `retention` before `now`. Future times never expire.
fn is_expired(modified: SystemTime, retention: Duration, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|age| age > retention)
        .unwrap_or(false)
}

/// Delete regular files in `dir` last modified more than `retention` ago
pub fn sweep_uploads(dir: &Path, retention: Duration, now: SystemTime) -> SweepReport {
    sweep(dir, retention, now, |entry_path, meta| {
        meta.is_file().then(|| std::fs::remove_file(entry_path))
    })
}

/// Delete `<prefix>*` directories under `root` last modified more than `retention` ago
pub fn sweep_collections(root: &Path, prefix: &str, retention: Duration, now: SystemTime) -> SweepReport {
    sweep(root, retention, now, |entry_path, meta| {
        let matches = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        (meta.is_dir() && matches).then(|| std::fs::remove_dir_all(entry_path))
    })
}

/// Walk `dir` once; `remove` returns `None` for entries it does not manage
fn sweep<F>(dir: &Path, retention: Duration, now: SystemTime, remove: F) -> SweepReport
where
    F: Fn(&Path, &std::fs::Metadata) -> Option<std::io::Result<()>>,
{
    let mut report = SweepReport::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            tracing::error!("Cannot read {}: {}", dir.display(), e);
            report.failed.push((dir.display().to_string(), e.to_string()));
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", path.display(), e);
                report.failed.push((name, e.to_string()));
                continue;
            }
        };

        let modified = match meta.modified() {
            Ok(modified) => modified,
            Err(e) => {
                report.failed.push((name, e.to_string()));
                continue;
            }
        };
        if !is_expired(modified, retention, now) {
            continue;
        }

        match remove(&path, &meta) {
            Some(Ok(())) => {
                tracing::info!("Deleted expired {}", path.display());
                report.removed.push(name);
            }
            Some(Err(e)) => {
                tracing::error!("Failed to delete {}: {}", path.display(), e);
                report.failed.push((name, e.to_string()));
            }
            None => {}
        }
    }

    report
}

/// Run both sweeps and evict QA chains whose collection is gone
pub async fn run_cleanup(state: &AppState, now: SystemTime) -> SweepReport {
    let config = state.config();
    let uploads_dir = state.uploads().dir().to_path_buf();
    let index_root = config.storage.index_root.clone();
    let prefix = config.storage.collection_prefix.clone();
    let retention = config.cleanup.retention();

    let swept = tokio::task::spawn_blocking(move || {
        let mut report = sweep_uploads(&uploads_dir, retention, now);
        report.merge(sweep_collections(&index_root, &prefix, retention, now));
        report
    })
    .await;

    let report = match swept {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Cleanup task failed: {}", e);
            return SweepReport::default();
        }
    };

    let evicted = state.evict_orphaned_chains();
    tracing::info!(
        "Cleanup removed {} entries ({} failures), evicted {} QA chains",
        report.removed.len(),
        report.failed.len(),
        evicted
    );
    report
}

/// Spawn the cleanup loop: poll every `poll_interval`, sweep once `sweep_interval` has
/// passed since startup or the previous sweep
pub fn spawn_cleanup_task(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cleanup = state.config().cleanup.clone();
        let mut ticker = tokio::time::interval(cleanup.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_run = Instant::now();

        tracing::info!(
            "Cleanup scheduled every {:?} (retention {:?})",
            cleanup.sweep_interval(),
            cleanup.retention()
        );

        loop {
            ticker.tick().await;
            if last_run.elapsed() >= cleanup.sweep_interval() {
                run_cleanup(&state, SystemTime::now()).await;
                last_run = Instant::now();
            }
        }
    })
}
