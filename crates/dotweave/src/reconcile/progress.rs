use std::path::PathBuf;

use super::summary::FileOutcome;

/// Events emitted by the reconciler as it works through a backup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    EntryStarted { name: String },
    FileDone { path: PathBuf, outcome: FileOutcome },
    FileFailed { path: PathBuf, error: String },
    Cancelled,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to the log.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::EntryStarted { name } => log::info!("Reconciling {}", name),
            ProgressEvent::FileDone { path, outcome } => match outcome {
                FileOutcome::Unchanged | FileOutcome::AlreadyLinked => {
                    log::debug!("{}: {:?}", path.display(), outcome)
                }
                FileOutcome::Merged { conflict: true } => {
                    log::warn!("{}: merged with conflicts", path.display())
                }
                _ => log::info!("{}: {:?}", path.display(), outcome),
            },
            ProgressEvent::FileFailed { path, error } => {
                log::warn!("{}: {}", path.display(), error)
            }
            ProgressEvent::Cancelled => log::warn!("Reconciliation cancelled"),
        }
    }
}
