//! Reconciliation driver: brings target locations in line with the backup
//! tree by rendering templates, merging user edits and creating symlinks.

mod driver;
mod kind;
mod options;
mod progress;
mod status;
mod summary;

pub use driver::{Reconciler, ResolvedEntry};
pub use kind::EntryKind;
pub use options::{CancelToken, ReconcileOptions};
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use status::TemplateStatus;
pub use summary::{FailedFile, FileOutcome, ReconcileSummary};

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::platform::Platform;
use crate::state::{MemoryRenderStore, RenderStore, SqliteRenderStore};

/// Runs every entry of `config` against the on-disk render history.
///
/// A dry run reads existing history but never creates or writes the
/// database; without one it plans against an empty history.
pub fn reconcile_config(
    config: &Config,
    platform: &Platform,
    cancel: CancelToken,
) -> Result<ReconcileSummary> {
    let db_path = config.state_database_path();

    let summary = if !config.dry_run {
        let store = SqliteRenderStore::new(Database::open(&db_path)?);
        run_with(config, platform, cancel, store)
    } else if db_path.exists() {
        match Database::open_read_only(&db_path) {
            Ok(db) => run_with(config, platform, cancel, SqliteRenderStore::new(db)),
            Err(e) => {
                log::warn!(
                    "Cannot read render history at {}, planning without it: {}",
                    db_path.display(),
                    e
                );
                run_with(config, platform, cancel, MemoryRenderStore::new())
            }
        }
    } else {
        log::debug!("No render history at {}", db_path.display());
        run_with(config, platform, cancel, MemoryRenderStore::new())
    };

    log::info!("Reconciliation finished: {}", summary);
    Ok(summary)
}

fn run_with<S: RenderStore>(
    config: &Config,
    platform: &Platform,
    cancel: CancelToken,
    store: S,
) -> ReconcileSummary {
    Reconciler::new(platform.clone(), store, config.backup_root.clone())
        .with_options(ReconcileOptions {
            dry_run: config.dry_run,
            force_render: config.force_render,
        })
        .with_cancel(cancel)
        .with_progress(Box::new(LogProgress))
        .reconcile_all(&config.entries)
}
