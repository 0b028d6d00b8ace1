use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use crate::db::DatabaseError;

use super::{RenderRecord, RenderStore};

/// In-process render history. Nothing survives the process; used for tests
/// and dry runs without a state database.
#[derive(Default)]
pub struct MemoryRenderStore {
    records: Mutex<BTreeMap<String, RenderRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryRenderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `lookup` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `save` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves since creation.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unavailable(rel_path: &str) -> DatabaseError {
    DatabaseError::Io {
        path: PathBuf::from(rel_path),
        source: std::io::Error::other("render store unavailable"),
    }
}

impl RenderStore for MemoryRenderStore {
    fn lookup(&self, rel_path: &str) -> Result<Option<RenderRecord>, DatabaseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable(rel_path));
        }
        let records = self.records.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        Ok(records.get(rel_path).cloned())
    }

    fn save(
        &self,
        rel_path: &str,
        pure_render: &[u8],
        template_hash: &str,
        os: &str,
        hostname: &str,
    ) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable(rel_path));
        }
        let mut records = self.records.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        records.insert(
            rel_path.to_string(),
            RenderRecord {
                rel_path: rel_path.to_string(),
                template_hash: template_hash.to_string(),
                pure_render: pure_render.to_vec(),
                os: os.to_string(),
                hostname: hostname.to_string(),
                rendered_at: Utc::now(),
            },
        );
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
