//! Render history: the last pure render of every template, keyed by its
//! path relative to the backup root.
//!
//! The stored bytes are always raw template output, never a merge result, so
//! the next reconciliation can tell template changes apart from user edits.

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::db::DatabaseError;

pub use memory::MemoryRenderStore;
pub use sqlite::SqliteRenderStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRecord {
    pub rel_path: String,
    /// Hex SHA-256 of the template source at render time.
    pub template_hash: String,
    pub pure_render: Vec<u8>,
    pub os: String,
    pub hostname: String,
    pub rendered_at: DateTime<Utc>,
}

/// Durable per-path render history.
///
/// Implementations hold at most one record per key. A single reconciler owns
/// the store for the duration of a run.
pub trait RenderStore {
    fn lookup(&self, rel_path: &str) -> Result<Option<RenderRecord>, DatabaseError>;

    /// Inserts or replaces the record for `rel_path`.
    fn save(
        &self,
        rel_path: &str,
        pure_render: &[u8],
        template_hash: &str,
        os: &str,
        hostname: &str,
    ) -> Result<(), DatabaseError>;

    /// Like `lookup`, but a read failure is logged and reported as no history.
    fn get_latest(&self, rel_path: &str) -> Option<RenderRecord> {
        match self.lookup(rel_path) {
            Ok(record) => record,
            Err(e) => {
                log::warn!(
                    "Render history unavailable for {}, treating as first render: {}",
                    rel_path,
                    e
                );
                None
            }
        }
    }
}

impl<S: RenderStore + ?Sized> RenderStore for &S {
    fn lookup(&self, rel_path: &str) -> Result<Option<RenderRecord>, DatabaseError> {
        (**self).lookup(rel_path)
    }

    fn save(
        &self,
        rel_path: &str,
        pure_render: &[u8],
        template_hash: &str,
        os: &str,
        hostname: &str,
    ) -> Result<(), DatabaseError> {
        (**self).save(rel_path, pure_render, template_hash, os, hostname)
    }
}

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
