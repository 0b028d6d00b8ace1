//! Render store backed by the SQLite state database.

use chrono::{DateTime, Utc};

use crate::db::render_repo::{self, RenderRow};
use crate::db::{Database, DatabaseError};

use super::{RenderRecord, RenderStore};

/// Render history persisted in the SQLite state database.
#[derive(Clone)]
pub struct SqliteRenderStore {
    db: Database,
}

impl SqliteRenderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl RenderStore for SqliteRenderStore {
    fn lookup(&self, rel_path: &str) -> Result<Option<RenderRecord>, DatabaseError> {
        render_repo::find_latest(&self.db, rel_path)?
            .map(row_to_record)
            .transpose()
    }

    fn save(
        &self,
        rel_path: &str,
        pure_render: &[u8],
        template_hash: &str,
        os: &str,
        hostname: &str,
    ) -> Result<(), DatabaseError> {
        let row = RenderRow {
            rel_path: rel_path.to_string(),
            template_hash: template_hash.to_string(),
            pure_render: pure_render.to_vec(),
            os: os.to_string(),
            hostname: hostname.to_string(),
            rendered_at: Utc::now().to_rfc3339(),
        };
        render_repo::upsert(&self.db, &row)
    }
}

fn row_to_record(row: RenderRow) -> Result<RenderRecord, DatabaseError> {
    let rendered_at = DateTime::parse_from_rfc3339(&row.rendered_at)
        .map_err(|e| DatabaseError::CorruptRecord {
            rel_path: row.rel_path.clone(),
            reason: format!("bad timestamp '{}': {}", row.rendered_at, e),
        })?
        .with_timezone(&Utc);

    Ok(RenderRecord {
        rel_path: row.rel_path,
        template_hash: row.template_hash,
        pure_render: row.pure_render,
        os: row.os,
        hostname: row.hostname,
        rendered_at,
    })
}
