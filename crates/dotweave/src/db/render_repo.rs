//! Render record repository: point lookup and upsert on `render_records`.

use rusqlite::params;

use super::{Database, DatabaseError};

/// A raw render record row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRow {
    pub rel_path: String,
    pub template_hash: String,
    pub pure_render: Vec<u8>,
    pub os: String,
    pub hostname: String,
    pub rendered_at: String,
}

/// Inserts or replaces the record for `row.rel_path`.
pub fn upsert(db: &Database, row: &RenderRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO render_records (rel_path, template_hash, pure_render, os, hostname, rendered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(rel_path) DO UPDATE SET
               template_hash = ?2,
               pure_render = ?3,
               os = ?4,
               hostname = ?5,
               rendered_at = ?6",
            params![
                row.rel_path,
                row.template_hash,
                row.pure_render,
                row.os,
                row.hostname,
                row.rendered_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the latest record for a relative path.
pub fn find_latest(db: &Database, rel_path: &str) -> Result<Option<RenderRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT rel_path, template_hash, pure_render, os, hostname, rendered_at
             FROM render_records WHERE rel_path = ?1",
        )?;
        let mut rows = stmt.query_map(params![rel_path], |row| {
            Ok(RenderRow {
                rel_path: row.get(0)?,
                template_hash: row.get(1)?,
                pure_render: row.get(2)?,
                os: row.get(3)?,
                hostname: row.get(4)?,
                rendered_at: row.get(5)?,
            })
        })?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM render_records", [], |r| r.get(0))?;
        Ok(n as u64)
    })
}

/// All tracked relative paths, sorted.
pub fn list_paths(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT rel_path FROM render_records ORDER BY rel_path")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    })
}
