//! SQLite-backed engine store

use super::schema::init_schema;
use super::Persistence;
use crate::config::WorkflowDefinition;
use crate::workflow::{ExecutionContext, ExecutionStatus};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Definitions and contexts in a single SQLite file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory at {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        init_schema(&conn)?;

        tracing::debug!(path = %path.display(), "Opened engine store");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Throwaway store for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("store connection lock poisoned"))
    }
}

/// Fixed-width UTC timestamps for the bookkeeping columns
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Persistence for SqliteStore {
    fn save_definition(&self, definition: &WorkflowDefinition) -> Result<()> {
        let body = serde_json::to_string(definition)?;

        self.conn()?.execute(
            "INSERT INTO definitions (id, name, trigger, is_active, version, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                trigger = excluded.trigger,
                is_active = excluded.is_active,
                version = excluded.version,
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![
                definition.id,
                definition.name,
                definition.trigger,
                definition.is_active,
                definition.version,
                body,
                timestamp(Utc::now()),
            ],
        )?;

        Ok(())
    }

    fn load_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let body: Option<String> = self
            .conn()?
            .query_row("SELECT body FROM definitions WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;

        body.map(|b| {
            serde_json::from_str(&b).with_context(|| format!("Corrupt definition row '{}'", id))
        })
        .transpose()
    }

    fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT body FROM definitions ORDER BY id")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).context("Corrupt definition row"))
            .collect()
    }

    fn active_for_trigger(&self, trigger: &str) -> Result<Vec<WorkflowDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM definitions WHERE trigger = ?1 AND is_active = 1 ORDER BY id",
        )?;
        let bodies = stmt
            .query_map([trigger], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).context("Corrupt definition row"))
            .collect()
    }

    fn save_context(&self, context: &ExecutionContext) -> Result<()> {
        let body = serde_json::to_string(context)?;

        self.conn()?.execute(
            "INSERT INTO contexts (id, workflow_id, status, current_step, resume_at_ms, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                current_step = excluded.current_step,
                resume_at_ms = excluded.resume_at_ms,
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![
                context.id,
                context.workflow_id,
                context.status.as_str(),
                context.current_step,
                context.resume_at().map(|at| at.timestamp_millis()),
                body,
                timestamp(context.created_at),
                timestamp(context.updated_at),
            ],
        )?;

        Ok(())
    }

    fn load_context(&self, id: &str) -> Result<Option<ExecutionContext>> {
        let body: Option<String> = self
            .conn()?
            .query_row("SELECT body FROM contexts WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;

        body.map(|b| {
            serde_json::from_str(&b).with_context(|| format!("Corrupt context row '{}'", id))
        })
        .transpose()
    }

    fn list_contexts(&self, status: Option<ExecutionStatus>) -> Result<Vec<ExecutionContext>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM contexts WHERE ?1 IS NULL OR status = ?1 ORDER BY created_at, id",
        )?;
        let bodies = stmt
            .query_map(params![status.map(|s| s.as_str())], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).context("Corrupt context row"))
            .collect()
    }

    fn due_delays(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM contexts
             WHERE status = ?1 AND resume_at_ms IS NOT NULL AND resume_at_ms <= ?2
             ORDER BY resume_at_ms, id",
        )?;
        let ids = stmt
            .query_map(
                params![ExecutionStatus::Paused.as_str(), now.timestamp_millis()],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }
}
