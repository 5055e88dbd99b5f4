//! Database schema for definitions and run contexts

use anyhow::Result;
use rusqlite::Connection;

/// Initialize the database schema
///
/// Rows carry the full JSON body; the other columns exist for filtering.
/// Delay deadlines are epoch milliseconds so ordering holds for any year.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS definitions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            trigger TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_definitions_trigger ON definitions(trigger, is_active);

        CREATE TABLE IF NOT EXISTS contexts (
            id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL,
            status TEXT NOT NULL,
            current_step TEXT NOT NULL,
            resume_at_ms INTEGER,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_contexts_workflow ON contexts(workflow_id);
        CREATE INDEX IF NOT EXISTS idx_contexts_status ON contexts(status);
        CREATE INDEX IF NOT EXISTS idx_contexts_resume_at ON contexts(resume_at_ms);
        "#,
    )?;

    Ok(())
}
