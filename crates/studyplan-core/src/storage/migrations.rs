//! Database schema migrations for studyplan.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Apply all pending migrations to bring the database to the current schema
/// version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: Initial schema (baseline).
///
/// The planner tables (containers, tasks, schedule_blocks) are created by
/// `PlannerDb::migrate()` directly; this just marks the baseline.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    set_schema_version(conn, 1)?;
    Ok(())
}

/// Migration v2: calendar import tables.
///
/// Adds provider_connections, calendar_sources and the imported_events
/// tracking table, with the identity indexes the reconciler relies on:
/// - one tracking row per (user, source, external uid)
/// - at most one tracking row per created entity
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS provider_connections (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            provider         TEXT NOT NULL,
            access_token     TEXT,
            refresh_token    TEXT,
            token_expires_at TEXT,
            account_email    TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS calendar_sources (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL,
            kind               TEXT NOT NULL,
            name               TEXT NOT NULL,
            feed_url           TEXT,
            ics_payload        TEXT,
            connection_id      TEXT,
            selected_calendars TEXT NOT NULL DEFAULT '[]',
            import_mode        TEXT NOT NULL DEFAULT 'smart',
            container_id       TEXT NOT NULL,
            is_active          INTEGER NOT NULL DEFAULT 1,
            last_synced_at     TEXT,
            last_error         TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS imported_events (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL,
            source_id    TEXT NOT NULL,
            external_uid TEXT NOT NULL,
            created_as   TEXT NOT NULL,
            created_id   TEXT NOT NULL,
            event_hash   TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_imported_events_identity
            ON imported_events(user_id, source_id, external_uid);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_imported_events_created_id
            ON imported_events(created_id);

        CREATE INDEX IF NOT EXISTS idx_calendar_sources_user
            ON calendar_sources(user_id);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: sync drift-repair fields.
///
/// Adds soft deletion to tasks (duplicate cleanup keeps the row) and the
/// per-source compare-and-set `sync_status` flag.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE tasks ADD COLUMN deleted_at TEXT;
         ALTER TABLE calendar_sources ADD COLUMN sync_status TEXT NOT NULL DEFAULT 'idle';",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}
