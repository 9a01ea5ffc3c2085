//! SQLite-based storage for the planner and the calendar import engine.
//!
//! One database file holds the planner entities (containers, tasks,
//! schedule blocks) and the import engine's state (provider connections,
//! calendar sources, imported_events tracking rows).

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::calendar::source::{CalendarSource, ImportMode, SourceKind, SyncStatus};
use crate::error::{CoreError, DatabaseError};
use crate::integrations::oauth::ProviderConnection;
use crate::schedule::ScheduleBlock;
use crate::sync::tracking::{EntityKind, ImportedEventRecord};
use crate::task::{Container, Task};

use super::data_dir;
use super::migrations;

// === Helper Functions ===

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_datetime(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn parse_date_fallback(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

fn parse_opt_date(date_str: Option<String>) -> Option<NaiveDate> {
    date_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn parse_time_fallback(time_str: &str) -> NaiveTime {
    NaiveTime::parse_from_str(time_str, "%H:%M")
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default())
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Decode the JSON-encoded selected_calendars column
fn parse_calendar_list(json_str: &str) -> Vec<String> {
    serde_json::from_str(json_str).unwrap_or_default()
}

/// Build a Task from a database row (see TASK_COLUMNS for the order)
fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        container_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        due_date: parse_opt_date(row.get(5)?),
        completed: row.get(6)?,
        deleted_at: parse_opt_datetime(row.get(7)?),
        created_at: parse_datetime_fallback(&row.get::<_, String>(8)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(9)?),
    })
}

/// Build a ScheduleBlock from a database row (see BLOCK_COLUMNS)
fn row_to_block(row: &rusqlite::Row) -> Result<ScheduleBlock, rusqlite::Error> {
    Ok(ScheduleBlock {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        day_of_week: row.get::<_, i64>(3)? as u8,
        start_time: parse_time_fallback(&row.get::<_, String>(4)?),
        end_time: parse_time_fallback(&row.get::<_, String>(5)?),
        start_date: parse_date_fallback(&row.get::<_, String>(6)?),
        end_date: parse_date_fallback(&row.get::<_, String>(7)?),
        created_at: parse_datetime_fallback(&row.get::<_, String>(8)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(9)?),
    })
}

/// Build a CalendarSource from a database row (see SOURCE_COLUMNS)
fn row_to_source(row: &rusqlite::Row) -> Result<CalendarSource, rusqlite::Error> {
    let kind_str: String = row.get(2)?;
    let mode_str: String = row.get(8)?;
    let status_str: String = row.get(11)?;
    let calendars_json: String = row.get(7)?;

    Ok(CalendarSource {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: SourceKind::parse(&kind_str).unwrap_or(SourceKind::IcsFeed),
        name: row.get(3)?,
        feed_url: row.get(4)?,
        ics_payload: row.get(5)?,
        connection_id: row.get(6)?,
        selected_calendars: parse_calendar_list(&calendars_json),
        import_mode: ImportMode::parse(&mode_str).unwrap_or(ImportMode::Smart),
        container_id: row.get(9)?,
        is_active: row.get(10)?,
        sync_status: SyncStatus::parse(&status_str),
        last_synced_at: parse_opt_datetime(row.get(12)?),
        last_error: row.get(13)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(14)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(15)?),
    })
}

/// Build a ProviderConnection from a database row
fn row_to_connection(row: &rusqlite::Row) -> Result<ProviderConnection, rusqlite::Error> {
    Ok(ProviderConnection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4)?,
        token_expires_at: parse_opt_datetime(row.get(5)?),
        account_email: row.get(6)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(7)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(8)?),
    })
}

/// Build an ImportedEventRecord from a database row
fn row_to_imported_event(row: &rusqlite::Row) -> Result<ImportedEventRecord, rusqlite::Error> {
    let kind_str: String = row.get(4)?;
    Ok(ImportedEventRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        source_id: row.get(2)?,
        external_uid: row.get(3)?,
        created_as: EntityKind::parse(&kind_str).unwrap_or(EntityKind::Task),
        created_id: row.get(5)?,
        event_hash: row.get(6)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(7)?),
    })
}

const TASK_COLUMNS: &str =
    "id, user_id, container_id, title, description, due_date, completed, deleted_at, created_at, updated_at";

const BLOCK_COLUMNS: &str =
    "id, user_id, title, day_of_week, start_time, end_time, start_date, end_date, created_at, updated_at";

const SOURCE_COLUMNS: &str = "id, user_id, kind, name, feed_url, ics_payload, connection_id, \
     selected_calendars, import_mode, container_id, is_active, sync_status, last_synced_at, \
     last_error, created_at, updated_at";

const CONNECTION_COLUMNS: &str =
    "id, user_id, provider, access_token, refresh_token, token_expires_at, account_email, created_at, updated_at";

const IMPORTED_EVENT_COLUMNS: &str =
    "id, user_id, source_id, external_uid, created_as, created_id, event_hash, created_at";

/// SQLite database for planner and sync-engine storage.
pub struct PlannerDb {
    conn: Connection,
}

impl PlannerDb {
    /// Open the database at `~/.config/studyplan/studyplan.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("studyplan.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and tooling).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Base (v1) planner tables
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS containers (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                name       TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL,
                container_id TEXT NOT NULL,
                title        TEXT NOT NULL,
                description  TEXT,
                due_date     TEXT,
                completed    INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedule_blocks (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                day_of_week INTEGER NOT NULL,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL,
                start_date  TEXT NOT NULL,
                end_date    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user_container ON tasks(user_id, container_id);
            CREATE INDEX IF NOT EXISTS idx_schedule_blocks_user ON schedule_blocks(user_id);",
        )?;

        // Incremental migrations (v1 -> v2 -> v3)
        migrations::migrate(&self.conn)?;

        Ok(())
    }

    // === Containers ===

    /// Look up the user's default container, creating it on first use.
    pub fn default_container(&self, user_id: &str) -> Result<Container, DatabaseError> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, user_id, name, is_default FROM containers
                 WHERE user_id = ?1 AND is_default = 1 LIMIT 1",
                params![user_id],
                |row| {
                    Ok(Container {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        is_default: row.get(3)?,
                    })
                },
            )
            .optional()?;

        if let Some(container) = existing {
            return Ok(container);
        }

        let container = Container::new(user_id, "Inbox", true);
        self.insert_container(&container)?;
        Ok(container)
    }

    pub fn insert_container(&self, container: &Container) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO containers (id, user_id, name, is_default) VALUES (?1, ?2, ?3, ?4)",
            params![container.id, container.user_id, container.name, container.is_default],
        )?;
        Ok(())
    }

    pub fn get_container(&self, id: &str) -> Result<Option<Container>, DatabaseError> {
        let container = self
            .conn
            .query_row(
                "SELECT id, user_id, name, is_default FROM containers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Container {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        is_default: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(container)
    }

    // === Tasks ===

    pub fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO tasks (id, user_id, container_id, title, description, due_date,
                                completed, deleted_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.id,
                task.user_id,
                task.container_id,
                task.title,
                task.description,
                task.due_date.map(format_date),
                task.completed,
                task.deleted_at.map(|dt| dt.to_rfc3339()),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, DatabaseError> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Update an imported task's title and due date. Returns false when the
    /// task no longer exists (or was soft-deleted), so the caller can heal
    /// the stale tracking row.
    pub fn update_task_fields(
        &self,
        id: &str,
        title: &str,
        due_date: Option<NaiveDate>,
    ) -> Result<bool, DatabaseError> {
        let rows = self.conn.execute(
            "UPDATE tasks SET title = ?2, due_date = ?3, updated_at = ?4
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, title, due_date.map(format_date), Utc::now().to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    /// Soft-delete a task. Returns false if it was already gone.
    pub fn soft_delete_task(&self, id: &str) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE tasks SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now],
        )?;
        Ok(rows > 0)
    }

    /// Hard-delete a task row (source disconnect cascade).
    pub fn delete_task(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Non-deleted tasks for a user, newest due first.
    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND deleted_at IS NULL
             ORDER BY due_date IS NULL, due_date, created_at"
        ))?;
        let tasks = stmt
            .query_map(params![user_id], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Non-deleted tasks in one container.
    pub fn list_container_tasks(
        &self,
        user_id: &str,
        container_id: &str,
    ) -> Result<Vec<Task>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND container_id = ?2 AND deleted_at IS NULL
             ORDER BY created_at"
        ))?;
        let tasks = stmt
            .query_map(params![user_id, container_id], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Find a non-deleted task with this exact (title, due_date) in the
    /// container that no tracking row points at: an adoption candidate.
    pub fn find_untracked_task(
        &self,
        user_id: &str,
        container_id: &str,
        title: &str,
        due_date: NaiveDate,
    ) -> Result<Option<Task>, DatabaseError> {
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t
                     WHERE t.user_id = ?1 AND t.container_id = ?2
                       AND t.title = ?3 AND t.due_date = ?4 AND t.deleted_at IS NULL
                       AND NOT EXISTS (
                           SELECT 1 FROM imported_events ie WHERE ie.created_id = t.id
                       )
                     LIMIT 1"
                ),
                params![user_id, container_id, title, format_date(due_date)],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    // === Schedule blocks ===

    pub fn insert_block(&self, block: &ScheduleBlock) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO schedule_blocks (id, user_id, title, day_of_week, start_time, end_time,
                                          start_date, end_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                block.id,
                block.user_id,
                block.title,
                block.day_of_week as i64,
                format_time(block.start_time),
                format_time(block.end_time),
                format_date(block.start_date),
                format_date(block.end_date),
                block.created_at.to_rfc3339(),
                block.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_block(&self, id: &str) -> Result<Option<ScheduleBlock>, DatabaseError> {
        let block = self
            .conn
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM schedule_blocks WHERE id = ?1"),
                params![id],
                row_to_block,
            )
            .optional()?;
        Ok(block)
    }

    /// Update an imported block in place. Returns false when the block row
    /// no longer exists.
    pub fn update_block_fields(
        &self,
        id: &str,
        title: &str,
        day_of_week: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
        date: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let rows = self.conn.execute(
            "UPDATE schedule_blocks
             SET title = ?2, day_of_week = ?3, start_time = ?4, end_time = ?5,
                 start_date = ?6, end_date = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                title,
                day_of_week as i64,
                format_time(start_time),
                format_time(end_time),
                format_date(date),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_block(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM schedule_blocks WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn list_blocks(&self, user_id: &str) -> Result<Vec<ScheduleBlock>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM schedule_blocks
             WHERE user_id = ?1 ORDER BY start_date, start_time"
        ))?;
        let blocks = stmt
            .query_map(params![user_id], row_to_block)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    /// Single-day blocks (import-shaped) with no tracking row: orphans.
    pub fn list_untracked_single_day_blocks(
        &self,
        user_id: &str,
    ) -> Result<Vec<ScheduleBlock>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM schedule_blocks b
             WHERE b.user_id = ?1 AND b.start_date = b.end_date
               AND NOT EXISTS (
                   SELECT 1 FROM imported_events ie WHERE ie.created_id = b.id
               )"
        ))?;
        let blocks = stmt
            .query_map(params![user_id], row_to_block)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    // === Provider connections ===

    pub fn insert_connection(&self, connection: &ProviderConnection) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO provider_connections (id, user_id, provider, access_token, refresh_token,
                                               token_expires_at, account_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                connection.id,
                connection.user_id,
                connection.provider,
                connection.access_token,
                connection.refresh_token,
                connection.token_expires_at.map(|dt| dt.to_rfc3339()),
                connection.account_email,
                connection.created_at.to_rfc3339(),
                connection.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_connection(&self, id: &str) -> Result<Option<ProviderConnection>, DatabaseError> {
        let connection = self
            .conn
            .query_row(
                &format!("SELECT {CONNECTION_COLUMNS} FROM provider_connections WHERE id = ?1"),
                params![id],
                row_to_connection,
            )
            .optional()?;
        Ok(connection)
    }

    /// Persist a refreshed token set on a connection.
    pub fn update_connection_tokens(
        &self,
        id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE provider_connections
             SET access_token = ?2, refresh_token = ?3, token_expires_at = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                access_token,
                refresh_token,
                expires_at.map(|dt| dt.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_connection(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM provider_connections WHERE id = ?1", params![id])?;
        Ok(())
    }

    // === Calendar sources ===

    pub fn insert_source(&self, source: &CalendarSource) -> Result<(), DatabaseError> {
        let calendars_json =
            serde_json::to_string(&source.selected_calendars).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO calendar_sources (id, user_id, kind, name, feed_url, ics_payload,
                                           connection_id, selected_calendars, import_mode,
                                           container_id, is_active, sync_status, last_synced_at,
                                           last_error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                source.id,
                source.user_id,
                source.kind.as_str(),
                source.name,
                source.feed_url,
                source.ics_payload,
                source.connection_id,
                calendars_json,
                source.import_mode.as_str(),
                source.container_id,
                source.is_active,
                source.sync_status.as_str(),
                source.last_synced_at.map(|dt| dt.to_rfc3339()),
                source.last_error,
                source.created_at.to_rfc3339(),
                source.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_source(&self, id: &str) -> Result<Option<CalendarSource>, DatabaseError> {
        let source = self
            .conn
            .query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM calendar_sources WHERE id = ?1"),
                params![id],
                row_to_source,
            )
            .optional()?;
        Ok(source)
    }

    pub fn list_sources(&self, user_id: &str) -> Result<Vec<CalendarSource>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM calendar_sources WHERE user_id = ?1 ORDER BY created_at"
        ))?;
        let sources = stmt
            .query_map(params![user_id], row_to_source)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    pub fn list_active_sources(&self, user_id: &str) -> Result<Vec<CalendarSource>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM calendar_sources
             WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at"
        ))?;
        let sources = stmt
            .query_map(params![user_id], row_to_source)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Pause or resume a source.
    pub fn set_source_active(&self, id: &str, is_active: bool) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE calendar_sources SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, is_active, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Compare-and-set the advisory syncing flag. Returns false when another
    /// pass already holds it.
    pub fn try_begin_sync(&self, id: &str) -> Result<bool, DatabaseError> {
        let rows = self.conn.execute(
            "UPDATE calendar_sources SET sync_status = 'syncing', updated_at = ?2
             WHERE id = ?1 AND sync_status = 'idle'",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    /// Release the syncing flag and record the pass outcome.
    pub fn finish_sync(&self, id: &str, last_error: Option<&str>) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE calendar_sources
             SET sync_status = 'idle', last_synced_at = ?2, last_error = ?3, updated_at = ?2
             WHERE id = ?1",
            params![id, now, last_error],
        )?;
        Ok(())
    }

    /// Disconnect a source: delete every entity it created, its tracking
    /// rows, its now-unshared connection, and finally the source row.
    pub fn delete_source(&self, id: &str) -> Result<(), DatabaseError> {
        let Some(source) = self.get_source(id)? else {
            return Ok(());
        };

        for record in self.list_imported_events(&source.user_id, id)? {
            match record.created_as {
                EntityKind::Task => self.delete_task(&record.created_id)?,
                EntityKind::ScheduleBlock => self.delete_block(&record.created_id)?,
            }
        }
        self.conn.execute(
            "DELETE FROM imported_events WHERE source_id = ?1",
            params![id],
        )?;

        if let Some(connection_id) = &source.connection_id {
            let other_users: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM calendar_sources WHERE connection_id = ?1 AND id != ?2",
                params![connection_id, id],
                |row| row.get(0),
            )?;
            if other_users == 0 {
                self.delete_connection(connection_id)?;
            }
        }

        self.conn
            .execute("DELETE FROM calendar_sources WHERE id = ?1", params![id])?;
        Ok(())
    }

    // === Imported events (tracking rows) ===

    pub fn insert_imported_event(&self, record: &ImportedEventRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO imported_events (id, user_id, source_id, external_uid, created_as,
                                          created_id, event_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.user_id,
                record.source_id,
                record.external_uid,
                record.created_as.as_str(),
                record.created_id,
                record.event_hash,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_imported_events(
        &self,
        user_id: &str,
        source_id: &str,
    ) -> Result<Vec<ImportedEventRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {IMPORTED_EVENT_COLUMNS} FROM imported_events
             WHERE user_id = ?1 AND source_id = ?2"
        ))?;
        let records = stmt
            .query_map(params![user_id, source_id], row_to_imported_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn update_imported_event_hash(&self, id: &str, hash: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE imported_events SET event_hash = ?2 WHERE id = ?1",
            params![id, hash],
        )?;
        Ok(())
    }

    pub fn delete_imported_event(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM imported_events WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Entity ids of the given kind that some tracking row points at,
    /// across all of the user's sources.
    pub fn tracked_entity_ids(
        &self,
        user_id: &str,
        kind: EntityKind,
    ) -> Result<HashSet<String>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT created_id FROM imported_events WHERE user_id = ?1 AND created_as = ?2",
        )?;
        let ids = stmt
            .query_map(params![user_id, kind.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}
