//! Task and container types.
//!
//! Tasks live in a container (a per-user task list). Imported tasks are
//! plain tasks; the link back to their upstream event lives in the
//! `imported_events` tracking table, never on the task itself.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A container grouping tasks, e.g. "Inbox" or a course-specific list.
///
/// Every user has exactly one default container, created lazily on first
/// lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub is_default: bool,
}

impl Container {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, is_default: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            is_default,
        }
    }
}

/// A task owned by a user.
///
/// Soft-deleted tasks keep their row with `deleted_at` set; all listing
/// queries filter them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub container_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with a fresh id and current timestamps.
    pub fn new(
        user_id: impl Into<String>,
        container_id: impl Into<String>,
        title: impl Into<String>,
        due_date: Option<NaiveDate>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            container_id: container_id.into(),
            title: title.into(),
            description: None,
            due_date,
            completed: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
