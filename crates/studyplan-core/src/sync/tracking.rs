//! Identity resolver: the external-uid-to-entity tracking store.
//!
//! Tracking rows are the weak back-reference from an upstream event to the
//! internal entity it produced. The store loads every row for one
//! (user, source) pair once per pass, so reconciliation stays
//! O(events + tracked rows).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::storage::PlannerDb;

/// What kind of entity a tracking row points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    ScheduleBlock,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::ScheduleBlock => "schedule_block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(EntityKind::Task),
            "schedule_block" => Some(EntityKind::ScheduleBlock),
            _ => None,
        }
    }
}

/// One tracking row: maps an external event to the entity it created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedEventRecord {
    pub id: String,
    pub user_id: String,
    pub source_id: String,
    pub external_uid: String,
    pub created_as: EntityKind,
    pub created_id: String,
    pub event_hash: String,
    pub created_at: DateTime<Utc>,
}

impl ImportedEventRecord {
    pub fn new(
        user_id: impl Into<String>,
        source_id: impl Into<String>,
        external_uid: impl Into<String>,
        created_as: EntityKind,
        created_id: impl Into<String>,
        event_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            source_id: source_id.into(),
            external_uid: external_uid.into(),
            created_as,
            created_id: created_id.into(),
            event_hash: event_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// In-memory view of one (user, source)'s tracking rows, keyed by uid.
pub struct TrackingStore {
    records: HashMap<String, ImportedEventRecord>,
}

impl TrackingStore {
    /// Load all tracking rows for a (user, source) pair.
    pub fn load(db: &PlannerDb, user_id: &str, source_id: &str) -> Result<Self, DatabaseError> {
        let rows = db.list_imported_events(user_id, source_id)?;
        let records = rows
            .into_iter()
            .map(|r| (r.external_uid.clone(), r))
            .collect();
        Ok(Self { records })
    }

    pub fn lookup(&self, external_uid: &str) -> Option<&ImportedEventRecord> {
        self.records.get(external_uid)
    }

    /// Persist a new tracking row and add it to the map.
    pub fn record(
        &mut self,
        db: &PlannerDb,
        record: ImportedEventRecord,
    ) -> Result<(), DatabaseError> {
        db.insert_imported_event(&record)?;
        self.records.insert(record.external_uid.clone(), record);
        Ok(())
    }

    /// Update a row's change-detection hash after applying an update.
    pub fn touch(
        &mut self,
        db: &PlannerDb,
        external_uid: &str,
        new_hash: &str,
    ) -> Result<(), DatabaseError> {
        if let Some(record) = self.records.get_mut(external_uid) {
            db.update_imported_event_hash(&record.id, new_hash)?;
            record.event_hash = new_hash.to_string();
        }
        Ok(())
    }

    /// Drop a row from the database and the map.
    pub fn remove(&mut self, db: &PlannerDb, external_uid: &str) -> Result<(), DatabaseError> {
        if let Some(record) = self.records.remove(external_uid) {
            db.delete_imported_event(&record.id)?;
        }
        Ok(())
    }

    /// Rows whose uid was not seen this pass: candidates for deletion on
    /// full-pull sources.
    pub fn unseen(&self, seen: &HashSet<String>) -> Vec<ImportedEventRecord> {
        self.records
            .values()
            .filter(|r| !seen.contains(&r.external_uid))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
