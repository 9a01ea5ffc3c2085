//! Calendar synchronization: tracking, cleanup, reconciliation, and the
//! per-source orchestrator.

pub mod cleanup;
pub mod engine;
pub mod reconciler;
pub mod tracking;

use serde::{Deserialize, Serialize};

pub use cleanup::CleanupSummary;
pub use engine::SyncEngine;
pub use reconciler::{Applied, Reconciler};
pub use tracking::{EntityKind, ImportedEventRecord, TrackingStore};

/// How many errors the persisted per-source summary shows verbatim.
const ERROR_SUMMARY_CAP: usize = 5;

/// Aggregate result of one or more sync passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub tasks_deleted: usize,
    pub schedule_blocks_created: usize,
    pub schedule_blocks_updated: usize,
    pub schedule_blocks_deleted: usize,
    pub events_processed: usize,
    pub calendars_processed: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Fold another pass's result into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.tasks_created += other.tasks_created;
        self.tasks_updated += other.tasks_updated;
        self.tasks_deleted += other.tasks_deleted;
        self.schedule_blocks_created += other.schedule_blocks_created;
        self.schedule_blocks_updated += other.schedule_blocks_updated;
        self.schedule_blocks_deleted += other.schedule_blocks_deleted;
        self.events_processed += other.events_processed;
        self.calendars_processed += other.calendars_processed;
        self.errors.extend(other.errors);
    }

    /// Count one reconciler outcome.
    pub fn record(&mut self, applied: Applied) {
        match applied {
            Applied::CreatedTask => self.tasks_created += 1,
            Applied::CreatedBlock => self.schedule_blocks_created += 1,
            // Adoption repairs drift without creating anything new.
            Applied::UpdatedTask | Applied::AdoptedTask => self.tasks_updated += 1,
            Applied::UpdatedBlock => self.schedule_blocks_updated += 1,
            Applied::Unchanged => {}
        }
    }

    /// Whether the pass mutated anything.
    pub fn has_changes(&self) -> bool {
        self.tasks_created
            + self.tasks_updated
            + self.tasks_deleted
            + self.schedule_blocks_created
            + self.schedule_blocks_updated
            + self.schedule_blocks_deleted
            > 0
    }
}

/// Collapse an error list into the capped form persisted on the source:
/// the first five entries, then "+N more".
pub fn summarize_errors(errors: &[String]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    let mut summary = errors
        .iter()
        .take(ERROR_SUMMARY_CAP)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ");
    if errors.len() > ERROR_SUMMARY_CAP {
        summary.push_str(&format!(" (+{} more)", errors.len() - ERROR_SUMMARY_CAP));
    }
    Some(summary)
}
