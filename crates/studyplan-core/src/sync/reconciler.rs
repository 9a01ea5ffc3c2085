//! The per-event reconciliation state machine.
//!
//! Every canonical event lands in one of three states against the tracking
//! store: NEW (no row), UNCHANGED (row with an equal hash), or CHANGED
//! (row with a differing hash). The reconciler applies exactly the
//! mutation that state calls for, and afterwards sweeps tracked events
//! that vanished upstream (full-pull sources only).

use std::collections::HashSet;

use chrono::{Duration, NaiveTime};
use tracing::debug;

use crate::calendar::event::{CanonicalEvent, EventShape};
use crate::calendar::source::CalendarSource;
use crate::error::CoreError;
use crate::schedule::{day_of_week, ScheduleBlock};
use crate::storage::PlannerDb;
use crate::task::Task;

use super::tracking::{EntityKind, ImportedEventRecord, TrackingStore};
use super::SyncReport;

/// Outcome of applying one canonical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    CreatedTask,
    CreatedBlock,
    /// An untracked look-alike task was claimed instead of creating a twin.
    AdoptedTask,
    UpdatedTask,
    UpdatedBlock,
    Unchanged,
}

/// Ensure a block's end lands strictly after its start: push a degenerate
/// end forward by one hour, capped inside the same day.
fn correct_block_end(start: NaiveTime, end: NaiveTime) -> NaiveTime {
    if end > start {
        return end;
    }
    let (pushed, rollover) = start.overflowing_add_signed(Duration::hours(1));
    if rollover != 0 || pushed <= start {
        NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(start)
    } else {
        pushed
    }
}

/// Reconciles one source's canonical events against the planner store.
pub struct Reconciler<'a> {
    db: &'a PlannerDb,
    source: &'a CalendarSource,
    container_id: String,
    tracking: TrackingStore,
    seen: HashSet<String>,
}

impl<'a> Reconciler<'a> {
    /// Load the tracking rows for this (user, source) pair.
    pub fn new(
        db: &'a PlannerDb,
        source: &'a CalendarSource,
        container_id: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let tracking = TrackingStore::load(db, &source.user_id, &source.id)?;
        Ok(Self {
            db,
            source,
            container_id: container_id.into(),
            tracking,
            seen: HashSet::new(),
        })
    }

    /// Apply one canonical event and report what happened.
    pub fn apply(&mut self, event: &CanonicalEvent) -> Result<Applied, CoreError> {
        self.seen.insert(event.external_uid.clone());

        let tracked = self
            .tracking
            .lookup(&event.external_uid)
            .map(|r| (r.created_as, r.created_id.clone(), r.event_hash.clone()));

        match tracked {
            Some((_, _, hash)) if hash == event.hash => Ok(Applied::Unchanged),
            Some((created_as, created_id, _)) => self.apply_change(event, created_as, &created_id),
            None => self.apply_new(event),
        }
    }

    /// CHANGED: push the event's title/date/time onto the tracked entity.
    fn apply_change(
        &mut self,
        event: &CanonicalEvent,
        created_as: EntityKind,
        created_id: &str,
    ) -> Result<Applied, CoreError> {
        let updated = match created_as {
            EntityKind::Task => {
                self.db
                    .update_task_fields(created_id, &event.title, Some(event.date))?
            }
            EntityKind::ScheduleBlock => {
                let (start, end) = block_times(event);
                self.db.update_block_fields(
                    created_id,
                    &event.title,
                    day_of_week(event.date),
                    start,
                    end,
                    event.date,
                )?
            }
        };

        if !updated {
            // The entity is gone but its tracking row lingered; drop the
            // stale row and re-import from scratch.
            debug!(uid = %event.external_uid, "tracked entity missing, re-importing");
            self.tracking.remove(self.db, &event.external_uid)?;
            return self.apply_new(event);
        }

        self.tracking
            .touch(self.db, &event.external_uid, &event.hash)?;
        Ok(match created_as {
            EntityKind::Task => Applied::UpdatedTask,
            EntityKind::ScheduleBlock => Applied::UpdatedBlock,
        })
    }

    /// NEW: adopt a look-alike task, or create the entity plus its row.
    fn apply_new(&mut self, event: &CanonicalEvent) -> Result<Applied, CoreError> {
        match EventShape::for_mode(self.source.import_mode, event.is_all_day) {
            EventShape::Task => {
                if let Some(existing) = self.db.find_untracked_task(
                    &self.source.user_id,
                    &self.container_id,
                    &event.title,
                    event.date,
                )? {
                    debug!(uid = %event.external_uid, task_id = %existing.id, "adopting existing task");
                    self.record_tracking(event, EntityKind::Task, &existing.id)?;
                    return Ok(Applied::AdoptedTask);
                }

                let task = Task::new(
                    &self.source.user_id,
                    &self.container_id,
                    &event.title,
                    Some(event.date),
                );
                self.db.insert_task(&task)?;
                self.record_tracking(event, EntityKind::Task, &task.id)?;
                Ok(Applied::CreatedTask)
            }
            EventShape::Schedule => {
                let (start, end) = block_times(event);
                let block = ScheduleBlock::single_day(
                    &self.source.user_id,
                    &event.title,
                    event.date,
                    start,
                    end,
                );
                self.db.insert_block(&block)?;
                self.record_tracking(event, EntityKind::ScheduleBlock, &block.id)?;
                Ok(Applied::CreatedBlock)
            }
        }
    }

    fn record_tracking(
        &mut self,
        event: &CanonicalEvent,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<(), CoreError> {
        let record = ImportedEventRecord::new(
            &self.source.user_id,
            &self.source.id,
            &event.external_uid,
            kind,
            entity_id,
            &event.hash,
        );
        self.tracking.record(self.db, record)?;
        Ok(())
    }

    /// Delete entities whose upstream event vanished. Only meaningful for
    /// full-pull sources, where an unseen uid proves upstream deletion;
    /// callers skip this when the fetch itself failed.
    pub fn sweep_deleted(&mut self, report: &mut SyncReport) {
        if !self.source.kind.is_full_pull() {
            return;
        }

        for record in self.tracking.unseen(&self.seen) {
            let deleted = match record.created_as {
                EntityKind::Task => self.db.soft_delete_task(&record.created_id).map(|_| ()),
                EntityKind::ScheduleBlock => self.db.delete_block(&record.created_id),
            };

            match deleted.and_then(|_| {
                self.db.delete_imported_event(&record.id)?;
                Ok(())
            }) {
                Ok(()) => {
                    debug!(uid = %record.external_uid, "removed entity for vanished upstream event");
                    match record.created_as {
                        EntityKind::Task => report.tasks_deleted += 1,
                        EntityKind::ScheduleBlock => report.schedule_blocks_deleted += 1,
                    }
                }
                Err(e) => report
                    .errors
                    .push(format!("{}: {}", record.external_uid, e)),
            }
        }
    }
}

/// Start/end wall-clock times for a schedule-shaped event.
///
/// A forced-schedule all-day event becomes a full-day block; degenerate
/// ends are pushed strictly after the start.
fn block_times(event: &CanonicalEvent) -> (NaiveTime, NaiveTime) {
    match event.start_time {
        Some(start) => {
            let end = event
                .end_time
                .unwrap_or_else(|| correct_block_end(start, start));
            (start, correct_block_end(start, end))
        }
        None => (
            NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
        ),
    }
}
