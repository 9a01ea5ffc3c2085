//! Orphan and duplicate repair.
//!
//! Runs once at the start of every pass, before reconciliation, to heal
//! drift left behind by interrupted or buggy earlier passes. Deliberately
//! conservative: it only removes rows that are both import-shaped and
//! provably untracked, and never touches a tracked entity or a group with
//! no tracked member.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::storage::PlannerDb;

use super::tracking::EntityKind;

/// What a cleanup sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub orphan_blocks_deleted: usize,
    pub duplicate_tasks_removed: usize,
}

/// Repair orphaned schedule blocks and duplicate tasks for one user.
pub fn run(db: &PlannerDb, user_id: &str, container_id: &str) -> Result<CleanupSummary, CoreError> {
    let mut summary = CleanupSummary::default();

    // Orphaned blocks: single-day (import-shaped) with no tracking row.
    // Blocks carry no identity key strong enough to adopt, so they go.
    for block in db.list_untracked_single_day_blocks(user_id)? {
        debug!(block_id = %block.id, title = %block.title, "deleting orphaned block");
        db.delete_block(&block.id)?;
        summary.orphan_blocks_deleted += 1;
    }

    // Duplicate tasks: group by (title, due_date) in the target container.
    // Where a group has more than one member and at least one is tracked,
    // the untracked members are presumed duplicates from a partial pass.
    let tracked = db.tracked_entity_ids(user_id, EntityKind::Task)?;
    let tasks = db.list_container_tasks(user_id, container_id)?;

    let mut groups: HashMap<(String, Option<NaiveDate>), Vec<&crate::task::Task>> = HashMap::new();
    for task in &tasks {
        groups
            .entry((task.title.clone(), task.due_date))
            .or_default()
            .push(task);
    }

    for ((title, _due), group) in groups {
        if group.len() < 2 || !group.iter().any(|t| tracked.contains(&t.id)) {
            continue;
        }
        for task in group {
            if !tracked.contains(&task.id) {
                debug!(task_id = %task.id, %title, "soft-deleting duplicate task");
                db.soft_delete_task(&task.id)?;
                summary.duplicate_tasks_removed += 1;
            }
        }
    }

    if summary != CleanupSummary::default() {
        info!(
            orphan_blocks = summary.orphan_blocks_deleted,
            duplicate_tasks = summary.duplicate_tasks_removed,
            "cleanup repaired drift"
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleBlock;
    use crate::sync::tracking::ImportedEventRecord;
    use crate::task::Task;
    use chrono::NaiveTime;

    fn block(db: &PlannerDb, user: &str, date: NaiveDate, end_date: NaiveDate) -> ScheduleBlock {
        let mut b = ScheduleBlock::single_day(
            user,
            "Imported",
            date,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        b.end_date = end_date;
        db.insert_block(&b).unwrap();
        b
    }

    fn track_task(db: &PlannerDb, task_id: &str, uid: &str) {
        db.insert_imported_event(&ImportedEventRecord::new(
            "u1",
            "s1",
            uid,
            EntityKind::Task,
            task_id,
            "h",
        ))
        .unwrap();
    }

    #[test]
    fn untracked_single_day_blocks_are_deleted() {
        let db = PlannerDb::open_memory().unwrap();
        let container = db.default_container("u1").unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();

        let orphan = block(&db, "u1", date, date);
        // Multi-day block is not import-shaped; it stays.
        let weekly = block(&db, "u1", date, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        // Tracked single-day block stays.
        let tracked = block(&db, "u1", date, date);
        db.insert_imported_event(&ImportedEventRecord::new(
            "u1",
            "s1",
            "uid-b",
            EntityKind::ScheduleBlock,
            &tracked.id,
            "h",
        ))
        .unwrap();

        let summary = run(&db, "u1", &container.id).unwrap();
        assert_eq!(summary.orphan_blocks_deleted, 1);
        assert!(db.get_block(&orphan.id).unwrap().is_none());
        assert!(db.get_block(&weekly.id).unwrap().is_some());
        assert!(db.get_block(&tracked.id).unwrap().is_some());
    }

    #[test]
    fn mixed_duplicate_group_loses_untracked_members() {
        let db = PlannerDb::open_memory().unwrap();
        let container = db.default_container("u1").unwrap();
        let due = NaiveDate::from_ymd_opt(2025, 5, 2);

        let tracked = Task::new("u1", &container.id, "Quiz", due);
        let duplicate = Task::new("u1", &container.id, "Quiz", due);
        db.insert_task(&tracked).unwrap();
        db.insert_task(&duplicate).unwrap();
        track_task(&db, &tracked.id, "uid-q");

        let summary = run(&db, "u1", &container.id).unwrap();
        assert_eq!(summary.duplicate_tasks_removed, 1);
        assert!(!db.get_task(&tracked.id).unwrap().unwrap().is_deleted());
        assert!(db.get_task(&duplicate.id).unwrap().unwrap().is_deleted());
    }

    #[test]
    fn all_untracked_group_is_left_alone() {
        let db = PlannerDb::open_memory().unwrap();
        let container = db.default_container("u1").unwrap();
        let due = NaiveDate::from_ymd_opt(2025, 5, 2);

        let a = Task::new("u1", &container.id, "Quiz", due);
        let b = Task::new("u1", &container.id, "Quiz", due);
        db.insert_task(&a).unwrap();
        db.insert_task(&b).unwrap();

        let summary = run(&db, "u1", &container.id).unwrap();
        assert_eq!(summary.duplicate_tasks_removed, 0);
        assert!(!db.get_task(&a.id).unwrap().unwrap().is_deleted());
        assert!(!db.get_task(&b.id).unwrap().unwrap().is_deleted());
    }

    #[test]
    fn distinct_titles_or_dates_are_not_duplicates() {
        let db = PlannerDb::open_memory().unwrap();
        let container = db.default_container("u1").unwrap();

        let quiz = Task::new("u1", &container.id, "Quiz", NaiveDate::from_ymd_opt(2025, 5, 2));
        let quiz_later = Task::new("u1", &container.id, "Quiz", NaiveDate::from_ymd_opt(2025, 5, 9));
        db.insert_task(&quiz).unwrap();
        db.insert_task(&quiz_later).unwrap();
        track_task(&db, &quiz.id, "uid-q");

        let summary = run(&db, "u1", &container.id).unwrap();
        assert_eq!(summary.duplicate_tasks_removed, 0);
    }
}
