//! End-to-end sync passes against an in-memory database, with mockito
//! standing in for the feed host and the remote calendar API.

use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use studyplan_core::calendar::source::{CalendarSource, ImportMode};
use studyplan_core::integrations::oauth::{OAuthConfig, ProviderConnection};
use studyplan_core::storage::PlannerDb;
use studyplan_core::sync::SyncEngine;
use studyplan_core::task::Task;

const USER: &str = "u1";

fn engine(db: &PlannerDb) -> SyncEngine<'_> {
    SyncEngine::new(db, OAuthConfig::google("client-id", "client-secret"), Tz::UTC)
}

fn ics_doc(events: &[&str]) -> String {
    let mut lines = vec!["BEGIN:VCALENDAR", "VERSION:2.0", "PRODID:-//studyplan tests//EN"];
    lines.extend_from_slice(events);
    lines.push("END:VCALENDAR");
    let mut doc = lines.join("\r\n");
    doc.push_str("\r\n");
    doc
}

fn essay_and_lab() -> String {
    ics_doc(&[
        "BEGIN:VEVENT",
        "UID:essay-1",
        "SUMMARY:Essay due",
        "DTSTART;VALUE=DATE:20250310",
        "END:VEVENT",
        "BEGIN:VEVENT",
        "UID:lab-1",
        "SUMMARY:Lab",
        "DTSTART:20250311T090000Z",
        "DTEND:20250311T103000Z",
        "END:VEVENT",
    ])
}

#[tokio::test]
async fn smart_upload_splits_tasks_and_blocks() {
    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_upload(
        USER,
        "Syllabus",
        essay_and_lab(),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    let report = engine(&db).sync_source(&source.id).await.unwrap();

    assert_eq!(report.tasks_created, 1);
    assert_eq!(report.schedule_blocks_created, 1);
    assert_eq!(report.events_processed, 2);
    assert!(report.errors.is_empty());

    let tasks = db.list_tasks(USER).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Essay due");
    assert_eq!(tasks[0].due_date, NaiveDate::from_ymd_opt(2025, 3, 10));

    let blocks = db.list_blocks(USER).unwrap();
    assert_eq!(blocks.len(), 1);
    let lab = &blocks[0];
    assert_eq!(lab.title, "Lab");
    assert_eq!(lab.day_of_week, 1); // Tuesday
    assert_eq!(lab.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    assert_eq!(lab.end_time, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
    assert_eq!(lab.start_date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
    assert_eq!(lab.end_date, lab.start_date);

    let after = db.get_source(&source.id).unwrap().unwrap();
    assert!(after.last_synced_at.is_some());
    assert!(after.last_error.is_none());
}

#[tokio::test]
async fn second_pass_with_no_upstream_change_is_a_no_op() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed.ics")
        .with_status(200)
        .with_body(essay_and_lab())
        .create_async()
        .await;

    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_feed(
        USER,
        "Uni feed",
        format!("{}/feed.ics", server.url()),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    let first = engine(&db).sync_source(&source.id).await.unwrap();
    assert!(first.has_changes());

    let second = engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(second.tasks_created, 0);
    assert_eq!(second.tasks_updated, 0);
    assert_eq!(second.tasks_deleted, 0);
    assert_eq!(second.schedule_blocks_created, 0);
    assert_eq!(second.schedule_blocks_updated, 0);
    assert_eq!(second.schedule_blocks_deleted, 0);
    assert!(second.events_processed > 0);
    assert!(!second.has_changes());
}

#[tokio::test]
async fn upstream_title_change_converges_in_one_pass() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed.ics")
        .with_status(200)
        .with_body(ics_doc(&[
            "BEGIN:VEVENT",
            "UID:essay-1",
            "SUMMARY:Essay draft",
            "DTSTART;VALUE=DATE:20250310",
            "END:VEVENT",
        ]))
        .create_async()
        .await;

    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_feed(
        USER,
        "Uni feed",
        format!("{}/feed.ics", server.url()),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    engine(&db).sync_source(&source.id).await.unwrap();

    // Upstream rename; the newer mock takes precedence for later requests.
    server
        .mock("GET", "/feed.ics")
        .with_status(200)
        .with_body(ics_doc(&[
            "BEGIN:VEVENT",
            "UID:essay-1",
            "SUMMARY:Essay final",
            "DTSTART;VALUE=DATE:20250310",
            "END:VEVENT",
        ]))
        .create_async()
        .await;

    let second = engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(second.tasks_updated, 1);
    assert_eq!(second.tasks_created, 0);
    assert_eq!(db.list_tasks(USER).unwrap()[0].title, "Essay final");

    let third = engine(&db).sync_source(&source.id).await.unwrap();
    assert!(!third.has_changes());
}

#[tokio::test]
async fn vanished_upstream_event_is_deleted_from_feed_sources() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed.ics")
        .with_status(200)
        .with_body(essay_and_lab())
        .create_async()
        .await;

    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_feed(
        USER,
        "Uni feed",
        format!("{}/feed.ics", server.url()),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(db.list_imported_events(USER, &source.id).unwrap().len(), 2);

    // The lab disappears upstream; the essay stays. The newer mock takes
    // precedence for later requests.
    server
        .mock("GET", "/feed.ics")
        .with_status(200)
        .with_body(ics_doc(&[
            "BEGIN:VEVENT",
            "UID:essay-1",
            "SUMMARY:Essay due",
            "DTSTART;VALUE=DATE:20250310",
            "END:VEVENT",
        ]))
        .create_async()
        .await;

    let second = engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(second.schedule_blocks_deleted, 1);
    assert_eq!(second.tasks_deleted, 0);

    assert!(db.list_blocks(USER).unwrap().is_empty());
    assert_eq!(db.list_tasks(USER).unwrap().len(), 1);
    assert_eq!(db.list_imported_events(USER, &source.id).unwrap().len(), 1);
}

#[tokio::test]
async fn failed_fetch_never_triggers_deletion() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed.ics")
        .with_status(200)
        .with_body(essay_and_lab())
        .create_async()
        .await;

    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_feed(
        USER,
        "Uni feed",
        format!("{}/feed.ics", server.url()),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    engine(&db).sync_source(&source.id).await.unwrap();

    // The feed host goes down; the newer mock takes precedence.
    server
        .mock("GET", "/feed.ics")
        .with_status(503)
        .create_async()
        .await;

    let second = engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(second.tasks_deleted, 0);
    assert_eq!(second.schedule_blocks_deleted, 0);
    assert_eq!(second.errors.len(), 1);
    assert!(second.errors[0].contains("Uni feed"));

    // Everything imported by the first pass survives the outage.
    assert_eq!(db.list_tasks(USER).unwrap().len(), 1);
    assert_eq!(db.list_blocks(USER).unwrap().len(), 1);

    let after = db.get_source(&source.id).unwrap().unwrap();
    assert!(after.last_error.is_some());
}

#[tokio::test]
async fn identical_untracked_task_is_adopted_not_duplicated() {
    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();

    // Leftover from an earlier partial pass.
    let existing = Task::new(
        USER,
        &container.id,
        "Exam",
        NaiveDate::from_ymd_opt(2025, 5, 1),
    );
    db.insert_task(&existing).unwrap();

    let source = CalendarSource::new_upload(
        USER,
        "Syllabus",
        ics_doc(&[
            "BEGIN:VEVENT",
            "UID:exam-1",
            "SUMMARY:Exam",
            "DTSTART;VALUE=DATE:20250501",
            "END:VEVENT",
        ]),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    let report = engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(report.tasks_created, 0);
    assert_eq!(report.tasks_updated, 1);

    let tasks = db.list_tasks(USER).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, existing.id);

    let rows = db.list_imported_events(USER, &source.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].created_id, existing.id);
}

#[tokio::test]
async fn duplicate_of_a_tracked_task_is_cleaned_up() {
    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_upload(
        USER,
        "Syllabus",
        ics_doc(&[
            "BEGIN:VEVENT",
            "UID:quiz-1",
            "SUMMARY:Quiz",
            "DTSTART;VALUE=DATE:20250502",
            "END:VEVENT",
        ]),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    // First pass imports the quiz and tracks it.
    engine(&db).sync_source(&source.id).await.unwrap();

    // A buggy earlier run left an identical untracked twin behind.
    let twin = Task::new(
        USER,
        &container.id,
        "Quiz",
        NaiveDate::from_ymd_opt(2025, 5, 2),
    );
    db.insert_task(&twin).unwrap();
    assert_eq!(db.list_tasks(USER).unwrap().len(), 2);

    // Cleanup at the start of the next pass removes only the twin.
    engine(&db).sync_source(&source.id).await.unwrap();
    let remaining = db.list_tasks(USER).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, twin.id);
    assert!(db.get_task(&twin.id).unwrap().unwrap().is_deleted());
}

#[tokio::test]
async fn one_broken_calendar_does_not_block_the_others() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/calendars/good/events")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            serde_json::json!({
                "items": [{
                    "id": "ev-1",
                    "status": "confirmed",
                    "summary": "Essay due",
                    "start": {"date": "2025-03-10"},
                    "end": {"date": "2025-03-11"}
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/calendars/bad/events")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();

    let connection = ProviderConnection::new(USER, "google", "valid-token", None, Some(3600));
    db.insert_connection(&connection).unwrap();

    let source = CalendarSource::new_remote(
        USER,
        "School account",
        &connection.id,
        vec!["good".to_string(), "bad".to_string()],
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    let report = engine(&db)
        .with_google_base_url(server.url())
        .sync_source(&source.id)
        .await
        .unwrap();

    assert_eq!(report.tasks_created, 1);
    assert_eq!(report.calendars_processed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("bad"));

    let after = db.get_source(&source.id).unwrap().unwrap();
    assert!(after.last_error.as_deref().unwrap().contains("bad"));
}

#[tokio::test]
async fn remote_source_without_reachable_token_reports_reconnect() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(serde_json::json!({"error": "invalid_grant"}).to_string())
        .create_async()
        .await;

    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();

    // Expired token whose refresh the provider rejects.
    let mut connection =
        ProviderConnection::new(USER, "google", "stale", Some("refresh-1".to_string()), Some(-60));
    connection.token_expires_at = Some(Utc::now() - chrono::Duration::minutes(10));
    db.insert_connection(&connection).unwrap();

    let source = CalendarSource::new_remote(
        USER,
        "School account",
        &connection.id,
        vec!["primary".to_string()],
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    let oauth = OAuthConfig {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        token_url: format!("{}/token", server.url()),
    };
    let engine = SyncEngine::new(&db, oauth, Tz::UTC).with_google_base_url(server.url());

    let err = engine.sync_source(&source.id).await.unwrap_err();
    assert!(err.to_string().contains("reconnect required"));

    // The failure is recorded and the advisory flag released.
    let after = db.get_source(&source.id).unwrap().unwrap();
    assert!(after.last_error.is_some());
    assert!(db.try_begin_sync(&source.id).unwrap());
}

#[tokio::test]
async fn paused_sources_refuse_to_sync() {
    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_upload(
        USER,
        "Syllabus",
        essay_and_lab(),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();
    db.set_source_active(&source.id, false).unwrap();

    let err = engine(&db).sync_source(&source.id).await.unwrap_err();
    assert!(err.to_string().contains("paused"));
    assert!(db.list_tasks(USER).unwrap().is_empty());
}

#[tokio::test]
async fn sync_all_isolates_failing_sources() {
    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();

    let healthy = CalendarSource::new_upload(
        USER,
        "Syllabus",
        essay_and_lab(),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&healthy).unwrap();

    // Misconfigured: remote source whose connection row is gone.
    let broken = CalendarSource::new_remote(
        USER,
        "Old account",
        "missing-connection",
        vec!["primary".to_string()],
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&broken).unwrap();

    let report = engine(&db).sync_all(USER).await.unwrap();

    assert_eq!(report.tasks_created, 1);
    assert_eq!(report.schedule_blocks_created, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("Old account"));
}

#[tokio::test]
async fn cancelled_events_are_dropped_not_counted() {
    let db = PlannerDb::open_memory().unwrap();
    let container = db.default_container(USER).unwrap();
    let source = CalendarSource::new_upload(
        USER,
        "Syllabus",
        ics_doc(&[
            "BEGIN:VEVENT",
            "UID:kept",
            "SUMMARY:Seminar",
            "DTSTART:20250312T100000Z",
            "END:VEVENT",
            "BEGIN:VEVENT",
            "UID:cancelled",
            "SUMMARY:Cancelled seminar",
            "STATUS:CANCELLED",
            "DTSTART:20250313T100000Z",
            "END:VEVENT",
        ]),
        ImportMode::Smart,
        &container.id,
    );
    db.insert_source(&source).unwrap();

    let report = engine(&db).sync_source(&source.id).await.unwrap();
    assert_eq!(report.events_processed, 1);
    assert_eq!(report.schedule_blocks_created, 1);
    assert_eq!(db.list_blocks(USER).unwrap().len(), 1);
}
