//! The sync orchestrator.
//!
//! One engine instance drives passes over configured sources. A pass takes
//! the source's advisory syncing flag, runs cleanup, fetches and normalizes
//! upstream events, reconciles them, and records the outcome on the source.
//! Per-event and per-calendar failures land in the pass's error list; only
//! source-level setup failures abort a pass, and a failing source never
//! stops its siblings in a multi-source run.

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::calendar::event::{normalize, RawEvent};
use crate::calendar::google::{self, GoogleCalendarApi};
use crate::calendar::ics;
use crate::calendar::source::{CalendarSource, SourceKind};
use crate::error::{CoreError, SyncError};
use crate::integrations::oauth::{self, OAuthConfig};
use crate::storage::PlannerDb;

use super::cleanup;
use super::reconciler::Reconciler;
use super::{summarize_errors, SyncReport};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Drives sync passes for one user's calendar sources.
pub struct SyncEngine<'a> {
    db: &'a PlannerDb,
    http: reqwest::Client,
    oauth: OAuthConfig,
    timezone: Tz,
    google_base_url: Option<String>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(db: &'a PlannerDb, oauth: OAuthConfig, timezone: Tz) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            db,
            http,
            oauth,
            timezone,
            google_base_url: None,
        }
    }

    /// Point remote-API calls at a different base URL (tests).
    pub fn with_google_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.google_base_url = Some(base_url.into());
        self
    }

    /// Run one sync pass for a single source.
    ///
    /// The advisory syncing flag is always released, and the outcome
    /// (`last_synced_at`, capped `last_error`) recorded, whether the pass
    /// succeeds or fails.
    pub async fn sync_source(&self, source_id: &str) -> Result<SyncReport, CoreError> {
        let source = self
            .db
            .get_source(source_id)?
            .ok_or_else(|| SyncError::SourceNotFound(source_id.to_string()))?;

        if !source.is_active {
            return Err(SyncError::SourcePaused(source.name.clone()).into());
        }
        if !self.db.try_begin_sync(&source.id)? {
            return Err(SyncError::AlreadySyncing(source.name.clone()).into());
        }

        let outcome = self.run_pass(&source).await;
        match outcome {
            Ok(report) => {
                self.db
                    .finish_sync(&source.id, summarize_errors(&report.errors).as_deref())?;
                info!(
                    source = %source.name,
                    events = report.events_processed,
                    tasks_created = report.tasks_created,
                    blocks_created = report.schedule_blocks_created,
                    errors = report.errors.len(),
                    "sync pass finished"
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(persist_err) = self.db.finish_sync(&source.id, Some(&message)) {
                    warn!(error = %persist_err, "failed to record sync failure");
                }
                Err(e)
            }
        }
    }

    /// Run one pass for every active source the user has.
    ///
    /// A source-level failure is folded into the aggregate error list so
    /// sibling sources still sync.
    pub async fn sync_all(&self, user_id: &str) -> Result<SyncReport, CoreError> {
        let mut report = SyncReport::default();

        for source in self.db.list_active_sources(user_id)? {
            match self.sync_source(&source.id).await {
                Ok(pass) => report.merge(pass),
                Err(e) => {
                    warn!(source = %source.name, error = %e, "source sync failed");
                    report.errors.push(format!("{}: {}", source.name, e));
                }
            }
        }

        Ok(report)
    }

    async fn run_pass(&self, source: &CalendarSource) -> Result<SyncReport, CoreError> {
        let mut report = SyncReport::default();

        // The target container may have been deleted since the source was
        // configured; fall back to the user's default bucket.
        let container_id = match self.db.get_container(&source.container_id)? {
            Some(container) => container.id,
            None => self.db.default_container(&source.user_id)?.id,
        };

        // Repair drift before reconciling, so adoption and duplicate
        // detection see a clean slate.
        if let Err(e) = cleanup::run(self.db, &source.user_id, &container_id) {
            report.errors.push(format!("cleanup: {e}"));
        }

        let (raw_events, fetch_complete) = self.fetch_events(source, &mut report).await?;

        let mut reconciler = Reconciler::new(self.db, source, &container_id)?;
        for raw in &raw_events {
            let Some(event) = normalize(raw, source.kind, self.timezone) else {
                continue;
            };
            report.events_processed += 1;
            match reconciler.apply(&event) {
                Ok(applied) => report.record(applied),
                Err(e) => report.errors.push(format!("{}: {}", event.title, e)),
            }
        }

        // Deletion detection needs a complete upstream set; skip it when
        // any part of the fetch failed.
        if fetch_complete {
            reconciler.sweep_deleted(&mut report);
        }

        Ok(report)
    }

    /// Fetch raw events for a source. Returns the events plus whether the
    /// fetch covered the source completely (a prerequisite for deletion
    /// detection). Per-feed and per-calendar failures are recorded and the
    /// fetch continues; only setup problems bubble up.
    async fn fetch_events(
        &self,
        source: &CalendarSource,
        report: &mut SyncReport,
    ) -> Result<(Vec<RawEvent>, bool), CoreError> {
        match source.kind {
            SourceKind::IcsFeed => {
                let feed_url = source
                    .feed_url
                    .as_deref()
                    .ok_or_else(|| SyncError::MissingFeedUrl(source.name.clone()))?;

                let fetched = match ics::fetch_ics_text(&self.http, feed_url).await {
                    Ok(text) => ics::parse_ics_events(&text),
                    Err(e) => Err(e),
                };
                match fetched {
                    Ok(events) => {
                        report.calendars_processed += 1;
                        Ok((events, true))
                    }
                    Err(e) => {
                        warn!(source = %source.name, error = %e, "feed fetch failed");
                        report.errors.push(format!("feed {}: {}", source.name, e));
                        Ok((Vec::new(), false))
                    }
                }
            }
            SourceKind::IcsUpload => {
                let payload = source
                    .ics_payload
                    .as_deref()
                    .ok_or_else(|| SyncError::MissingPayload(source.name.clone()))?;

                match ics::parse_ics_events(payload) {
                    Ok(events) => {
                        report.calendars_processed += 1;
                        Ok((events, true))
                    }
                    Err(e) => {
                        report.errors.push(format!("upload {}: {}", source.name, e));
                        Ok((Vec::new(), false))
                    }
                }
            }
            SourceKind::RemoteApi => {
                let connection_id = source
                    .connection_id
                    .as_deref()
                    .ok_or_else(|| SyncError::NotConnected(source.name.clone()))?;
                let connection = self
                    .db
                    .get_connection(connection_id)?
                    .ok_or_else(|| SyncError::NotConnected(source.name.clone()))?;

                if source.selected_calendars.is_empty() {
                    return Err(SyncError::NoCalendarsSelected(source.name.clone()).into());
                }

                let token =
                    oauth::valid_access_token(self.db, &self.http, &self.oauth, &connection)
                        .await
                        .ok_or(SyncError::ReconnectRequired)?;

                let api = match &self.google_base_url {
                    Some(base) => GoogleCalendarApi::with_base_url(self.http.clone(), base),
                    None => GoogleCalendarApi::new(self.http.clone()),
                };
                let window = google::sync_window(Utc::now());

                let mut events = Vec::new();
                let mut complete = true;
                for calendar_id in &source.selected_calendars {
                    match api.fetch_calendar_events(&token, calendar_id, window).await {
                        Ok(calendar_events) => {
                            report.calendars_processed += 1;
                            events.extend(calendar_events);
                        }
                        Err(e) => {
                            warn!(calendar = %calendar_id, error = %e, "calendar fetch failed");
                            report.errors.push(format!("calendar {calendar_id}: {e}"));
                            complete = false;
                        }
                    }
                }
                Ok((events, complete))
            }
        }
    }
}
