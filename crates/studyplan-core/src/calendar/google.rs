//! Google Calendar API fetcher.
//!
//! Events are queried per calendar over a fixed window (one week back,
//! three months ahead) with recurring events expanded into single
//! occurrences, following `nextPageToken` pagination up to the page cap.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FeedError;

use super::event::{RawEvent, RawEventTime};

const GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Sync window bounds relative to `now`.
const WINDOW_DAYS_PAST: i64 = 7;
const WINDOW_DAYS_AHEAD: i64 = 90;

/// Server-side page size cap.
const MAX_RESULTS_PER_PAGE: u32 = 250;

/// The fixed fetch window for a pass starting at `now`.
pub fn sync_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now - Duration::days(WINDOW_DAYS_PAST),
        now + Duration::days(WINDOW_DAYS_AHEAD),
    )
}

/// Thin client over the Google Calendar v3 events API.
pub struct GoogleCalendarApi {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: GOOGLE_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API base (tests).
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// List the calendars visible to the authenticated account as
    /// `(id, summary)` pairs.
    pub async fn list_calendars(&self, token: &str) -> Result<Vec<(String, String)>, FeedError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let body = self.get_json(token, &url, &[], "calendar list").await?;

        let calendars = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = item["id"].as_str()?;
                        let summary = item["summary"].as_str().unwrap_or(id);
                        Some((id.to_string(), summary.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(calendars)
    }

    /// Fetch every event in one calendar within the window, following
    /// pagination.
    pub async fn fetch_calendar_events(
        &self,
        token: &str,
        calendar_id: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<RawEvent>, FeedError> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);
        let (time_min, time_max) = window;
        let max_results = MAX_RESULTS_PER_PAGE.to_string();

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("maxResults", max_results.clone()),
            ];
            if let Some(page) = &page_token {
                query.push(("pageToken", page.clone()));
            }

            let body = self
                .get_json(token, &url, &query, &format!("calendar {calendar_id}"))
                .await?;

            let (page_events, next) = parse_events_page(&body, calendar_id);
            events.extend(page_events);

            match next {
                Some(next_token) => page_token = Some(next_token),
                None => break,
            }
        }

        debug!(calendar_id, count = events.len(), "fetched remote events");
        Ok(events)
    }

    async fn get_json(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<Value, FeedError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FeedError::Http { url: url.to_string(), message: e.to_string() })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                context: context.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))
    }
}

/// Extract the raw events and the next page token from one events page.
///
/// Items without an id or a usable start are dropped with a warning.
pub fn parse_events_page(body: &Value, calendar_id: &str) -> (Vec<RawEvent>, Option<String>) {
    let mut events = Vec::new();

    if let Some(items) = body["items"].as_array() {
        for item in items {
            let Some(id) = item["id"].as_str() else {
                warn!(calendar_id, "skipping remote event without id");
                continue;
            };
            let Some(start) = parse_event_time(&item["start"]) else {
                warn!(calendar_id, id, "skipping remote event without start");
                continue;
            };

            events.push(RawEvent {
                native_id: id.to_string(),
                calendar_id: calendar_id.to_string(),
                title: item["summary"].as_str().map(str::to_string),
                cancelled: item["status"].as_str() == Some("cancelled"),
                start,
                end: parse_event_time(&item["end"]),
            });
        }
    }

    let next = body["nextPageToken"].as_str().map(str::to_string);
    (events, next)
}

/// Google encodes all-day boundaries as `{"date": "2025-03-10"}` and timed
/// ones as `{"dateTime": "2025-03-11T09:00:00Z"}`.
fn parse_event_time(value: &Value) -> Option<RawEventTime> {
    if let Some(dt) = value["dateTime"].as_str() {
        let parsed = DateTime::parse_from_rfc3339(dt).ok()?;
        return Some(RawEventTime::Timed(parsed.with_timezone(&Utc)));
    }
    if let Some(d) = value["date"].as_str() {
        let parsed = NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()?;
        return Some(RawEventTime::AllDay(parsed));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_timed_and_all_day_items() {
        let body = json!({
            "items": [
                {
                    "id": "ev1",
                    "status": "confirmed",
                    "summary": "Lab",
                    "start": {"dateTime": "2025-03-11T09:00:00Z"},
                    "end": {"dateTime": "2025-03-11T10:30:00Z"}
                },
                {
                    "id": "ev2",
                    "status": "confirmed",
                    "summary": "Essay due",
                    "start": {"date": "2025-03-10"},
                    "end": {"date": "2025-03-11"}
                }
            ]
        });

        let (events, next) = parse_events_page(&body, "primary");
        assert_eq!(events.len(), 2);
        assert!(next.is_none());
        assert!(matches!(events[0].start, RawEventTime::Timed(_)));
        assert!(matches!(events[1].start, RawEventTime::AllDay(_)));
        assert_eq!(events[1].calendar_id, "primary");
    }

    #[test]
    fn carries_page_token_and_cancelled_flag() {
        let body = json!({
            "items": [
                {
                    "id": "ev1",
                    "status": "cancelled",
                    "start": {"dateTime": "2025-03-11T09:00:00Z"}
                }
            ],
            "nextPageToken": "page-2"
        });

        let (events, next) = parse_events_page(&body, "primary");
        assert_eq!(events.len(), 1);
        assert!(events[0].cancelled);
        assert_eq!(next.as_deref(), Some("page-2"));
    }

    #[test]
    fn drops_items_without_id_or_start() {
        let body = json!({
            "items": [
                {"summary": "no id", "start": {"date": "2025-03-10"}},
                {"id": "no-start", "summary": "x"},
                {"id": "ok", "start": {"date": "2025-03-10"}}
            ]
        });

        let (events, _) = parse_events_page(&body, "primary");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].native_id, "ok");
    }

    #[test]
    fn window_spans_week_back_to_three_months_ahead() {
        let now = Utc::now();
        let (min, max) = sync_window(now);
        assert_eq!(now - min, Duration::days(7));
        assert_eq!(max - now, Duration::days(90));
    }

    #[tokio::test]
    async fn fetch_follows_pagination() {
        let mut server = mockito::Server::new_async().await;

        // Registered catch-all first: mockito gives the later, more specific
        // pageToken mock precedence for the second request.
        let page1 = server
            .mock("GET", "/calendars/primary/events")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "items": [{"id": "a", "summary": "A", "start": {"date": "2025-03-10"}}],
                    "nextPageToken": "page-2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/calendars/primary/events")
            .match_query(mockito::Matcher::UrlEncoded("pageToken".into(), "page-2".into()))
            .with_status(200)
            .with_body(
                json!({"items": [{"id": "b", "summary": "B", "start": {"date": "2025-03-11"}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let api = GoogleCalendarApi::with_base_url(reqwest::Client::new(), server.url());
        let events = api
            .fetch_calendar_events("tok", "primary", sync_window(Utc::now()))
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_calendar_scoped_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendars/broken/events")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let api = GoogleCalendarApi::with_base_url(reqwest::Client::new(), server.url());
        let err = api
            .fetch_calendar_events("tok", "broken", sync_window(Utc::now()))
            .await
            .unwrap_err();

        match err {
            FeedError::Status { context, status } => {
                assert!(context.contains("broken"));
                assert_eq!(status, 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
