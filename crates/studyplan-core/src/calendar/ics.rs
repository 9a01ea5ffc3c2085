//! ICS feed fetching and VEVENT parsing.
//!
//! Both feed subscriptions and one-time uploads go through
//! [`parse_ics_events`]; only feeds also hit the network. Individual
//! cancelled or malformed VEVENTs are skipped with a warning so one bad
//! entry never aborts the whole feed.

use std::str::FromStr;

use chrono::TimeZone;
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike};
use tracing::warn;

use crate::error::FeedError;

use super::event::{RawEvent, RawEventTime};

/// Calendar id used in external uids for ICS-based sources, which have no
/// per-calendar structure of their own.
pub const ICS_CALENDAR_ID: &str = "ics";

/// Fetch the raw ICS text behind a feed URL.
///
/// `webcal://` URLs are rewritten to `https://` before fetching.
pub async fn fetch_ics_text(client: &reqwest::Client, url: &str) -> Result<String, FeedError> {
    let fetch_url = if let Some(rest) = url.strip_prefix("webcal://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    };

    let resp = client
        .get(&fetch_url)
        .send()
        .await
        .map_err(|e| FeedError::Http { url: fetch_url.clone(), message: e.to_string() })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FeedError::Status {
            context: format!("feed {fetch_url}"),
            status: status.as_u16(),
        });
    }

    resp.text()
        .await
        .map_err(|e| FeedError::Http { url: fetch_url, message: e.to_string() })
}

/// Parse every VEVENT in an ICS document into raw events.
///
/// A document that fails to parse at all is a [`FeedError::Parse`]; events
/// missing a UID or start are dropped individually.
pub fn parse_ics_events(text: &str) -> Result<Vec<RawEvent>, FeedError> {
    let calendar = Calendar::from_str(text).map_err(FeedError::Parse)?;

    let mut events = Vec::new();
    for event in calendar.components.iter().filter_map(|c| c.as_event()) {
        let Some(uid) = event.get_uid() else {
            warn!("skipping VEVENT without UID");
            continue;
        };
        let Some(start_dpt) = event.get_start() else {
            warn!(uid, "skipping VEVENT without DTSTART");
            continue;
        };
        let Some(start) = date_perhaps_time_to_raw(&start_dpt) else {
            warn!(uid, "skipping VEVENT with unusable DTSTART");
            continue;
        };

        let cancelled = event
            .properties()
            .get("STATUS")
            .map(|p| p.value().eq_ignore_ascii_case("CANCELLED"))
            .unwrap_or(false);

        let end = event.get_end().and_then(|dpt| date_perhaps_time_to_raw(&dpt));

        events.push(RawEvent {
            native_id: uid.to_string(),
            calendar_id: ICS_CALENDAR_ID.to_string(),
            title: event.get_summary().map(str::to_string),
            cancelled,
            start,
            end,
        });
    }

    Ok(events)
}

fn date_perhaps_time_to_raw(dpt: &DatePerhapsTime) -> Option<RawEventTime> {
    match dpt {
        DatePerhapsTime::Date(d) => Some(RawEventTime::AllDay(*d)),
        DatePerhapsTime::DateTime(cdt) => match cdt {
            CalendarDateTime::Utc(dt) => Some(RawEventTime::Timed(*dt)),
            // Floating times carry no zone; treat as UTC (best effort).
            CalendarDateTime::Floating(ndt) => Some(RawEventTime::Timed(ndt.and_utc())),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                match tzid.parse::<Tz>() {
                    Ok(tz) => tz
                        .from_local_datetime(date_time)
                        .single()
                        .map(|dt| RawEventTime::Timed(dt.with_timezone(&chrono::Utc))),
                    Err(_) => {
                        warn!(tzid = %tzid, "unknown TZID, treating local time as UTC");
                        Some(RawEventTime::Timed(date_time.and_utc()))
                    }
                }
            }
        },
    }
}
