//! Canonical event representation and normalization.
//!
//! Provider fetchers produce [`RawEvent`]s; [`normalize`] converts them into
//! the canonical form the reconciler consumes. Normalization is where
//! timezone conversion, the default end time, and the change-detection hash
//! all happen, so the reconciler only ever sees local dates and times.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::source::{ImportMode, SourceKind};

/// Start or end of a provider-native event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventTime {
    /// Date-only (all-day) marker.
    AllDay(NaiveDate),
    /// Concrete instant.
    Timed(DateTime<Utc>),
}

/// A provider-native event as the fetchers hand it over.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub native_id: String,
    /// Calendar the event came from ("ics" for feed/upload sources).
    pub calendar_id: String,
    pub title: Option<String>,
    pub cancelled: bool,
    pub start: RawEventTime,
    pub end: Option<RawEventTime>,
}

/// Canonical in-memory event, the unit the reconciler works on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub external_uid: String,
    pub title: String,
    pub is_all_day: bool,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub hash: String,
}

/// Shape an imported event takes: task or schedule block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventShape {
    Task,
    Schedule,
}

impl EventShape {
    /// Resolve the shape for an event under the source's import mode.
    ///
    /// "tasks" and "schedule" force the shape; "smart" infers it from
    /// all-day-ness.
    pub fn for_mode(mode: ImportMode, is_all_day: bool) -> Self {
        match mode {
            ImportMode::Tasks => EventShape::Task,
            ImportMode::Schedule => EventShape::Schedule,
            ImportMode::Smart => {
                if is_all_day {
                    EventShape::Task
                } else {
                    EventShape::Schedule
                }
            }
        }
    }
}

/// Stable external uid: composite of source kind, calendar id and the
/// provider's native event id. Deterministic across passes.
pub fn external_uid(kind: SourceKind, calendar_id: &str, native_id: &str) -> String {
    format!("{}:{}:{}", kind.as_str(), calendar_id, native_id)
}

/// Change-detection hash over (title, date, start_time) only.
///
/// Changes to any other field are deliberately invisible: the hash is a
/// cheap dirty check, not an integrity measure.
pub fn event_hash(title: &str, date: NaiveDate, start_time: Option<NaiveTime>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(b"|");
    match start_time {
        Some(t) => hasher.update(t.format("%H:%M").to_string().as_bytes()),
        None => hasher.update(b"all-day"),
    }
    hex::encode(&hasher.finalize()[..16])
}

/// Default end for a timed event with no usable end: start + 1h, clamped so
/// it never crosses 23:00 on the same day.
fn default_end(start: NaiveTime) -> NaiveTime {
    let cap = NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default();
    let (end, rollover) = start.overflowing_add_signed(Duration::hours(1));
    if rollover != 0 || end > cap {
        cap
    } else {
        end
    }
}

/// Convert a raw provider event into canonical form.
///
/// Returns `None` for cancelled or untitled events, which are dropped
/// without being counted. Timed events are converted into the user's
/// timezone to obtain the local date and wall-clock times.
pub fn normalize(raw: &RawEvent, kind: SourceKind, tz: Tz) -> Option<CanonicalEvent> {
    if raw.cancelled {
        return None;
    }
    let title = raw.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    let (is_all_day, date, start_time, end_time) = match raw.start {
        RawEventTime::AllDay(date) => (true, date, None, None),
        RawEventTime::Timed(start_utc) => {
            let local_start = start_utc.with_timezone(&tz);
            let date = local_start.date_naive();
            let start = truncate_to_minute(local_start.time());

            let end = match raw.end {
                Some(RawEventTime::Timed(end_utc)) => {
                    let local_end = end_utc.with_timezone(&tz);
                    if local_end.date_naive() == date {
                        truncate_to_minute(local_end.time())
                    } else {
                        // Spills past midnight; keep the block on its day.
                        default_end(start)
                    }
                }
                _ => default_end(start),
            };
            (false, date, Some(start), Some(end))
        }
    };

    Some(CanonicalEvent {
        external_uid: external_uid(kind, &raw.calendar_id, &raw.native_id),
        title: title.to_string(),
        is_all_day,
        date,
        start_time,
        end_time,
        hash: event_hash(title, date, start_time),
    })
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw_timed(id: &str, title: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> RawEvent {
        RawEvent {
            native_id: id.to_string(),
            calendar_id: "ics".to_string(),
            title: Some(title.to_string()),
            cancelled: false,
            start: RawEventTime::Timed(start),
            end: end.map(RawEventTime::Timed),
        }
    }

    #[test]
    fn all_day_event_keeps_date_verbatim() {
        let raw = RawEvent {
            native_id: "e1".to_string(),
            calendar_id: "ics".to_string(),
            title: Some("Essay due".to_string()),
            cancelled: false,
            start: RawEventTime::AllDay(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()),
            end: None,
        };
        let event = normalize(&raw, SourceKind::IcsFeed, chrono_tz::Tz::UTC).unwrap();
        assert!(event.is_all_day);
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert!(event.start_time.is_none());
        assert_eq!(event.external_uid, "ics_feed:ics:e1");
    }

    #[test]
    fn timed_event_converts_into_user_timezone() {
        // 13:30 UTC on 2025-03-11 is 09:30 in New York (EDT).
        let start = Utc.with_ymd_and_hms(2025, 3, 11, 13, 30, 0).unwrap();
        let raw = raw_timed("e2", "Lab", start, None);
        let tz: Tz = "America/New_York".parse().unwrap();

        let event = normalize(&raw, SourceKind::RemoteApi, tz).unwrap();
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(event.start_time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(event.end_time, NaiveTime::from_hms_opt(10, 30, 0));
    }

    #[test]
    fn missing_end_defaults_to_one_hour() {
        let start = Utc.with_ymd_and_hms(2025, 5, 2, 14, 0, 0).unwrap();
        let event = normalize(&raw_timed("e", "Lecture", start, None), SourceKind::IcsFeed, Tz::UTC)
            .unwrap();
        assert_eq!(event.end_time, NaiveTime::from_hms_opt(15, 0, 0));
    }

    #[test]
    fn late_start_end_is_clamped_to_day_end() {
        let start = Utc.with_ymd_and_hms(2025, 5, 2, 22, 30, 0).unwrap();
        let event = normalize(&raw_timed("e", "Late", start, None), SourceKind::IcsFeed, Tz::UTC)
            .unwrap();
        assert_eq!(event.end_time, NaiveTime::from_hms_opt(23, 0, 0));
    }

    #[test]
    fn end_past_midnight_falls_back_to_default() {
        let start = Utc.with_ymd_and_hms(2025, 5, 2, 21, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 5, 3, 1, 0, 0).unwrap();
        let event = normalize(&raw_timed("e", "Party", start, Some(end)), SourceKind::IcsFeed, Tz::UTC)
            .unwrap();
        assert_eq!(event.end_time, NaiveTime::from_hms_opt(22, 0, 0));
    }

    #[test]
    fn cancelled_and_untitled_events_are_dropped() {
        let start = Utc.with_ymd_and_hms(2025, 5, 2, 10, 0, 0).unwrap();
        let mut cancelled = raw_timed("e", "Gone", start, None);
        cancelled.cancelled = true;
        assert!(normalize(&cancelled, SourceKind::IcsFeed, Tz::UTC).is_none());

        let mut untitled = raw_timed("e", "  ", start, None);
        untitled.title = Some("  ".to_string());
        assert!(normalize(&untitled, SourceKind::IcsFeed, Tz::UTC).is_none());

        let mut no_title = raw_timed("e", "x", start, None);
        no_title.title = None;
        assert!(normalize(&no_title, SourceKind::IcsFeed, Tz::UTC).is_none());
    }

    #[test]
    fn hash_tracks_only_title_date_and_start() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let t = NaiveTime::from_hms_opt(9, 0, 0);

        assert_eq!(event_hash("Exam", date, t), event_hash("Exam", date, t));
        assert_ne!(event_hash("Exam", date, t), event_hash("Quiz", date, t));
        assert_ne!(
            event_hash("Exam", date, t),
            event_hash("Exam", date.succ_opt().unwrap(), t)
        );
        assert_ne!(event_hash("Exam", date, t), event_hash("Exam", date, None));
    }

    #[test]
    fn smart_mode_splits_on_all_day() {
        assert_eq!(EventShape::for_mode(ImportMode::Smart, true), EventShape::Task);
        assert_eq!(EventShape::for_mode(ImportMode::Smart, false), EventShape::Schedule);
        assert_eq!(EventShape::for_mode(ImportMode::Tasks, false), EventShape::Task);
        assert_eq!(EventShape::for_mode(ImportMode::Schedule, true), EventShape::Schedule);
    }

    #[test]
    fn default_end_always_lands_after_start_until_cap() {
        for hour in 0..23u32 {
            for minute in [0u32, 15, 30, 45] {
                let start = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
                let end = default_end(start);
                assert!(end > start, "end {end} not after start {start}");
                assert!(end <= NaiveTime::from_hms_opt(23, 0, 0).unwrap());
            }
        }
    }
}
