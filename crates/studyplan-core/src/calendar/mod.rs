//! External calendar ingestion: source configuration, provider fetchers,
//! and normalization into canonical events.

pub mod event;
pub mod google;
pub mod ics;
pub mod source;

pub use event::{
    event_hash, external_uid, normalize, CanonicalEvent, EventShape, RawEvent, RawEventTime,
};
pub use google::GoogleCalendarApi;
pub use source::{CalendarSource, ImportMode, SourceKind, SyncStatus};
