//! Calendar source configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a source's events reach us.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Subscription to an ICS feed URL, re-fetched every pass.
    IcsFeed,
    /// One-time ICS file upload; the text is stored on the source.
    IcsUpload,
    /// OAuth2-authenticated remote calendar API.
    RemoteApi,
}

impl SourceKind {
    /// Whether a fetch returns the complete current upstream set.
    ///
    /// Only full-pull sources support deletion detection: a tracked uid
    /// missing from the fetch means the upstream event is gone. An uploaded
    /// file is a static snapshot, and the remote API is queried over a
    /// bounded window, so absence proves nothing for either.
    pub fn is_full_pull(&self) -> bool {
        matches!(self, SourceKind::IcsFeed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::IcsFeed => "ics_feed",
            SourceKind::IcsUpload => "ics_upload",
            SourceKind::RemoteApi => "remote_api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ics_feed" => Some(SourceKind::IcsFeed),
            "ics_upload" => Some(SourceKind::IcsUpload),
            "remote_api" => Some(SourceKind::RemoteApi),
            _ => None,
        }
    }
}

/// What shape imported events take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Everything becomes a task.
    Tasks,
    /// Everything becomes a schedule block.
    Schedule,
    /// All-day events become tasks, timed events become schedule blocks.
    Smart,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Tasks => "tasks",
            ImportMode::Schedule => "schedule",
            ImportMode::Smart => "smart",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tasks" => Some(ImportMode::Tasks),
            "schedule" => Some(ImportMode::Schedule),
            "smart" => Some(ImportMode::Smart),
            _ => None,
        }
    }
}

/// Advisory per-source sync state, compare-and-set by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "syncing" => SyncStatus::Syncing,
            _ => SyncStatus::Idle,
        }
    }
}

/// A linked external calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSource {
    pub id: String,
    pub user_id: String,
    pub kind: SourceKind,
    pub name: String,
    /// Feed URL for `IcsFeed` sources.
    pub feed_url: Option<String>,
    /// Stored ICS text for `IcsUpload` sources.
    pub ics_payload: Option<String>,
    /// Provider connection for `RemoteApi` sources.
    pub connection_id: Option<String>,
    /// Remote calendar ids to sync (`RemoteApi` only).
    pub selected_calendars: Vec<String>,
    pub import_mode: ImportMode,
    pub container_id: String,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarSource {
    fn base(
        user_id: impl Into<String>,
        kind: SourceKind,
        name: impl Into<String>,
        import_mode: ImportMode,
        container_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            name: name.into(),
            feed_url: None,
            ics_payload: None,
            connection_id: None,
            selected_calendars: Vec::new(),
            import_mode,
            container_id: container_id.into(),
            is_active: true,
            sync_status: SyncStatus::Idle,
            last_synced_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Link an ICS feed subscription.
    pub fn new_feed(
        user_id: impl Into<String>,
        name: impl Into<String>,
        feed_url: impl Into<String>,
        import_mode: ImportMode,
        container_id: impl Into<String>,
    ) -> Self {
        let mut source = Self::base(user_id, SourceKind::IcsFeed, name, import_mode, container_id);
        source.feed_url = Some(feed_url.into());
        source
    }

    /// Store a one-time ICS upload.
    pub fn new_upload(
        user_id: impl Into<String>,
        name: impl Into<String>,
        ics_payload: impl Into<String>,
        import_mode: ImportMode,
        container_id: impl Into<String>,
    ) -> Self {
        let mut source =
            Self::base(user_id, SourceKind::IcsUpload, name, import_mode, container_id);
        source.ics_payload = Some(ics_payload.into());
        source
    }

    /// Link a remote calendar API through an existing provider connection.
    pub fn new_remote(
        user_id: impl Into<String>,
        name: impl Into<String>,
        connection_id: impl Into<String>,
        selected_calendars: Vec<String>,
        import_mode: ImportMode,
        container_id: impl Into<String>,
    ) -> Self {
        let mut source =
            Self::base(user_id, SourceKind::RemoteApi, name, import_mode, container_id);
        source.connection_id = Some(connection_id.into());
        source.selected_calendars = selected_calendars;
        source
    }
}
