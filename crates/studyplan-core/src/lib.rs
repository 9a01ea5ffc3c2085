//! # Studyplan Core Library
//!
//! Core business logic for the Studyplan planner: storage, external
//! calendar ingestion, and the synchronization engine that keeps internal
//! tasks and schedule blocks aligned with linked calendars.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite persistence for planner entities and the sync
//!   engine's state, plus TOML-based configuration
//! - **Calendar**: source configuration, ICS and remote-API fetchers, and
//!   normalization into canonical events
//! - **Integrations**: OAuth2 token management for provider connections
//! - **Sync**: tracking store, drift cleanup, the reconciliation state
//!   machine, and the per-source orchestrator
//!
//! ## Key Components
//!
//! - [`PlannerDb`]: planner and sync-engine persistence
//! - [`SyncEngine`]: per-source sync passes and multi-source runs
//! - [`CanonicalEvent`]: the normalized unit of reconciliation
//! - [`SyncReport`]: aggregate counts and isolated errors for a run

pub mod calendar;
pub mod error;
pub mod integrations;
pub mod schedule;
pub mod storage;
pub mod sync;
pub mod task;

pub use calendar::{CalendarSource, CanonicalEvent, EventShape, ImportMode, SourceKind};
pub use error::{ConfigError, CoreError, DatabaseError, FeedError, OAuthError, SyncError};
pub use integrations::{OAuthConfig, ProviderConnection};
pub use schedule::ScheduleBlock;
pub use storage::{Config, PlannerDb};
pub use sync::{SyncEngine, SyncReport};
pub use task::{Container, Task};
