//! Calendar source subcommands: link, upload, connect, pause, disconnect.

use clap::Subcommand;
use studyplan_core::calendar::source::{CalendarSource, ImportMode};
use studyplan_core::integrations::oauth::ProviderConnection;
use studyplan_core::storage::PlannerDb;

/// Source management actions.
#[derive(Subcommand)]
pub enum SourceAction {
    /// Subscribe to an ICS feed URL
    AddFeed {
        /// Display name for the source
        name: String,
        /// Feed URL (https:// or webcal://)
        url: String,
        /// Import mode: tasks, schedule, or smart
        #[arg(long, default_value = "smart")]
        mode: String,
    },
    /// Import an ICS file once and keep it as a source
    Upload {
        /// Display name for the source
        name: String,
        /// Path to the .ics file
        file: std::path::PathBuf,
        /// Import mode: tasks, schedule, or smart
        #[arg(long, default_value = "smart")]
        mode: String,
    },
    /// Link a remote calendar account from tokens obtained out-of-band
    Connect {
        /// Display name for the source
        name: String,
        /// OAuth2 access token
        #[arg(long)]
        access_token: String,
        /// OAuth2 refresh token
        #[arg(long)]
        refresh_token: Option<String>,
        /// Access token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
        /// Calendar ids to sync (comma-separated)
        #[arg(long, value_delimiter = ',')]
        calendars: Vec<String>,
        /// Import mode: tasks, schedule, or smart
        #[arg(long, default_value = "smart")]
        mode: String,
    },
    /// List configured sources
    List,
    /// Pause a source without deleting its imports
    Pause {
        /// Source id
        id: String,
    },
    /// Resume a paused source
    Resume {
        /// Source id
        id: String,
    },
    /// Disconnect a source, deleting everything it imported
    Remove {
        /// Source id
        id: String,
    },
}

fn parse_mode(mode: &str) -> Result<ImportMode, Box<dyn std::error::Error>> {
    ImportMode::parse(mode)
        .ok_or_else(|| format!("invalid import mode '{mode}' (tasks|schedule|smart)").into())
}

/// Run the source command.
pub fn run(action: SourceAction, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = PlannerDb::open()?;

    match action {
        SourceAction::AddFeed { name, url, mode } => {
            let container = db.default_container(user)?;
            let source =
                CalendarSource::new_feed(user, &name, url, parse_mode(&mode)?, &container.id);
            db.insert_source(&source)?;
            println!("Linked feed '{name}' ({})", source.id);
        }
        SourceAction::Upload { name, file, mode } => {
            let payload = std::fs::read_to_string(&file)?;
            let container = db.default_container(user)?;
            let source =
                CalendarSource::new_upload(user, &name, payload, parse_mode(&mode)?, &container.id);
            db.insert_source(&source)?;
            println!("Stored upload '{name}' ({})", source.id);
        }
        SourceAction::Connect {
            name,
            access_token,
            refresh_token,
            expires_in,
            calendars,
            mode,
        } => {
            if calendars.is_empty() {
                return Err("at least one calendar id is required".into());
            }
            let connection =
                ProviderConnection::new(user, "google", access_token, refresh_token, expires_in);
            db.insert_connection(&connection)?;

            let container = db.default_container(user)?;
            let source = CalendarSource::new_remote(
                user,
                &name,
                &connection.id,
                calendars,
                parse_mode(&mode)?,
                &container.id,
            );
            db.insert_source(&source)?;
            println!("Connected '{name}' ({})", source.id);
        }
        SourceAction::List => {
            let sources = db.list_sources(user)?;
            if sources.is_empty() {
                println!("No calendar sources configured.");
                return Ok(());
            }
            for source in sources {
                let status = if source.is_active { "active" } else { "paused" };
                let synced = source
                    .last_synced_at
                    .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {}  [{}] [{}] mode={} last_synced={}",
                    source.id,
                    source.name,
                    source.kind.as_str(),
                    status,
                    source.import_mode.as_str(),
                    synced,
                );
                if let Some(error) = &source.last_error {
                    println!("    last error: {error}");
                }
            }
        }
        SourceAction::Pause { id } => {
            db.set_source_active(&id, false)?;
            println!("Paused {id}");
        }
        SourceAction::Resume { id } => {
            db.set_source_active(&id, true)?;
            println!("Resumed {id}");
        }
        SourceAction::Remove { id } => {
            db.delete_source(&id)?;
            println!("Removed {id} and everything it imported");
        }
    }

    Ok(())
}
