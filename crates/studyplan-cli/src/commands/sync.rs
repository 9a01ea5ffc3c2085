//! Sync subcommand: run a pass for one source or all of them.

use clap::Subcommand;
use studyplan_core::storage::{Config, PlannerDb};
use studyplan_core::sync::{SyncEngine, SyncReport};

/// Sync actions.
#[derive(Subcommand)]
pub enum SyncAction {
    /// Sync a single source
    Run {
        /// Source id
        source_id: String,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync every active source
    All {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the sync command.
pub fn run(action: SyncAction, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = PlannerDb::open()?;
    let config = Config::load()?;
    let engine = SyncEngine::new(&db, config.google_oauth(), config.timezone());

    let rt = tokio::runtime::Runtime::new()?;
    let (report, json) = match action {
        SyncAction::Run { source_id, json } => {
            (rt.block_on(engine.sync_source(&source_id))?, json)
        }
        SyncAction::All { json } => (rt.block_on(engine.sync_all(user))?, json),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "Processed {} events across {} calendars",
        report.events_processed, report.calendars_processed
    );
    println!(
        "  tasks: {} created, {} updated, {} deleted",
        report.tasks_created, report.tasks_updated, report.tasks_deleted
    );
    println!(
        "  schedule blocks: {} created, {} updated, {} deleted",
        report.schedule_blocks_created,
        report.schedule_blocks_updated,
        report.schedule_blocks_deleted
    );
    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for error in &report.errors {
            println!("  - {error}");
        }
    }
}
