//! Schedule block subcommands.

use clap::Subcommand;
use studyplan_core::storage::PlannerDb;

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Schedule actions.
#[derive(Subcommand)]
pub enum ScheduleAction {
    /// List schedule blocks
    List,
}

/// Run the schedule command.
pub fn run(action: ScheduleAction, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = PlannerDb::open()?;

    match action {
        ScheduleAction::List => {
            let blocks = db.list_blocks(user)?;
            if blocks.is_empty() {
                println!("No schedule blocks.");
                return Ok(());
            }
            for block in blocks {
                let day = DAY_NAMES
                    .get(block.day_of_week as usize)
                    .copied()
                    .unwrap_or("?");
                println!(
                    "{day} {}-{}  {}  ({} to {})  {}",
                    block.start_time.format("%H:%M"),
                    block.end_time.format("%H:%M"),
                    block.title,
                    block.start_date,
                    block.end_date,
                    block.id,
                );
            }
        }
    }

    Ok(())
}
