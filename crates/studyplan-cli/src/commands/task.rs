//! Task subcommands.

use clap::Subcommand;
use studyplan_core::storage::PlannerDb;

/// Task actions.
#[derive(Subcommand)]
pub enum TaskAction {
    /// List tasks
    List,
}

/// Run the task command.
pub fn run(action: TaskAction, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = PlannerDb::open()?;

    match action {
        TaskAction::List => {
            let tasks = db.list_tasks(user)?;
            if tasks.is_empty() {
                println!("No tasks.");
                return Ok(());
            }
            for task in tasks {
                let due = task
                    .due_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "no due date".to_string());
                let done = if task.completed { "x" } else { " " };
                println!("[{done}] {}  (due {due})  {}", task.title, task.id);
            }
        }
    }

    Ok(())
}
