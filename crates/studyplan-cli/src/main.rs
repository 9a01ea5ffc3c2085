use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "studyplan-cli", version, about = "Studyplan CLI")]
struct Cli {
    /// User the command acts on behalf of
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calendar source management
    Source {
        #[command(subcommand)]
        action: commands::source::SourceAction,
    },
    /// Run calendar sync passes
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Schedule block management
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Source { action } => commands::source::run(action, &cli.user),
        Commands::Sync { action } => commands::sync::run(action, &cli.user),
        Commands::Task { action } => commands::task::run(action, &cli.user),
        Commands::Schedule { action } => commands::schedule::run(action, &cli.user),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
