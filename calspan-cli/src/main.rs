mod commands;
mod dates;

use anyhow::Result;
use calspan_core::config::CalSpanConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calspan")]
#[command(about = "Store events and query when you are busy")]
struct Cli {
    /// Log verbosely to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an event
    Add {
        title: String,

        /// Start date/time (e.g., "2025-03-20T15:00" or "2025-03-20")
        #[arg(short, long)]
        start: String,

        /// End date/time
        #[arg(short, long)]
        end: String,

        #[arg(long)]
        all_day: bool,

        /// Calendar id
        #[arg(short, long, default_value = "1")]
        calendar: String,

        /// Recurrence rule (e.g., "FREQ=WEEKLY;COUNT=4")
        #[arg(long)]
        rrule: Option<String>,

        /// Alarm offset in seconds relative to the start, repeatable
        #[arg(long, allow_hyphen_values = true)]
        alarm: Vec<i64>,
    },
    /// Show busytimes grouped by day
    Busy {
        /// From this date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        from: Option<String>,

        /// Until this date (YYYY-MM-DD), defaults to a week from `from`
        #[arg(long)]
        to: Option<String>,
    },
    /// List the calendar days a range touches
    Days {
        /// First day (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
        from: String,

        /// Last instant (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
        to: String,
    },
    /// Remove an event with its busytimes and alarms
    Remove { event_id: String },
    /// Remove every event of a calendar
    RemoveCalendar { calendar_id: i64 },
    /// Count stored events, busytimes and alarms
    Count,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "calspan_core=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = CalSpanConfig::load()?;

    match cli.command {
        Commands::Add {
            title,
            start,
            end,
            all_day,
            calendar,
            rrule,
            alarm,
        } => {
            let args = commands::add::AddArgs {
                title,
                start,
                end,
                all_day,
                calendar,
                rrule,
                alarms: alarm,
            };
            commands::add::run(&config, args).await
        }
        Commands::Busy { from, to } => {
            commands::busy::run(&config, from.as_deref(), to.as_deref()).await
        }
        Commands::Days { from, to } => commands::days::run(&from, &to),
        Commands::Remove { event_id } => commands::remove::run(&config, &event_id).await,
        Commands::RemoveCalendar { calendar_id } => {
            commands::remove_calendar::run(&config, calendar_id).await
        }
        Commands::Count => commands::count::run(&config).await,
    }
}
