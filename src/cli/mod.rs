pub mod report;
pub mod track;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{
    process_day_command, process_hot_command, process_month_command, process_search_command,
    process_stats_command, process_today_command, DayCommand, HotCommand, MonthCommand,
    SearchCommand, StatsCommand, TodayCommand,
};
use track::{process_track_command, TrackCommand};
use tracing::level_filters::LevelFilter;

use crate::utils::{
    dir::{create_application_default_path, default_tracker_root},
    logging::{enable_logging, CLI_PREFIX, TRACKER_PREFIX},
};

#[derive(Parser, Debug)]
#[command(name = "Tracklog", version, long_about = None)]
#[command(about = "Time tracker for tasks and projects", long_about = None)]
pub(crate) struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Directory holding the logs. By default it's the tracker directory inside $XDG_STATE_HOME/tracklog or $HOME/.local/state/tracklog"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track a task in the foreground until ctrl-c")]
    Track {
        #[command(flatten)]
        command: TrackCommand,
    },
    #[command(about = "Time logged against a task or project over the usual ranges")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Tasks or projects with the most time inside a range")]
    Hot {
        #[command(flatten)]
        command: HotCommand,
    },
    #[command(about = "Everything logged on a single day")]
    Day {
        #[command(flatten)]
        command: DayCommand,
    },
    #[command(about = "Time logged against a task or project on every day of a month")]
    Month {
        #[command(flatten)]
        command: MonthCommand,
    },
    #[command(about = "Find logged tasks and projects")]
    Search {
        #[command(flatten)]
        command: SearchCommand,
    },
    #[command(about = "Today's entries")]
    Today {
        #[command(flatten)]
        command: TodayCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let application_path = create_application_default_path()?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let prefix = match args.commands {
        Commands::Track { .. } => TRACKER_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &application_path, logging_level, args.log)?;

    let root = args
        .dir
        .unwrap_or_else(|| default_tracker_root(&application_path));

    match args.commands {
        Commands::Track { command } => process_track_command(command, root).await,
        Commands::Stats { command } => process_stats_command(command, &root).await,
        Commands::Hot { command } => process_hot_command(command, &root).await,
        Commands::Day { command } => process_day_command(command, &root).await,
        Commands::Month { command } => process_month_command(command, &root).await,
        Commands::Search { command } => process_search_command(command, &root).await,
        Commands::Today { command } => process_today_command(command, &root).await,
    }
}
