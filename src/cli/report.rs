use std::{fmt::Display, path::Path, sync::Arc};

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate, Weekday};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use serde::Serialize;

use crate::{
    stats::{
        bounds::DateBounds,
        query::{
            day_breakdown, hot_ranking, month_days, search, sum_keyword, DateRange,
            DEFAULT_SEARCH_LIMIT,
        },
        read_snapshot, StatsSnapshot,
    },
    storage::entities::EntryKind,
    utils::{
        percentage::{minutes_percentage, Percentage},
        time::{format_date, format_minutes},
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WeekStart {
    Monday,
    Saturday,
    Sunday,
}

impl From<WeekStart> for Weekday {
    fn from(value: WeekStart) -> Self {
        match value {
            WeekStart::Monday => Weekday::Mon,
            WeekStart::Saturday => Weekday::Sat,
            WeekStart::Sunday => Weekday::Sun,
        }
    }
}

impl Display for WeekStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeekStart::Monday => write!(f, "monday"),
            WeekStart::Saturday => write!(f, "saturday"),
            WeekStart::Sunday => write!(f, "sunday"),
        }
    }
}

const DATE_EXAMPLES: &str = "Examples are \"today\", \"yesterday\", \"last monday\", \"15/03/2025\"";

fn parse_day(value: &str, date_style: DateStyle, name: &str) -> Result<NaiveDate> {
    match parse_date_string(value, Local::now(), date_style.into()) {
        Ok(v) => Ok(v.with_timezone(&Local).date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} {e}"),
            )
            .into()),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn snapshot(root: &Path) -> Result<Arc<StatsSnapshot>> {
    read_snapshot(root, today()).await
}

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[arg(help = "Task line or +project to sum up")]
    keyword: String,
    #[arg(long, default_value_t = WeekStart::Monday, help = "First day of the week")]
    week_start: WeekStart,
    #[arg(long, help = "Print as json")]
    json: bool,
}

/// Command to process `stats`. Sums a single keyword over today, this week, this month, the
/// last three and six months and the whole history.
pub async fn process_stats_command(
    StatsCommand {
        keyword,
        week_start,
        json,
    }: StatsCommand,
    root: &Path,
) -> Result<()> {
    let snapshot = snapshot(root).await?;
    let bounds = DateBounds::new(today(), week_start.into());
    let sums = sum_keyword(&snapshot, &keyword, &bounds);

    if json {
        return print_json(&sums);
    }

    println!("{keyword}");
    for (name, minutes) in [
        ("Today", sums.today),
        ("This week", sums.week),
        ("This month", sums.month),
        ("Last 3 months", sums.three_months),
        ("Last 6 months", sums.six_months),
        ("All time", sums.all),
    ] {
        println!("{name}\t{}", format_minutes(minutes));
    }
    if !sums.quarters.is_empty() {
        println!("\nTotal time per yearly quarter");
        for (year, quarters) in sums.quarters.iter().rev() {
            let quarters = quarters
                .iter()
                .map(|v| format_minutes(*v))
                .collect::<Vec<_>>()
                .join("\t");
            println!("{year}\t{quarters}");
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct HotCommand {
    #[arg(long = "start", short, help = format!("Start of the range. {DATE_EXAMPLES}"))]
    start_date: Option<String>,
    #[arg(long = "end", short, help = format!("End of the range. {DATE_EXAMPLES}"))]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Rank tasks instead of projects")]
    tasks: bool,
    #[arg(long, default_value_t = 10, help = "Amount of entries to show")]
    top: usize,
    #[arg(
        short = 'p',
        long = "percentage",
        help = "Hide entries below this share of the range total"
    )]
    min_percentage: Option<Percentage>,
    #[arg(long, help = "Print as json")]
    json: bool,
}

/// Command to process `hot`. Ranks tasks or projects by the time logged between two dates.
pub async fn process_hot_command(
    HotCommand {
        start_date,
        end_date,
        date_style,
        tasks,
        top,
        min_percentage,
        json,
    }: HotCommand,
    root: &Path,
) -> Result<()> {
    let start = start_date
        .map(|v| parse_day(&v, date_style, "start date"))
        .transpose()?;
    let end = end_date
        .map(|v| parse_day(&v, date_style, "end date"))
        .transpose()?;
    let kind = if tasks {
        EntryKind::Task
    } else {
        EntryKind::Project
    };

    let snapshot = snapshot(root).await?;
    let ranking = hot_ranking(
        &snapshot,
        DateRange::new(start, end),
        kind,
        top,
        min_percentage,
    );

    if json {
        return print_json(&ranking);
    }
    for entry in &ranking.entries {
        println!(
            "{}\t{:.1}%\t{}",
            format_minutes(entry.minutes),
            *minutes_percentage(entry.minutes, ranking.total),
            entry.key
        );
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct DayCommand {
    #[arg(help = format!("Day to show, today by default. {DATE_EXAMPLES}"))]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Print as json")]
    json: bool,
}

pub async fn process_day_command(
    DayCommand {
        date,
        date_style,
        json,
    }: DayCommand,
    root: &Path,
) -> Result<()> {
    let date = match date {
        Some(v) => parse_day(&v, date_style, "date")?,
        None => today(),
    };
    let snapshot = snapshot(root).await?;
    let records = day_breakdown(&snapshot, date);

    if json {
        return print_json(&records);
    }
    println!("{}", format_date(date));
    for record in records {
        println!(
            "{}\t{}\t{}",
            format_minutes(record.minutes),
            record.kind,
            record.key
        );
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct MonthCommand {
    #[arg(help = "Task line or +project to show")]
    keyword: String,
    #[arg(long, help = "Year of the month, the current one by default")]
    year: Option<i32>,
    #[arg(long, help = "Month number starting at 1, the current one by default")]
    month: Option<u32>,
    #[arg(long, help = "Print as json")]
    json: bool,
}

#[derive(Serialize)]
struct MonthDay {
    date: NaiveDate,
    minutes: u64,
}

/// Command to process `month`. One line per calendar day.
pub async fn process_month_command(
    MonthCommand {
        keyword,
        year,
        month,
        json,
    }: MonthCommand,
    root: &Path,
) -> Result<()> {
    let today = today();
    let year = year.unwrap_or(today.year());
    let month = month.unwrap_or(today.month());

    let snapshot = snapshot(root).await?;
    let Some(days) = month_days(&snapshot, &keyword, year, month) else {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("There is no month {month} in {year}"),
            )
            .into());
    };

    if json {
        let days = days
            .into_iter()
            .map(|(date, minutes)| MonthDay { date, minutes })
            .collect::<Vec<_>>();
        return print_json(&days);
    }
    for (date, minutes) in days {
        println!("{}\t{}", format_date(date), format_minutes(minutes));
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct SearchCommand {
    #[arg(help = "Part of a task line or project to look for")]
    needle: String,
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT, help = "Maximal amount of results")]
    limit: usize,
}

pub async fn process_search_command(
    SearchCommand { needle, limit }: SearchCommand,
    root: &Path,
) -> Result<()> {
    let snapshot = snapshot(root).await?;
    for key in search(&snapshot, &needle, limit) {
        println!("{key}");
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub struct TodayCommand {
    #[arg(long, help = "Print as json")]
    json: bool,
}

/// Command to process `today`. Reads the daily log as the running tracker last wrote it.
pub async fn process_today_command(
    TodayCommand { json }: TodayCommand,
    root: &Path,
) -> Result<()> {
    let today = today();
    let snapshot = snapshot(root).await?;
    let records = day_breakdown(&snapshot, today);

    if json {
        return print_json(&records);
    }
    let total = records
        .iter()
        .filter(|v| v.kind == EntryKind::Task)
        .map(|v| v.minutes)
        .sum::<u64>();
    for record in &records {
        println!("{}\t{}", format_minutes(record.minutes), record.key);
    }
    println!("Total\t{}", format_minutes(total));
    Ok(())
}
