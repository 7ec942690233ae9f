//! Line format shared by the daily and the yearly logs:
//!
//! ```text
//! 2024-01-02, 01:05, ++, "+project"
//! 2024-01-02, 00:45, (), "write the ""quoted"" report"
//! ```
//!
//! Fields are separated by `", "`. The key is always last and quoted, so commas inside it need
//! no escaping. Older files were read with fixed column offsets; the writer still produces the
//! same layout so those readers keep working.

use std::{fmt::Write, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};

use crate::utils::time::{format_date, format_minutes, parse_date};

use super::entities::{EntryKind, LogRecord};

const SEPARATOR: &str = ", ";

/// Encodes a record into a single line, including the trailing newline.
pub fn encode(record: &LogRecord) -> String {
    let mut line = String::with_capacity(record.key.len() + 28);
    let _ = writeln!(
        line,
        "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}\"{}\"",
        format_date(record.date),
        format_minutes(record.minutes),
        record.kind.tag(),
        record.key.replace('"', "\"\""),
    );
    line
}

/// Decodes a line produced by [encode]. A trailing newline is ignored.
pub fn decode(line: &str) -> Result<LogRecord> {
    let line = line.trim_end_matches(['\n', '\r']);

    let (date, rest) = line
        .split_once(SEPARATOR)
        .ok_or_else(|| anyhow!("Missing date field in {line:?}"))?;
    let (time, rest) = rest
        .split_once(SEPARATOR)
        .ok_or_else(|| anyhow!("Missing time field in {line:?}"))?;
    let (tag, quoted) = rest
        .split_once(SEPARATOR)
        .ok_or_else(|| anyhow!("Missing kind field in {line:?}"))?;

    let date = parse_date(date).ok_or_else(|| anyhow!("Illegal date {date:?}"))?;
    let minutes = decode_time(time).with_context(|| format!("Illegal time {time:?}"))?;
    let kind = EntryKind::from_tag(tag).ok_or_else(|| anyhow!("Illegal kind tag {tag:?}"))?;
    let key = decode_key(quoted)?;

    Ok(LogRecord {
        date,
        kind,
        key,
        minutes,
    })
}

/// Returns the date a line starts with without decoding the rest of it.
pub fn leading_date(line: &str) -> Option<&str> {
    line.get(..10)
}

fn decode_time(time: &str) -> Result<u64> {
    let (hours, minutes) = time
        .split_once(':')
        .ok_or_else(|| anyhow!("Missing ':' separator"))?;
    let hours: u64 = hours.parse()?;
    let minutes: u64 = minutes.parse()?;
    if minutes >= 60 {
        bail!("Minutes out of range");
    }
    hours
        .checked_mul(60)
        .and_then(|v| v.checked_add(minutes))
        .ok_or_else(|| anyhow!("Time out of range"))
}

fn decode_key(quoted: &str) -> Result<Arc<str>> {
    let inner = quoted
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| anyhow!("Key is not quoted: {quoted:?}"))?;

    let mut key = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' && chars.next_if_eq(&'"').is_none() {
            bail!("Unescaped quote in key {quoted:?}");
        }
        key.push(c);
    }
    Ok(key.into())
}
