use chrono::{NaiveDate, Weekday};
use serde::Serialize;

use crate::utils::time::{month_start_date, months_before, week_start_date};

/// Lower dates of the named ranges, relative to `today`. Every range ends today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateBounds {
    pub today: NaiveDate,
    pub week: NaiveDate,
    pub month: NaiveDate,
    pub three_months: NaiveDate,
    pub six_months: NaiveDate,
}

impl DateBounds {
    pub fn new(today: NaiveDate, week_start: Weekday) -> Self {
        let month = month_start_date(today);
        let three_months = months_before(month, 2);
        Self {
            today,
            week: week_start_date(today, week_start),
            month,
            three_months,
            six_months: months_before(three_months, 3),
        }
    }
}
