use chrono::{Datelike, NaiveDate};

use super::tables::CalendarRow;

/// A validated `calendar.txt` entry: weekday flags active between two dates,
/// both inclusive.
///
/// Single-day exceptions (`calendar_dates.txt`) are not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCalendar {
    pub service_id: String,
    /// Monday first.
    pub weekdays: [bool; 7],
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ServiceCalendar {
    /// Returns `None` when a flag is not `0`/`1` or a date is not `YYYYMMDD`.
    pub fn from_row(row: &CalendarRow) -> Option<Self> {
        let flags = [
            &row.monday,
            &row.tuesday,
            &row.wednesday,
            &row.thursday,
            &row.friday,
            &row.saturday,
            &row.sunday,
        ];
        let mut weekdays = [false; 7];
        for (slot, flag) in weekdays.iter_mut().zip(flags) {
            *slot = match flag.trim() {
                "1" => true,
                "0" => false,
                _ => return None,
            };
        }
        Some(Self {
            service_id: row.service_id.clone(),
            weekdays,
            start: parse_date(&row.start_date)?,
            end: parse_date(&row.end_date)?,
        })
    }

    pub fn is_active(&self, date: NaiveDate) -> bool {
        self.start <= date
            && date <= self.end
            && self.weekdays[date.weekday().num_days_from_monday() as usize]
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y%m%d").ok()
}
