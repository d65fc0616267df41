//! # Recurring Schedule
//!
//! Decides when recurring-mode ticks fire. Supports:
//!
//! - Standard 5-field cron: `minute hour day-of-month month day-of-week`,
//!   each field accepting `*`, values, `a-b` ranges, `/n` steps and comma
//!   lists. Months and weekdays also accept three-letter names (`JAN`,
//!   `MON`). Weekday `7` is Sunday, like `0`. When both day fields are
//!   restricted a day matches if either does.
//! - Descriptors: `@yearly` (`@annually`), `@monthly`, `@weekly`, `@daily`
//!   (`@midnight`), `@hourly`.
//! - Fixed intervals: `@every 90s`, `@every 15m`, `@every 1h30m`.
//!
//! All times are UTC. [`CronSchedule::next_after`] returns the first fire
//! time strictly after the given instant.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use thiserror::Error;

/// Upper bound on search steps; protects against unsatisfiable expressions
/// such as `0 0 31 2 *`.
const MAX_SEARCH_STEPS: usize = 100_000;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Schedule expression could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The expression is blank.
    #[error("schedule expression is empty")]
    Empty,

    /// A cron expression must have exactly five fields.
    #[error("expected 5 cron fields, found {0}")]
    FieldCount(usize),

    /// One cron field is invalid.
    #[error("invalid {field} field {value:?}: {reason}")]
    InvalidField {
        /// Field name (minute, hour, ...).
        field: &'static str,
        /// The offending text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `@` descriptor not recognised.
    #[error("unknown schedule descriptor {0:?}")]
    UnknownDescriptor(String),

    /// `@every` interval is malformed or not positive.
    #[error("invalid interval {0:?}: expected a positive duration such as 30s, 15m or 1h30m")]
    InvalidInterval(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CronFields {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScheduleKind {
    Cron(CronFields),
    Every(Duration),
}

/// A parsed recurring schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    kind: ScheduleKind,
}

impl CronSchedule {
    /// Parse a schedule expression.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::Empty);
        }

        let kind = if let Some(rest) = trimmed.strip_prefix("@every") {
            ScheduleKind::Every(parse_interval(rest.trim())?)
        } else if trimmed.starts_with('@') {
            let fields = match trimmed.to_ascii_lowercase().as_str() {
                "@yearly" | "@annually" => "0 0 1 1 *",
                "@monthly" => "0 0 1 * *",
                "@weekly" => "0 0 * * 0",
                "@daily" | "@midnight" => "0 0 * * *",
                "@hourly" => "0 * * * *",
                _ => return Err(ScheduleError::UnknownDescriptor(trimmed.to_string())),
            };
            ScheduleKind::Cron(parse_cron(fields)?)
        } else {
            ScheduleKind::Cron(parse_cron(trimmed)?)
        };

        Ok(Self {
            expression: trimmed.to_string(),
            kind,
        })
    }

    /// The expression as given (trimmed).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`. `None` if the expression can
    /// never fire.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Every(interval) => after.checked_add_signed(*interval),
            ScheduleKind::Cron(fields) => fields.next_after(after),
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl std::str::FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl CronFields {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        for _ in 0..MAX_SEARCH_STEPS {
            if !bit(self.months, t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = midnight(NaiveDate::from_ymd_opt(year, month, 1)?)?;
                continue;
            }
            if !self.day_matches(t) {
                t = midnight(t.date_naive().succ_opt()?)?;
                continue;
            }
            if !bit(self.hours, t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = bit(self.days_of_month, t.day());
        let dow = bit(self.days_of_week, t.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn parse_cron(expression: &str) -> Result<CronFields, ScheduleError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ScheduleError::FieldCount(fields.len()));
    }

    let (minutes, _) = parse_field("minute", fields[0], 0, 59, &[])?;
    let (hours, _) = parse_field("hour", fields[1], 0, 23, &[])?;
    let (days_of_month, dom_restricted) = parse_field("day-of-month", fields[2], 1, 31, &[])?;
    let (months, _) = parse_field("month", fields[3], 1, 12, &MONTH_NAMES)?;
    let (mut days_of_week, dow_restricted) =
        parse_field("day-of-week", fields[4], 0, 7, &WEEKDAY_NAMES)?;

    // 7 is an alias for Sunday.
    if bit(days_of_week, 7) {
        days_of_week = (days_of_week & !(1u64 << 7)) | 1;
    }

    Ok(CronFields {
        minutes,
        hours,
        days_of_month,
        months,
        days_of_week,
        dom_restricted,
        dow_restricted,
    })
}

/// Parse one field into a bit mask. The flag reports whether the field was
/// anything other than a bare `*`.
fn parse_field(
    field: &'static str,
    text: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<(u64, bool), ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidField {
        field,
        value: text.to_string(),
        reason,
    };

    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("step {step:?} is not a number")))?;
                if step == 0 {
                    return Err(invalid("step must be positive".to_string()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                parse_value(a, min, names).map_err(&invalid)?,
                parse_value(b, min, names).map_err(&invalid)?,
            )
        } else {
            let v = parse_value(range, min, names).map_err(&invalid)?;
            // `5/10` means "from 5 to the end in steps of 10".
            (v, if step.is_some() { max } else { v })
        };

        if start < min || end > max {
            return Err(invalid(format!("values must lie within {min}-{max}")));
        }
        if start > end {
            return Err(invalid(format!("range {start}-{end} is descending")));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (start..=end).step_by(step) {
            mask |= 1u64 << v;
        }
    }

    Ok((mask, text != "*"))
}

fn parse_value(text: &str, min: u32, names: &[&str]) -> Result<u32, String> {
    if let Ok(v) = text.parse::<u32>() {
        return Ok(v);
    }
    let upper = text.to_ascii_uppercase();
    names
        .iter()
        .position(|n| *n == upper)
        .map(|i| i as u32 + min)
        .ok_or_else(|| format!("{text:?} is not a number or known name"))
}

fn parse_interval(text: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(text.to_string());
    if text.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit = match c {
            's' => Duration::try_seconds(n),
            'm' => Duration::try_minutes(n),
            'h' => Duration::try_hours(n),
            'd' => Duration::try_days(n),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(&unit).ok_or_else(invalid)?;
    }

    if !digits.is_empty() || total <= Duration::zero() {
        return Err(invalid());
    }
    Ok(total)
}
