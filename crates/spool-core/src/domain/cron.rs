//! 5-field cron expressions ("MIN HOUR DOM MON DOW"), evaluated at minute
//! resolution in UTC.
//!
//! Each field accepts `*`, `N`, `A-B`, lists `a,b,c` and steps (`*/S`, `A-B/S`,
//! `N/S`). Month and weekday names (`JAN`, `MON`, ...) are accepted, weekday
//! `7` is Sunday like `0`. When both day-of-month and day-of-week are
//! restricted a day matches if either does (Vixie cron rule); a field counts as
//! unrestricted when it starts with `*`.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

use super::errors::ScheduleError;

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};

const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};

const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};

const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ],
    name_base: 1,
};

const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
    name_base: 0,
};

/// Upper bound for [`CronExpr::next_after`]; covers leap-day schedules.
const SEARCH_LIMIT_MINUTES: i64 = 5 * 366 * 24 * 60;

/// A parsed cron expression. Each field is a bitmask of matching values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_star: bool,
    dow_star: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(invalid(expr, format!("unknown macro '{trimmed}'")));
            }
            _ => trimmed,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expr,
                format!(
                    "expected 5 fields (MIN HOUR DOM MON DOW), got {}",
                    fields.len()
                ),
            ));
        }

        let minutes = parse_field(fields[0], &MINUTE).map_err(|r| invalid(expr, r))?;
        let hours = parse_field(fields[1], &HOUR).map_err(|r| invalid(expr, r))?;
        let days_of_month = parse_field(fields[2], &DAY_OF_MONTH).map_err(|r| invalid(expr, r))?;
        let months = parse_field(fields[3], &MONTH).map_err(|r| invalid(expr, r))?;
        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK).map_err(|r| invalid(expr, r))?;

        // 7 is an alias of Sunday.
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_star: fields[2].starts_with('*'),
            dow_star: fields[4].starts_with('*'),
        })
    }

    /// Does the minute containing `at` match?
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !bit(self.minutes, at.minute())
            || !bit(self.hours, at.hour())
            || !bit(self.months, at.month())
        {
            return false;
        }

        let dom = bit(self.days_of_month, at.day());
        let dow = bit(self.days_of_week, at.weekday().num_days_from_sunday());
        if self.dom_star || self.dow_star {
            dom && dow
        } else {
            dom || dow
        }
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)?;
        let mut candidate = start + Duration::minutes(1);
        for _ in 0..SEARCH_LIMIT_MINUTES {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for CronExpr {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(expr: &str, reason: String) -> ScheduleError {
    ScheduleError::InvalidCron {
        expr: expr.to_string(),
        reason,
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn parse_field(field: &str, spec: &FieldSpec) -> Result<u64, String> {
    let mut mask = 0u64;
    for part in field.split(',') {
        if part.is_empty() {
            return Err(format!("empty list element in {} field", spec.name));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in {} field", spec.name))?;
                if step == 0 {
                    return Err(format!("step must be positive in {} field", spec.name));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo = parse_value(a, spec)?;
            let hi = parse_value(b, spec)?;
            if lo > hi {
                return Err(format!("reversed range {lo}-{hi} in {} field", spec.name));
            }
            (lo, hi)
        } else {
            let value = parse_value(range, spec)?;
            // "N/S" runs from N to the end of the field.
            if step.is_some() {
                (value, spec.max)
            } else {
                (value, value)
            }
        };

        for value in (lo..=hi).step_by(step.unwrap_or(1) as usize) {
            mask |= 1u64 << value;
        }
    }
    Ok(mask)
}

fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32, String> {
    let value = match token.parse::<u32>() {
        Ok(v) => v,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|i| i as u32 + spec.name_base)
            .ok_or_else(|| format!("invalid value '{token}' in {} field", spec.name))?,
    };
    if value < spec.min || value > spec.max {
        return Err(format!(
            "{value} out of range {}-{} in {} field",
            spec.min, spec.max, spec.name
        ));
    }
    Ok(value)
}
