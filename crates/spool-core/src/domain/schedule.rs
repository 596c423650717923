//! Schedule evaluation: is "now" a moment at which new work may be queued?

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::sync::Arc;

use super::cron::CronExpr;
use super::errors::ScheduleError;

type DuePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Naive formats accepted for fixed instants; read as UTC.
const NAIVE_INSTANT_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// When a queue admits new items.
#[derive(Clone)]
pub enum ScheduleSpec {
    /// Arbitrary check; its answer is authoritative.
    Predicate(DuePredicate),

    /// Single-fire: due only during the exact minute of the instant.
    FixedInstant(String),

    /// Due whenever the expression matches the current minute.
    Cron(CronExpr),
}

impl ScheduleSpec {
    pub fn predicate(f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        ScheduleSpec::Predicate(Arc::new(f))
    }

    /// The instant is only parsed on evaluation (or by [`ScheduleSpec::validate`]).
    pub fn at(instant: impl Into<String>) -> Self {
        ScheduleSpec::FixedInstant(instant.into())
    }

    pub fn cron(expr: &str) -> Result<Self, ScheduleError> {
        Ok(ScheduleSpec::Cron(CronExpr::parse(expr)?))
    }

    pub fn every_minute() -> Self {
        ScheduleSpec::predicate(|| true)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> Result<bool, ScheduleError> {
        match self {
            ScheduleSpec::Predicate(f) => Ok(f()),
            ScheduleSpec::FixedInstant(raw) => {
                let instant = parse_instant(raw)?;
                Ok(minute_of(instant) == minute_of(now))
            }
            ScheduleSpec::Cron(expr) => Ok(expr.matches(now)),
        }
    }

    /// Parse-only check, so a bad instant fails at construction rather than on
    /// the first tick.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            ScheduleSpec::FixedInstant(raw) => parse_instant(raw).map(|_| ()),
            ScheduleSpec::Predicate(_) | ScheduleSpec::Cron(_) => Ok(()),
        }
    }

    /// Next minute the schedule will be due, when that can be known.
    /// Predicates are opaque and return `None`.
    pub fn next_due(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        match self {
            ScheduleSpec::Predicate(_) => Ok(None),
            ScheduleSpec::FixedInstant(raw) => {
                let instant = parse_instant(raw)?;
                Ok((minute_of(instant) > minute_of(after)).then_some(instant))
            }
            ScheduleSpec::Cron(expr) => Ok(expr.next_after(after)),
        }
    }
}

impl fmt::Debug for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSpec::Predicate(_) => f.write_str("Predicate(..)"),
            ScheduleSpec::FixedInstant(raw) => f.debug_tuple("FixedInstant").field(raw).finish(),
            ScheduleSpec::Cron(expr) => f.debug_tuple("Cron").field(&expr.as_str()).finish(),
        }
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_INSTANT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ScheduleError::InvalidInstant(raw.to_string()))
}

fn minute_of(dt: DateTime<Utc>) -> i64 {
    dt.timestamp().div_euclid(60)
}
