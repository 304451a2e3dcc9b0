//! Cron-style recurrence with exact next-fire computation.
//!
//! Accepts classic 5-field crontab expressions (minute precision) as well
//! as 6/7-field expressions that lead with seconds. Crontab numbers
//! day-of-week 0-7 with both 0 and 7 meaning Sunday; the evaluator counts
//! 1-7 from Sunday, so numeric day-of-week values in 5-field input are
//! shifted before parsing.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::DEFAULT_TIMEZONE;
use crate::error::{Result, SentinelError};

static NUMERIC_DOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap());

#[derive(Debug, Clone)]
pub struct Recurrence {
    expression: String,
    schedule: cron::Schedule,
    timezone: Tz,
}

impl Recurrence {
    pub fn parse(expression: &str, timezone: &str) -> Result<Self> {
        let timezone = parse_timezone(timezone)?;
        let normalized = normalize(expression)?;
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            SentinelError::Configuration(format!(
                "invalid recurrence expression '{}': {}",
                expression, e
            ))
        })?;
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire strictly after `after`, evaluated in the schedule's
    /// timezone.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Gap between the next two fires after `from`. `None` when the
    /// expression fires fewer than twice more.
    pub fn period(&self, from: DateTime<Utc>) -> Option<Duration> {
        let mut upcoming = self.schedule.after(&from.with_timezone(&self.timezone));
        let first = upcoming.next()?;
        let second = upcoming.next()?;
        (second - first).to_std().ok()
    }
}

fn parse_timezone(name: &str) -> Result<Tz> {
    let name = name.trim();
    let name = if name.is_empty() { DEFAULT_TIMEZONE } else { name };
    name.parse::<Tz>()
        .map_err(|_| SentinelError::Configuration(format!("unknown timezone '{}'", name)))
}

/// Bring an expression into the evaluator's 6/7-field form.
pub fn normalize(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => {
            let dow = translate_day_of_week(fields[4])?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            ))
        }
        6 | 7 => Ok(fields.join(" ")),
        n => Err(SentinelError::Configuration(format!(
            "recurrence expression '{}' has {} fields, expected 5, 6 or 7",
            expression, n
        ))),
    }
}

fn shift_day(token: &str, day: u32) -> Result<u32> {
    match day {
        0..=6 => Ok(day + 1),
        7 => Ok(1),
        _ => Err(SentinelError::Configuration(format!(
            "day-of-week '{}' out of range 0-7",
            token
        ))),
    }
}

fn translate_day_of_week(field: &str) -> Result<String> {
    let mut parts = Vec::new();
    for element in field.split(',') {
        let (base, step) = match element.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (element, None),
        };

        let Some(caps) = NUMERIC_DOW.captures(base) else {
            // `*`, `?` and day names need no translation.
            parts.push(element.to_string());
            continue;
        };

        let start: u32 = caps[1].parse().map_err(|_| bad_dow(element))?;
        let translated = match caps.get(2) {
            None => shift_day(element, start)?.to_string(),
            Some(end) => {
                let end: u32 = end.as_str().parse().map_err(|_| bad_dow(element))?;
                if start > end {
                    return Err(bad_dow(element));
                }
                match (start, end) {
                    (0, 7) => "1-7".to_string(),
                    // Sunday at the end wraps to the front.
                    (s, 7) if step.is_none() => format!("{}-7,1", shift_day(element, s)?),
                    (_, 7) => {
                        return Err(SentinelError::Configuration(format!(
                            "day-of-week '{}': stepped ranges ending on Sunday (7) are not supported",
                            element
                        )))
                    }
                    (s, e) => format!("{}-{}", shift_day(element, s)?, shift_day(element, e)?),
                }
            }
        };

        match step {
            Some(step) => parts.push(format!("{}/{}", translated, step)),
            None => parts.push(translated),
        }
    }
    Ok(parts.join(","))
}

fn bad_dow(element: &str) -> SentinelError {
    SentinelError::Configuration(format!("invalid day-of-week '{}'", element))
}
