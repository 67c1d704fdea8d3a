// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron pattern parsing and minute-boundary matching.
//!
//! Patterns use the classic `minute hour day-of-month month day-of-week`
//! form. Each field accepts `*`, `*/n`, `a`, `a-b`, `a-b/n`, and comma
//! lists. A handful of named patterns (`daily`, `hourly`, `monday`, ...)
//! expand to their five-field equivalents. Matching is evaluated against
//! the current minute in a caller-chosen timezone.

use chrono::{Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Errors produced while parsing a cron pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("invalid cron pattern `{pattern}`: expected 5 fields, found {found}")]
    FieldCount { pattern: String, found: usize },
    #[error("invalid cron pattern `{pattern}`: {reason} in `{field}`")]
    Field { pattern: String, field: String, reason: String },
}

/// Named shorthands and their five-field expansions.
const NAMED_PATTERNS: &[(&str, &str)] = &[
    ("minutely", "* * * * *"),
    ("hourly", "0 * * * *"),
    ("daily", "0 0 * * *"),
    ("weekly", "0 0 * * 0"),
    ("monthly", "0 0 1 * *"),
    ("yearly", "0 0 1 1 *"),
    ("sunday", "0 0 * * 0"),
    ("monday", "0 0 * * 1"),
    ("tuesday", "0 0 * * 2"),
    ("wednesday", "0 0 * * 3"),
    ("thursday", "0 0 * * 4"),
    ("friday", "0 0 * * 5"),
    ("saturday", "0 0 * * 6"),
];

/// A parsed cron pattern, one token per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPattern {
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
}

/// Name, value range, and day-of-week flag for each field position.
/// Day-of-week accepts both 0 and 7 for Sunday.
const FIELD_SPECS: &[(&str, u32, u32)] = &[
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("dayOfMonth", 1, 31),
    ("month", 1, 12),
    ("dayOfWeek", 0, 7),
];

impl CronPattern {
    /// Parse a five-field pattern or one of the named shorthands.
    pub fn parse(pattern: &str) -> Result<Self, CronError> {
        let lowered = pattern.trim().to_ascii_lowercase();
        let expanded = NAMED_PATTERNS
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, p)| *p)
            .unwrap_or(lowered.as_str());

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount {
                pattern: pattern.to_string(),
                found: fields.len(),
            });
        }
        for (token, (_, min, max)) in fields.iter().zip(FIELD_SPECS) {
            validate_field(token, *min, *max).map_err(|reason| CronError::Field {
                pattern: pattern.to_string(),
                field: token.to_string(),
                reason,
            })?;
        }
        Ok(Self {
            minute: fields[0].to_string(),
            hour: fields[1].to_string(),
            day_of_month: fields[2].to_string(),
            month: fields[3].to_string(),
            day_of_week: fields[4].to_string(),
        })
    }

    /// True when the pattern matches the minute containing `epoch_ms`,
    /// evaluated in `tz`.
    pub fn is_time_to_run(&self, tz: Tz, epoch_ms: u64) -> bool {
        let Some(utc) = Utc.timestamp_millis_opt(epoch_ms as i64).single() else {
            return false;
        };
        let t = utc.with_timezone(&tz);
        field_matches(&self.minute, t.minute(), 0, false)
            && field_matches(&self.hour, t.hour(), 0, false)
            && field_matches(&self.day_of_month, t.day(), 1, false)
            && field_matches(&self.month, t.month(), 1, false)
            && field_matches(&self.day_of_week, t.weekday().num_days_from_sunday(), 0, true)
    }
}

fn parse_num(s: &str, min: u32, max: u32) -> Result<u32, String> {
    let n: u32 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if n < min || n > max {
        return Err(format!("{n} is out of range {min}-{max}"));
    }
    Ok(n)
}

fn parse_step(s: &str) -> Result<u32, String> {
    let n: u32 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if n == 0 {
        return Err("step must be positive".to_string());
    }
    Ok(n)
}

/// Split `expr` into `(base, step)` around an optional `/`.
fn split_step(expr: &str) -> Result<(&str, Option<u32>), String> {
    match expr.split_once('/') {
        Some((base, step)) => Ok((base, Some(parse_step(step)?))),
        None => Ok((expr, None)),
    }
}

fn validate_field(expr: &str, min: u32, max: u32) -> Result<(), String> {
    if expr.is_empty() {
        return Err("empty field".to_string());
    }
    for part in expr.split(',') {
        let (base, _step) = split_step(part)?;
        if base == "*" {
            continue;
        }
        match base.split_once('-') {
            Some((a, b)) => {
                let lo = parse_num(a, min, max)?;
                let hi = parse_num(b, min, max)?;
                if lo > hi {
                    return Err(format!("range {lo}-{hi} is inverted"));
                }
            }
            None => {
                parse_num(base, min, max)?;
            }
        }
    }
    Ok(())
}

/// Match one field token against a value. For day-of-week, 0 (Sunday) also
/// matches tokens written as 7.
fn field_matches(expr: &str, value: u32, start: u32, sunday_wraps: bool) -> bool {
    let candidates: &[u32] = if sunday_wraps && value == 0 { &[0, 7] } else { &[value] };
    expr.split(',').any(|part| {
        let Ok((base, step)) = split_step(part) else {
            return false;
        };
        let (lo, hi) = if base == "*" {
            (start, u32::MAX)
        } else {
            match base.split_once('-') {
                Some((a, b)) => match (parse_num(a, 0, u32::MAX), parse_num(b, 0, u32::MAX)) {
                    (Ok(lo), Ok(hi)) => (lo, hi),
                    _ => return false,
                },
                None => match parse_num(base, 0, u32::MAX) {
                    Ok(n) => (n, n),
                    Err(_) => return false,
                },
            }
        };
        candidates.iter().any(|&v| {
            if v < lo || v > hi {
                return false;
            }
            match step {
                Some(n) => (v - lo) % n == 0,
                None => true,
            }
        })
    })
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
