//! Interval conversion
//!
//! Policies express durations as a count plus a unit. Configuration uses the
//! compact string form (`"5d"`, `"2h"`, `"1M"`): digits followed by exactly one
//! unit letter, where lowercase `m` is minutes and uppercase `M` is months.
//! An empty string means "unset".
//!
//! Months are 30 days and weeks are 7 days when normalizing to seconds.

use super::error::ValidationError;
use crate::api::types::int64;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static INTERVAL_RE: OnceLock<Regex> = OnceLock::new();

fn interval_regex() -> &'static Regex {
    INTERVAL_RE.get_or_init(|| {
        Regex::new(r"^(\d+)([smMhdw])$")
            .unwrap_or_else(|e| panic!("Failed to compile interval pattern: {}", e))
    })
}

/// Interval unit as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

impl IntervalUnit {
    /// Single-letter code used in the string form
    pub fn suffix(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
            Self::Weeks => 'w',
            Self::Months => 'M',
        }
    }

    pub fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            'd' => Some(Self::Days),
            'w' => Some(Self::Weeks),
            'M' => Some(Self::Months),
            _ => None,
        }
    }

    /// Number of seconds in one unit
    pub fn seconds(self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * Self::Minutes.seconds(),
            Self::Days => 24 * Self::Hours.seconds(),
            Self::Weeks => 7 * Self::Days.seconds(),
            Self::Months => 30 * Self::Days.seconds(),
        }
    }
}

/// A count of some time unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    #[serde(rename = "type")]
    pub unit: IntervalUnit,
    #[serde(default, with = "int64")]
    pub count: i64,
}

impl Interval {
    pub fn new(count: i64, unit: IntervalUnit) -> Self {
        Self { unit, count }
    }

    pub fn seconds(count: i64) -> Self {
        Self::new(count, IntervalUnit::Seconds)
    }

    /// Parse the compact string form. An empty string yields `None`.
    pub fn parse(value: &str) -> Result<Option<Self>, ValidationError> {
        if value.is_empty() {
            return Ok(None);
        }

        let invalid = || ValidationError::InvalidInterval {
            value: value.to_string(),
        };

        let caps = interval_regex().captures(value).ok_or_else(invalid)?;
        let count = caps[1].parse::<i64>().map_err(|_| invalid())?;
        let unit = caps[2]
            .chars()
            .next()
            .and_then(IntervalUnit::from_suffix)
            .ok_or_else(invalid)?;

        Ok(Some(Self::new(count, unit)))
    }

    /// Render the compact string form
    pub fn format(&self) -> String {
        format!("{}{}", self.count, self.unit.suffix())
    }

    /// Total length in seconds, saturating on overflow
    pub fn total_seconds(&self) -> i64 {
        self.count.saturating_mul(self.unit.seconds())
    }

    /// Rewrite this interval in place as a count of seconds
    pub fn normalize_to_seconds(&mut self) {
        self.count = self.total_seconds();
        self.unit = IntervalUnit::Seconds;
    }

    pub fn normalized_to_seconds(mut self) -> Self {
        self.normalize_to_seconds();
        self
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Check the string form without building a value
pub fn validate_interval(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || interval_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidInterval {
            value: value.to_string(),
        })
    }
}

pub fn parse_interval(value: &str) -> Result<Option<Interval>, ValidationError> {
    Interval::parse(value)
}

/// Format an optional interval; `None` renders as an empty string
pub fn format_interval(interval: Option<&Interval>) -> String {
    interval.map(Interval::format).unwrap_or_default()
}

pub fn normalize_to_seconds(interval: Option<Interval>) -> Option<Interval> {
    interval.map(Interval::normalized_to_seconds)
}
