//! Cron normalization and next-fire helpers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::Result;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Callers usually write standard 5-field cron: `min hour day-of-month month day-of-week`.
pub(crate) fn normalize_cron(cron_5field: &str) -> String {
    let trimmed = cron_5field.trim();
    let field_count = trimmed.split_whitespace().count();
    if field_count == 5 {
        format!("0 {}", trimmed)
    } else {
        // Already 6-field or non-standard; let the parser decide.
        trimmed.to_string()
    }
}

/// A parsed cron expression evaluated in a fixed time zone.
///
/// Minute and hour fields accept `*`, comma lists (`0,15,30`) and ranges
/// (`9-17`); the remaining fields follow the `cron` crate's grammar.
#[derive(Debug, Clone)]
pub struct CronExpr {
    /// Expression as written by the caller.
    source: String,
    zone: Tz,
    compiled: cron::Schedule,
}

impl CronExpr {
    /// Parse `expression` (5 or 6 fields) for evaluation in `zone`.
    pub fn parse(expression: &str, zone: Tz) -> Result<Self> {
        let compiled = cron::Schedule::from_str(&normalize_cron(expression))?;
        Ok(Self {
            source: expression.trim().to_string(),
            zone,
            compiled,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// First fire time strictly after `from`.
    pub(crate) fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = from.with_timezone(&self.zone);
        self.compiled
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
            .filter(|next| *next > from)
    }
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.zone == other.zone
    }
}
