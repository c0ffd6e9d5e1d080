//! Temporal parameter resolution
//!
//! A timestamp selection can carry relative markers (offset + period unit),
//! absolute epoch timestamps, or a reference into a named period. Two
//! resolution modes exist:
//! - Relative (automation context): relative markers are encoded as opaque
//!   `"<offset>_<UNIT>"` strings and resolved against "now" much later, at
//!   execution time, by a downstream component.
//! - Absolute (interactive context): everything resolves immediately to
//!   epoch milliseconds.
//!
//! Mixing encodings across the two sides of a window is allowed; carrying
//! both encodings for the same side is rejected.

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use vesta_core::Params;

/// Calendar period unit used by relative markers and named periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodUnit {
    /// One calendar day
    Day,
    /// One ISO week (Monday-based)
    Week,
    /// One calendar month
    Month,
    /// One calendar year
    Year,
}

impl PeriodUnit {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
        }
    }
}

/// Relative time marker: an offset in period units from "now".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeMarker {
    /// Signed offset (negative = past)
    pub offset: i64,
    /// Period unit of the offset
    #[serde(rename = "type")]
    pub unit: PeriodUnit,
}

impl RelativeMarker {
    /// Opaque wire encoding resolved downstream at execution time.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}_{}", self.offset, self.unit.as_str())
    }
}

/// Reference into a named period: any instant inside the period plus its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodRef {
    /// Period unit
    #[serde(rename = "type")]
    pub unit: PeriodUnit,
    /// Epoch milliseconds of any instant inside the period
    pub reference: i64,
}

/// Timestamp selection attached to an enrichment's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimestampSelection {
    /// Relative start marker
    pub relative_start: Option<RelativeMarker>,
    /// Relative end marker
    pub relative_end: Option<RelativeMarker>,
    /// Absolute start, epoch milliseconds
    pub min_custom_date_time: Option<i64>,
    /// Absolute end, epoch milliseconds
    pub max_custom_date_time: Option<i64>,
    /// Named period filling any side not otherwise bounded
    pub selected_period: Option<PeriodRef>,
}

impl TimestampSelection {
    /// True when no bound of any kind is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relative_start.is_none()
            && self.relative_end.is_none()
            && self.min_custom_date_time.is_none()
            && self.max_custom_date_time.is_none()
            && self.selected_period.is_none()
    }
}

/// Resolution mode for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalMode {
    /// Automation context: keep relative markers symbolic
    Relative,
    /// Interactive context: resolve everything against "now"
    Absolute,
}

/// Temporal resolution errors.
#[derive(Debug, Error, PartialEq)]
pub enum TemporalError {
    /// A side carries both a relative marker and an absolute timestamp
    #[error("conflicting {side} bounds: relative marker and absolute timestamp")]
    ConflictingBounds {
        /// Which side of the window conflicts
        side: &'static str,
    },
    /// A timestamp does not map to a representable instant
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
}

/// One resolved bound of a time window.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeBound {
    /// Absolute epoch milliseconds
    Millis(i64),
    /// Opaque relative encoding, resolved downstream
    Encoded(String),
}

impl TimeBound {
    fn to_value(&self) -> Value {
        match self {
            Self::Millis(ms) => Value::from(*ms),
            Self::Encoded(s) => Value::from(s.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339()),
            Self::Encoded(s) => s.clone(),
        }
    }
}

/// Resolved time window attached to a temporal command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeWindow {
    /// Start bound, open when absent
    pub start: Option<TimeBound>,
    /// End bound, open when absent
    pub end: Option<TimeBound>,
}

impl TimeWindow {
    /// Insert the window into a command parameter map.
    pub fn apply(&self, params: &mut Params) {
        if let Some(start) = &self.start {
            params.insert("start_time".into(), start.to_value());
        }
        if let Some(end) = &self.end {
            params.insert("end_time".into(), end.to_value());
        }
    }

    /// Rebuild a window from command parameters.
    #[must_use]
    pub fn from_params(params: &Params) -> Self {
        let bound = |key: &str| {
            params.get(key).and_then(|v| match v {
                Value::Number(n) => n.as_i64().map(TimeBound::Millis),
                Value::String(s) => Some(TimeBound::Encoded(s.clone())),
                _ => None,
            })
        };
        Self {
            start: bound("start_time"),
            end: bound("end_time"),
        }
    }

    /// Human-readable window description for data titles.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                format!("between {} and {}", start.describe(), end.describe())
            }
            (Some(start), None) => format!("open-ended from {}", start.describe()),
            (None, Some(end)) => format!("open-ended up to {}", end.describe()),
            (None, None) => "all time".to_string(),
        }
    }
}

/// Period arithmetic collaborator: maps a period reference to its bounds.
pub trait PeriodMath: Send + Sync {
    /// Epoch milliseconds of the period's first instant.
    fn period_start(&self, unit: PeriodUnit, reference_ms: i64) -> i64;

    /// Epoch milliseconds of the period's last instant.
    fn period_end(&self, unit: PeriodUnit, reference_ms: i64) -> i64;
}

/// UTC calendar implementation of [`PeriodMath`]. Weeks start on Monday.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarPeriodMath;

impl CalendarPeriodMath {
    fn start_of(unit: PeriodUnit, reference_ms: i64) -> DateTime<Utc> {
        let dt = Utc
            .timestamp_millis_opt(reference_ms)
            .single()
            .unwrap_or_else(Utc::now);
        let day = dt.date_naive();
        let start_day = match unit {
            PeriodUnit::Day => day,
            PeriodUnit::Week => day - Duration::days(i64::from(day.weekday().num_days_from_monday())),
            PeriodUnit::Month => day.with_day(1).unwrap_or(day),
            PeriodUnit::Year => day.with_month(1).and_then(|d| d.with_day(1)).unwrap_or(day),
        };
        Utc.from_utc_datetime(&start_day.and_hms_opt(0, 0, 0).expect("midnight is valid"))
    }

    fn next_start(unit: PeriodUnit, start: DateTime<Utc>) -> DateTime<Utc> {
        match unit {
            PeriodUnit::Day => start + Duration::days(1),
            PeriodUnit::Week => start + Duration::weeks(1),
            PeriodUnit::Month => start.checked_add_months(Months::new(1)).unwrap_or(start),
            PeriodUnit::Year => start.checked_add_months(Months::new(12)).unwrap_or(start),
        }
    }
}

impl PeriodMath for CalendarPeriodMath {
    fn period_start(&self, unit: PeriodUnit, reference_ms: i64) -> i64 {
        Self::start_of(unit, reference_ms).timestamp_millis()
    }

    fn period_end(&self, unit: PeriodUnit, reference_ms: i64) -> i64 {
        let start = Self::start_of(unit, reference_ms);
        Self::next_start(unit, start).timestamp_millis() - 1
    }
}

fn shift_from(now: DateTime<Utc>, marker: &RelativeMarker) -> i64 {
    let shifted = match marker.unit {
        PeriodUnit::Day => Some(now + Duration::days(marker.offset)),
        PeriodUnit::Week => Some(now + Duration::weeks(marker.offset)),
        PeriodUnit::Month => shift_months(now, marker.offset),
        PeriodUnit::Year => shift_months(now, marker.offset.saturating_mul(12)),
    };
    shifted.unwrap_or(now).timestamp_millis()
}

fn shift_months(now: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        now.checked_add_months(magnitude)
    } else {
        now.checked_sub_months(magnitude)
    }
}

/// Resolve a timestamp selection into a concrete window.
///
/// `now` is only consulted in [`TemporalMode::Absolute`]; relative mode keeps
/// relative markers symbolic on purpose, because automation commands may run
/// long after they were authored.
pub fn resolve_window(
    selection: &TimestampSelection,
    mode: TemporalMode,
    now: DateTime<Utc>,
    math: &dyn PeriodMath,
) -> Result<TimeWindow, TemporalError> {
    if selection.relative_start.is_some() && selection.min_custom_date_time.is_some() {
        return Err(TemporalError::ConflictingBounds { side: "start" });
    }
    if selection.relative_end.is_some() && selection.max_custom_date_time.is_some() {
        return Err(TemporalError::ConflictingBounds { side: "end" });
    }

    let start = if let Some(marker) = &selection.relative_start {
        Some(match mode {
            TemporalMode::Relative => TimeBound::Encoded(marker.encode()),
            TemporalMode::Absolute => TimeBound::Millis(shift_from(now, marker)),
        })
    } else if let Some(ms) = selection.min_custom_date_time {
        Some(TimeBound::Millis(ms))
    } else {
        selection
            .selected_period
            .map(|p| TimeBound::Millis(math.period_start(p.unit, p.reference)))
    };

    let end = if let Some(marker) = &selection.relative_end {
        Some(match mode {
            TemporalMode::Relative => TimeBound::Encoded(marker.encode()),
            TemporalMode::Absolute => TimeBound::Millis(shift_from(now, marker)),
        })
    } else if let Some(ms) = selection.max_custom_date_time {
        Some(TimeBound::Millis(ms))
    } else {
        selection
            .selected_period
            .map(|p| TimeBound::Millis(math.period_end(p.unit, p.reference)))
    };

    Ok(TimeWindow { start, end })
}
