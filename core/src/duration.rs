//! Duration quantities.
//!
//! A [`DurationValue`] is a signed time span with millisecond precision,
//! parsed from literals such as `"70ms"`, `"5s"`, `"2h"` or `"1Y"`, or taken
//! from a raw millisecond count. Months count as 30 days and years as 365.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::TimeDelta;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::byte_size::MAX_SAFE_INTEGER;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?\d+)\s*(ms|s|m|h|d|w|M|Y)?\s*$").expect("static regex must compile")
});

/// Unit suffix of a duration literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    /// `ms`
    Milliseconds,
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// `w`
    Weeks,
    /// `M` (30 days)
    Months,
    /// `Y` (365 days)
    Years,
}

impl DurationUnit {
    /// Units used when formatting, largest first. Months and years are
    /// parse-only since they are not exact multiples of weeks.
    const FORMAT_ORDER: [DurationUnit; 6] = [
        DurationUnit::Weeks,
        DurationUnit::Days,
        DurationUnit::Hours,
        DurationUnit::Minutes,
        DurationUnit::Seconds,
        DurationUnit::Milliseconds,
    ];

    /// Milliseconds in one unit.
    pub const fn millis(self) -> i64 {
        match self {
            DurationUnit::Milliseconds => 1,
            DurationUnit::Seconds => 1_000,
            DurationUnit::Minutes => 60_000,
            DurationUnit::Hours => 3_600_000,
            DurationUnit::Days => 86_400_000,
            DurationUnit::Weeks => 7 * 86_400_000,
            DurationUnit::Months => 30 * 86_400_000,
            DurationUnit::Years => 365 * 86_400_000,
        }
    }

    /// Literal suffix.
    pub const fn suffix(self) -> &'static str {
        match self {
            DurationUnit::Milliseconds => "ms",
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "m",
            DurationUnit::Hours => "h",
            DurationUnit::Days => "d",
            DurationUnit::Weeks => "w",
            DurationUnit::Months => "M",
            DurationUnit::Years => "Y",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "ms" => Some(DurationUnit::Milliseconds),
            "s" => Some(DurationUnit::Seconds),
            "m" => Some(DurationUnit::Minutes),
            "h" => Some(DurationUnit::Hours),
            "d" => Some(DurationUnit::Days),
            "w" => Some(DurationUnit::Weeks),
            "M" => Some(DurationUnit::Months),
            "Y" => Some(DurationUnit::Years),
            _ => None,
        }
    }
}

/// Failure to read a duration literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// Text does not follow `<count>[ms|s|m|h|d|w|M|Y]`.
    #[error(
        "Failed to parse value as time value. Value must be a duration in milliseconds, or follow the format <count>[ms|s|m|h|d|w|M|Y] (e.g. '70ms', '5s', '3d', '1Y'), where the duration is a safe integer. Got [{0}]."
    )]
    Malformed(String),
    /// Numeric input with a fractional part or outside the safe integer range.
    #[error("Duration in milliseconds is expected to be a safe integer, but provided [{0}].")]
    NotAnInteger(String),
    /// Span does not fit the millisecond range.
    #[error("Duration [{0}] is out of range.")]
    Overflow(String),
}

/// A signed time span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DurationValue(TimeDelta);

impl DurationValue {
    /// Creates a span of `millis` milliseconds.
    pub fn from_millis(millis: i64) -> Result<Self, DurationParseError> {
        TimeDelta::try_milliseconds(millis)
            .map(Self)
            .ok_or_else(|| DurationParseError::Overflow(format!("{millis}ms")))
    }

    /// Creates a span of `count` units.
    pub fn from_unit(count: i64, unit: DurationUnit) -> Result<Self, DurationParseError> {
        let millis = count
            .checked_mul(unit.millis())
            .ok_or_else(|| DurationParseError::Overflow(format!("{count}{}", unit.suffix())))?;
        Self::from_millis(millis)
    }

    /// Creates a span from a numeric millisecond count.
    pub fn from_number(number: f64) -> Result<Self, DurationParseError> {
        if !number.is_finite() || number.fract() != 0.0 || number.abs() > MAX_SAFE_INTEGER {
            return Err(DurationParseError::NotAnInteger(number.to_string()));
        }
        Self::from_millis(number as i64)
    }

    /// Parses a duration literal. Unitless integers are milliseconds.
    pub fn parse(text: &str) -> Result<Self, DurationParseError> {
        let captures = DURATION_RE
            .captures(text)
            .ok_or_else(|| DurationParseError::Malformed(text.to_string()))?;

        let count: i64 = captures[1]
            .parse()
            .map_err(|_| DurationParseError::Overflow(text.to_string()))?;
        let unit = captures
            .get(2)
            .and_then(|m| DurationUnit::from_suffix(m.as_str()))
            .unwrap_or(DurationUnit::Milliseconds);

        Self::from_unit(count, unit)
    }

    /// Returns the span in whole milliseconds.
    pub fn as_millis(self) -> i64 {
        self.0.num_milliseconds()
    }

    /// Returns the underlying [`TimeDelta`].
    pub const fn as_time_delta(self) -> TimeDelta {
        self.0
    }

    /// Converts to [`std::time::Duration`]; `None` for negative spans.
    pub fn to_std(self) -> Option<std::time::Duration> {
        self.0.to_std().ok()
    }
}

impl From<TimeDelta> for DurationValue {
    /// Sub-millisecond precision is dropped.
    fn from(delta: TimeDelta) -> Self {
        Self(TimeDelta::milliseconds(delta.num_milliseconds()))
    }
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.as_millis();
        let unit = DurationUnit::FORMAT_ORDER
            .into_iter()
            .find(|u| millis != 0 && millis % u.millis() == 0)
            .unwrap_or(DurationUnit::Milliseconds);
        write!(f, "{}{}", millis / unit.millis(), unit.suffix())
    }
}

impl FromStr for DurationValue {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DurationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DurationValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = DurationValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a millisecond count or a <count>[ms|s|m|h|d|w|M|Y] literal")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                DurationValue::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                DurationValue::from_millis(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                let millis = i64::try_from(v)
                    .map_err(|_| E::custom(DurationParseError::Overflow(v.to_string())))?;
                DurationValue::from_millis(millis).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                DurationValue::from_number(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
