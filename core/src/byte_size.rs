//! Byte-size quantities.
//!
//! A [`ByteSizeValue`] is a count of bytes parsed from literals such as
//! `"100b"`, `"1kb"` or `"20MB"`, or taken from a raw integer. Unit suffixes
//! are case-insensitive and scale by powers of 1024. A leading sign is
//! accepted by the grammar; rejecting negative sizes is left to `min` rules.
//!
//! # Examples
//!
//! ```
//! use config_schema_core::{ByteSizeValue, ByteUnit};
//!
//! let size = ByteSizeValue::parse("1kb").unwrap();
//! assert_eq!(size.bytes(), 1024);
//! assert_eq!(size, ByteSizeValue::from_bytes(1024));
//! assert_eq!(size.to_string(), "1kb");
//! assert_eq!(ByteSizeValue::from_bytes(1536).to_string_in(None), "1.5kb");
//! assert_eq!(ByteSizeValue::from_bytes(1536).to_string_in(Some(ByteUnit::B)), "1536b");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Largest integer an `f64` represents exactly.
pub(crate) const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

static BYTE_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([+-]?\d+)\s*(b|kb|mb|gb)?\s*$").expect("static regex must compile")
});

/// Unit suffix of a byte-size literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ByteUnit {
    /// Bytes (`b`).
    B,
    /// Kibibytes (`kb`).
    Kb,
    /// Mebibytes (`mb`).
    Mb,
    /// Gibibytes (`gb`).
    Gb,
}

impl ByteUnit {
    /// Units from largest to smallest.
    pub const DESCENDING: [ByteUnit; 4] = [ByteUnit::Gb, ByteUnit::Mb, ByteUnit::Kb, ByteUnit::B];

    /// Number of bytes in one unit.
    pub const fn multiplier(self) -> i64 {
        match self {
            ByteUnit::B => 1,
            ByteUnit::Kb => 1 << 10,
            ByteUnit::Mb => 1 << 20,
            ByteUnit::Gb => 1 << 30,
        }
    }

    /// Lowercase literal suffix.
    pub const fn suffix(self) -> &'static str {
        match self {
            ByteUnit::B => "b",
            ByteUnit::Kb => "kb",
            ByteUnit::Mb => "mb",
            ByteUnit::Gb => "gb",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "b" => Some(ByteUnit::B),
            "kb" => Some(ByteUnit::Kb),
            "mb" => Some(ByteUnit::Mb),
            "gb" => Some(ByteUnit::Gb),
            _ => None,
        }
    }
}

/// Failure to read a byte-size literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteSizeParseError {
    /// Text does not follow `<count>[b|kb|mb|gb]`.
    #[error(
        "Failed to parse value as byte value. Value must be either number of bytes, or follow the format <count>[b|kb|mb|gb] (e.g., '1024kb', '200mb', '1gb'), where the number is a safe integer. Got [{0}]."
    )]
    Malformed(String),
    /// Numeric input with a fractional part or outside the safe integer range.
    #[error("Value in bytes is expected to be a safe integer, but provided [{0}].")]
    NotAnInteger(String),
    /// Count times unit does not fit in 64 bits.
    #[error("Byte value [{0}] is out of range.")]
    Overflow(String),
}

/// A quantity of bytes.
///
/// Ordering compares byte counts, so `"1kb" > "1000b"` regardless of how the
/// literals were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSizeValue(i64);

impl ByteSizeValue {
    /// Creates a quantity from a raw byte count.
    pub const fn from_bytes(bytes: i64) -> Self {
        Self(bytes)
    }

    /// Creates a quantity from a count of `unit`.
    pub fn from_unit(count: i64, unit: ByteUnit) -> Result<Self, ByteSizeParseError> {
        count
            .checked_mul(unit.multiplier())
            .map(Self)
            .ok_or_else(|| ByteSizeParseError::Overflow(format!("{count}{}", unit.suffix())))
    }

    /// Creates a quantity from a numeric byte count.
    ///
    /// The number must be an integer within the `f64` safe integer range.
    pub fn from_number(number: f64) -> Result<Self, ByteSizeParseError> {
        if !number.is_finite() || number.fract() != 0.0 || number.abs() > MAX_SAFE_INTEGER {
            return Err(ByteSizeParseError::NotAnInteger(number.to_string()));
        }
        Ok(Self(number as i64))
    }

    /// Parses a byte-size literal. Unitless integers are byte counts.
    pub fn parse(text: &str) -> Result<Self, ByteSizeParseError> {
        let captures = BYTE_SIZE_RE
            .captures(text)
            .ok_or_else(|| ByteSizeParseError::Malformed(text.to_string()))?;

        let count: i64 = captures[1]
            .parse()
            .map_err(|_| ByteSizeParseError::Overflow(text.to_string()))?;
        let unit = captures
            .get(2)
            .and_then(|m| ByteUnit::from_suffix(m.as_str()))
            .unwrap_or(ByteUnit::B);

        Self::from_unit(count, unit)
    }

    /// Returns the byte count.
    pub const fn bytes(self) -> i64 {
        self.0
    }

    /// Returns `true` if this quantity is smaller than `other`.
    pub fn is_less_than(self, other: Self) -> bool {
        self < other
    }

    /// Returns `true` if this quantity is larger than `other`.
    pub fn is_greater_than(self, other: Self) -> bool {
        self > other
    }

    /// Formats with up to two decimals in `unit`, or in the largest unit not
    /// exceeding the quantity when `unit` is `None`.
    pub fn to_string_in(self, unit: Option<ByteUnit>) -> String {
        let unit = unit.unwrap_or_else(|| {
            ByteUnit::DESCENDING
                .into_iter()
                .find(|u| self.0.unsigned_abs() >= u.multiplier().unsigned_abs())
                .unwrap_or(ByteUnit::B)
        });
        let scaled = self.0 as f64 / unit.multiplier() as f64;
        let rendered = format!("{scaled:.2}");
        let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
        format!("{rendered}{}", unit.suffix())
    }
}

impl fmt::Display for ByteSizeValue {
    /// Prints the largest unit that divides the count exactly, so the output
    /// parses back to the same quantity.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = ByteUnit::DESCENDING
            .into_iter()
            .find(|u| self.0 != 0 && self.0 % u.multiplier() == 0)
            .unwrap_or(ByteUnit::B);
        write!(f, "{}{}", self.0 / unit.multiplier(), unit.suffix())
    }
}

impl FromStr for ByteSizeValue {
    type Err = ByteSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ByteSizeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSizeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSizeValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a <count>[b|kb|mb|gb] literal")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                ByteSizeValue::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ByteSizeValue::from_bytes(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .map(ByteSizeValue::from_bytes)
                    .map_err(|_| E::custom(ByteSizeParseError::Overflow(v.to_string())))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                ByteSizeValue::from_number(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}
