//! Timestamp type shared by every PMX crate
//!
//! Metadata sources disagree not only on values but on *kinds* of values: EXIF
//! stores wall-clock local time without an offset, QuickTime stores UTC, XMP
//! usually carries an explicit offset and cloud sidecars store Unix epochs.
//! [`Timestamp`] keeps the distinction between an aware value (with a UTC
//! offset) and a naive value (ambiguous local time) explicit in the type.

use crate::{Error, Result};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Format used by exiftool for date/time tags (no offset)
pub const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

static OFFSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-])(\d{2}):(\d{2})$").expect("offset regex is valid"));

static EXIF_DATE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}):(\d{2}):(\d{2})").expect("exif date regex is valid"));

/// A point in time that is either timezone-aware or naive
#[derive(Debug, Clone, Copy)]
pub enum Timestamp {
    /// Local wall-clock time with no offset information
    Naive(NaiveDateTime),
    /// Time with an explicit UTC offset
    Aware(DateTime<FixedOffset>),
}

impl Timestamp {
    /// Aware timestamp at the given instant in UTC
    pub fn utc(naive_utc: NaiveDateTime) -> Self {
        Timestamp::Aware(Utc.from_utc_datetime(&naive_utc).fixed_offset())
    }

    pub fn is_aware(&self) -> bool {
        matches!(self, Timestamp::Aware(_))
    }

    /// Aware with a zero offset
    pub fn is_utc(&self) -> bool {
        self.offset_seconds() == Some(0)
    }

    /// UTC offset in seconds, `None` for naive values
    pub fn offset_seconds(&self) -> Option<i32> {
        match self {
            Timestamp::Naive(_) => None,
            Timestamp::Aware(dt) => Some(dt.offset().local_minus_utc()),
        }
    }

    /// Wall-clock representation (the value itself for naive timestamps)
    pub fn local_naive(&self) -> NaiveDateTime {
        match self {
            Timestamp::Naive(n) => *n,
            Timestamp::Aware(dt) => dt.naive_local(),
        }
    }

    /// UTC wall-clock representation; naive values are returned unchanged
    pub fn utc_naive(&self) -> NaiveDateTime {
        match self {
            Timestamp::Naive(n) => *n,
            Timestamp::Aware(dt) => dt.naive_utc(),
        }
    }

    /// Interpret a naive value as UTC. Aware values are returned unchanged.
    pub fn as_utc_stamped(&self) -> Self {
        match self {
            Timestamp::Naive(n) => Timestamp::utc(*n),
            aware => *aware,
        }
    }

    /// Drop the offset and keep the wall-clock time
    pub fn strip_offset(&self) -> Self {
        Timestamp::Naive(self.local_naive())
    }

    /// Re-express an aware value at the given offset (same instant)
    pub fn with_offset(&self, offset: FixedOffset) -> Self {
        match self {
            Timestamp::Aware(dt) => Timestamp::Aware(dt.with_timezone(&offset)),
            naive => *naive,
        }
    }

    /// Re-express an aware value in `tz` (same instant); naive values are localized
    pub fn in_timezone(&self, tz: &Tz) -> Self {
        match self {
            Timestamp::Aware(dt) => Timestamp::Aware(dt.with_timezone(tz).fixed_offset()),
            Timestamp::Naive(_) => self.localize(tz),
        }
    }

    /// Attach `tz` to a naive wall-clock value.
    ///
    /// Ambiguous local times (DST fold) resolve to the earlier instant. Local
    /// times that do not exist in `tz` (DST gap) stay naive.
    pub fn localize(&self, tz: &Tz) -> Self {
        match self {
            Timestamp::Naive(n) => match tz.from_local_datetime(n) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Timestamp::Aware(dt.fixed_offset())
                }
                LocalResult::None => *self,
            },
            aware => *aware,
        }
    }

    /// Signed difference `self - other`, comparing UTC instants for aware values
    /// and wall clocks for naive ones. `None` when awareness differs.
    pub fn delta(&self, other: &Timestamp) -> Option<Duration> {
        match (self, other) {
            (Timestamp::Aware(a), Timestamp::Aware(b)) => Some(a.signed_duration_since(*b)),
            (Timestamp::Naive(a), Timestamp::Naive(b)) => Some(a.signed_duration_since(*b)),
            _ => None,
        }
    }

    /// Key that orders timestamps of the same awareness chronologically
    pub fn sort_key(&self) -> NaiveDateTime {
        self.utc_naive()
    }

    /// exiftool representation of the wall-clock time
    pub fn exif_string(&self) -> String {
        self.local_naive().format(EXIF_FORMAT).to_string()
    }

    /// Parse the timestamp representations produced by metadata extractors.
    ///
    /// Accepted forms:
    /// - `2023:06:15 14:30:12`, optionally with `.fff` and `+02:00` / `Z`
    /// - ISO 8601 / RFC 3339 (`2023-06-15T14:30:12+02:00`)
    /// - Unix epoch seconds (`1686839412`), read as UTC
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::Timestamp("empty timestamp".to_string()));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) && (9..=12).contains(&trimmed.len()) {
            let secs: i64 = trimmed
                .parse()
                .map_err(|_| Error::Timestamp(format!("invalid epoch value '{}'", trimmed)))?;
            return DateTime::from_timestamp(secs, 0)
                .map(|dt| Timestamp::Aware(dt.fixed_offset()))
                .ok_or_else(|| Error::Timestamp(format!("epoch out of range '{}'", trimmed)));
        }

        let normalized = EXIF_DATE_PREFIX_RE.replace(trimmed, "$1-$2-$3");
        let normalized = normalized.replacen(' ', "T", 1);

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
            return Ok(Timestamp::Aware(dt));
        }
        if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%:z") {
            return Ok(Timestamp::Aware(dt));
        }
        if let Some(stripped) = normalized.strip_suffix('Z') {
            if let Ok(n) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f") {
                return Ok(Timestamp::utc(n));
            }
        }
        NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
            .map(Timestamp::Naive)
            .map_err(|e| Error::Timestamp(format!("'{}': {}", trimmed, e)))
    }
}

/// Strict `±HH:MM` offset parser used for EXIF `OffsetTime*` tags
pub fn parse_offset(input: &str) -> Option<FixedOffset> {
    let caps = OFFSET_RE.captures(input.trim())?;
    let hours: i32 = caps.get(2)?.as_str().parse().ok()?;
    let minutes: i32 = caps.get(3)?.as_str().parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }
    let seconds = hours * 3600 + minutes * 60;
    match caps.get(1)?.as_str() {
        "-" => FixedOffset::west_opt(seconds),
        _ => FixedOffset::east_opt(seconds),
    }
}

/// Offset of `tz` at the UTC instant of `at`
pub fn offset_at(tz: &Tz, at: &DateTime<FixedOffset>) -> FixedOffset {
    tz.offset_from_utc_datetime(&at.naive_utc()).fix()
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Timestamp::Naive(a), Timestamp::Naive(b)) => a == b,
            (Timestamp::Aware(a), Timestamp::Aware(b)) => a == b && a.offset() == b.offset(),
            _ => false,
        }
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Timestamp::Naive(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            Timestamp::Aware(dt) => {
                1u8.hash(state);
                dt.naive_utc().hash(state);
                dt.offset().local_minus_utc().hash(state);
            }
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Naive values sort before aware ones; within a kind, chronologically, then by offset.
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.is_aware()
            .cmp(&other.is_aware())
            .then_with(|| self.sort_key().cmp(&other.sort_key()))
            .then_with(|| self.offset_seconds().cmp(&other.offset_seconds()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Naive(n) => write!(f, "{}", n.format("%Y-%m-%dT%H:%M:%S%.f")),
            Timestamp::Aware(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f%:z")),
        }
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Timestamp::Naive(value)
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Timestamp::Aware(value)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Timestamp::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a timestamp string or Unix epoch seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Timestamp, E> {
        Timestamp::parse(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Timestamp, E> {
        DateTime::from_timestamp(v, 0)
            .map(|dt| Timestamp::Aware(dt.fixed_offset()))
            .ok_or_else(|| E::custom(format!("epoch out of range: {}", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Timestamp, E> {
        let secs = i64::try_from(v).map_err(E::custom)?;
        self.visit_i64(secs)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}
