//! Date/time candidates and their clustering container
//!
//! Different sources frequently report the same instant with small encoding
//! differences (sub-second truncation, a write a second later, a filename
//! rounded to the minute). Candidates within tolerance of each other are
//! clustered into one logical candidate before any resolution logic runs.
//!
//! # Matching rule
//! - Awareness must be identical
//! - Aware candidates: UTC instants within tolerance AND identical UTC offset
//! - Naive candidates: wall-clock delta within tolerance
//!
//! Closeness is single-linkage: a cluster spans `[earliest, latest]` of its
//! members and two clusters match when the gap between their spans is within
//! tolerance. This makes the final cluster set independent of insertion order.

use crate::keys;
use crate::model::EntryId;
use chrono::{Duration, FixedOffset};
use chrono_tz::Tz;
use pmx_common::Timestamp;
use std::collections::BTreeSet;
use std::fmt;

/// Where a candidate value came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKey {
    /// A single datetime key
    Single(String),
    /// Naive date key combined with a separate offset key
    Pair(String, String),
}

impl SourceKey {
    pub fn single(key: impl Into<String>) -> Self {
        SourceKey::Single(key.into())
    }

    pub fn pair(date_key: impl Into<String>, offset_key: impl Into<String>) -> Self {
        SourceKey::Pair(date_key.into(), offset_key.into())
    }

    /// Key holding the date value
    pub fn date_key(&self) -> &str {
        match self {
            SourceKey::Single(key) | SourceKey::Pair(key, _) => key,
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Single(key) => write!(f, "{}", key),
            SourceKey::Pair(date, offset) => write!(f, "{}+{}", date, offset),
        }
    }
}

/// One clustered timestamp value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeCandidate {
    value: Timestamp,
    latest: Timestamp,
    source_keys: BTreeSet<SourceKey>,
    source_ids: BTreeSet<EntryId>,
}

impl DateTimeCandidate {
    pub fn new(value: Timestamp, key: SourceKey, ids: impl IntoIterator<Item = EntryId>) -> Self {
        Self {
            value,
            latest: value,
            source_keys: BTreeSet::from([key]),
            source_ids: ids.into_iter().collect(),
        }
    }

    /// Representative value: the earliest member of the cluster
    pub fn value(&self) -> Timestamp {
        self.value
    }

    /// Latest member of the cluster
    pub fn latest(&self) -> Timestamp {
        self.latest
    }

    pub fn is_aware(&self) -> bool {
        self.value.is_aware()
    }

    pub fn is_utc(&self) -> bool {
        self.value.is_utc()
    }

    pub fn source_keys(&self) -> &BTreeSet<SourceKey> {
        &self.source_keys
    }

    pub fn source_ids(&self) -> &BTreeSet<EntryId> {
        &self.source_ids
    }

    /// Date keys of all sources (offset halves of pairs excluded)
    pub fn date_keys(&self) -> impl Iterator<Item = &str> {
        self.source_keys.iter().map(SourceKey::date_key)
    }

    /// Every source is a filename/title key
    pub fn is_filename_only(&self) -> bool {
        self.date_keys().all(keys::is_filename_key)
    }

    /// Every source key is contained in `set`
    pub fn all_keys_in(&self, set: &BTreeSet<String>) -> bool {
        self.source_keys
            .iter()
            .all(|k| matches!(k, SourceKey::Single(key) if set.contains(key)))
    }

    /// Gap between the spans of two clusters; `None` when they are not comparable
    /// (different awareness or different UTC offsets)
    pub fn distance(&self, other: &DateTimeCandidate) -> Option<Duration> {
        if self.is_aware() != other.is_aware() {
            return None;
        }
        if self.value.offset_seconds() != other.value.offset_seconds() {
            return None;
        }
        if let Some(gap) = other.value.delta(&self.latest) {
            if gap > Duration::zero() {
                return Some(gap);
            }
        }
        if let Some(gap) = self.value.delta(&other.latest) {
            if gap > Duration::zero() {
                return Some(gap);
            }
        }
        Some(Duration::zero())
    }

    pub fn matches(&self, other: &DateTimeCandidate, tolerance: Duration) -> bool {
        self.distance(other).is_some_and(|gap| gap <= tolerance)
    }

    /// Combine two clusters: earliest value wins, sources are unioned
    pub fn merge(mut self, other: DateTimeCandidate) -> Self {
        if other.value < self.value {
            self.value = other.value;
        }
        if other.latest > self.latest {
            self.latest = other.latest;
        }
        self.source_keys.extend(other.source_keys);
        self.source_ids.extend(other.source_ids);
        self
    }

    /// Same instant expressed at another offset
    pub fn with_offset(&self, offset: FixedOffset) -> Self {
        Self {
            value: self.value.with_offset(offset),
            latest: self.latest.with_offset(offset),
            ..self.clone()
        }
    }

    /// Same instant expressed in `tz`
    pub fn in_timezone(&self, tz: &Tz) -> Self {
        Self {
            value: self.value.in_timezone(tz),
            latest: self.latest.in_timezone(tz),
            ..self.clone()
        }
    }

    fn sort_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.source_keys.cmp(&other.source_keys))
            .then_with(|| self.source_ids.cmp(&other.source_ids))
    }
}

impl fmt::Display for DateTimeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.source_keys.iter().map(ToString::to_string).collect();
        let ids: Vec<String> = self.source_ids.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} (keys: {}; ids: [{}])",
            self.value,
            keys.join(", "),
            ids.join(", ")
        )
    }
}

/// Accumulator that keeps candidates clustered.
///
/// Invariant: no two candidates held by the container match each other.
#[derive(Debug, Clone)]
pub struct DateTimeCandidateContainer {
    aware_tolerance: Duration,
    naive_tolerance: Duration,
    candidates: Vec<DateTimeCandidate>,
}

impl DateTimeCandidateContainer {
    /// Container using one tolerance for aware and naive candidates
    pub fn new(tolerance: Duration) -> Self {
        Self::with_tolerances(tolerance, tolerance)
    }

    pub fn with_tolerances(aware_tolerance: Duration, naive_tolerance: Duration) -> Self {
        Self {
            aware_tolerance,
            naive_tolerance,
            candidates: Vec::new(),
        }
    }

    fn tolerance_for(&self, candidate: &DateTimeCandidate) -> Duration {
        if candidate.is_aware() {
            self.aware_tolerance
        } else {
            self.naive_tolerance
        }
    }

    /// Add a candidate, merging it with every existing candidate it matches
    pub fn add(&mut self, candidate: DateTimeCandidate) {
        let tolerance = self.tolerance_for(&candidate);
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.candidates)
            .into_iter()
            .partition(|existing| existing.matches(&candidate, tolerance));

        let merged = matching.into_iter().fold(candidate, DateTimeCandidate::merge);
        self.candidates = rest;
        self.candidates.push(merged);
        self.candidates.sort_by(DateTimeCandidate::sort_cmp);
    }

    pub fn candidates(&self) -> &[DateTimeCandidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<DateTimeCandidate> {
        self.candidates
    }

    pub fn aware_candidates(&self) -> Vec<&DateTimeCandidate> {
        self.candidates.iter().filter(|c| c.is_aware()).collect()
    }

    pub fn naive_candidates(&self) -> Vec<&DateTimeCandidate> {
        self.candidates.iter().filter(|c| !c.is_aware()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Extend<DateTimeCandidate> for DateTimeCandidateContainer {
    fn extend<I: IntoIterator<Item = DateTimeCandidate>>(&mut self, iter: I) {
        for candidate in iter {
            self.add(candidate);
        }
    }
}
