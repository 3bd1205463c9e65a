//! Date/time and timezone reconciliation
//!
//! Establishes one canonical timestamp for a field ("taken" or "modified")
//! from a mix of aware and naive sources.
//!
//! # Algorithm
//! 1. Gather candidates from the configured keys (EXIF date + offset pairs
//!    become aware candidates, known-UTC keys are stamped UTC) and cluster them.
//!    Filename-derived dates are clustered separately with a looser tolerance
//!    and then merged in.
//! 2. Look up the timezone at the resolved GPS position, if any.
//! 3. With aware candidates: pick a primary, reconcile it with the GPS
//!    timezone, then either infer an offset for a UTC primary from the naive
//!    candidates or validate the naive candidates against a local primary.
//! 4. With only naive candidates: commit a single one (localized when the
//!    timezone is known), try the UTC/local pairing for two of them, or fall
//!    back to a loose re-clustering pass.
//!
//! Every unresolvable disagreement is recorded as a conflict for the field.

use crate::candidate::{DateTimeCandidate, DateTimeCandidateContainer, SourceKey};
use crate::config::MergeConfig;
use crate::context::MergeContext;
use crate::error::{MergeError, MergeResult};
use crate::export::{DateTimeKind, ExportArgument};
use crate::keys;
use crate::model::EntryId;
use crate::pipeline::MergeStep;
use crate::steps::gps_timezone;
use crate::timezone::TimezoneLookup;
use chrono::{Duration, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use pmx_common::human_time::{format_delta, format_offset};
use pmx_common::time::{offset_at, parse_offset};
use pmx_common::Timestamp;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const HALF_HOUR_SECS: i64 = 1800;
const MIN_OFFSET_SECS: i64 = -12 * 3600;
const MAX_OFFSET_SECS: i64 = 14 * 3600;

/// A key (or key pair) consulted for candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKey {
    Single(String),
    /// Naive date combined with a separate `±HH:MM` offset tag
    WithOffset { date: String, offset: String },
}

impl CandidateKey {
    pub fn single(key: &str) -> Self {
        CandidateKey::Single(key.to_string())
    }

    pub fn with_offset(date: &str, offset: &str) -> Self {
        CandidateKey::WithOffset {
            date: date.to_string(),
            offset: offset.to_string(),
        }
    }
}

/// What one datetime step resolves and from where
#[derive(Debug, Clone)]
pub struct DateTimeFieldConfig {
    pub field: String,
    pub kind: DateTimeKind,
    pub keys: Vec<CandidateKey>,
    /// Keys whose values are UTC by definition
    pub utc_keys: BTreeSet<String>,
    /// Merge filename-derived dates in as candidates
    pub include_filenames: bool,
}

impl DateTimeFieldConfig {
    /// Capture time
    pub fn taken() -> Self {
        Self {
            field: keys::FIELD_TAKEN.to_string(),
            kind: DateTimeKind::Taken,
            keys: vec![
                CandidateKey::single(keys::XMP_DATETIME_ORIGINAL),
                CandidateKey::with_offset(keys::EXIF_DATETIME_ORIGINAL, keys::EXIF_OFFSET_TIME_ORIGINAL),
                CandidateKey::single(keys::EXIF_DATETIME_ORIGINAL),
                CandidateKey::single(keys::EXIF_CREATE_DATE),
                CandidateKey::single(keys::QUICKTIME_CREATE_DATE),
                CandidateKey::single(keys::QUICKTIME_MEDIA_CREATE_DATE),
                CandidateKey::single(keys::GOOGLE_PHOTO_TAKEN_TIME),
            ],
            utc_keys: [
                keys::QUICKTIME_CREATE_DATE,
                keys::QUICKTIME_MEDIA_CREATE_DATE,
                keys::GOOGLE_PHOTO_TAKEN_TIME,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            include_filenames: true,
        }
    }

    /// Last modification time
    pub fn modified() -> Self {
        Self {
            field: keys::FIELD_MODIFIED.to_string(),
            kind: DateTimeKind::Modified,
            keys: vec![
                CandidateKey::single(keys::XMP_MODIFY_DATE),
                CandidateKey::with_offset(keys::EXIF_MODIFY_DATE, keys::EXIF_OFFSET_TIME),
                CandidateKey::single(keys::EXIF_MODIFY_DATE),
                CandidateKey::single(keys::QUICKTIME_MODIFY_DATE),
                CandidateKey::single(keys::QUICKTIME_MEDIA_MODIFY_DATE),
                CandidateKey::single(keys::GOOGLE_PHOTO_LAST_MODIFIED_TIME),
            ],
            utc_keys: [
                keys::QUICKTIME_MODIFY_DATE,
                keys::QUICKTIME_MEDIA_MODIFY_DATE,
                keys::GOOGLE_PHOTO_LAST_MODIFIED_TIME,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            include_filenames: false,
        }
    }
}

/// Resolves one datetime field; see the module docs for the algorithm
pub struct DateTimeMergeStep {
    name: String,
    field: DateTimeFieldConfig,
    config: MergeConfig,
    timezones: Arc<dyn TimezoneLookup>,
}

impl DateTimeMergeStep {
    pub fn new(
        field: DateTimeFieldConfig,
        config: MergeConfig,
        timezones: Arc<dyn TimezoneLookup>,
    ) -> Self {
        Self {
            name: format!("datetime:{}", field.field),
            field,
            config,
            timezones,
        }
    }

    fn field(&self) -> &str {
        &self.field.field
    }

    fn type_violation(&self, key: &str, entry_id: EntryId) -> MergeError {
        MergeError::TypeViolation {
            field: self.field().to_string(),
            key: key.to_string(),
            entry_id,
        }
    }

    /// Step 1: raw candidates from the configured keys
    fn gather(&self, ctx: &MergeContext) -> MergeResult<Vec<DateTimeCandidate>> {
        let mut gathered = Vec::new();

        for candidate_key in &self.field.keys {
            match candidate_key {
                CandidateKey::Single(key) => {
                    for entry in ctx.entries_with_key(key) {
                        let Some(ts) = entry.datetime else {
                            if entry.text.is_some() || entry.real.is_some() {
                                return Err(self.type_violation(key, entry.id));
                            }
                            continue;
                        };
                        let ts = if self.field.utc_keys.contains(key) {
                            ts.as_utc_stamped()
                        } else {
                            ts
                        };
                        gathered.push(DateTimeCandidate::new(ts, SourceKey::single(key), [entry.id]));
                    }
                }
                CandidateKey::WithOffset { date, offset } => {
                    // Duplicate entries with the same offset count once
                    let mut offsets: Vec<(FixedOffset, Vec<EntryId>)> = Vec::new();
                    for e in ctx.entries_with_key(offset) {
                        let Some(parsed) = e.text.as_deref().and_then(parse_offset) else {
                            continue;
                        };
                        match offsets.iter_mut().find(|(o, _)| *o == parsed) {
                            Some((_, ids)) => ids.push(e.id),
                            None => offsets.push((parsed, vec![e.id])),
                        }
                    }
                    let [(offset_value, offset_ids)] = offsets.as_slice() else {
                        if offsets.len() > 1 {
                            debug!(field = %self.field(), key = %offset, "Conflicting offsets, date not paired");
                        }
                        continue;
                    };
                    for entry in ctx.entries_with_key(date) {
                        match entry.datetime {
                            Some(Timestamp::Naive(naive)) => {
                                if let Some(aware) = offset_value.from_local_datetime(&naive).single() {
                                    gathered.push(DateTimeCandidate::new(
                                        Timestamp::Aware(aware),
                                        SourceKey::pair(date, offset),
                                        std::iter::once(entry.id).chain(offset_ids.iter().copied()),
                                    ));
                                }
                            }
                            Some(Timestamp::Aware(_)) => {}
                            None if entry.text.is_some() || entry.real.is_some() => {
                                return Err(self.type_violation(date, entry.id));
                            }
                            None => {}
                        }
                    }
                }
            }
        }

        self.demote_conflicting_xmp(&mut gathered);
        Ok(gathered)
    }

    /// Cloud and XMP values both claiming UTC but disagreeing: the XMP value is
    /// kept as a local-time hint instead of a second UTC anchor.
    fn demote_conflicting_xmp(&self, gathered: &mut [DateTimeCandidate]) {
        let cloud_utc: Vec<Timestamp> = gathered
            .iter()
            .filter(|c| c.is_utc() && c.date_keys().any(keys::is_cloud_key))
            .map(DateTimeCandidate::value)
            .collect();
        if cloud_utc.is_empty() {
            return;
        }

        let tolerance = self.config.aware_tolerance();
        for candidate in gathered.iter_mut() {
            let is_xmp = candidate.date_keys().all(|k| k.starts_with("XMP:"));
            if !is_xmp || !candidate.is_utc() {
                continue;
            }
            let disagrees = cloud_utc.iter().all(|cloud| {
                cloud
                    .delta(&candidate.value())
                    .map_or(true, |d| d.abs() > tolerance)
            });
            if disagrees {
                debug!(field = %self.field(), candidate = %candidate, "Demoting XMP UTC value to local time");
                let ids = candidate.source_ids().clone();
                let key = candidate
                    .source_keys()
                    .iter()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| SourceKey::single(keys::XMP_DATETIME_ORIGINAL));
                *candidate = DateTimeCandidate::new(candidate.value().strip_offset(), key, ids);
            }
        }
    }

    fn cluster(&self, ctx: &MergeContext) -> MergeResult<DateTimeCandidateContainer> {
        let mut container = DateTimeCandidateContainer::with_tolerances(
            self.config.aware_tolerance(),
            self.config.naive_tolerance(),
        );
        container.extend(self.gather(ctx)?);

        if self.field.include_filenames {
            let mut from_names = DateTimeCandidateContainer::new(self.config.filename_tolerance());
            for key in keys::FILENAME_KEYS {
                for entry in ctx.entries_with_key(key) {
                    if let Some(ts) = entry.datetime {
                        from_names.add(DateTimeCandidate::new(ts, SourceKey::single(key), [entry.id]));
                    }
                }
            }
            container.extend(from_names.into_candidates());
        }
        Ok(container)
    }

    fn commit(&self, ctx: &mut MergeContext, value: Timestamp) {
        debug!(field = %self.field(), value = %value, "Datetime resolved");
        ctx.set_argument(
            self.field(),
            ExportArgument::DateTime {
                value,
                kind: self.field.kind,
            },
        );
    }

    fn conflict(&self, ctx: &mut MergeContext, message: String) {
        ctx.record_conflict(self.field(), message);
    }

    /// Step 3
    fn resolve_with_aware(
        &self,
        ctx: &mut MergeContext,
        aware: &[DateTimeCandidate],
        naive: &[DateTimeCandidate],
        tz: Option<Tz>,
    ) {
        let primary = match aware {
            [only] => only.clone(),
            [a, b] if a.is_utc() != b.is_utc() => {
                if a.is_utc() {
                    b.clone()
                } else {
                    a.clone()
                }
            }
            _ => {
                self.conflict(
                    ctx,
                    format!(
                        "Timezone-aware sources disagree on the instant or offset: {}",
                        describe(aware)
                    ),
                );
                return;
            }
        };

        let primary = match tz {
            Some(tz) => match self.reconcile_with_gps(&primary, &tz) {
                Ok(reconciled) => reconciled,
                Err(message) => {
                    self.conflict(ctx, message);
                    return;
                }
            },
            None => primary,
        };

        if naive.is_empty() {
            self.commit(ctx, primary.value());
            return;
        }

        let resolved = if primary.is_utc() {
            self.infer_offset(&primary, naive)
        } else {
            self.validate_naive(&primary, naive)
        };
        match resolved {
            Ok(value) => self.commit(ctx, value),
            Err(message) => self.conflict(ctx, message),
        }
    }

    /// GPS timezone versus the primary's stated offset
    fn reconcile_with_gps(
        &self,
        primary: &DateTimeCandidate,
        tz: &Tz,
    ) -> Result<DateTimeCandidate, String> {
        if primary.all_keys_in(&self.field.utc_keys) {
            return Ok(primary.in_timezone(tz));
        }

        let Timestamp::Aware(value) = primary.value() else {
            return Ok(primary.clone());
        };
        let expected = offset_at(tz, &value).local_minus_utc();
        let actual = value.offset().local_minus_utc();

        // A UTC marker is not a stated local offset, even when it falls in the band
        if primary.is_utc() && expected != 0 {
            return Ok(primary.in_timezone(tz));
        }
        if i64::from((actual - expected).abs()) <= self.config.gps_offset_tolerance_secs {
            return Ok(primary.clone());
        }
        Err(format!(
            "Stated offset {} of {} disagrees with GPS timezone {} (expected {})",
            format_offset(actual),
            primary,
            tz.name(),
            format_offset(expected)
        ))
    }

    /// UTC primary: derive the local offset from the naive candidates
    fn infer_offset(
        &self,
        primary: &DateTimeCandidate,
        naive: &[DateTimeCandidate],
    ) -> Result<Timestamp, String> {
        let considered: Vec<&DateTimeCandidate> =
            naive.iter().filter(|c| !c.is_filename_only()).collect();
        if considered.is_empty() {
            return Ok(primary.value());
        }

        let utc = primary.value().utc_naive();
        let mut offsets = BTreeSet::new();
        for candidate in &considered {
            let delta = candidate
                .value()
                .local_naive()
                .signed_duration_since(utc)
                .num_seconds();
            let snapped = (delta as f64 / HALF_HOUR_SECS as f64).round() as i64 * HALF_HOUR_SECS;
            if (delta - snapped).abs() > self.config.offset_snap_tolerance_secs {
                return Err(format!(
                    "Naive {} is {} from UTC {}, not a whole number of half hours",
                    candidate,
                    format_delta(Duration::seconds(delta)),
                    primary
                ));
            }
            if !(MIN_OFFSET_SECS..=MAX_OFFSET_SECS).contains(&snapped) {
                return Err(format!(
                    "Naive {} implies offset {} from UTC {}, outside the valid range",
                    candidate,
                    format_delta(Duration::seconds(snapped)),
                    primary
                ));
            }
            offsets.insert(snapped);
        }

        let offset = match offsets.iter().copied().collect::<Vec<i64>>().as_slice() {
            [only] => *only,
            [a, b] if *a == 0 || *b == 0 => {
                if *a == 0 {
                    *b
                } else {
                    *a
                }
            }
            many => {
                let rendered: Vec<String> = many
                    .iter()
                    .map(|o| format_offset(i32::try_from(*o).unwrap_or_default()))
                    .collect();
                return Err(format!(
                    "Naive sources imply conflicting offsets [{}] for UTC {}: {}",
                    rendered.join(", "),
                    primary,
                    describe_refs(&considered)
                ));
            }
        };

        let fixed = i32::try_from(offset)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| format!("Inferred offset {}s is not representable", offset))?;
        debug!(field = %self.field(), offset = %format_offset(fixed.local_minus_utc()), "Offset inferred from naive sources");
        Ok(primary.value().with_offset(fixed))
    }

    /// Local primary: every naive candidate must agree with its local or UTC wall clock
    fn validate_naive(
        &self,
        primary: &DateTimeCandidate,
        naive: &[DateTimeCandidate],
    ) -> Result<Timestamp, String> {
        let local = primary.value().local_naive();
        let utc = primary.value().utc_naive();

        let cloud_edit = self.trusts_cloud_edit(primary, naive, local);
        if cloud_edit {
            debug!(field = %self.field(), primary = %primary, "Trusting edited cloud timestamp over embedded values");
        }

        for candidate in naive {
            if candidate.is_filename_only() {
                if naive_distance(candidate, local) <= self.config.filename_window() {
                    debug!(field = %self.field(), candidate = %candidate, "Filename date close enough to primary");
                    continue;
                }
            } else if cloud_edit {
                continue;
            }

            let tolerance = self.config.naive_validation();
            if naive_distance(candidate, local) > tolerance && naive_distance(candidate, utc) > tolerance {
                return Err(format!(
                    "Naive {} does not match local or UTC time of {}",
                    candidate, primary
                ));
            }
        }
        Ok(primary.value())
    }

    /// Heuristic: a cloud "taken" time near embedded values was edited on purpose
    fn trusts_cloud_edit(
        &self,
        primary: &DateTimeCandidate,
        naive: &[DateTimeCandidate],
        local: NaiveDateTime,
    ) -> bool {
        if !self.config.trust_cloud_edits || self.field.kind != DateTimeKind::Taken {
            return false;
        }
        if !primary.date_keys().any(keys::is_cloud_key) {
            return false;
        }
        let embedded: Vec<&DateTimeCandidate> =
            naive.iter().filter(|c| !c.is_filename_only()).collect();
        !embedded.is_empty()
            && embedded.iter().all(|c| {
                c.date_keys().all(keys::is_embedded_key)
                    && naive_distance(c, local) <= self.config.cloud_edit_window()
            })
    }

    /// Step 4
    fn resolve_naive_only(&self, ctx: &mut MergeContext, naive: &[DateTimeCandidate], tz: Option<Tz>) {
        let localize = |ts: Timestamp| match &tz {
            Some(tz) => ts.localize(tz),
            None => ts,
        };

        match (naive, &tz) {
            ([], _) => {}
            ([only], _) => self.commit(ctx, localize(only.value())),
            ([a, b], Some(tz)) => match self.pair_utc_local(a, b, tz) {
                Some(value) => self.commit(ctx, value),
                None => self.conflict(
                    ctx,
                    format!(
                        "Difference between naive {} and {} is not explained by timezone {}",
                        a,
                        b,
                        tz.name()
                    ),
                ),
            },
            _ => {
                let mut loose = DateTimeCandidateContainer::new(self.config.loose_tolerance());
                loose.extend(naive.iter().cloned());
                match loose.candidates() {
                    [only] => self.commit(ctx, localize(only.value())),
                    _ => self.conflict(
                        ctx,
                        format!("Found multiple distinct naive times: {}", describe(naive)),
                    ),
                }
            }
        }
    }

    /// One naive value is really UTC and the other the same instant in local time
    fn pair_utc_local(&self, a: &DateTimeCandidate, b: &DateTimeCandidate, tz: &Tz) -> Option<Timestamp> {
        let tolerance = self.config.utc_local_heuristic();
        [(a, b), (b, a)].into_iter().find_map(|(as_utc, as_local)| {
            let converted = Timestamp::utc(as_utc.value().local_naive()).in_timezone(tz);
            let delta = converted
                .local_naive()
                .signed_duration_since(as_local.value().local_naive());
            (delta.abs() <= tolerance).then_some(converted)
        })
    }
}

/// Distance from a naive cluster span to a wall-clock point
fn naive_distance(candidate: &DateTimeCandidate, point: NaiveDateTime) -> Duration {
    let earliest = candidate.value().local_naive();
    let latest = candidate.latest().local_naive();
    if point < earliest {
        earliest - point
    } else if point > latest {
        point - latest
    } else {
        Duration::zero()
    }
}

fn describe(candidates: &[DateTimeCandidate]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_refs(candidates: &[&DateTimeCandidate]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MergeStep for DateTimeMergeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        ctx.mark_attempted(self.field());
        if self.field.keys.is_empty() {
            return Err(MergeError::InvalidConfig(format!(
                "no candidate keys configured for '{}'",
                self.field()
            )));
        }

        let container = self.cluster(ctx)?;
        if container.is_empty() {
            debug!(field = %self.field(), "No datetime candidates");
            return Ok(());
        }

        let tz = gps_timezone(ctx, self.timezones.as_ref());
        let aware: Vec<DateTimeCandidate> = container.aware_candidates().into_iter().cloned().collect();
        let naive: Vec<DateTimeCandidate> = container.naive_candidates().into_iter().cloned().collect();
        debug!(
            field = %self.field(),
            aware = aware.len(),
            naive = naive.len(),
            timezone = ?tz.map(|t| t.name()),
            "Resolving datetime"
        );

        if aware.is_empty() {
            self.resolve_naive_only(ctx, &naive, tz);
        } else {
            self.resolve_with_aware(ctx, &aware, &naive, tz);
        }
        Ok(())
    }
}
