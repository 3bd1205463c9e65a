//! Fallback cascade
//!
//! Last-resort steps that run after the datetime steps. Every fallback only
//! fills a field that is still open (not finalized, not conflicted, not
//! errored), except the WhatsApp correction which may override a committed
//! "taken" value.

use crate::context::{FieldValue, MergeContext};
use crate::error::MergeResult;
use crate::export::{DateTimeKind, ExportArgument};
use crate::keys;
use crate::pipeline::MergeStep;
use crate::steps::filename::{dates_from_filename, filenames, noon, whatsapp_date};
use crate::steps::gps_timezone;
use crate::timezone::TimezoneLookup;
use chrono::Duration;
use chrono_tz::Tz;
use pmx_common::human_time::format_delta;
use pmx_common::Timestamp;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DATE_FIELDS: [(&str, DateTimeKind); 2] = [
    (keys::FIELD_TAKEN, DateTimeKind::Taken),
    (keys::FIELD_MODIFIED, DateTimeKind::Modified),
];

fn fill(ctx: &mut MergeContext, field: &str, kind: DateTimeKind, value: Timestamp, source: &str) {
    if !ctx.is_open(field) {
        return;
    }
    debug!(field = %field, value = %value, source, "Filled by fallback");
    ctx.set_argument(field, ExportArgument::DateTime { value, kind });
}

fn localized(value: Timestamp, tz: Option<Tz>) -> Timestamp {
    match tz {
        Some(tz) => value.localize(&tz),
        None => value,
    }
}

/// (a) GPS timestamp as "taken", expressed in the GPS timezone
pub struct GpsDateFallback {
    timezones: Arc<dyn TimezoneLookup>,
}

impl GpsDateFallback {
    pub fn new(timezones: Arc<dyn TimezoneLookup>) -> Self {
        Self { timezones }
    }
}

impl MergeStep for GpsDateFallback {
    fn name(&self) -> &str {
        "fallback:gps_date"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        if !ctx.is_open(keys::FIELD_TAKEN) {
            return Ok(());
        }
        let Some(gps_time) = ctx
            .dependency(keys::FIELD_GPS_DATETIME)
            .and_then(FieldValue::timestamp)
        else {
            return Ok(());
        };
        let value = match gps_timezone(ctx, self.timezones.as_ref()) {
            Some(tz) => gps_time.in_timezone(&tz),
            None => gps_time,
        };
        fill(ctx, keys::FIELD_TAKEN, DateTimeKind::Taken, value, "gps");
        Ok(())
    }
}

/// (b) "taken" and "modified" fill each other
pub struct CrossFieldFallback;

impl MergeStep for CrossFieldFallback {
    fn name(&self) -> &str {
        "fallback:cross_field"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        let taken = ctx
            .dependency(keys::FIELD_TAKEN)
            .and_then(FieldValue::timestamp);
        let modified = ctx
            .dependency(keys::FIELD_MODIFIED)
            .and_then(FieldValue::timestamp);

        match (taken, modified) {
            (Some(taken), None) => fill(ctx, keys::FIELD_MODIFIED, DateTimeKind::Modified, taken, "taken"),
            (None, Some(modified)) => fill(ctx, keys::FIELD_TAKEN, DateTimeKind::Taken, modified, "modified"),
            _ => {}
        }
        Ok(())
    }
}

/// (c) Earliest filesystem modification time for both fields
pub struct FilesystemDateFallback;

impl MergeStep for FilesystemDateFallback {
    fn name(&self) -> &str {
        "fallback:filesystem"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        let earliest = ctx
            .entries_with_key(keys::FILE_MODIFY_DATE)
            .filter_map(|e| e.datetime)
            .min_by_key(Timestamp::utc_naive);
        let Some(earliest) = earliest else {
            return Ok(());
        };
        for (field, kind) in DATE_FIELDS {
            fill(ctx, field, kind, earliest, "filesystem");
        }
        Ok(())
    }
}

/// (d) Noon on a `YYYYMMDD` date from the file name, for both fields
pub struct FilenameDateFallback {
    timezones: Arc<dyn TimezoneLookup>,
}

impl FilenameDateFallback {
    pub fn new(timezones: Arc<dyn TimezoneLookup>) -> Self {
        Self { timezones }
    }
}

impl MergeStep for FilenameDateFallback {
    fn name(&self) -> &str {
        "fallback:filename_date"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        if DATE_FIELDS.iter().all(|(field, _)| !ctx.is_open(field)) {
            return Ok(());
        }

        let dates: BTreeSet<_> = filenames(ctx)
            .iter()
            .flat_map(|name| dates_from_filename(name))
            .collect();
        if dates.len() > 1 {
            debug!(dates = ?dates, "File names carry several dates, skipping");
            return Ok(());
        }
        let Some(date) = dates.into_iter().next() else {
            return Ok(());
        };

        let tz = gps_timezone(ctx, self.timezones.as_ref());
        let value = localized(Timestamp::Naive(noon(date)), tz);
        for (field, kind) in DATE_FIELDS {
            fill(ctx, field, kind, value, "filename");
        }
        Ok(())
    }
}

/// (e) WhatsApp strips EXIF and re-encodes; the name carries the real date.
///
/// A committed "taken" more than the threshold away from noon on the
/// filename date is overridden, and so is "modified" when it is also off.
pub struct WhatsAppCorrection {
    threshold: Duration,
    timezones: Arc<dyn TimezoneLookup>,
}

impl WhatsAppCorrection {
    pub fn new(threshold: Duration, timezones: Arc<dyn TimezoneLookup>) -> Self {
        Self {
            threshold,
            timezones,
        }
    }

    fn is_stale(&self, current: Timestamp, reference: Timestamp) -> bool {
        current
            .local_naive()
            .signed_duration_since(reference.local_naive())
            .abs()
            > self.threshold
    }
}

impl MergeStep for WhatsAppCorrection {
    fn name(&self) -> &str {
        "fallback:whatsapp"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        let Some(date) = filenames(ctx).iter().find_map(|name| whatsapp_date(name)) else {
            return Ok(());
        };
        if ctx.has_conflict(keys::FIELD_TAKEN) || ctx.has_error(keys::FIELD_TAKEN) {
            return Ok(());
        }
        let Some(taken) = ctx
            .dependency(keys::FIELD_TAKEN)
            .and_then(FieldValue::timestamp)
        else {
            return Ok(());
        };

        let reference = Timestamp::Naive(noon(date));
        if !self.is_stale(taken, reference) {
            return Ok(());
        }

        let tz = gps_timezone(ctx, self.timezones.as_ref());
        let corrected = localized(reference, tz);
        info!(
            previous = %taken,
            corrected = %corrected,
            delta = %format_delta(taken.local_naive().signed_duration_since(reference.local_naive())),
            "WhatsApp file name overrides embedded date"
        );
        let applied = ctx.override_argument(
            keys::FIELD_TAKEN,
            ExportArgument::DateTime {
                value: corrected,
                kind: DateTimeKind::Taken,
            },
        );
        if !applied {
            warn!(field = keys::FIELD_TAKEN, previous = %taken, "WhatsApp correction not applied, export tag collision");
        }

        if ctx.has_conflict(keys::FIELD_MODIFIED) || ctx.has_error(keys::FIELD_MODIFIED) {
            return Ok(());
        }
        let modified = ctx
            .dependency(keys::FIELD_MODIFIED)
            .and_then(FieldValue::timestamp);
        if modified.is_some_and(|m| self.is_stale(m, reference)) {
            let applied = ctx.override_argument(
                keys::FIELD_MODIFIED,
                ExportArgument::DateTime {
                    value: corrected,
                    kind: DateTimeKind::Modified,
                },
            );
            if !applied {
                warn!(field = keys::FIELD_MODIFIED, "WhatsApp correction not applied, export tag collision");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DependencyPolicy, MergedValue};
    use crate::model::MetadataEntry;
    use crate::timezone::FixedTimezone;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn no_tz() -> Arc<dyn TimezoneLookup> {
        Arc::new(FixedTimezone(None))
    }

    /// Context where every upstream field was attempted without result
    fn context(entries: Vec<MetadataEntry>) -> MergeContext {
        let mut ctx = MergeContext::with_policy(entries, DependencyPolicy::Strict);
        for field in [
            keys::FIELD_GPS_LATITUDE,
            keys::FIELD_GPS_LONGITUDE,
            keys::FIELD_GPS_DATETIME,
            keys::FIELD_TAKEN,
            keys::FIELD_MODIFIED,
        ] {
            ctx.mark_attempted(field);
        }
        ctx
    }

    fn commit(ctx: &mut MergeContext, field: &str, kind: DateTimeKind, value: &str) {
        ctx.set_argument(
            field,
            ExportArgument::DateTime {
                value: ts(value),
                kind,
            },
        );
    }

    fn value(ctx: &MergeContext, field: &str) -> Option<String> {
        ctx.get_timestamp(field).map(|t| t.to_string())
    }

    #[test]
    fn test_gps_date_fills_taken_in_gps_timezone() {
        let mut ctx = context(vec![]);
        ctx.set_value(keys::FIELD_GPS_LATITUDE, MergedValue::Real(52.52));
        ctx.set_value(keys::FIELD_GPS_LONGITUDE, MergedValue::Real(13.405));
        ctx.set_value(keys::FIELD_GPS_DATETIME, MergedValue::DateTime(ts("2024-06-01T10:00:00Z")));

        GpsDateFallback::new(Arc::new(FixedTimezone(Some(Tz::Europe__Berlin))))
            .process(&mut ctx)
            .unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2024-06-01T12:00:00+02:00"));
    }

    #[test]
    fn test_gps_date_never_fills_conflicted_taken() {
        let mut ctx = context(vec![]);
        ctx.set_value(keys::FIELD_GPS_DATETIME, MergedValue::DateTime(ts("2024-06-01T10:00:00Z")));
        ctx.record_conflict(keys::FIELD_TAKEN, "sources disagree");

        GpsDateFallback::new(no_tz()).process(&mut ctx).unwrap();
        assert!(ctx.get(keys::FIELD_TAKEN).is_none());
    }

    #[test]
    fn test_cross_field_fills_modified_from_taken() {
        let mut ctx = context(vec![]);
        commit(&mut ctx, keys::FIELD_TAKEN, DateTimeKind::Taken, "2024-06-01T12:00:00+02:00");

        CrossFieldFallback.process(&mut ctx).unwrap();
        assert_eq!(value(&ctx, keys::FIELD_MODIFIED).as_deref(), Some("2024-06-01T12:00:00+02:00"));
        assert!(ctx.conflicts().is_empty());
    }

    #[test]
    fn test_cross_field_fills_taken_from_modified() {
        let mut ctx = context(vec![]);
        commit(&mut ctx, keys::FIELD_MODIFIED, DateTimeKind::Modified, "2024-06-02T08:00:00");

        CrossFieldFallback.process(&mut ctx).unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2024-06-02T08:00:00"));
    }

    #[test]
    fn test_filesystem_uses_earliest() {
        let mut ctx = context(vec![
            MetadataEntry::datetime(1, keys::FILE_MODIFY_DATE, ts("2024-06-03T09:00:00+02:00")),
            MetadataEntry::datetime(2, keys::FILE_MODIFY_DATE, ts("2024-06-02T09:00:00+02:00")),
        ]);
        ctx.record_conflict(keys::FIELD_MODIFIED, "disagreement");

        FilesystemDateFallback.process(&mut ctx).unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2024-06-02T09:00:00+02:00"));
        assert!(ctx.get(keys::FIELD_MODIFIED).is_none());
    }

    #[test]
    fn test_filename_date_noon() {
        let mut ctx = context(vec![MetadataEntry::text(1, keys::SOURCE_FILE, "/x/scan_20190704.jpg")]);

        FilenameDateFallback::new(no_tz()).process(&mut ctx).unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2019-07-04T12:00:00"));
        assert_eq!(value(&ctx, keys::FIELD_MODIFIED).as_deref(), Some("2019-07-04T12:00:00"));
    }

    #[test]
    fn test_filename_date_ambiguous_skipped() {
        let mut ctx = context(vec![
            MetadataEntry::text(1, keys::SOURCE_FILE, "/x/scan_20190704.jpg"),
            MetadataEntry::text(2, keys::GOOGLE_TITLE, "scan_20190705.jpg"),
        ]);

        FilenameDateFallback::new(no_tz()).process(&mut ctx).unwrap();
        assert!(ctx.get(keys::FIELD_TAKEN).is_none());
    }

    #[test]
    fn test_whatsapp_overrides_stale_taken_and_modified() {
        let mut ctx = context(vec![MetadataEntry::text(1, keys::SOURCE_FILE, "IMG-20230615-WA0001.jpg")]);
        commit(&mut ctx, keys::FIELD_TAKEN, DateTimeKind::Taken, "2023-01-01T12:00:00");
        commit(&mut ctx, keys::FIELD_MODIFIED, DateTimeKind::Modified, "2023-01-01T12:00:00");

        WhatsAppCorrection::new(Duration::days(4), no_tz())
            .process(&mut ctx)
            .unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2023-06-15T12:00:00"));
        assert_eq!(value(&ctx, keys::FIELD_MODIFIED).as_deref(), Some("2023-06-15T12:00:00"));
        assert!(ctx.conflicts().is_empty());
    }

    #[test]
    fn test_whatsapp_keeps_recent_modified() {
        let mut ctx = context(vec![MetadataEntry::text(1, keys::SOURCE_FILE, "IMG-20230615-WA0001.jpg")]);
        commit(&mut ctx, keys::FIELD_TAKEN, DateTimeKind::Taken, "2023-01-01T12:00:00");
        commit(&mut ctx, keys::FIELD_MODIFIED, DateTimeKind::Modified, "2023-06-16T09:00:00");

        WhatsAppCorrection::new(Duration::days(4), no_tz())
            .process(&mut ctx)
            .unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2023-06-15T12:00:00"));
        assert_eq!(value(&ctx, keys::FIELD_MODIFIED).as_deref(), Some("2023-06-16T09:00:00"));
    }

    #[test]
    fn test_whatsapp_within_threshold_untouched() {
        let mut ctx = context(vec![MetadataEntry::text(1, keys::SOURCE_FILE, "IMG-20230615-WA0001.jpg")]);
        commit(&mut ctx, keys::FIELD_TAKEN, DateTimeKind::Taken, "2023-06-13T18:30:00");

        WhatsAppCorrection::new(Duration::days(4), no_tz())
            .process(&mut ctx)
            .unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2023-06-13T18:30:00"));
    }

    #[test]
    fn test_whatsapp_tag_collision_leaves_taken_and_reports() {
        let mut ctx = context(vec![MetadataEntry::text(1, keys::SOURCE_FILE, "IMG-20230615-WA0001.jpg")]);
        ctx.set_value(keys::FIELD_TAKEN, MergedValue::DateTime(ts("2023-01-01T12:00:00")));
        assert!(ctx.set_argument("legacy_create_date", ExportArgument::simple("EXIF:CreateDate", "2020:01:01 00:00:00")));

        WhatsAppCorrection::new(Duration::days(4), no_tz())
            .process(&mut ctx)
            .unwrap();
        assert_eq!(value(&ctx, keys::FIELD_TAKEN).as_deref(), Some("2023-01-01T12:00:00"));
        assert!(ctx.conflicts()[keys::FIELD_EXPORT_TAGS][0].contains("legacy_create_date"));
    }
}
