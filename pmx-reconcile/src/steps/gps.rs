//! GPS coordinate and GPS timestamp merge
//!
//! Coordinates resolve in two stages per axis. Stage 1 reads the composite
//! EXIF tags written by the device. Stage 2 (the cloud sidecar `geoData`)
//! is consulted only when stage 1 has no data at all: a stage-1 conflict stops
//! the axis, so a sidecar value never masks disagreeing device data.

use crate::candidate::{DateTimeCandidate, DateTimeCandidateContainer, SourceKey};
use crate::context::{MergeContext, MergedValue};
use crate::error::{MergeError, MergeResult};
use crate::export::{Axis, ExportArgument};
use crate::keys;
use crate::model::EntryId;
use crate::pipeline::MergeStep;
use chrono::Duration;
use pmx_common::Timestamp;
use tracing::debug;

struct AxisKeys {
    axis: Axis,
    field: &'static str,
    composite: &'static str,
    sidecar: &'static str,
}

const AXES: [AxisKeys; 2] = [
    AxisKeys {
        axis: Axis::Latitude,
        field: keys::FIELD_GPS_LATITUDE,
        composite: keys::COMPOSITE_GPS_LATITUDE,
        sidecar: keys::GOOGLE_GEO_LATITUDE,
    },
    AxisKeys {
        axis: Axis::Longitude,
        field: keys::FIELD_GPS_LONGITUDE,
        composite: keys::COMPOSITE_GPS_LONGITUDE,
        sidecar: keys::GOOGLE_GEO_LONGITUDE,
    },
];

/// Two-stage latitude/longitude merge
pub struct GpsMergeStep {
    tolerance: f64,
}

impl GpsMergeStep {
    pub fn new(tolerance_deg: f64) -> Self {
        Self {
            tolerance: tolerance_deg,
        }
    }

    fn is_close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance
    }

    fn values(ctx: &MergeContext, key: &str) -> Vec<(f64, EntryId)> {
        ctx.entries_with_key(key)
            .filter_map(|e| e.real.map(|v| (v, e.id)))
            .filter(|(v, _)| v.is_finite())
            .collect()
    }

    /// Sidecars report "no location" as (0, 0)
    fn sidecar_is_null_island(&self, ctx: &MergeContext) -> bool {
        let latitudes = Self::values(ctx, keys::GOOGLE_GEO_LATITUDE);
        let longitudes = Self::values(ctx, keys::GOOGLE_GEO_LONGITUDE);
        latitudes
            .iter()
            .chain(longitudes.iter())
            .all(|(v, _)| self.is_close(*v, 0.0))
    }

    /// Resolve one axis from one stage. `values` must be non-empty.
    fn resolve(&self, ctx: &mut MergeContext, axis: &AxisKeys, key: &str, values: &[(f64, EntryId)]) {
        let first = values[0].0;
        let agree = values
            .iter()
            .all(|(a, _)| values.iter().all(|(b, _)| self.is_close(*a, *b)));

        if agree {
            ctx.set_argument(
                axis.field,
                ExportArgument::Coordinate {
                    axis: axis.axis,
                    value: first,
                },
            );
            return;
        }

        let mut sorted: Vec<f64> = values.iter().map(|(v, _)| *v).collect();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();
        let mut ids: Vec<EntryId> = values.iter().map(|(_, id)| *id).collect();
        ids.sort();
        ctx.record_conflict(
            axis.field,
            format!(
                "Coordinates from '{}' disagree beyond {}°: {:?}. Source IDs: {:?}",
                key,
                self.tolerance,
                sorted,
                ids.iter().map(|id| id.0).collect::<Vec<_>>()
            ),
        );
    }
}

impl MergeStep for GpsMergeStep {
    fn name(&self) -> &str {
        "gps"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        let null_island = self.sidecar_is_null_island(ctx);

        for axis in &AXES {
            ctx.mark_attempted(axis.field);

            let composite = Self::values(ctx, axis.composite);
            if !composite.is_empty() {
                self.resolve(ctx, axis, axis.composite, &composite);
                continue;
            }

            let sidecar = Self::values(ctx, axis.sidecar);
            if sidecar.is_empty() {
                debug!(field = axis.field, "No coordinate data");
                continue;
            }
            if null_island {
                debug!(field = axis.field, "Rejecting sidecar (0, 0) coordinate");
                continue;
            }
            self.resolve(ctx, axis, axis.sidecar, &sidecar);
        }
        Ok(())
    }
}

/// Resolves the GPS timestamp used by the GPS date fallback.
///
/// GPS time is UTC by definition: naive values are stamped UTC and aware
/// values are normalized to UTC before clustering.
pub struct GpsDateTimeStep {
    tolerance: Duration,
}

impl GpsDateTimeStep {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }
}

impl MergeStep for GpsDateTimeStep {
    fn name(&self) -> &str {
        "gps_datetime"
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        ctx.mark_attempted(keys::FIELD_GPS_DATETIME);

        let mut container = DateTimeCandidateContainer::new(self.tolerance);
        for entry in ctx.entries_with_key(keys::COMPOSITE_GPS_DATETIME) {
            match entry.datetime {
                Some(ts) => container.add(DateTimeCandidate::new(
                    Timestamp::utc(ts.utc_naive()),
                    SourceKey::single(keys::COMPOSITE_GPS_DATETIME),
                    [entry.id],
                )),
                None if entry.text.is_some() || entry.real.is_some() => {
                    return Err(MergeError::TypeViolation {
                        field: keys::FIELD_GPS_DATETIME.to_string(),
                        key: entry.key.clone(),
                        entry_id: entry.id,
                    });
                }
                None => {}
            }
        }

        match container.candidates() {
            [] => {}
            [only] => ctx.set_value(keys::FIELD_GPS_DATETIME, MergedValue::DateTime(only.value())),
            many => {
                let listed: Vec<String> = many.iter().map(ToString::to_string).collect();
                ctx.record_conflict(
                    keys::FIELD_GPS_DATETIME,
                    format!("GPS timestamps disagree: {}", listed.join("; ")),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataEntry;

    fn run(entries: Vec<MetadataEntry>) -> MergeContext {
        let mut ctx = MergeContext::new(entries);
        GpsMergeStep::new(1e-6).process(&mut ctx).unwrap();
        ctx
    }

    #[test]
    fn test_composite_agreement_commits() {
        let ctx = run(vec![
            MetadataEntry::real(1, keys::COMPOSITE_GPS_LATITUDE, 48.137154),
            MetadataEntry::real(2, keys::COMPOSITE_GPS_LATITUDE, 48.1371545),
            MetadataEntry::real(3, keys::COMPOSITE_GPS_LONGITUDE, 11.576124),
        ]);
        assert_eq!(ctx.get_real(keys::FIELD_GPS_LATITUDE), Some(48.137154));
        assert_eq!(ctx.get_real(keys::FIELD_GPS_LONGITUDE), Some(11.576124));
        assert!(ctx.conflicts().is_empty());
    }

    #[test]
    fn test_sidecar_used_only_without_composite_data() {
        let ctx = run(vec![
            MetadataEntry::real(1, keys::COMPOSITE_GPS_LATITUDE, 48.137154),
            MetadataEntry::real(2, keys::GOOGLE_GEO_LATITUDE, 40.0),
            MetadataEntry::real(3, keys::GOOGLE_GEO_LONGITUDE, -3.7),
        ]);
        assert_eq!(ctx.get_real(keys::FIELD_GPS_LATITUDE), Some(48.137154));
        assert_eq!(ctx.get_real(keys::FIELD_GPS_LONGITUDE), Some(-3.7));
    }

    #[test]
    fn test_composite_conflict_does_not_fall_through() {
        let ctx = run(vec![
            MetadataEntry::real(1, keys::COMPOSITE_GPS_LATITUDE, 48.1),
            MetadataEntry::real(2, keys::COMPOSITE_GPS_LATITUDE, 48.2),
            MetadataEntry::real(3, keys::GOOGLE_GEO_LATITUDE, 48.1),
        ]);
        assert!(ctx.has_conflict(keys::FIELD_GPS_LATITUDE));
        assert!(ctx.get(keys::FIELD_GPS_LATITUDE).is_none());
        assert!(ctx.conflicts()[keys::FIELD_GPS_LATITUDE][0].contains("Composite:GPSLatitude"));
    }

    #[test]
    fn test_sidecar_null_island_rejected() {
        let ctx = run(vec![
            MetadataEntry::real(1, keys::GOOGLE_GEO_LATITUDE, 0.0000001),
            MetadataEntry::real(2, keys::GOOGLE_GEO_LONGITUDE, 0.0000001),
        ]);
        assert!(ctx.get(keys::FIELD_GPS_LATITUDE).is_none());
        assert!(ctx.get(keys::FIELD_GPS_LONGITUDE).is_none());
        assert!(ctx.conflicts().is_empty());
    }

    #[test]
    fn test_sidecar_on_equator_is_kept() {
        let ctx = run(vec![
            MetadataEntry::real(1, keys::GOOGLE_GEO_LATITUDE, 0.0),
            MetadataEntry::real(2, keys::GOOGLE_GEO_LONGITUDE, 32.58),
        ]);
        assert_eq!(ctx.get_real(keys::FIELD_GPS_LATITUDE), Some(0.0));
        assert_eq!(ctx.get_real(keys::FIELD_GPS_LONGITUDE), Some(32.58));
    }

    #[test]
    fn test_gps_datetime_naive_is_utc() {
        let mut ctx = MergeContext::new(vec![
            MetadataEntry::datetime(1, keys::COMPOSITE_GPS_DATETIME, Timestamp::parse("2024-06-01T10:00:00").unwrap()),
            MetadataEntry::datetime(2, keys::COMPOSITE_GPS_DATETIME, Timestamp::parse("2024-06-01T10:00:01Z").unwrap()),
        ]);
        GpsDateTimeStep::new(Duration::seconds(2)).process(&mut ctx).unwrap();
        assert_eq!(
            ctx.get_timestamp(keys::FIELD_GPS_DATETIME).map(|t| t.to_string()),
            Some("2024-06-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_gps_datetime_text_is_type_violation() {
        let mut ctx = MergeContext::new(vec![MetadataEntry::text(
            9,
            keys::COMPOSITE_GPS_DATETIME,
            "not a date",
        )]);
        let err = GpsDateTimeStep::new(Duration::seconds(2)).process(&mut ctx).unwrap_err();
        assert!(matches!(err, MergeError::TypeViolation { entry_id: EntryId(9), .. }));
    }
}
