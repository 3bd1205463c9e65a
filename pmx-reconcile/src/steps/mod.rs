//! Merge steps
//!
//! Each step resolves one or a few fields of a [`MergeContext`]. The standard
//! order is assembled by [`MergePipeline::standard`](crate::pipeline::MergePipeline::standard).

pub mod basic;
pub mod datetime;
pub mod fallback;
pub mod filename;
pub mod gps;

pub use basic::BasicFieldMergeStep;
pub use datetime::{CandidateKey, DateTimeFieldConfig, DateTimeMergeStep};
pub use fallback::{
    CrossFieldFallback, FilenameDateFallback, FilesystemDateFallback, GpsDateFallback,
    WhatsAppCorrection,
};
pub use filename::FilenameDateStep;
pub use gps::{GpsDateTimeStep, GpsMergeStep};

use crate::context::{FieldValue, MergeContext};
use crate::keys;
use crate::timezone::TimezoneLookup;
use chrono_tz::Tz;

/// Timezone at the resolved GPS position, if both axes are resolved and known
pub(crate) fn gps_timezone(ctx: &MergeContext, timezones: &dyn TimezoneLookup) -> Option<Tz> {
    let latitude = ctx
        .dependency(keys::FIELD_GPS_LATITUDE)
        .and_then(FieldValue::real)?;
    let longitude = ctx
        .dependency(keys::FIELD_GPS_LONGITUDE)
        .and_then(FieldValue::real)?;
    timezones.timezone_at(latitude, longitude)
}
