//! Export arguments consumed by the downstream tag writer
//!
//! Each committed field is wrapped in an [`ExportArgument`] that knows which
//! tag-writer arguments it produces and which tags it claims. Two arguments
//! claiming the same tag are a pipeline construction defect and are reported
//! as a conflict by [`MergeContext::set_argument`](crate::context::MergeContext::set_argument).

use pmx_common::time::EXIF_FORMAT;
use pmx_common::{human_time, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn tag(&self) -> &'static str {
        match self {
            Axis::Latitude => "GPSLatitude",
            Axis::Longitude => "GPSLongitude",
        }
    }

    fn ref_tag(&self) -> &'static str {
        match self {
            Axis::Latitude => "GPSLatitudeRef",
            Axis::Longitude => "GPSLongitudeRef",
        }
    }

    fn hemisphere(&self, value: f64) -> &'static str {
        match (self, value < 0.0) {
            (Axis::Latitude, false) => "N",
            (Axis::Latitude, true) => "S",
            (Axis::Longitude, false) => "E",
            (Axis::Longitude, true) => "W",
        }
    }
}

/// Which timestamp family a date/time argument writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeKind {
    Taken,
    Modified,
}

impl DateTimeKind {
    fn local_tags(&self) -> &'static [&'static str] {
        match self {
            DateTimeKind::Taken => &["EXIF:DateTimeOriginal", "EXIF:CreateDate", "FileCreateDate"],
            DateTimeKind::Modified => &["EXIF:ModifyDate", "FileModifyDate"],
        }
    }

    fn offset_tag(&self) -> Option<&'static str> {
        match self {
            DateTimeKind::Taken => Some("EXIF:OffsetTimeOriginal"),
            DateTimeKind::Modified => None,
        }
    }

    fn xmp_tag(&self) -> &'static str {
        match self {
            DateTimeKind::Taken => "XMP:DateTimeOriginal",
            DateTimeKind::Modified => "XMP:ModifyDate",
        }
    }

    fn utc_tags(&self) -> &'static [&'static str] {
        match self {
            DateTimeKind::Taken => &["QuickTime:CreateDate", "Keys:CreationDate"],
            DateTimeKind::Modified => &["QuickTime:ModifyDate"],
        }
    }
}

/// A committed value ready for the tag writer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportArgument {
    /// `-TAG=value`
    Simple { tag: String, value: String },
    /// Absolute coordinate plus hemisphere reference tag
    Coordinate { axis: Axis, value: f64 },
    /// Local-time tags, plus offset/XMP/UTC container tags when aware
    DateTime { value: Timestamp, kind: DateTimeKind },
}

impl ExportArgument {
    pub fn simple(tag: impl Into<String>, value: impl Into<String>) -> Self {
        ExportArgument::Simple {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// Tag-writer command-line arguments
    pub fn build(&self) -> Vec<String> {
        match self {
            ExportArgument::Simple { tag, value } => {
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![format!("-{}={}", tag, value)]
                }
            }
            ExportArgument::Coordinate { axis, value } => vec![
                format!("-{}={}", axis.tag(), value.abs()),
                format!("-{}={}", axis.ref_tag(), axis.hemisphere(*value)),
            ],
            ExportArgument::DateTime { value, kind } => {
                let local = value.exif_string();
                let mut args: Vec<String> = kind
                    .local_tags()
                    .iter()
                    .map(|tag| format!("-{}={}", tag, local))
                    .collect();

                if let Some(offset) = value.offset_seconds() {
                    if let Some(tag) = kind.offset_tag() {
                        args.push(format!("-{}={}", tag, human_time::format_offset(offset)));
                    }
                    args.push(format!("-{}={}", kind.xmp_tag(), value));
                    let utc = value.utc_naive().format(EXIF_FORMAT).to_string();
                    args.extend(kind.utc_tags().iter().map(|tag| format!("-{}={}", tag, utc)));
                }
                args
            }
        }
    }

    /// Tags this argument writes, in `-TAG` form
    pub fn managed_tags(&self) -> BTreeSet<String> {
        match self {
            ExportArgument::Simple { tag, .. } => BTreeSet::from([format!("-{}", tag)]),
            ExportArgument::Coordinate { axis, .. } => BTreeSet::from([
                format!("-{}", axis.tag()),
                format!("-{}", axis.ref_tag()),
            ]),
            ExportArgument::DateTime { value, kind } => {
                let mut tags: BTreeSet<String> =
                    kind.local_tags().iter().map(|t| format!("-{}", t)).collect();
                if value.is_aware() {
                    tags.extend(kind.offset_tag().map(|t| format!("-{}", t)));
                    tags.insert(format!("-{}", kind.xmp_tag()));
                    tags.extend(kind.utc_tags().iter().map(|t| format!("-{}", t)));
                }
                tags
            }
        }
    }
}
