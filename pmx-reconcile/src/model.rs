//! Metadata entry model
//!
//! The unit of input: typed key/value records produced by an external
//! extraction pass (exiftool run, cloud JSON sidecar, filesystem stat).

use pmx_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque entry identity, only used in conflict messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One metadata record. Normally exactly one of the typed slots is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub id: EntryId,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real: Option<f64>,
}

impl MetadataEntry {
    pub fn text(id: i64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: EntryId(id),
            key: key.into(),
            text: Some(value.into()),
            datetime: None,
            real: None,
        }
    }

    pub fn datetime(id: i64, key: impl Into<String>, value: Timestamp) -> Self {
        Self {
            id: EntryId(id),
            key: key.into(),
            text: None,
            datetime: Some(value),
            real: None,
        }
    }

    pub fn real(id: i64, key: impl Into<String>, value: f64) -> Self {
        Self {
            id: EntryId(id),
            key: key.into(),
            text: None,
            datetime: None,
            real: Some(value),
        }
    }

    /// True when none of the typed slots is populated
    pub fn is_null(&self) -> bool {
        self.text.is_none() && self.datetime.is_none() && self.real.is_none()
    }
}

/// Kind of extraction pass a source came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Exif,
    GoogleJson,
    Filesystem,
    Other(String),
}

/// Entries produced by one extraction pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSource {
    pub id: i64,
    pub kind: SourceKind,
    #[serde(default)]
    pub entries: Vec<MetadataEntry>,
}

/// All sources gathered for one physical media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub path: String,
    #[serde(default)]
    pub sources: Vec<MetadataSource>,
}

/// Flatten sources into the entry list consumed by the pipeline
pub fn flatten_sources(sources: Vec<MetadataSource>) -> Vec<MetadataEntry> {
    sources.into_iter().flat_map(|s| s.entries).collect()
}
