//! Test Helper Utilities
//!
//! Shared builders for pmx-reconcile integration tests

#![allow(dead_code)]

pub mod log_capture;

use chrono_tz::Tz;
use pmx_common::Timestamp;
use pmx_reconcile::config::MergeConfig;
use pmx_reconcile::model::{MediaRecord, MetadataEntry, MetadataSource, SourceKind};
use pmx_reconcile::timezone::FixedTimezone;
use pmx_reconcile::MergePipeline;
use std::sync::Arc;

pub use log_capture::{capture_logs, LogCapture};

pub fn ts(value: &str) -> Timestamp {
    Timestamp::parse(value).unwrap()
}

/// Sequential entry ids for hand-built fixtures
#[derive(Default)]
pub struct Entries {
    next_id: i64,
    entries: Vec<MetadataEntry>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        let id = self.id();
        self.entries.push(MetadataEntry::text(id, key, value));
        self
    }

    pub fn datetime(mut self, key: &str, value: &str) -> Self {
        let id = self.id();
        self.entries.push(MetadataEntry::datetime(id, key, ts(value)));
        self
    }

    pub fn real(mut self, key: &str, value: f64) -> Self {
        let id = self.id();
        self.entries.push(MetadataEntry::real(id, key, value));
        self
    }

    pub fn build(self) -> Vec<MetadataEntry> {
        self.entries
    }

    /// Wrap as a single-source media record
    pub fn record(self, path: &str) -> MediaRecord {
        MediaRecord {
            path: path.to_string(),
            sources: vec![MetadataSource {
                id: 1,
                kind: SourceKind::Exif,
                entries: self.entries,
            }],
        }
    }
}

/// Standard pipeline with a fixed timezone instead of the polygon lookup
pub fn pipeline_in(tz: Option<Tz>) -> MergePipeline {
    MergePipeline::standard(&MergeConfig::default(), Arc::new(FixedTimezone(tz)))
}
