//! pmx-reconcile library interface
//!
//! Reconciles the metadata of one media file, gathered from several
//! extraction passes (embedded EXIF/XMP/QuickTime tags, cloud JSON sidecars,
//! filesystem stat, file names), into a single authoritative value per field.
//! Disagreements are recorded as conflicts and the fields involved are held
//! back from export.

pub mod batch;
pub mod candidate;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod keys;
pub mod model;
pub mod pipeline;
pub mod steps;
pub mod timezone;

pub use crate::batch::{reconcile_batch, BatchSummary, FileReport};
pub use crate::context::{MergeContext, MergeOutcome};
pub use crate::error::{MergeError, MergeResult};
pub use crate::model::{MediaRecord, MetadataEntry, MetadataSource};
pub use crate::pipeline::{MergePipeline, MergeStep};
