//! Pipeline Orchestrator
//!
//! Runs an ordered list of merge steps against one [`MergeContext`].
//!
//! # Step order
//! Later steps read fields earlier steps resolved, so the order is fixed:
//! 1. Filename date inference (writes datetime slots of filename entries)
//! 2. Basic fields (make, model, lens, description)
//! 3. GPS coordinates, then GPS timestamp
//! 4. "taken" and "modified" datetime resolution (needs GPS for the timezone)
//! 5. Fallbacks: GPS date, cross-field, filesystem, filename date, WhatsApp
//!
//! # Error Handling
//! A failing step stops only the field it was resolving: the error is logged,
//! recorded for that field and the remaining steps still run.

use crate::config::MergeConfig;
use crate::context::MergeContext;
use crate::error::MergeResult;
use crate::keys;
use crate::model::{flatten_sources, MetadataEntry, MetadataSource};
use crate::steps::{
    BasicFieldMergeStep, CrossFieldFallback, DateTimeFieldConfig, DateTimeMergeStep,
    FilenameDateFallback, FilenameDateStep, FilesystemDateFallback, GpsDateFallback,
    GpsDateTimeStep, GpsMergeStep, WhatsAppCorrection,
};
use crate::timezone::TimezoneLookup;
use std::sync::Arc;
use tracing::{debug, error};

/// One unit of reconciliation
pub trait MergeStep: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// Resolve this step's fields in `ctx`.
    ///
    /// Source disagreement is recorded in the context, not returned.
    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()>;
}

/// Ordered sequence of merge steps
pub struct MergePipeline {
    steps: Vec<Box<dyn MergeStep>>,
}

impl MergePipeline {
    pub fn new(steps: Vec<Box<dyn MergeStep>>) -> Self {
        Self { steps }
    }

    /// The standard step order for photo and video metadata
    pub fn standard(config: &MergeConfig, timezones: Arc<dyn TimezoneLookup>) -> Self {
        let steps: Vec<Box<dyn MergeStep>> = vec![
            Box::new(FilenameDateStep),
            Box::new(BasicFieldMergeStep::new(keys::FIELD_MAKE, keys::EXIF_MAKE).with_export_tag(keys::EXIF_MAKE)),
            Box::new(BasicFieldMergeStep::new(keys::FIELD_MODEL, keys::EXIF_MODEL).with_export_tag(keys::EXIF_MODEL)),
            Box::new(
                BasicFieldMergeStep::new(keys::FIELD_LENS, keys::EXIF_LENS_MODEL)
                    .with_export_tag(keys::EXIF_LENS_MODEL),
            ),
            Box::new(
                BasicFieldMergeStep::new(keys::FIELD_DESCRIPTION, keys::XMP_DESCRIPTION)
                    .with_export_tag(keys::XMP_DESCRIPTION),
            ),
            Box::new(GpsMergeStep::new(config.gps_tolerance_deg)),
            Box::new(GpsDateTimeStep::new(config.gps_datetime_tolerance())),
            Box::new(DateTimeMergeStep::new(
                DateTimeFieldConfig::taken(),
                config.clone(),
                Arc::clone(&timezones),
            )),
            Box::new(DateTimeMergeStep::new(
                DateTimeFieldConfig::modified(),
                config.clone(),
                Arc::clone(&timezones),
            )),
            Box::new(GpsDateFallback::new(Arc::clone(&timezones))),
            Box::new(CrossFieldFallback),
            Box::new(FilesystemDateFallback),
            Box::new(FilenameDateFallback::new(Arc::clone(&timezones))),
            Box::new(WhatsAppCorrection::new(config.whatsapp_threshold(), timezones)),
        ];
        Self::new(steps)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step against a fresh context for `entries`
    pub fn run(&self, entries: Vec<MetadataEntry>) -> MergeContext {
        let mut ctx = MergeContext::new(entries);
        self.run_context(&mut ctx);
        ctx
    }

    pub fn run_sources(&self, sources: Vec<MetadataSource>) -> MergeContext {
        self.run(flatten_sources(sources))
    }

    /// Run every step against an existing context
    pub fn run_context(&self, ctx: &mut MergeContext) {
        for step in &self.steps {
            debug!(step = step.name(), "Running merge step");
            if let Err(e) = step.process(ctx) {
                let field = e.field().unwrap_or(step.name()).to_string();
                error!(step = step.name(), error = %e, "Merge step failed");
                ctx.record_error(&field, e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MergeError;
    use crate::model::EntryId;
    use crate::timezone::FixedTimezone;

    struct Failing;

    impl MergeStep for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn process(&self, _ctx: &mut MergeContext) -> MergeResult<()> {
            Err(MergeError::TypeViolation {
                field: "date_time_original".into(),
                key: "EXIF:DateTimeOriginal".into(),
                entry_id: EntryId(3),
            })
        }
    }

    #[test]
    fn test_standard_order() {
        let pipeline = MergePipeline::standard(&MergeConfig::default(), Arc::new(FixedTimezone(None)));
        let names = pipeline.step_names();
        let position = |name: &str| names.iter().position(|n| *n == name).unwrap();

        assert_eq!(names[0], "filename_dates");
        assert!(position("gps") < position("datetime:date_time_original"));
        assert!(position("datetime:modify_date") < position("fallback:gps_date"));
        assert_eq!(*names.last().unwrap(), "fallback:whatsapp");
    }

    #[test]
    fn test_failing_step_does_not_stop_pipeline() {
        let pipeline = MergePipeline::new(vec![
            Box::new(Failing),
            Box::new(BasicFieldMergeStep::new("make", "EXIF:Make")),
        ]);
        let ctx = pipeline.run(vec![MetadataEntry::text(1, "EXIF:Make", "Canon")]);

        assert!(ctx.errors()["date_time_original"][0].contains("entry 3"));
        assert!(ctx.is_finalized("make"));
        assert!(ctx.conflicts().is_empty());
    }
}
