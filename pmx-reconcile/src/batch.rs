//! Batch reconciliation
//!
//! Reconciles many media records concurrently. Each record gets its own
//! [`MergeContext`](crate::context::MergeContext); the pipeline and the
//! timezone lookup are shared read-only. A semaphore bounds the number of
//! records in flight and results come back in input order.

use crate::context::MergeOutcome;
use crate::model::MediaRecord;
use crate::pipeline::MergePipeline;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Reconciliation result for one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub outcome: MergeOutcome,
}

/// Counters over a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub scanned: usize,
    /// Files with at least one exportable field
    pub merged: usize,
    pub with_conflicts: usize,
    pub with_errors: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        reports.iter().fold(Self::default(), |mut summary, report| {
            summary.scanned += 1;
            if !report.outcome.export.arguments.is_empty() {
                summary.merged += 1;
            }
            if report.outcome.has_conflicts() {
                summary.with_conflicts += 1;
            }
            if report.outcome.has_errors() {
                summary.with_errors += 1;
            }
            summary
        })
    }
}

fn reconcile_one(pipeline: &MergePipeline, record: MediaRecord) -> FileReport {
    debug!(path = %record.path, sources = record.sources.len(), "Reconciling file");
    let ctx = pipeline.run_sources(record.sources);
    FileReport {
        path: record.path,
        outcome: ctx.into_outcome(),
    }
}

/// Reconcile `records` with at most `workers` running at once.
///
/// The merge itself is CPU-bound, so each record runs on the blocking pool.
/// A task that panics (a dependency ordering defect under the strict policy)
/// yields a report carrying the panic as an error instead of aborting the
/// batch.
pub async fn reconcile_batch(
    pipeline: Arc<MergePipeline>,
    records: Vec<MediaRecord>,
    workers: usize,
) -> Vec<FileReport> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let total = records.len();
    info!(files = total, workers = workers.max(1), "Starting batch reconciliation");

    let mut handles = Vec::with_capacity(total);
    for record in records {
        let path = record.path.clone();
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let handle = tokio::spawn(async move {
            // Closed only if the semaphore is dropped, which cannot happen here
            let _permit = semaphore.acquire_owned().await.ok();
            tokio::task::spawn_blocking(move || reconcile_one(&pipeline, record)).await
        });
        handles.push((path, handle));
    }

    let mut reports = Vec::with_capacity(total);
    for (path, handle) in handles {
        let report = match handle.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) | Err(e) => {
                error!(path = %path, error = %e, "Reconciliation task failed");
                failed_report(path, e.to_string())
            }
        };
        reports.push(report);
    }

    let summary = BatchSummary::from_reports(&reports);
    info!(
        scanned = summary.scanned,
        merged = summary.merged,
        with_conflicts = summary.with_conflicts,
        with_errors = summary.with_errors,
        "Batch reconciliation complete"
    );
    reports
}

fn failed_report(path: String, message: String) -> FileReport {
    let mut outcome = MergeOutcome {
        fields: Default::default(),
        conflicts: Default::default(),
        errors: Default::default(),
        export: Default::default(),
    };
    outcome.errors.insert("pipeline".to_string(), vec![message]);
    outcome.export.blocked.push("pipeline".to_string());
    FileReport { path, outcome }
}
