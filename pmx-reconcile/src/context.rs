//! Per-file merge state
//!
//! A [`MergeContext`] is created for one media file, threaded through every
//! step of a [`MergePipeline`](crate::pipeline::MergePipeline) by mutable
//! reference and harvested into a [`MergeOutcome`] afterwards. It is never
//! shared between files.

use crate::export::ExportArgument;
use crate::keys;
use crate::model::MetadataEntry;
use pmx_common::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, error, warn};

/// Plain committed value (not written back by the tag writer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MergedValue {
    Text(String),
    Real(f64),
    DateTime(Timestamp),
}

impl fmt::Display for MergedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergedValue::Text(s) => write!(f, "'{}'", s),
            MergedValue::Real(v) => write!(f, "{}", v),
            MergedValue::DateTime(ts) => write!(f, "{}", ts),
        }
    }
}

/// Resolution state of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    Missing,
    Value { value: MergedValue },
    Argument { argument: ExportArgument },
}

impl FieldValue {
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            FieldValue::Value {
                value: MergedValue::DateTime(ts),
            } => Some(*ts),
            FieldValue::Argument {
                argument: ExportArgument::DateTime { value, .. },
            } => Some(*value),
            _ => None,
        }
    }

    pub fn real(&self) -> Option<f64> {
        match self {
            FieldValue::Value {
                value: MergedValue::Real(v),
            } => Some(*v),
            FieldValue::Argument {
                argument: ExportArgument::Coordinate { value, .. },
            } => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            FieldValue::Value {
                value: MergedValue::Text(s),
            } => Some(s),
            FieldValue::Argument {
                argument: ExportArgument::Simple { value, .. },
            } => Some(value),
            _ => None,
        }
    }

    pub fn argument(&self) -> Option<&ExportArgument> {
        match self {
            FieldValue::Argument { argument } => Some(argument),
            _ => None,
        }
    }
}

/// How a read of a not-yet-attempted field is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Panic: the pipeline is wired in the wrong order
    Strict,
    /// Log a warning and treat the value as unknown
    Tolerant,
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            DependencyPolicy::Strict
        } else {
            DependencyPolicy::Tolerant
        }
    }
}

/// Arguments the tag writer may apply, and fields it must not touch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportPlan {
    /// field → tag-writer arguments
    pub arguments: BTreeMap<String, Vec<String>>,
    /// Fields held back for manual review
    pub blocked: Vec<String>,
}

impl ExportPlan {
    /// All arguments in field order
    pub fn flatten(&self) -> Vec<String> {
        self.arguments.values().flatten().cloned().collect()
    }
}

/// Harvested result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub fields: BTreeMap<String, FieldValue>,
    pub conflicts: BTreeMap<String, Vec<String>>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub export: ExportPlan,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn timestamp(&self, field: &str) -> Option<Timestamp> {
        self.fields.get(field).and_then(FieldValue::timestamp)
    }
}

/// Working state for one media file
#[derive(Debug, Clone)]
pub struct MergeContext {
    entries: Vec<MetadataEntry>,
    merged_data: BTreeMap<String, FieldValue>,
    conflicts: BTreeMap<String, Vec<String>>,
    errors: BTreeMap<String, Vec<String>>,
    finalized_fields: BTreeSet<String>,
    attempted_fields: BTreeSet<String>,
    policy: DependencyPolicy,
}

impl MergeContext {
    pub fn new(entries: Vec<MetadataEntry>) -> Self {
        Self::with_policy(entries, DependencyPolicy::default())
    }

    pub fn with_policy(entries: Vec<MetadataEntry>, policy: DependencyPolicy) -> Self {
        Self {
            entries,
            merged_data: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            errors: BTreeMap::new(),
            finalized_fields: BTreeSet::new(),
            attempted_fields: BTreeSet::new(),
            policy,
        }
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    /// Mutable entry access; only filename date inference writes entries
    pub fn entries_mut(&mut self) -> &mut [MetadataEntry] {
        &mut self.entries
    }

    pub fn entries_with_key<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = &'a MetadataEntry> + 'a {
        self.entries.iter().filter(move |e| e.key == key)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.merged_data.get(field)
    }

    pub fn get_timestamp(&self, field: &str) -> Option<Timestamp> {
        self.get(field).and_then(FieldValue::timestamp)
    }

    pub fn get_real(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::real)
    }

    /// Read a field produced by an earlier step.
    ///
    /// Reading a field no step has attempted means the pipeline is wired in
    /// the wrong order. Under [`DependencyPolicy::Strict`] this panics.
    pub fn dependency(&self, field: &str) -> Option<&FieldValue> {
        if !self.attempted_fields.contains(field) {
            match self.policy {
                DependencyPolicy::Strict => panic!(
                    "Dependency error: field '{}' read before any step attempted it",
                    field
                ),
                DependencyPolicy::Tolerant => {
                    warn!(field = %field, "Field read before any step attempted it, treating as unknown");
                    return None;
                }
            }
        }
        self.get(field)
    }

    /// Commit a plain value and finalize the field
    pub fn set_value(&mut self, field: &str, value: MergedValue) {
        debug!(field = %field, value = %value, "Field finalized");
        self.merged_data
            .insert(field.to_string(), FieldValue::Value { value });
        self.finalize(field);
    }

    /// Commit an export argument and finalize the field.
    ///
    /// Returns `false` (and records a conflict under the export-tags sentinel)
    /// when another field already claims one of the argument's tags.
    pub fn set_argument(&mut self, field: &str, argument: ExportArgument) -> bool {
        if let Some(message) = self.tag_collision(field, &argument) {
            self.record_conflict(keys::FIELD_EXPORT_TAGS, message);
            return false;
        }
        debug!(field = %field, argument = ?argument.build(), "Field finalized");
        self.merged_data
            .insert(field.to_string(), FieldValue::Argument { argument });
        self.finalize(field);
        true
    }

    /// Replace the committed argument of a field, finalized or not
    pub fn override_argument(&mut self, field: &str, argument: ExportArgument) -> bool {
        if let Some(previous) = self.get(field) {
            debug!(field = %field, previous = ?previous, "Overriding committed value");
        }
        self.set_argument(field, argument)
    }

    fn tag_collision(&self, field: &str, argument: &ExportArgument) -> Option<String> {
        let tags = argument.managed_tags();
        for (other_field, value) in &self.merged_data {
            if other_field == field {
                continue;
            }
            if let Some(other) = value.argument() {
                let shared: Vec<String> = tags.intersection(&other.managed_tags()).cloned().collect();
                if !shared.is_empty() {
                    return Some(format!(
                        "Field '{}' and field '{}' both write tags [{}]",
                        field,
                        other_field,
                        shared.join(", ")
                    ));
                }
            }
        }
        None
    }

    fn finalize(&mut self, field: &str) {
        self.finalized_fields.insert(field.to_string());
        self.attempted_fields.insert(field.to_string());
    }

    /// Record a disagreement between sources
    pub fn record_conflict(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(field = %field, "Merge conflict: {}", message);
        self.conflicts
            .entry(field.to_string())
            .or_default()
            .push(message);
        self.attempted_fields.insert(field.to_string());
    }

    /// Record an extraction defect (type violation, step failure)
    pub fn record_error(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        error!(field = %field, "Merge error: {}", message);
        self.errors.entry(field.to_string()).or_default().push(message);
        self.attempted_fields.insert(field.to_string());
    }

    /// Mark that a step tried to resolve `field`, even without result
    pub fn mark_attempted(&mut self, field: &str) {
        self.attempted_fields.insert(field.to_string());
    }

    pub fn is_finalized(&self, field: &str) -> bool {
        self.finalized_fields.contains(field)
    }

    pub fn has_conflict(&self, field: &str) -> bool {
        self.conflicts.contains_key(field)
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Neither finalized, conflicted nor errored: fallbacks may fill it
    pub fn is_open(&self, field: &str) -> bool {
        !self.is_finalized(field) && !self.has_conflict(field) && !self.has_error(field)
    }

    pub fn merged_data(&self) -> &BTreeMap<String, FieldValue> {
        &self.merged_data
    }

    pub fn conflicts(&self) -> &BTreeMap<String, Vec<String>> {
        &self.conflicts
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn finalized_fields(&self) -> &BTreeSet<String> {
        &self.finalized_fields
    }

    /// Committed arguments minus every field that is conflicted or errored
    pub fn export_plan(&self) -> ExportPlan {
        let mut plan = ExportPlan::default();
        for (field, value) in &self.merged_data {
            if self.has_conflict(field) || self.has_error(field) {
                continue;
            }
            if let Some(argument) = value.argument() {
                let args = argument.build();
                if !args.is_empty() {
                    plan.arguments.insert(field.clone(), args);
                }
            }
        }
        plan.blocked = self
            .conflicts
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        plan
    }

    pub fn into_outcome(self) -> MergeOutcome {
        let export = self.export_plan();
        MergeOutcome {
            fields: self.merged_data,
            conflicts: self.conflicts,
            errors: self.errors,
            export,
        }
    }
}
