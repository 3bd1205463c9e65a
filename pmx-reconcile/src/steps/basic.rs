//! Single-key scalar merge (camera make, model, lens, description)

use crate::context::{MergeContext, MergedValue};
use crate::error::MergeResult;
use crate::export::ExportArgument;
use crate::model::{EntryId, MetadataEntry};
use crate::pipeline::MergeStep;
use tracing::debug;

/// Commits the value of `key` when all entries agree on it.
///
/// - No values → nothing happens
/// - One distinct value → committed (as an export argument when a tag is set)
/// - Several distinct values → conflict, nothing committed
pub struct BasicFieldMergeStep {
    name: String,
    field: String,
    key: String,
    export_tag: Option<String>,
}

impl BasicFieldMergeStep {
    pub fn new(field: impl Into<String>, key: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: format!("basic:{}", field),
            field,
            key: key.into(),
            export_tag: None,
        }
    }

    /// Commit as a `-TAG=value` export argument
    pub fn with_export_tag(mut self, tag: impl Into<String>) -> Self {
        self.export_tag = Some(tag.into());
        self
    }
}

fn entry_value(entry: &MetadataEntry) -> Option<MergedValue> {
    if let Some(ts) = entry.datetime {
        return Some(MergedValue::DateTime(ts));
    }
    if let Some(v) = entry.real {
        return Some(MergedValue::Real(v));
    }
    entry.text.clone().map(MergedValue::Text)
}

fn export_string(value: &MergedValue) -> String {
    match value {
        MergedValue::Text(s) => s.clone(),
        MergedValue::Real(v) => v.to_string(),
        MergedValue::DateTime(ts) => ts.exif_string(),
    }
}

impl MergeStep for BasicFieldMergeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, ctx: &mut MergeContext) -> MergeResult<()> {
        ctx.mark_attempted(&self.field);

        let mut distinct: Vec<(MergedValue, Vec<EntryId>)> = Vec::new();
        for entry in ctx.entries_with_key(&self.key) {
            let Some(value) = entry_value(entry) else {
                continue;
            };
            match distinct.iter_mut().find(|(v, _)| *v == value) {
                Some((_, ids)) => ids.push(entry.id),
                None => distinct.push((value, vec![entry.id])),
            }
        }

        match distinct.len() {
            0 => {
                debug!(field = %self.field, key = %self.key, "No values");
            }
            1 => {
                let (value, _) = distinct.remove(0);
                match &self.export_tag {
                    Some(tag) => {
                        let argument = ExportArgument::simple(tag.clone(), export_string(&value));
                        ctx.set_argument(&self.field, argument);
                    }
                    None => ctx.set_value(&self.field, value),
                }
            }
            _ => {
                let mut rendered: Vec<String> = distinct.iter().map(|(v, _)| v.to_string()).collect();
                rendered.sort();
                let mut ids: Vec<EntryId> = distinct.into_iter().flat_map(|(_, ids)| ids).collect();
                ids.sort();
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                ctx.record_conflict(
                    &self.field,
                    format!(
                        "Found multiple distinct values for '{}': [{}]. Source IDs: [{}]",
                        self.key,
                        rendered.join(", "),
                        ids.join(", ")
                    ),
                );
            }
        }
        Ok(())
    }
}
