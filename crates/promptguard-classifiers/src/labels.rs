//! Index-to-label mapping.
//!
//! Labels come from the `id2label` table of a model's `config.json`. Indexes
//! the table does not cover, or models without a usable table, render as
//! `LABEL_{index}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Maps model output indexes to label names
pub trait LabelResolver: Send + Sync {
    /// Label for an output index
    fn label(&self, index: usize) -> String;

    /// First index below `count` whose label matches `name`, ignoring case
    fn find(&self, name: &str, count: usize) -> Option<usize> {
        (0..count).find(|&i| self.label(i).eq_ignore_ascii_case(name))
    }
}

/// Labels read from configuration, with `LABEL_{i}` for gaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredLabels {
    labels: BTreeMap<usize, String>,
}

impl ConfiguredLabels {
    pub fn new(labels: BTreeMap<usize, String>) -> Self {
        Self { labels }
    }

    /// Labels in index order starting at 0
    pub fn from_list<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels.into_iter().map(Into::into).enumerate().collect())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl LabelResolver for ConfiguredLabels {
    fn label(&self, index: usize) -> String {
        self.labels
            .get(&index)
            .cloned()
            .unwrap_or_else(|| generic_label(index))
    }
}

/// `LABEL_0`, `LABEL_1`, ...
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericLabels;

impl LabelResolver for GenericLabels {
    fn label(&self, index: usize) -> String {
        generic_label(index)
    }
}

fn generic_label(index: usize) -> String {
    format!("LABEL_{}", index)
}

/// Build a resolver from a parsed `config.json`.
///
/// Entries with non-integer keys or non-string values are skipped; if nothing
/// usable remains the generic resolver is returned.
pub fn labels_from_config(config: &serde_json::Value) -> Arc<dyn LabelResolver> {
    let Some(table) = config.get("id2label").and_then(|v| v.as_object()) else {
        debug!("No id2label table, using generic labels");
        return Arc::new(GenericLabels);
    };

    let labels: BTreeMap<usize, String> = table
        .iter()
        .filter_map(|(key, value)| {
            let index = key.trim().parse::<usize>().ok()?;
            let label = value.as_str()?;
            Some((index, label.to_string()))
        })
        .collect();

    if labels.is_empty() {
        debug!("id2label table has no usable entries, using generic labels");
        return Arc::new(GenericLabels);
    }
    Arc::new(ConfiguredLabels::new(labels))
}
