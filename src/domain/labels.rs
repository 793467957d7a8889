// ============================================================
// Layer 3 — Class Labels
// ============================================================
// Maps a class index (arg-max of the softmax output) to a
// human-readable label.
//
// The table travels with the model: Stage 3 records the class
// directory names it trained on into the model manifest, and
// every later consumer (evaluation, inference) reads it back
// from there. When nothing better is known, the lung CT table
// below is used.
//
// Index outside the table → "Unknown". This is the single soft
// fallback in the whole system; everything else fails fast.

use serde::{Deserialize, Serialize};

/// Label returned for an index the table does not cover.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Default table, in the sorted order of the dataset's class directories.
pub const LUNG_CT_LABELS: [&str; 4] = [
    "adeno_carcinoma",
    "large_cell_carcinoma",
    "normal",
    "squamous_cell_carcinoma",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn lung_ct() -> Self {
        Self::new(LUNG_CT_LABELS.iter().map(|s| s.to_string()).collect())
    }

    /// Table for a model with `num_classes` outputs: the lung table when
    /// it matches in size, otherwise generic `class_<i>` names.
    pub fn default_for(num_classes: usize) -> Self {
        if num_classes == LUNG_CT_LABELS.len() {
            Self::lung_ct()
        } else {
            Self::new((0..num_classes).map(|i| format!("class_{i}")).collect())
        }
    }

    /// Look up a label. Never fails.
    pub fn label(&self, index: usize) -> &str {
        self.names
            .get(index)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self::lung_ct()
    }
}
