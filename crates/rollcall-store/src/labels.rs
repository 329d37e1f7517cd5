//! Label set codec for the delimited `photos.labels` column.

use crate::StoreError;
use std::collections::HashSet;

/// Separator between labels in the persisted label field.
pub const LABEL_DELIMITER: char = ',';

/// Split a stored label field into its labels: trimmed, blanks dropped,
/// duplicates collapsed to their first occurrence.
pub fn parse_labels(field: &str) -> Vec<String> {
    dedup_labels(field.split(LABEL_DELIMITER).map(|l| l.trim().to_string()))
}

/// Join a label set into its persisted form.
pub fn join_labels(labels: &[String]) -> String {
    labels.join(&LABEL_DELIMITER.to_string())
}

/// Collapse exact duplicates, keeping first-occurrence order and dropping blanks.
pub fn dedup_labels<I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|l| !l.is_empty() && seen.insert(l.clone()))
        .collect()
}

/// Reject labels that cannot round-trip through the label field.
pub fn validate_label(label: &str) -> Result<(), StoreError> {
    let reason = if label.is_empty() {
        "label is empty"
    } else if label.trim() != label {
        "label has surrounding whitespace"
    } else if label.contains(LABEL_DELIMITER) {
        "label contains the label delimiter"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidLabel {
        label: label.to_string(),
        reason,
    })
}
