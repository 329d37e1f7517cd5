//! Label identity registry: maps raw classifier labels onto the canonical
//! label vocabulary.
//!
//! Two lookups are available. [`normalize`] fuzzy-matches a raw label against
//! the known vocabulary; [`LabelRegistry::current_label`] follows the rename
//! log one hop. [`LabelRegistry::resolve`] composes them and is what ingestion
//! uses:
//!
//! 1. fuzzy-normalize the raw label against the vocabulary,
//! 2. follow the rename log from that result, each hop taking only a mapping
//!    made after the one that led there,
//! 3. otherwise the raw label passes through and becomes a new canonical label.

use crate::labels::dedup_labels;
use crate::mappings::LabelMapping;
use std::collections::HashMap;

/// Match `raw` against `existing` labels.
///
/// Case-insensitive exact match (after trimming) wins and returns the existing
/// casing. Otherwise the first existing label that contains, or is contained
/// in, `raw` case-insensitively. Otherwise `raw` unchanged. `existing` is
/// scanned in order, so callers control tie-breaks by ordering it.
pub fn normalize(raw: &str, existing: &[String]) -> String {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return raw.to_string();
    }

    if let Some(exact) = existing.iter().find(|l| l.trim().to_lowercase() == needle) {
        return exact.clone();
    }

    let partial = existing.iter().find(|l| {
        let candidate = l.trim().to_lowercase();
        !candidate.is_empty() && (candidate.contains(&needle) || needle.contains(&candidate))
    });

    match partial {
        Some(label) => label.clone(),
        None => raw.to_string(),
    }
}

/// Snapshot of the label vocabulary and rename log.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    /// Known labels in registration order: photo labels by ingestion time,
    /// then both sides of each rename mapping by log order.
    vocabulary: Vec<String>,
    /// original -> (log position, current label) of its most recent mapping.
    renames: HashMap<String, (usize, String)>,
}

impl LabelRegistry {
    /// `photo_labels` in ingestion order; `mappings` oldest first.
    pub fn new<I>(photo_labels: I, mappings: &[LabelMapping]) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mapped = mappings
            .iter()
            .flat_map(|m| [m.original_label.clone(), m.current_label.clone()]);
        let vocabulary = dedup_labels(photo_labels.into_iter().chain(mapped));

        let mut renames = HashMap::new();
        for (seq, mapping) in mappings.iter().enumerate() {
            renames.insert(mapping.original_label.clone(), (seq, mapping.current_label.clone()));
        }

        Self { vocabulary, renames }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Fuzzy match against the vocabulary. See [`normalize`].
    pub fn normalize(&self, raw: &str) -> String {
        normalize(raw, &self.vocabulary)
    }

    /// Most recent rename of an exact `original` label, or `original` itself. Single hop.
    pub fn current_label(&self, original: &str) -> String {
        self.renames
            .get(original)
            .map(|(_, current)| current.clone())
            .unwrap_or_else(|| original.to_string())
    }

    /// Canonical label for a raw classifier output.
    ///
    /// A hop is only taken when its mapping is newer than the previous hop.
    /// Photos were rewritten in log order, so an older mapping out of the
    /// current label was already superseded. Positions strictly increase,
    /// so the walk ends.
    pub fn resolve(&self, raw: &str) -> String {
        let mut label = self.normalize(raw);
        let mut floor: Option<usize> = None;

        while let Some((seq, next)) = self.renames.get(&label) {
            if floor.is_some_and(|f| *seq <= f) {
                break;
            }
            floor = Some(*seq);
            label = next.clone();
        }

        if label != raw {
            tracing::debug!(raw, canonical = %label, "resolved label");
        }
        label
    }
}
