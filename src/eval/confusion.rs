use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use super::Grouping;

#[derive(Debug, Clone, Copy)]
pub struct Bucket(pub f64);

impl PartialEq for Bucket {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Bucket {}

impl PartialOrd for Bucket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bucket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Raw counts keyed `predicted -> actual -> count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfusionMatrix {
    cells: BTreeMap<Bucket, BTreeMap<Bucket, usize>>,
}

impl ConfusionMatrix {
    pub fn count(&self, predicted: f64, actual: f64) -> usize {
        self.cells
            .get(&Bucket(predicted))
            .and_then(|row| row.get(&Bucket(actual)))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.cells.values().flat_map(|row| row.values()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Non-empty cells as `(predicted, actual, count)` in ascending order.
    pub fn cells(&self) -> impl Iterator<Item = (f64, f64, usize)> + '_ {
        self.cells.iter().flat_map(|(predicted, row)| {
            row.iter()
                .map(move |(actual, count)| (predicted.0, actual.0, *count))
        })
    }

    fn increment(&mut self, predicted: f64, actual: f64) {
        *self
            .cells
            .entry(Bucket(predicted))
            .or_default()
            .entry(Bucket(actual))
            .or_default() += 1;
    }
}

/// Cross-tabulates every (query, document) pair seen in either grouping.
///
/// A side that does not mention the pair contributes 0.
pub fn build_confusion_matrix(actual: &Grouping, predicted: &Grouping) -> ConfusionMatrix {
    let keys = actual
        .keys()
        .chain(predicted.keys())
        .collect::<BTreeSet<&String>>();

    let mut matrix = ConfusionMatrix::default();
    for key in keys {
        let actual_docs = actual.get(key);
        let predicted_docs = predicted.get(key);

        let mut seen = BTreeSet::<&str>::new();
        let doc_ids = actual_docs
            .into_iter()
            .flat_map(|docs| docs.iter())
            .chain(predicted_docs.into_iter().flat_map(|docs| docs.iter()))
            .map(|(doc_id, _)| doc_id);

        for doc_id in doc_ids {
            if !seen.insert(doc_id) {
                continue;
            }
            let predicted_value = predicted_docs
                .and_then(|docs| docs.get(doc_id))
                .unwrap_or(0.0);
            let actual_value = actual_docs
                .and_then(|docs| docs.get(doc_id))
                .unwrap_or(0.0);
            matrix.increment(predicted_value, actual_value);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoredDocs;

    fn grouping(entries: &[(&str, &[(&str, f64)])]) -> Grouping {
        entries
            .iter()
            .map(|(key, docs)| (key.to_string(), docs.iter().copied().collect::<ScoredDocs>()))
            .collect()
    }

    #[test]
    fn aggregates_across_every_query_key() {
        let actual = grouping(&[("q1", &[("d1", 1.0), ("d2", 1.0)]), ("q2", &[("d5", 1.0)])]);
        let predicted = grouping(&[("q1", &[("d1", 1.0), ("d3", 1.0)]), ("q3", &[("d7", 1.0)])]);

        let matrix = build_confusion_matrix(&actual, &predicted);

        assert_eq!(matrix.count(1.0, 1.0), 1);
        assert_eq!(matrix.count(0.0, 1.0), 2);
        assert_eq!(matrix.count(1.0, 0.0), 2);
        assert_eq!(matrix.total(), 5);
    }

    #[test]
    fn empty_groupings_produce_an_empty_matrix() {
        let matrix = build_confusion_matrix(&Grouping::new(), &Grouping::new());
        assert!(matrix.is_empty());
        assert_eq!(matrix.total(), 0);
    }

    #[test]
    fn serializes_as_nested_string_keyed_object() {
        let actual = grouping(&[("q1", &[("d1", 2.0)])]);
        let predicted = grouping(&[("q1", &[("d1", 0.5), ("d2", 0.25)])]);

        let matrix = build_confusion_matrix(&actual, &predicted);
        let value = serde_json::to_value(&matrix).expect("matrix should serialize");

        assert_eq!(value, serde_json::json!({"0.25": {"0": 1}, "0.5": {"2": 1}}));
        assert_eq!(
            matrix.cells().collect::<Vec<_>>(),
            vec![(0.25, 0.0, 1), (0.5, 2.0, 1)]
        );
    }
}
