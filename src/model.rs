use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type RecordId = i64;

/// Document id to score, kept in insertion order.
///
/// Predictions use the order as retrieval rank; labels use it as the tie-break
/// when sorting by relevance. A document id inserted twice keeps its first
/// position and first score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredDocs {
    entries: Vec<(String, f64)>,
    positions: HashMap<String, usize>,
}

impl ScoredDocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: impl Into<String>, score: f64) -> bool {
        let doc_id = doc_id.into();
        if self.positions.contains_key(&doc_id) {
            return false;
        }
        self.positions.insert(doc_id.clone(), self.entries.len());
        self.entries.push((doc_id, score));
        true
    }

    pub fn get(&self, doc_id: &str) -> Option<f64> {
        self.positions
            .get(doc_id)
            .map(|position| self.entries[*position].1)
    }

    pub fn position(&self, doc_id: &str) -> Option<usize> {
        self.positions.get(doc_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries
            .iter()
            .map(|(doc_id, score)| (doc_id.as_str(), *score))
    }

    /// Entries by descending score. The sort is stable, so equal scores stay
    /// in insertion order.
    pub fn sorted_by_score_desc(&self) -> Vec<(&str, f64)> {
        let mut sorted = self.iter().collect::<Vec<_>>();
        sorted.sort_by(|left, right| right.1.total_cmp(&left.1));
        sorted
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ScoredDocs {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut docs = ScoredDocs::new();
        for (doc_id, score) in iter {
            docs.insert(doc_id, score);
        }
        docs
    }
}

impl Serialize for ScoredDocs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (doc_id, score) in &self.entries {
            map.serialize_entry(doc_id, score)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScoredDocs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScoredDocsVisitor;

        impl<'de> Visitor<'de> for ScoredDocsVisitor {
            type Value = ScoredDocs;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping document ids to numeric scores")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ScoredDocs, A::Error> {
                let mut docs = ScoredDocs::new();
                while let Some((doc_id, score)) = access.next_entry::<String, f64>()? {
                    docs.insert(doc_id, score);
                }
                Ok(docs)
            }
        }

        deserializer.deserialize_map(ScoredDocsVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfiguration {
    pub name: String,
    pub path: String,
    pub num_dimensions: usize,
    pub similarity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub index_id: String,
    pub database: String,
    pub collection: String,
    pub configuration: IndexConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSet {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub key: String,
    pub label_set: LabelSet,
    pub index_id: String,
    pub relevant_docs: ScoredDocs,
    /// When true, documents absent from `relevant_docs` are confirmed not relevant.
    pub comprehensive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub key: String,
    pub index_id: String,
    pub text: String,
    #[serde(default)]
    pub vector: Vec<f32>,
    pub search_call: String,
    pub predictions: ScoredDocs,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl Query {
    pub fn prediction_length(&self) -> usize {
        self.predictions.len()
    }
}
