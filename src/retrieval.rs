use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{EvalError, Result};
use crate::model::{Index, IndexConfiguration, Label, LabelSet, Query, ScoredDocs};
use crate::store::{LabelFilter, RecordStore};

pub const DEFAULT_NUM_CANDIDATES: usize = 1000;
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexDefinition {
    pub id: String,
    pub name: String,
    pub latest_definition: SearchIndexFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexFields {
    pub fields: Vec<VectorField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorField {
    pub path: String,
    pub num_dimensions: usize,
    pub similarity: String,
}

pub trait IndexCatalog {
    fn list_search_indexes(&self) -> Result<Vec<SearchIndexDefinition>>;
}

/// Catalog backed by a JSON array of index definitions on disk.
#[derive(Debug, Clone)]
pub struct JsonIndexCatalog {
    path: PathBuf,
}

impl JsonIndexCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexCatalog for JsonIndexCatalog {
    fn list_search_indexes(&self) -> Result<Vec<SearchIndexDefinition>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|err| {
            EvalError::InvalidArgument(format!(
                "failed to read index listing {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub num_candidates: usize,
    pub limit: usize,
    pub exact: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            num_candidates: DEFAULT_NUM_CANDIDATES,
            limit: DEFAULT_LIMIT,
            exact: false,
        }
    }
}

impl SearchParams {
    pub fn exact(limit: usize) -> Self {
        Self {
            num_candidates: limit,
            limit,
            exact: true,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(EvalError::InvalidArgument(
                "search limit must be a positive integer".to_string(),
            ));
        }
        if !self.exact && self.num_candidates < self.limit {
            return Err(EvalError::InvalidArgument(format!(
                "num_candidates ({}) must be at least limit ({})",
                self.num_candidates, self.limit
            )));
        }
        Ok(())
    }
}

pub trait VectorSearch {
    /// Returns document ids to scores, best first.
    fn search(&self, index: &Index, vector: &[f32], params: &SearchParams) -> Result<ScoredDocs>;
}

/// Finds `index_name` in the catalog and get-or-creates its Index record.
pub fn initialize_index<S, C>(
    store: &S,
    catalog: &C,
    database: &str,
    collection: &str,
    index_name: &str,
) -> Result<Index>
where
    S: RecordStore + ?Sized,
    C: IndexCatalog + ?Sized,
{
    let definition = catalog
        .list_search_indexes()?
        .into_iter()
        .find(|definition| definition.name == index_name)
        .ok_or_else(|| EvalError::IndexNotFound {
            index: index_name.to_string(),
        })?;

    let Some(field) = definition.latest_definition.fields.first() else {
        return Err(EvalError::InvalidArgument(format!(
            "search index {index_name} defines no vector fields"
        )));
    };

    let index = Index {
        index_id: definition.id.clone(),
        database: database.to_string(),
        collection: collection.to_string(),
        configuration: IndexConfiguration {
            name: definition.name.clone(),
            path: field.path.clone(),
            num_dimensions: field.num_dimensions,
            similarity: field.similarity.clone(),
        },
    };
    let stored = store.get_or_create_index(&index)?;
    info!(index_id = %stored.index_id, name = %stored.configuration.name, "index initialized");
    Ok(stored)
}

pub fn get_label_set<S: RecordStore + ?Sized>(store: &S, name: &str) -> Result<LabelSet> {
    if name.trim().is_empty() {
        return Err(EvalError::InvalidArgument(
            "label set name must not be blank".to_string(),
        ));
    }
    store.get_or_create_label_set(name)
}

pub fn search_call(index: &Index, vector: &[f32], params: &SearchParams) -> Result<String> {
    let mut stage = json!({
        "index": index.configuration.name,
        "path": index.configuration.path,
        "queryVector": vector,
        "limit": params.limit,
    });
    if params.exact {
        stage["exact"] = json!(true);
    } else {
        stage["numCandidates"] = json!(params.num_candidates);
    }
    let pipeline = json!([
        { "$vectorSearch": stage },
        { "$project": { "_id": 1, "search_score": { "$meta": "vectorSearchScore" } } },
    ]);
    Ok(serde_json::to_string(&pipeline)?)
}

/// Runs one search and returns the unsaved Query.
#[allow(clippy::too_many_arguments)]
pub fn query_index<S, V>(
    store: &S,
    search: &V,
    index: &Index,
    key: &str,
    text: &str,
    vector: &[f32],
    params: &SearchParams,
    assign_labels: bool,
) -> Result<Query>
where
    S: RecordStore + ?Sized,
    V: VectorSearch + ?Sized,
{
    params.validate()?;
    let predictions = search.search(index, vector, params)?;
    let labels = if assign_labels {
        store.find_labels(&LabelFilter::for_query(key, &index.index_id))?
    } else {
        Vec::new()
    };
    debug!(
        key,
        predictions = predictions.len(),
        labels = labels.len(),
        "index queried"
    );

    Ok(Query {
        id: None,
        key: key.to_string(),
        index_id: index.index_id.clone(),
        text: text.to_string(),
        vector: vector.to_vec(),
        search_call: search_call(index, vector, params)?,
        predictions,
        labels,
    })
}

/// Exact nearest-neighbour label; the search score becomes the relevance.
pub fn generate_exact_label<V: VectorSearch + ?Sized>(
    search: &V,
    index: &Index,
    key: &str,
    vector: &[f32],
    label_set: &LabelSet,
    limit: usize,
) -> Result<Label> {
    let params = SearchParams::exact(limit);
    params.validate()?;
    let relevant_docs = search.search(index, vector, &params)?;

    Ok(Label {
        id: None,
        key: key.to_string(),
        label_set: label_set.clone(),
        index_id: index.index_id.clone(),
        relevant_docs,
        comprehensive: true,
    })
}

pub type Judgments = BTreeMap<String, BTreeMap<String, f64>>;

/// Builds unsaved Labels from graded judgments, dropping non-positive relevance.
///
/// Keys left with no relevant documents produce no Label.
pub fn labels_from_judgments(
    judgments: &Judgments,
    label_set: &LabelSet,
    index: &Index,
    comprehensive: bool,
) -> Vec<Label> {
    judgments
        .iter()
        .filter_map(|(key, docs)| {
            let relevant_docs = docs
                .iter()
                .filter(|(_, relevance)| **relevance > 0.0)
                .map(|(doc_id, relevance)| (doc_id.as_str(), *relevance))
                .collect::<ScoredDocs>();
            if relevant_docs.is_empty() {
                debug!(key = %key, "judgment has no positive relevance");
                return None;
            }
            Some(Label {
                id: None,
                key: key.clone(),
                label_set: label_set.clone(),
                index_id: index.index_id.clone(),
                relevant_docs,
                comprehensive,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::store::SqliteRecordStore;

    struct FixedCatalog(Vec<SearchIndexDefinition>);

    impl IndexCatalog for FixedCatalog {
        fn list_search_indexes(&self) -> Result<Vec<SearchIndexDefinition>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSearch {
        calls: RefCell<Vec<SearchParams>>,
    }

    impl VectorSearch for RecordingSearch {
        fn search(&self, _index: &Index, _vector: &[f32], params: &SearchParams) -> Result<ScoredDocs> {
            self.calls.borrow_mut().push(*params);
            Ok([("d1", 0.9), ("d2", 0.7)].into_iter().take(params.limit).collect())
        }
    }

    fn definition(id: &str, name: &str) -> SearchIndexDefinition {
        SearchIndexDefinition {
            id: id.to_string(),
            name: name.to_string(),
            latest_definition: SearchIndexFields {
                fields: vec![VectorField {
                    path: "embedding".to_string(),
                    num_dimensions: 3,
                    similarity: "cosine".to_string(),
                }],
            },
        }
    }

    fn registered(store: &SqliteRecordStore) -> Index {
        let catalog = FixedCatalog(vec![definition("idx-1", "vector_index")]);
        initialize_index(store, &catalog, "db", "docs", "vector_index").expect("index")
    }

    #[test]
    fn initialize_index_is_idempotent_and_uses_catalog_definition() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let first = registered(&store);
        let second = registered(&store);

        assert_eq!(first, second);
        assert_eq!(first.index_id, "idx-1");
        assert_eq!(first.configuration.path, "embedding");
        assert_eq!(store.list_indexes().expect("indexes").len(), 1);
    }

    #[test]
    fn unknown_index_name_is_reported() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let catalog = FixedCatalog(vec![definition("idx-1", "vector_index")]);
        let error = initialize_index(&store, &catalog, "db", "docs", "other").expect_err("missing");
        assert!(matches!(error, EvalError::IndexNotFound { ref index } if index == "other"));
    }

    #[test]
    fn json_catalog_reads_camel_case_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("indexes.json");
        std::fs::write(
            &path,
            r#"[{"id":"abc","name":"vi","latestDefinition":{"fields":[{"path":"v","numDimensions":8,"similarity":"dotProduct"}]}}]"#,
        )
        .expect("write listing");

        let definitions = JsonIndexCatalog::new(&path)
            .list_search_indexes()
            .expect("listing should parse");
        assert_eq!(definitions[0].latest_definition.fields[0].num_dimensions, 8);
    }

    #[test]
    fn query_index_uses_defaults_and_attaches_existing_labels() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let index = registered(&store);
        let label_set = get_label_set(&store, "gold").expect("label set");
        let search = RecordingSearch::default();

        let label = generate_exact_label(&search, &index, "q1", &[0.1, 0.2, 0.3], &label_set, DEFAULT_LIMIT)
            .expect("label");
        store.insert_label(&label).expect("insert label");

        let query = query_index(
            &store,
            &search,
            &index,
            "q1",
            "what is rust",
            &[0.1, 0.2, 0.3],
            &SearchParams::default(),
            true,
        )
        .expect("query");

        assert_eq!(query.labels.len(), 1);
        assert!(query.labels[0].comprehensive);
        assert_eq!(query.predictions.position("d2"), Some(1));
        assert!(query.search_call.contains("\"numCandidates\":1000"));

        let calls = search.calls.borrow();
        assert!(calls[0].exact);
        assert_eq!(calls[1], SearchParams::default());
    }

    #[test]
    fn query_index_without_label_assignment_leaves_labels_empty() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let index = registered(&store);
        let query = query_index(
            &store,
            &RecordingSearch::default(),
            &index,
            "q1",
            "text",
            &[0.0],
            &SearchParams::default(),
            false,
        )
        .expect("query");
        assert!(query.labels.is_empty());
        assert_eq!(query.id, None);
    }

    #[test]
    fn judgments_drop_non_positive_relevance() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let index = registered(&store);
        let label_set = get_label_set(&store, "mteb").expect("label set");

        let judgments: Judgments = serde_json::from_str(
            r#"{"q1": {"d1": 2, "d2": 0, "d3": -1}, "q2": {"d4": 0}}"#,
        )
        .expect("judgments");
        let labels = labels_from_judgments(&judgments, &label_set, &index, false);

        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].relevant_docs.len(), 1);
        assert_eq!(labels[0].relevant_docs.get("d1"), Some(2.0));
    }

    #[test]
    fn blank_label_set_name_is_rejected() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        assert!(get_label_set(&store, "  ").is_err());
    }
}
