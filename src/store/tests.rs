use super::*;
use crate::model::{IndexConfiguration, ScoredDocs};

fn sample_index(index_id: &str) -> Index {
    Index {
        index_id: index_id.to_string(),
        database: "MRL_Assessment".to_string(),
        collection: "FeedbackQARetrieval_256".to_string(),
        configuration: IndexConfiguration {
            name: "vector_256".to_string(),
            path: "vector_256".to_string(),
            num_dimensions: 256,
            similarity: "cosine".to_string(),
        },
    }
}

fn label(key: &str, label_set: &LabelSet, index_id: &str, docs: &[(&str, f64)]) -> Label {
    Label {
        id: None,
        key: key.to_string(),
        label_set: label_set.clone(),
        index_id: index_id.to_string(),
        relevant_docs: docs.iter().copied().collect::<ScoredDocs>(),
        comprehensive: true,
    }
}

fn query(key: &str, index_id: &str, predictions: &[(&str, f64)]) -> Query {
    Query {
        id: None,
        key: key.to_string(),
        index_id: index_id.to_string(),
        text: format!("text for {key}"),
        vector: vec![0.25, 0.5],
        search_call: "{}".to_string(),
        predictions: predictions.iter().copied().collect::<ScoredDocs>(),
        labels: Vec::new(),
    }
}

#[test]
fn label_set_get_or_create_is_idempotent() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    let first = store.get_or_create_label_set("gold").expect("label set");
    let second = store.get_or_create_label_set("gold").expect("label set");
    let other = store.get_or_create_label_set("exact_nn").expect("label set");

    assert_eq!(first, second);
    assert_ne!(first.id, other.id);
    assert_eq!(store.counts().expect("counts").label_sets, 2);
}

#[test]
fn index_get_or_create_keeps_first_definition() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    let original = store
        .get_or_create_index(&sample_index("idx-1"))
        .expect("index");

    let mut changed = sample_index("idx-1");
    changed.configuration.num_dimensions = 1024;
    let fetched = store.get_or_create_index(&changed).expect("index");

    assert_eq!(fetched, original);
    assert_eq!(fetched.configuration.num_dimensions, 256);
}

#[test]
fn missing_index_is_reported() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    let error = store.get_index("nope").expect_err("index should be missing");
    assert!(matches!(error, EvalError::IndexNotFound { .. }));
}

#[test]
fn queries_round_trip_with_attached_labels_in_order() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    store.get_or_create_index(&sample_index("idx-1")).expect("index");
    let gold = store.get_or_create_label_set("gold").expect("label set");
    let exact = store.get_or_create_label_set("exact").expect("label set");

    let second = store
        .insert_label(&label("q1", &exact, "idx-1", &[("d9", 0.7)]))
        .expect("label");
    let first = store
        .insert_label(&label("q1", &gold, "idx-1", &[("d3", 1.0), ("d1", 1.0)]))
        .expect("label");

    let mut record = query("q1", "idx-1", &[("d1", 0.9), ("d2", 0.8), ("d3", 0.5)]);
    record.labels = vec![first.clone(), second.clone()];
    let stored = store.insert_query(&record).expect("query");
    assert!(stored.id.is_some());

    let fetched = store
        .find_queries(&QueryFilter::for_index("idx-1"))
        .expect("queries");
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0], stored);

    let docs = fetched[0].labels[0]
        .relevant_docs
        .iter()
        .map(|(doc_id, _)| doc_id)
        .collect::<Vec<_>>();
    assert_eq!(docs, vec!["d3", "d1"]);
    assert_eq!(fetched[0].labels[1].label_set.name, "exact");
}

#[test]
fn find_queries_applies_key_and_label_set_filters() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    let gold = store.get_or_create_label_set("gold").expect("label set");
    let stored_label = store
        .insert_label(&label("q2", &gold, "idx-1", &[("d1", 1.0)]))
        .expect("label");

    store.insert_query(&query("q1", "idx-1", &[("d1", 0.5)])).expect("query");
    let mut labelled = query("q2", "idx-1", &[("d1", 0.5)]);
    labelled.labels = vec![stored_label];
    store.insert_query(&labelled).expect("query");
    store.insert_query(&query("q1", "idx-2", &[("d1", 0.5)])).expect("query");

    let by_key = store
        .find_queries(&QueryFilter {
            keys: vec!["q1".to_string()],
            ..QueryFilter::default()
        })
        .expect("queries");
    assert_eq!(by_key.len(), 2);

    let by_label_set = store
        .find_queries(&QueryFilter {
            label_set: Some("gold".to_string()),
            ..QueryFilter::default()
        })
        .expect("queries");
    assert_eq!(by_label_set.len(), 1);
    assert_eq!(by_label_set[0].key, "q2");
}

#[test]
fn save_query_replaces_attached_labels() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    let gold = store.get_or_create_label_set("gold").expect("label set");
    let stored_label = store
        .insert_label(&label("q1", &gold, "idx-1", &[("d1", 1.0)]))
        .expect("label");

    let mut stored = store
        .insert_query(&query("q1", "idx-1", &[("d1", 0.5)]))
        .expect("query");
    stored.labels = vec![stored_label.clone()];
    store.save_query(&stored).expect("save");
    store.save_query(&stored).expect("save twice");

    let fetched = store.find_queries(&QueryFilter::default()).expect("queries");
    assert_eq!(fetched[0].labels, vec![stored_label]);
    assert_eq!(store.counts().expect("counts").attached_labels, 1);
}

#[test]
fn save_query_requires_a_stored_record() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    let error = store
        .save_query(&query("q1", "idx-1", &[]))
        .expect_err("unsaved query should be rejected");
    assert!(matches!(error, EvalError::InvalidArgument(_)));
}

#[test]
fn remove_index_records_purges_only_that_index() {
    let store = SqliteRecordStore::open_in_memory().expect("store should open");
    store.get_or_create_index(&sample_index("idx-1")).expect("index");
    store.get_or_create_index(&sample_index("idx-2")).expect("index");
    let gold = store.get_or_create_label_set("gold").expect("label set");
    let stored_label = store
        .insert_label(&label("q1", &gold, "idx-1", &[("d1", 1.0)]))
        .expect("label");
    store
        .insert_label(&label("q1", &gold, "idx-2", &[("d1", 1.0)]))
        .expect("label");

    let mut record = query("q1", "idx-1", &[("d1", 0.5)]);
    record.labels = vec![stored_label];
    store.insert_query(&record).expect("query");
    store.insert_query(&query("q1", "idx-2", &[("d1", 0.5)])).expect("query");

    let removed = store.remove_index_records("idx-1").expect("purge");
    assert_eq!(
        removed,
        RemovalCounts {
            index_removed: true,
            queries: 1,
            labels: 1,
        }
    );

    let counts = store.counts().expect("counts");
    assert_eq!(counts.indexes, 1);
    assert_eq!(counts.queries, 1);
    assert_eq!(counts.labels, 1);
    assert_eq!(counts.attached_labels, 0);
    assert_eq!(counts.label_sets, 1);
}

#[test]
fn file_backed_store_persists_between_opens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("records.sqlite");

    {
        let store = SqliteRecordStore::open(&db_path).expect("store should open");
        store.get_or_create_label_set("gold").expect("label set");
    }

    let reopened = SqliteRecordStore::open(&db_path).expect("store should reopen");
    assert_eq!(reopened.counts().expect("counts").label_sets, 1);
    assert_eq!(
        reopened.schema_version().expect("version").as_deref(),
        Some("0.1.0")
    );
}

#[test]
fn malformed_filter_json_is_an_invalid_argument() {
    let error = QueryFilter::from_json(r#"{"index": "idx-1"}"#).expect_err("unknown field");
    assert!(matches!(error, EvalError::InvalidArgument(_)));

    let error = QueryFilter::from_json(r#"{"keys": ["  "]}"#).expect_err("blank key");
    assert!(matches!(error, EvalError::InvalidArgument(_)));

    let filter = QueryFilter::from_json(r#"{"index_id": "idx-1", "keys": ["q1"]}"#)
        .expect("valid filter");
    assert_eq!(filter.keys, vec!["q1".to_string()]);
}
