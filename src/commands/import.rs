use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rankeval::model::{Query, ScoredDocs};
use rankeval::retrieval::{Judgments, get_label_set, labels_from_judgments};
use rankeval::store::{LabelFilter, RecordStore};
use rankeval::util::{now_utc_string, read_json_file, run_id, sha256_file, write_json_pretty};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::open_store;
use crate::cli::{ImportLabelsArgs, ImportRunArgs, StoreArgs};

#[derive(Debug, Clone, Deserialize)]
pub struct RunRecord {
    pub key: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub vector: Vec<f32>,
    #[serde(default)]
    pub search_call: String,
    pub predictions: ScoredDocs,
}

#[derive(Debug, Serialize)]
pub struct ImportManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub kind: String,
    pub index_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_set: Option<String>,
    pub source_path: String,
    pub source_sha256: String,
    pub records_read: usize,
    pub records_inserted: usize,
}

pub fn run_labels(args: ImportLabelsArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let judgments: Judgments = read_json_file(&args.judgments)?;

    let inserted = import_judgments(
        &store,
        &args.index_id,
        &args.label_set,
        &judgments,
        args.comprehensive,
    )?;

    let run_id = run_id("import-labels");
    let manifest = ImportManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: now_utc_string(),
        kind: "labels".to_string(),
        index_id: args.index_id.clone(),
        label_set: Some(args.label_set.clone()),
        source_path: args.judgments.display().to_string(),
        source_sha256: sha256_file(&args.judgments)?,
        records_read: judgments.len(),
        records_inserted: inserted,
    };
    let manifest_path = manifest_path(&args.store, args.manifest_path.as_deref(), &run_id);
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        label_set = %args.label_set,
        keys = judgments.len(),
        inserted,
        manifest = %manifest_path.display(),
        "labels imported"
    );
    Ok(())
}

pub fn run_queries(args: ImportRunArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let records: Vec<RunRecord> = read_json_file(&args.run)?;

    let inserted = import_run_records(&store, &args.index_id, &records, !args.skip_labels)?;

    let run_id = run_id("import-run");
    let manifest = ImportManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: now_utc_string(),
        kind: "run".to_string(),
        index_id: args.index_id.clone(),
        label_set: None,
        source_path: args.run.display().to_string(),
        source_sha256: sha256_file(&args.run)?,
        records_read: records.len(),
        records_inserted: inserted,
    };
    let manifest_path = manifest_path(&args.store, args.manifest_path.as_deref(), &run_id);
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        index_id = %args.index_id,
        queries = inserted,
        manifest = %manifest_path.display(),
        "run imported"
    );
    Ok(())
}

fn manifest_path(store: &StoreArgs, explicit: Option<&Path>, run_id: &str) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| store.manifest_dir().join(format!("{run_id}.json")))
}

/// Stores one Label per judged key with positive relevance; returns how many were inserted.
pub fn import_judgments<S: RecordStore + ?Sized>(
    store: &S,
    index_id: &str,
    label_set: &str,
    judgments: &Judgments,
    comprehensive: bool,
) -> Result<usize> {
    let index = store
        .get_index(index_id)
        .with_context(|| format!("labels target unregistered index {index_id}"))?;
    let label_set = get_label_set(store, label_set)?;

    let labels = labels_from_judgments(judgments, &label_set, &index, comprehensive);
    for label in &labels {
        store.insert_label(label)?;
    }
    Ok(labels.len())
}

pub fn import_run_records<S: RecordStore + ?Sized>(
    store: &S,
    index_id: &str,
    records: &[RunRecord],
    assign_labels: bool,
) -> Result<usize> {
    store
        .get_index(index_id)
        .with_context(|| format!("run targets unregistered index {index_id}"))?;

    for record in records {
        let labels = if assign_labels {
            store.find_labels(&LabelFilter::for_query(&record.key, index_id))?
        } else {
            Vec::new()
        };
        debug!(key = %record.key, labels = labels.len(), "importing query");

        store.insert_query(&Query {
            id: None,
            key: record.key.clone(),
            index_id: index_id.to_string(),
            text: record.text.clone(),
            vector: record.vector.clone(),
            search_call: record.search_call.clone(),
            predictions: record.predictions.clone(),
            labels,
        })?;
    }
    Ok(records.len())
}
