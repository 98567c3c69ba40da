pub mod feedback;
pub mod import;
pub mod metrics;
pub mod purge;
pub mod rank_curve;
pub mod reconcile;
pub mod register_index;
pub mod status;

mod output;

use anyhow::{Context, Result};
use rankeval::store::{QueryFilter, SqliteRecordStore};
use rankeval::util::ensure_directory;
use tracing::debug;

use crate::cli::{FilterArgs, StoreArgs};

pub(crate) fn open_store(args: &StoreArgs) -> Result<SqliteRecordStore> {
    let db_path = args.resolved_db_path();
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    debug!(path = %db_path.display(), "opening record store");
    SqliteRecordStore::open(&db_path)
        .with_context(|| format!("failed to open record store {}", db_path.display()))
}

pub(crate) fn query_filter(args: &FilterArgs) -> Result<QueryFilter> {
    let filter = match &args.filter {
        Some(raw) => QueryFilter::from_json(raw)?,
        None => QueryFilter {
            index_id: args.index_id.clone(),
            keys: args.keys.clone(),
            label_set: args.label_set.clone(),
        },
    };
    filter.validate()?;
    Ok(filter)
}
