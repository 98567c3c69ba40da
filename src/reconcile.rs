use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::store::{LabelFilter, QueryFilter, RecordStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub queries: usize,
    /// Queries whose attached label list changed.
    pub updated: usize,
    pub attached: usize,
}

/// Re-attaches every stored Label of `index_id` to the Queries sharing its key.
pub fn reconcile_labels<S: RecordStore + ?Sized>(store: &S, index_id: &str) -> Result<ReconcileSummary> {
    store.get_index(index_id)?;

    let mut summary = ReconcileSummary::default();
    for mut query in store.find_queries(&QueryFilter::for_index(index_id))? {
        let labels = store.find_labels(&LabelFilter::for_query(&query.key, index_id))?;
        summary.queries += 1;
        summary.attached += labels.len();

        let current = query.labels.iter().map(|label| label.id).collect::<Vec<_>>();
        let latest = labels.iter().map(|label| label.id).collect::<Vec<_>>();
        if current == latest {
            continue;
        }

        debug!(key = %query.key, before = current.len(), after = latest.len(), "labels reattached");
        query.labels = labels;
        store.save_query(&query)?;
        summary.updated += 1;
    }

    info!(
        index_id,
        queries = summary.queries,
        updated = summary.updated,
        attached = summary.attached,
        "labels reconciled"
    );
    Ok(summary)
}
