use anyhow::Result;
use rankeval::store::RecordStore;
use tracing::{info, warn};

use super::open_store;
use crate::cli::PurgeArgs;

pub fn run(args: PurgeArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let removed = store.remove_index_records(&args.index_id)?;

    if !removed.index_removed {
        warn!(index_id = %args.index_id, "index was not registered");
    }
    info!(
        index_id = %args.index_id,
        queries = removed.queries,
        labels = removed.labels,
        "index records purged"
    );
    Ok(())
}
