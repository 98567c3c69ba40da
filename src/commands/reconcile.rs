use anyhow::Result;
use rankeval::reconcile::reconcile_labels;

use super::open_store;
use crate::cli::ReconcileArgs;

pub fn run(args: ReconcileArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    reconcile_labels(&store, &args.index_id)?;
    Ok(())
}
