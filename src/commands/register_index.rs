use anyhow::Result;
use rankeval::retrieval::{JsonIndexCatalog, initialize_index};
use tracing::info;

use super::open_store;
use crate::cli::RegisterIndexArgs;

pub fn run(args: RegisterIndexArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let catalog = JsonIndexCatalog::new(&args.index_listing);

    let index = initialize_index(
        &store,
        &catalog,
        &args.database,
        &args.collection,
        &args.index_name,
    )?;

    info!(
        index_id = %index.index_id,
        database = %index.database,
        collection = %index.collection,
        path = %index.configuration.path,
        num_dimensions = index.configuration.num_dimensions,
        similarity = %index.configuration.similarity,
        "index registered"
    );
    Ok(())
}
