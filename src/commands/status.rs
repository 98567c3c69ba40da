use std::io::{self, Write};

use anyhow::Result;
use rankeval::model::Index;
use rankeval::store::StoreCounts;
use serde::Serialize;
use tracing::{info, warn};

use super::open_store;
use super::output::write_json_stdout;
use crate::cli::{OutputFormat, StatusArgs};

#[derive(Debug, Serialize)]
struct StatusReport {
    db_path: String,
    db_schema_version: Option<String>,
    counts: StoreCounts,
    indexes: Vec<Index>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.store.resolved_db_path();
    info!(cache_root = %args.store.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = open_store(&args.store)?;
    let report = StatusReport {
        db_path: db_path.display().to_string(),
        db_schema_version: store.schema_version()?,
        counts: store.counts()?,
        indexes: store.list_indexes()?,
    };

    match args.format {
        OutputFormat::Json => write_json_stdout(&report),
        OutputFormat::Text => {
            let mut output = io::BufWriter::new(io::stdout().lock());
            write_text_report(&mut output, &report)?;
            output.flush()?;
            Ok(())
        }
    }
}

fn write_text_report(output: &mut dyn Write, report: &StatusReport) -> io::Result<()> {
    let counts = &report.counts;
    writeln!(output, "Database: {}", report.db_path)?;
    writeln!(
        output,
        "Schema version: {}",
        report.db_schema_version.as_deref().unwrap_or("unknown")
    )?;
    writeln!(
        output,
        "Records: indexes={} label_sets={} labels={} queries={} attached_labels={}",
        counts.indexes, counts.label_sets, counts.labels, counts.queries, counts.attached_labels
    )?;
    for index in &report.indexes {
        writeln!(
            output,
            "\t{}\t{}.{}\t{} ({} dims, {})",
            index.index_id,
            index.database,
            index.collection,
            index.configuration.name,
            index.configuration.num_dimensions,
            index.configuration.similarity
        )?;
    }
    Ok(())
}
