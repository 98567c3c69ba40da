use std::io::{self, Write};

use anyhow::Result;
use rankeval::eval::{LabelSetPair, MetricsReport, MetricsRequest, compute_metrics};

use super::output::{emit_report, format_value};
use super::{open_store, query_filter};
use crate::cli::MetricsArgs;

pub fn run(args: MetricsArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let filter = query_filter(&args.filter)?;

    let pairs = if args.pairs.is_empty() {
        None
    } else {
        Some(
            args.pairs
                .iter()
                .map(|raw| raw.parse::<LabelSetPair>())
                .collect::<rankeval::Result<Vec<_>>>()?,
        )
    };
    let request = MetricsRequest {
        metrics: args.metrics.clone(),
        pairs,
    };

    let report = compute_metrics(&store, &filter, &request)?;
    emit_report("metrics", &args.report, &report, |output| {
        write_text_report(output, &report)
    })
}

fn write_text_report(output: &mut dyn Write, report: &MetricsReport) -> io::Result<()> {
    writeln!(output, "Queries: {}", report.query_count)?;
    if report.groups.is_empty() {
        writeln!(output, "No labeled queries matched the filter.")?;
    }

    for group in &report.groups {
        writeln!(output, "{} (judged queries: {})", group.group, group.judged_queries)?;
        for (metric, value) in &group.metrics {
            writeln!(output, "\t{metric}\t{}", format_value(*value))?;
        }
        if let Some(matrix) = &group.confusion_matrix {
            writeln!(output, "\tconfusion_matrix (predicted, actual, count):")?;
            for (predicted, actual, count) in matrix.cells() {
                writeln!(output, "\t\t{predicted}\t{actual}\t{count}")?;
            }
        }
    }

    for warning in &report.warnings {
        writeln!(output, "warning: {warning}")?;
    }
    Ok(())
}
