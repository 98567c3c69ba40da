use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::Result;
use rankeval::eval::{RankCurve, RankCurveOptions, compute_rank_curve};

use super::output::emit_report;
use super::{open_store, query_filter};
use crate::cli::RankCurveArgs;

pub fn run(args: RankCurveArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let filter = query_filter(&args.filter)?;
    let options = RankCurveOptions {
        rank_cutoff: args.rank_cutoff,
        max_rank: args.max_rank,
    };

    let curves = compute_rank_curve(&store, &filter, options)?;
    emit_report("rank-curve", &args.report, &curves, |output| {
        write_text_report(output, &curves)
    })
}

fn write_text_report(output: &mut dyn Write, curves: &BTreeMap<String, RankCurve>) -> io::Result<()> {
    if curves.is_empty() {
        writeln!(output, "No labeled queries matched the filter.")?;
    }

    for curve in curves.values() {
        writeln!(
            output,
            "{}: contributions={} rank_cutoff={} misses={}",
            curve.label_set, curve.contributions, curve.rank_cutoff, curve.misses
        )?;
        for (rank, (hits, recall)) in curve.hits.iter().zip(&curve.curve).enumerate() {
            writeln!(output, "\t{}\t{hits}\t{recall:.4}", rank + 1)?;
        }
    }
    Ok(())
}
