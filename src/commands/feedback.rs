use std::io::{self, Write};

use anyhow::Result;
use rankeval::eval::{FeedbackSample, sample_feedback};

use super::output::emit_report;
use super::{open_store, query_filter};
use crate::cli::FeedbackArgs;

pub fn run(args: FeedbackArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let filter = query_filter(&args.filter)?;

    let samples = sample_feedback(&store, &filter, args.count, args.allow_duplicates)?;
    emit_report("feedback", &args.report, &samples, |output| {
        write_text_report(output, &samples)
    })
}

fn write_text_report(output: &mut dyn Write, samples: &[FeedbackSample]) -> io::Result<()> {
    writeln!(output, "Samples: {}", samples.len())?;
    for (rank, sample) in samples.iter().enumerate() {
        writeln!(
            output,
            "{}.\tscore={:.4}\tkey={}\tdocument={}",
            rank + 1,
            sample.score,
            sample.query_key,
            sample.document
        )?;
        if !sample.query_text.is_empty() {
            writeln!(output, "\ttext: {}", sample.query_text)?;
        }
    }
    Ok(())
}
