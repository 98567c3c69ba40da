use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rankeval::util::{now_utc_string, run_id, write_json_pretty};
use serde::Serialize;
use tracing::info;

use crate::cli::{OutputFormat, ReportArgs};

#[derive(Debug, Serialize)]
pub struct ReportManifest<'a, T: Serialize> {
    pub run_id: String,
    pub generated_at: String,
    pub command: &'a str,
    pub report: &'a T,
}

pub fn emit_report<T, F>(command: &str, args: &ReportArgs, report: &T, write_text: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    match args.format {
        OutputFormat::Json => write_json_stdout(report)?,
        OutputFormat::Text => {
            let mut output = io::BufWriter::new(io::stdout().lock());
            write_text(&mut output).context("failed to write text report")?;
            output.flush()?;
        }
    }

    if let Some(path) = &args.output {
        write_report_manifest(path, command, report)?;
    }
    Ok(())
}

pub fn write_json_stdout<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value).context("failed to serialize json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

pub fn write_report_manifest<T: Serialize>(path: &Path, command: &str, report: &T) -> Result<()> {
    let manifest = ReportManifest {
        run_id: run_id(command),
        generated_at: now_utc_string(),
        command,
        report,
    };
    write_json_pretty(path, &manifest)?;
    info!(path = %path.display(), run_id = %manifest.run_id, "wrote report manifest");
    Ok(())
}

pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.4}"),
        None => "n/a".to_string(),
    }
}
