use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::domain::RunStatus;
use crate::ledger::LedgerReport;
use crate::pipeline::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(result: &LedgerReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain-text summaries on stdout, progress lines on stderr.
pub struct TextOutput;

impl TextOutput {
    pub fn print_run(result: &RunSummary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "staged into {}", result.output_dir)?;
        writeln!(stdout, "ledger: {}", result.ledger_path)?;
        Self::write_counts(&mut stdout, result.total, &result.counts)?;
        let elapsed = result.finished_at - result.started_at;
        writeln!(stdout, "elapsed: {}s", elapsed.num_seconds())?;
        Ok(())
    }

    pub fn print_report(result: &LedgerReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "ledger: {}", result.ledger_path)?;
        Self::write_counts(&mut stdout, result.total, &result.counts)?;
        if !result.failed.is_empty() {
            writeln!(stdout, "retryable:")?;
            for row in &result.failed {
                writeln!(
                    stdout,
                    "  {} {} {}",
                    row.pmcid.as_deref().unwrap_or(&row.raw_id),
                    row.status,
                    row.detail.as_deref().unwrap_or("")
                )?;
            }
        }
        Ok(())
    }

    fn write_counts(
        out: &mut impl Write,
        total: usize,
        counts: &BTreeMap<RunStatus, usize>,
    ) -> io::Result<()> {
        writeln!(out, "identifiers: {total}")?;
        for (status, count) in counts {
            if *count > 0 {
                writeln!(out, "  {:<24} {count}", status.as_str())?;
            }
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
