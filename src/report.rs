//! Account statistics export

use crate::types::AccountReport;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

const HEADER: &str = "address;level;points;rank";

/// Receives the per-account rows at the end of a run
pub trait ReportSink {
    fn write(&mut self, rows: &[AccountReport]) -> Result<()>;
}

/// `;`-delimited table, one row per account with statistics
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    path: PathBuf,
}

impl CsvReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for CsvReportSink {
    fn write(&mut self, rows: &[AccountReport]) -> Result<()> {
        if rows.is_empty() {
            info!(path = %self.path.display(), "No statistics to write");
            return Ok(());
        }

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create report file: {}", self.path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{HEADER}")?;
        for row in rows {
            writeln!(
                out,
                "{};{};{};{}",
                row.address.to_checksum(None),
                row.level,
                row.points,
                row.rank
            )?;
        }
        out.flush()?;

        info!(path = %self.path.display(), rows = rows.len(), "Report written");
        Ok(())
    }
}
