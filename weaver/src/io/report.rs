//! Persist the final run report as JSON.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::outcome::RunReport;
use crate::io::config::write_atomic;

/// Atomically write the report as pretty JSON.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(report).context("serialize run report")?;
    buf.push('\n');
    write_atomic(path, &buf).with_context(|| format!("write report {}", path.display()))
}
