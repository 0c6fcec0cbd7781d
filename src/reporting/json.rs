//! # JSON Results / JSON 结果
//!
//! Writes the recorded runs of a directory, plus their summary counts, as JSON.
//!
//! 将目录的运行记录及其摘要计数写为 JSON。

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::core::models::{RunRecord, Summary};

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    directory: &'a str,
    generated_at: String,
    summary: Summary,
    records: &'a [RunRecord],
}

/// Serialises `records` to `output_path`.
///
/// # Errors
/// Returns an error if serialisation or the write fails.
pub fn write_json_report(records: &[RunRecord], directory: &str, output_path: &Path) -> Result<()> {
    let report = JsonReport {
        directory,
        generated_at: chrono::Local::now().to_rfc3339(),
        summary: Summary::from_records(records),
        records,
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialise results")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))
}
