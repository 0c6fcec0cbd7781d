//! # HTML Reporting Module / HTML 报告模块
//!
//! Renders every recorded run of a directory into a single self-contained
//! HTML page with summary counts and a results table.
//!
//! 将目录中每次记录的运行渲染为单个自包含的 HTML 页面，包含摘要计数和结果表格。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::path::Path;

use crate::core::models::{Outcome, RunRecord, Summary};
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 2em; color: #222; }
h1 { font-weight: 600; }
.summary-container { display: flex; gap: 1.5em; margin-bottom: 1.5em; }
.summary-item { border: 1px solid #ddd; border-radius: 6px; padding: 0.8em 1.2em; text-align: center; }
.summary-item .count { display: block; font-size: 1.6em; font-weight: 600; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #eee; padding: 0.4em 0.6em; text-align: left; }
.status-cell { border-radius: 4px; padding: 0.1em 0.5em; display: inline-block; }
.status-Passed { background: #e6f4ea; color: #137333; }
.status-Failed { background: #fce8e6; color: #c5221f; }
.status-Timeout { background: #f3e8fd; color: #8430ce; }
.status-Future { background: #fef7e0; color: #b06000; }
.status-Skipped { background: #f1f3f4; color: #5f6368; }
.passed-text { color: #137333; } .failed-text { color: #c5221f; }
.future-text { color: #b06000; } .skipped-text { color: #5f6368; }
"#;

/// Generates an HTML report from the recorded runs of one directory.
///
/// 根据一个目录的运行记录生成 HTML 报告。
///
/// # Errors / 错误
/// Returns an error if the report cannot be written to `output_path`.
/// 如果无法将报告写入 `output_path`，则返回错误。
pub fn generate_html_report(records: &[RunRecord], directory: &str, output_path: &Path, locale: &str) -> Result<()> {
    let markup = render(records, directory, locale);
    std::fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report to {}", output_path.display()))
}

fn render(records: &[RunRecord], directory: &str, locale: &str) -> Markup {
    let summary = Summary::from_records(records);
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale, directory = directory)) }
                div class="summary-container" {
                    (summary_item(records.len(), "", &t!("html_report.summary.total", locale = locale)))
                    (summary_item(summary.successes, "passed-text", &t!("html_report.summary.passed", locale = locale)))
                    (summary_item(summary.failures, "failed-text", &t!("html_report.summary.failed", locale = locale)))
                    (summary_item(summary.futures, "future-text", &t!("html_report.summary.futures", locale = locale)))
                    (summary_item(summary.skipped, "skipped-text", &t!("html_report.summary.skipped", locale = locale)))
                }
                table {
                    thead {
                        tr {
                            th { (t!("html_report.table.header.name", locale = locale)) }
                            th { (t!("html_report.table.header.stage", locale = locale)) }
                            th { (t!("html_report.table.header.status", locale = locale)) }
                            th { (t!("html_report.table.header.duration", locale = locale)) }
                            th { (t!("html_report.table.header.details", locale = locale)) }
                        }
                    }
                    tbody {
                        @for record in records {
                            tr {
                                td { (record.variant_label()) }
                                td { (format!("{:?}", record.stage)) }
                                td {
                                    div class={ "status-cell " (record.get_status_class()) } {
                                        (record.get_status_str(locale))
                                    }
                                }
                                td { (format!("{:.2}s", record.duration.as_secs_f64())) }
                                td { (details(record)) }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div class="summary-item" {
            span class={ "count " (class) } { (count) }
            span class="label" { (label) }
        }
    }
}

fn details(record: &RunRecord) -> String {
    match &record.outcome {
        Outcome::Skipped { reason } => reason.clone(),
        Outcome::InfraError(kind) => format!("{kind:?}"),
        _ if record.trial > 0 => format!("trial {}", record.trial + 1),
        _ => String::new(),
    }
}
