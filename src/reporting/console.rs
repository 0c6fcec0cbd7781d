//! # Console Reporting Module / 控制台报告模块
//!
//! The operator log sink and the end-of-run summary. Log lines are fixed
//! English bracketed tags consumed by downstream tooling; the summary is
//! coloured and localised.
//!
//! 操作日志输出和运行结束摘要。日志行是供下游工具使用的固定英文方括号标签；
//! 摘要带颜色并已本地化。

use colored::*;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::core::models::{Outcome, RunRecord, Summary};
use crate::infra::t;

#[derive(Debug, Clone)]
enum Sink {
    Stdout,
    Buffer(Arc<Mutex<String>>),
}

/// Where driver log lines go: the process stdout, or a shared in-memory buffer.
///
/// 驱动日志行的去向：进程标准输出，或共享的内存缓冲区。
#[derive(Debug, Clone)]
pub struct Reporter {
    sink: Sink,
}

impl Reporter {
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// A reporter capturing into memory. Clones share the buffer.
    pub fn buffered() -> Self {
        Self {
            sink: Sink::Buffer(Arc::new(Mutex::new(String::new()))),
        }
    }

    /// Writes text exactly as given.
    pub fn raw(&self, text: &str) {
        match &self.sink {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            Sink::Buffer(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.push_str(text);
                }
            }
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let mut text = text.as_ref().to_string();
        text.push('\n');
        self.raw(&text);
    }

    /// `[body]`
    pub fn tag(&self, body: impl AsRef<str>) {
        self.line(format!("[{}]", body.as_ref()));
    }

    /// `prefix[body]`, used for future-labelled result lines.
    pub fn prefixed_tag(&self, prefix: &str, body: impl AsRef<str>) {
        self.line(format!("{prefix}[{}]", body.as_ref()));
    }

    /// Everything captured so far; empty for the stdout sink.
    pub fn contents(&self) -> String {
        match &self.sink {
            Sink::Stdout => String::new(),
            Sink::Buffer(buffer) => buffer.lock().map(|b| b.clone()).unwrap_or_default(),
        }
    }
}

/// Prints a localised summary of every recorded run to the console.
///
/// 在控制台打印所有已记录运行的本地化摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   - Passed           | hello
///   - Failed           | math/add (compopts: 2)
///   - Future           | bugs/known
///   Successes: 1  Failures: 1  Futures: 1  Skipped: 0
/// ```
pub fn print_summary(records: &[RunRecord], locale: &str) {
    println!("\n{}", t!("summary.banner", locale = locale).bold());

    for record in records.iter().filter(|r| !r.is_skipped()) {
        let status_str = record.get_status_str(locale);
        let status_colored = match &record.outcome {
            Outcome::Success | Outcome::FutureSuppressed => status_str.green(),
            _ if record.future => status_str.yellow(),
            Outcome::Timeout => status_str.magenta(),
            _ => status_str.red(),
        };
        println!("  - {:<18} | {}", status_colored, record.variant_label());
    }

    let summary = Summary::from_records(records);
    println!(
        "  {}",
        t!(
            "summary.counts",
            locale = locale,
            successes = summary.successes,
            failures = summary.failures,
            futures = summary.futures,
            skipped = summary.skipped
        )
    );
    if summary.failures == 0 {
        println!("{}", t!("summary.all_passed", locale = locale).green().bold());
    } else {
        println!(
            "{}",
            t!("summary.some_failed", locale = locale, count = summary.failures)
                .red()
                .bold()
        );
    }
}
