//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the driver:
//! the resolved test case, the per-run outcome taxonomy and the records the
//! driver accumulates for the end-of-run summary.
//!
//! 此模块定义了整个驱动程序中使用的核心数据结构：
//! 已解析的测试用例、每次运行的结果分类以及驱动为运行结束摘要累积的记录。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::compiler::CompilerMode;
use crate::infra::command::StdinSource;
use crate::infra::t;

/// The flavour of compiler the driver was started with.
/// 驱动程序启动时使用的编译器类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerKind {
    Chpl,
    Chpldoc,
    Ipe,
}

impl CompilerKind {
    pub fn from_compiler_path(compiler: &Path) -> Self {
        let name = compiler.to_string_lossy();
        if name.ends_with("chpldoc") {
            Self::Chpldoc
        } else if name.ends_with("chpl-ipe") {
            Self::Ipe
        } else {
            Self::Chpl
        }
    }
}

/// Which step of the state machine produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Filter,
    Compile,
    Execute,
    Performance,
}

/// Infrastructure problems: reported, the current variant is abandoned and the
/// run continues with the next one.
///
/// 基础设施问题：报告后放弃当前变体，继续运行下一个变体。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfraKind {
    /// No golden file matched anywhere in the fallback chain.
    MissingGoodFile,
    /// Compilation reported success but produced no runnable executable.
    MissingExecutable,
    /// The compiler (or `chpldoc`) could not be spawned.
    MissingCompiler,
    /// The batch launcher reported a known fault in the captured output.
    LauncherFault,
    /// A stdin redirection in the execute options could not be honoured.
    StdinRedirect,
    /// A performance directory could not be created.
    PerfSetup,
    /// A log write or helper spawn failed; the rest of the test was abandoned.
    DriverIo,
}

/// The terminal classification of one (compile variant, execute variant, trial).
///
/// 一次（编译变体、执行变体、试验）运行的最终分类。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Output matched the golden file.
    Success,
    /// Output differed from the golden file.
    Mismatch,
    /// The compile or execute deadline expired. Never diffed.
    Timeout,
    /// The test was filtered out before any compile attempt.
    Skipped { reason: String },
    /// A future test failed its golden comparison but matched its `.bad` snapshot.
    FutureSuppressed,
    InfraError(InfraKind),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::FutureSuppressed)
    }
}

/// One recorded outcome. Records are never revisited once pushed.
/// 一条已记录的结果。记录一旦写入便不再修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// `<directory label>/<test base name>`
    pub test: String,
    /// Compile-option variant number, 0 when only the blank variant exists.
    pub compopts: usize,
    /// Execute-option variant number, 0 when only the blank variant exists.
    pub execopts: usize,
    pub trial: u32,
    pub stage: Stage,
    pub outcome: Outcome,
    /// Whether the test carried a `.future` marker or a triggered `.suppressif`.
    pub future: bool,
    pub duration: Duration,
}

impl RunRecord {
    pub fn skipped(test: String, reason: impl Into<String>) -> Self {
        Self {
            test,
            compopts: 0,
            execopts: 0,
            trial: 0,
            stage: Stage::Filter,
            outcome: Outcome::Skipped {
                reason: reason.into(),
            },
            future: false,
            duration: Duration::ZERO,
        }
    }

    /// A failure that should count against the run. Future tests are informational.
    /// 应计入运行失败的记录。future 测试仅作参考。
    pub fn is_failure(&self) -> bool {
        !self.future
            && matches!(
                self.outcome,
                Outcome::Mismatch | Outcome::Timeout | Outcome::InfraError(_)
            )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    /// Gets the status of the record as a localized string for display.
    /// 以本地化字符串形式获取记录状态以供显示。
    pub fn get_status_str(&self, locale: &str) -> String {
        match &self.outcome {
            Outcome::Success => t!("report.status_passed", locale = locale).to_string(),
            Outcome::FutureSuppressed => t!("report.status_bad_match", locale = locale).to_string(),
            Outcome::Skipped { .. } => t!("report.status_skipped", locale = locale).to_string(),
            Outcome::Timeout => t!("report.status_timeout", locale = locale).to_string(),
            Outcome::InfraError(_) => t!("report.status_infra", locale = locale).to_string(),
            Outcome::Mismatch if self.future => t!("report.status_future", locale = locale).to_string(),
            Outcome::Mismatch => t!("report.status_failed", locale = locale).to_string(),
        }
    }

    /// Gets the appropriate CSS class for the record status.
    pub fn get_status_class(&self) -> &'static str {
        match &self.outcome {
            Outcome::Success | Outcome::FutureSuppressed => "status-Passed",
            Outcome::Skipped { .. } => "status-Skipped",
            _ if self.future => "status-Future",
            Outcome::Timeout => "status-Timeout",
            _ => "status-Failed",
        }
    }

    /// `name (compopts: 1, execopts: 2)` style label.
    pub fn variant_label(&self) -> String {
        let mut label = self.test.clone();
        label.push_str(&variation_suffix(self.compopts, self.execopts));
        label
    }
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}: {:?}", self.variant_label(), self.stage, self.outcome)
    }
}

/// Renders ` (compopts: N, execopts: M)`, omitting zero counters.
/// 渲染 ` (compopts: N, execopts: M)`，省略为零的计数。
pub fn variation_suffix(compopts: usize, execopts: usize) -> String {
    match (compopts, execopts) {
        (0, 0) => String::new(),
        (c, 0) => format!(" (compopts: {c})"),
        (0, e) => format!(" (execopts: {e})"),
        (c, e) => format!(" (compopts: {c}, execopts: {e})"),
    }
}

/// Aggregated counts over every record of a directory run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub successes: usize,
    pub failures: usize,
    pub futures: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn from_records(records: &[RunRecord]) -> Self {
        let mut summary = Summary::default();
        for record in records {
            if record.is_skipped() {
                summary.skipped += 1;
            } else if record.future {
                summary.futures += 1;
            } else if record.outcome.is_success() {
                summary.successes += 1;
            } else {
                summary.failures += 1;
            }
        }
        summary
    }
}

/// A test file after discovery, filtering and option resolution.
/// Immutable for the rest of its run; discarded once its matrix is done.
///
/// 经过发现、过滤和选项解析后的测试文件。
/// 在其余运行过程中不可变；其矩阵运行完毕后即被丢弃。
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Source file name, e.g. `hello.chpl`.
    pub source: String,
    /// Source name without its test extension, e.g. `hello`.
    pub base: String,
    /// Executable name; the base name, optionally uniquified with the driver pid.
    pub exec_name: String,
    pub mode: CompilerMode,
    /// `Future (<reason>) ` or `Suppress (<reason>) ` prefix for result lines.
    pub future_label: Option<String>,
    pub numlocales: u32,
    /// ` -nl N` appended to every execute variant when locales are required.
    pub numlocales_execopts: Option<String>,
    pub timeout: u64,
    pub kill_timeout: u64,
    pub num_trials: u32,
    pub timer: Option<Vec<String>>,
    pub catfiles: Vec<String>,
    pub last_compopts: Vec<String>,
    pub last_execopts: Vec<String>,
    /// Whether a successful compilation proceeds to execution.
    pub execute: bool,
    pub precomp: Option<PathBuf>,
    pub prediff: Option<PathBuf>,
    pub preexec: Option<PathBuf>,
    pub stdin: StdinSource,
    pub comp_stdin: StdinSource,
    pub compenv: Vec<(String, String)>,
    pub execenv: Vec<(String, String)>,
    /// Merged compile-option matrix; never empty.
    pub compopts: Vec<String>,
    /// Execute-option variants; never empty.
    pub execopts: Vec<String>,
}

impl TestCase {
    pub fn is_future(&self) -> bool {
        self.future_label.is_some()
    }

    pub fn future_prefix(&self) -> &str {
        self.future_label.as_deref().unwrap_or("")
    }

    /// Only one compile and one execute variant: logs and golden files carry no index.
    pub fn only_one_variant(&self) -> bool {
        self.compopts.len() == 1 && self.execopts.len() == 1
    }
}
