//! # Performance Recorder / 性能记录器
//!
//! Hands captured execution logs (and compiler pass timings) to the
//! `computePerfStats` helper, which extracts key/value series and appends them
//! to dated `.dat` files. Failures are reported; they never abort the run.
//!
//! 将捕获的执行日志（以及编译器各阶段计时）交给 `computePerfStats` 辅助程序，
//! 由其提取键值序列并追加到带日期的 `.dat` 文件中。失败只会被报告，绝不中止运行。

use std::path::{Path, PathBuf};

use crate::core::config::Environment;
use crate::infra::command::{ProcessRequest, ProcessRunner};
use crate::reporting::Reporter;

/// Result of one recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfStatus {
    Recorded,
    /// The helper ran but could not find every key.
    KeysMissing,
    /// The output directory could not be created.
    SetupFailed,
}

/// One execution log to record.
#[derive(Debug, Clone)]
pub struct ExecutionSample<'a> {
    /// Series name; the test base name or the explicit `.perfkeys` override.
    pub name: &'a str,
    pub keyfile: &'a Path,
    pub log: &'a Path,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct PerformanceRecorder {
    helper: PathBuf,
    cwd: PathBuf,
}

impl PerformanceRecorder {
    pub fn new(env: &Environment, cwd: &Path) -> Self {
        Self {
            helper: env.util_test_helper("computePerfStats"),
            cwd: cwd.to_path_buf(),
        }
    }

    /// Records one execution in the performance directory of `env`.
    ///
    /// 在 `env` 的性能目录中记录一次执行。
    pub async fn record_execution(
        &self,
        env: &Environment,
        runner: &ProcessRunner,
        reporter: &Reporter,
        sample: &ExecutionSample<'_>,
    ) -> PerfStatus {
        let Some(perf) = &env.perf else {
            return PerfStatus::SetupFailed;
        };
        if !ensure_dir(&perf.dir).await {
            reporter.tag(format!("Error creating performance test directory {}", perf.dir.display()));
            return PerfStatus::SetupFailed;
        }

        let timed_out = if sample.timed_out { "True" } else { "False" };
        let args = vec![
            sample.name.to_string(),
            perf.dir.display().to_string(),
            sample.keyfile.display().to_string(),
            sample.log.display().to_string(),
            timed_out.to_string(),
            perf.date.clone(),
        ];
        reporter.tag(format!("Executing {} {}", self.helper.display(), args.join(" ")));

        let request = ProcessRequest::new(self.helper.display().to_string())
            .args(args)
            .current_dir(&self.cwd);
        match runner.run(&request).await {
            Ok(output) => {
                reporter.raw(&output.text());
                if output.success() {
                    PerfStatus::Recorded
                } else {
                    PerfStatus::KeysMissing
                }
            }
            Err(e) => {
                reporter.tag(format!("Error executing {}: {e}", self.helper.display()));
                PerfStatus::KeysMissing
            }
        }
    }

    /// Records compiler pass timings for one successful compilation. Partial
    /// `.dat`/`.error` files are deleted when the helper fails.
    ///
    /// 为一次成功的编译记录编译器各阶段计时。辅助程序失败时删除不完整的 `.dat`/`.error` 文件。
    pub async fn record_compilation(
        &self,
        env: &Environment,
        runner: &ProcessRunner,
        reporter: &Reporter,
        dat_name: &str,
        test_label: &str,
    ) -> PerfStatus {
        let Some(comp) = &env.comp_perf else {
            return PerfStatus::SetupFailed;
        };
        if !ensure_dir(&comp.dir).await {
            reporter.tag(format!(
                "Error creating compiler performance test directory {}",
                comp.dir.display()
            ));
            return PerfStatus::SetupFailed;
        }
        if !ensure_dir(&comp.temp_dat_dir).await {
            reporter.tag(format!(
                "Error creating compiler performance temp dat file test directory {}",
                comp.temp_dat_dir.display()
            ));
            return PerfStatus::SetupFailed;
        }

        let args = vec![
            dat_name.to_string(),
            comp.temp_dat_dir.display().to_string(),
            comp.keyfile.display().to_string(),
            comp.passes_file.clone(),
            "False".to_string(),
        ];
        reporter.tag(format!("Executing computePerfStats {}", args.join(" ")));

        let request = ProcessRequest::new(self.helper.display().to_string())
            .args(args)
            .current_dir(&self.cwd);
        let (succeeded, output) = match runner.run(&request).await {
            Ok(output) => (output.success(), output.text()),
            Err(e) => (false, e.to_string()),
        };

        if succeeded {
            reporter.tag(format!("Success finding compiler performance keys for {test_label}"));
            return PerfStatus::Recorded;
        }
        reporter.tag(format!("Error finding compiler performance keys for {test_label}."));
        reporter.line(format!("computePerfStats output was:\n{output}"));
        reporter.line(format!(
            "Deleting .dat files for {test_label} because of failure to find all keys"
        ));
        for extension in ["dat", "error"] {
            let partial = comp.temp_dat_dir.join(format!("{dat_name}.{extension}"));
            let _ = crate::infra::fs::remove_if_present(&partial).await;
        }
        PerfStatus::KeysMissing
    }
}

async fn ensure_dir(dir: &Path) -> bool {
    if dir.is_dir() {
        return true;
    }
    tokio::fs::create_dir_all(dir).await.is_ok() && dir.is_dir()
}
