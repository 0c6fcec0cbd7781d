//! # Environment Snapshot / 环境快照
//!
//! Process-wide configuration read once when the driver starts. After
//! construction the snapshot is never mutated; per-invocation environment
//! overlays are built from it by the driver and handed to the process runner.
//!
//! 驱动启动时一次性读取的进程级配置。构造完成后快照不再被修改；
//! 每次调用的环境变量覆盖由驱动基于它构建，并交给进程运行器。

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::models::CompilerKind;
use crate::infra::fs::is_executable;

/// A fatal configuration problem: a missing helper, an unreadable integer
/// option file, or an inconsistent environment. Aborts the directory run.
///
/// 致命的配置问题：缺少辅助脚本、无法解析的整数选项文件或不一致的环境。会中止整个目录的运行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    /// Sentinel exit status for fatal errors: the byte sum of "CHAPEL" modulo 256.
    /// 致命错误的哨兵退出码："CHAPEL" 的字节和对 256 取模。
    pub const EXIT_CODE: u8 = 173;

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Which discovered tests proceed, based on `.future` (and `.skipif`) markers.
/// 根据 `.future`（以及 `.skipif`）标记决定哪些已发现的测试继续执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FuturesMode {
    /// 0: skip every future test.
    None,
    /// 1: run futures alongside everything else.
    All,
    /// 2: run only future tests.
    OnlyFutures,
    /// 3: run futures only when they also carry a `.skipif`.
    FuturesWithSkipIf,
}

impl FuturesMode {
    pub fn from_level(level: &str) -> Result<Self, ConfigError> {
        match level.trim() {
            "0" => Ok(Self::None),
            "1" => Ok(Self::All),
            "2" => Ok(Self::OnlyFutures),
            "3" => Ok(Self::FuturesWithSkipIf),
            other => Err(ConfigError::new(format!(
                "Invalid futures testing mode '{other}' (expected 0, 1, 2 or 3)"
            ))),
        }
    }
}

/// Batch launchers that accept a walltime flag in place of a local timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherTimeout {
    Pbs,
    Slurm,
}

impl LauncherTimeout {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim() {
            "pbs" => Ok(Self::Pbs),
            "slurm" => Ok(Self::Slurm),
            other => Err(ConfigError::new(format!(
                "LauncherTimeoutArgs encountered an unknown format spec: {other}"
            ))),
        }
    }

    /// Formats `--walltime=hh:mm:ss` for the given number of seconds.
    pub fn walltime_args(&self, seconds: u64) -> Vec<String> {
        let (m, s) = (seconds / 60, seconds % 60);
        let (h, m) = (m / 60, m % 60);
        vec![format!("--walltime={h:02}:{m:02}:{s:02}")]
    }
}

/// How the process runner enforces deadlines.
/// 进程运行器如何强制执行超时。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutStrategy {
    /// Poll the merged output pipe until EOF or the deadline, then terminate.
    Internal,
    /// Delegate to an external `timedexec <seconds> <command>` helper whose
    /// sentinel exit status signals a timeout.
    TimedExec(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PerfSettings {
    /// File-name label, e.g. `perf` for `.perfkeys` / `PERFCOMPOPTS`.
    pub label: String,
    pub dir: PathBuf,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct CompPerfSettings {
    pub dir: PathBuf,
    pub keyfile: PathBuf,
    pub temp_dat_dir: PathBuf,
    /// File the compiler writes its pass timings to (`CHPL_PRINT_PASSES_FILE`).
    pub passes_file: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValgrindSettings {
    pub compile: bool,
    pub execute: bool,
    pub opts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecLimitSettings {
    pub slots: usize,
    pub dir: PathBuf,
}

/// The immutable environment snapshot threaded through the driver.
/// 贯穿驱动程序传递的不可变环境快照。
#[derive(Debug, Clone)]
pub struct Environment {
    pub compiler: PathBuf,
    pub compiler_kind: CompilerKind,
    pub chpl_home: PathBuf,
    pub util_dir: PathBuf,
    pub test_root: PathBuf,
    pub machine: String,
    pub platform: String,
    pub comm: String,
    pub launcher: String,
    pub locale_model: String,
    pub global_timeout: u64,
    pub exec_time_warn_limit: Option<u64>,
    pub futures_mode: FuturesMode,
    pub honor_notest: bool,
    pub honor_skipif: bool,
    pub perf: Option<PerfSettings>,
    pub comp_perf: Option<CompPerfSettings>,
    pub num_trials: u32,
    pub default_numlocales: u32,
    pub max_locales: Option<u32>,
    pub valgrind: ValgrindSettings,
    pub redirect_stdin: bool,
    pub one_test: Option<String>,
    pub uniquify_exe: bool,
    pub exec_limit: Option<ExecLimitSettings>,
    pub launcher_timeout: Option<LauncherTimeout>,
    pub launch_cmd: Option<Vec<String>>,
    pub interpret: bool,
    pub compile_only: bool,
    pub system_preexec: Option<PathBuf>,
    pub system_prediff: Option<PathBuf>,
    pub env_compopts: Vec<String>,
    pub env_execopts: Option<Vec<String>>,
    pub env_chpldocopts: Vec<String>,
    pub timeout_strategy: TimeoutStrategy,
}

impl Environment {
    /// Reads the snapshot from the current process environment.
    pub async fn from_env(compiler: &Path) -> Result<Self> {
        Self::from_lookup(compiler, |key| std::env::var(key).ok()).await
    }

    /// Builds the snapshot from an arbitrary variable lookup.
    ///
    /// 通过任意的变量查找函数构建快照。
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the compiler or a required helper is not
    /// executable, when performance mode is half-configured, or when a numeric
    /// variable does not parse.
    pub async fn from_lookup<F>(compiler: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !is_executable(compiler) {
            return Err(ConfigError::new(format!(
                "Cannot execute compiler '{}'",
                compiler.display()
            ))
            .into());
        }
        let compiler_kind = CompilerKind::from_compiler_path(compiler);
        // Tests run with the test directory as cwd, so relative paths must be anchored.
        let compiler = if compiler.components().count() > 1 {
            std::path::absolute(compiler).unwrap_or_else(|_| compiler.to_path_buf())
        } else {
            compiler.to_path_buf()
        };
        let compiler = compiler.as_path();

        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let is_on = |key: &str| lookup(key).as_deref() == Some("on");

        let chpl_home = match lookup("CHPL_HOME") {
            Some(home) => PathBuf::from(home),
            None => home_from_compiler(compiler),
        };

        let util_dir = match non_empty("CHPL_TEST_UTIL_DIR").map(PathBuf::from) {
            Some(dir) if dir.is_dir() => std::fs::canonicalize(&dir).unwrap_or(dir),
            other => {
                return Err(ConfigError::new(format!(
                    "Cannot find test util directory {}",
                    other.map(|d| d.display().to_string()).unwrap_or_else(|| "None".into())
                ))
                .into());
            }
        };

        let test_root = match non_empty("CHPL_TEST_ROOT_DIR") {
            Some(root) => PathBuf::from(root),
            None => default_test_root(&chpl_home)?,
        };

        let machine = match non_empty("CHPL_TEST_MACHINE") {
            Some(machine) => machine,
            None => crate::infra::fs::host_name(),
        };
        let machine = machine.split('.').next().unwrap_or_default().to_string();

        let platform = match non_empty("CHPL_TARGET_PLATFORM") {
            Some(platform) => platform.trim().to_string(),
            None => query_platform(&util_dir).await,
        };

        let valgrind = ValgrindSettings {
            compile: is_on("CHPL_TEST_VGRND_COMP"),
            execute: is_on("CHPL_TEST_VGRND_EXE"),
            opts: split_words(&lookup("CHPL_VALGRIND_OPTS").unwrap_or_else(|| "--tool=memcheck".into())),
        };

        let default_timeout = if valgrind.compile || valgrind.execute { 1000 } else { 300 };
        let global_timeout = parse_number("CHPL_TEST_TIMEOUT", non_empty("CHPL_TEST_TIMEOUT"))?
            .unwrap_or(default_timeout);
        let exec_time_warn_limit = parse_number(
            "CHPL_TEST_EXEC_TIME_WARN_LIMIT",
            non_empty("CHPL_TEST_EXEC_TIME_WARN_LIMIT"),
        )?
        .filter(|limit| *limit > 0);

        let futures_mode = match non_empty("CHPL_TEST_FUTURES") {
            Some(level) => FuturesMode::from_level(&level)?,
            None => FuturesMode::None,
        };

        let perf = if lookup("CHPL_TEST_PERF").is_some() {
            let (Some(label), Some(dir)) = (lookup("CHPL_TEST_PERF_LABEL"), lookup("CHPL_TEST_PERF_DIR")) else {
                return Err(ConfigError::new(
                    "$CHPL_TEST_PERF_DIR and $CHPL_TEST_PERF_LABEL must be set for performance testing",
                )
                .into());
            };
            let mut dir = PathBuf::from(dir);
            if let Some(description) = non_empty("CHPL_TEST_PERF_DESCRIPTION") {
                dir = dir.join(description);
            }
            let date = non_empty("CHPL_TEST_PERF_DATE")
                .unwrap_or_else(|| chrono::Local::now().format("%m/%d/%y").to_string());
            Some(PerfSettings { label, dir, date })
        } else {
            None
        };

        let comp_perf = if lookup("CHPL_TEST_COMP_PERF").is_some() {
            let dir = non_empty("CHPL_TEST_COMP_PERF_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| chpl_home.join("test").join("compperfdat"));
            let keyfile = non_empty("CHPL_TEST_COMP_PERF_KEYS")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    chpl_home.join("test/performance/compiler/compilerPerformance.perfkeys")
                });
            let temp_dat_dir = non_empty("CHPL_TEST_COMP_PERF_TEMP_DAT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| dir.join("tempCompPerfDatFiles"));
            let passes_file = non_empty("CHPL_PRINT_PASSES_FILE").unwrap_or_else(|| "timing.txt".into());
            Some(CompPerfSettings {
                dir,
                keyfile,
                temp_dat_dir,
                passes_file,
            })
        } else {
            None
        };

        let num_trials = parse_number("CHPL_TEST_NUM_TRIALS", non_empty("CHPL_TEST_NUM_TRIALS"))?
            .unwrap_or(1);
        let default_numlocales = parse_number("NUMLOCALES", non_empty("NUMLOCALES"))?.unwrap_or(0);
        let max_locales = parse_number(
            "CHPL_TEST_NUM_LOCALES_AVAILABLE",
            non_empty("CHPL_TEST_NUM_LOCALES_AVAILABLE"),
        )?;

        let exec_limit = lookup("CHPL_TEST_LIMIT_RUNNING_EXECUTABLES").map(|value| ExecLimitSettings {
            slots: value.trim().parse::<usize>().ok().filter(|n| *n > 0).unwrap_or(1),
            dir: non_empty("CHPL_TEST_LIMIT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        });

        let launcher_timeout = non_empty("CHPL_LAUNCHER_TIMEOUT")
            .map(|value| LauncherTimeout::parse(&value))
            .transpose()?;

        let launch_cmd = non_empty("LAUNCHCMD")
            .map(|cmd| {
                shlex::split(&cmd)
                    .filter(|parts| !parts.is_empty())
                    .ok_or_else(|| ConfigError::new(format!("Cannot parse LAUNCHCMD '{cmd}'")))
            })
            .transpose()?;

        let system_preexec = required_helper(non_empty("CHPL_SYSTEM_PREEXEC"), "system-wide preexec")?;
        let system_prediff = required_helper(non_empty("CHPL_SYSTEM_PREDIFF"), "system-wide prediff")?;

        let timeout_strategy = if is_on("CHPL_TEST_TIMEDEXEC") {
            let timedexec = util_dir.join("test").join("timedexec");
            if !is_executable(&timedexec) {
                return Err(ConfigError::new(format!(
                    "Cannot execute timedexec script '{}'",
                    timedexec.display()
                ))
                .into());
            }
            TimeoutStrategy::TimedExec(timedexec)
        } else {
            TimeoutStrategy::Internal
        };

        let env_compopts = split_option_var("COMPOPTS", lookup("COMPOPTS"))?;
        let env_chpldocopts = split_option_var("CHPLDOCOPTS", lookup("CHPLDOCOPTS"))?;
        let env_execopts = lookup("EXECOPTS")
            .map(|value| split_option_var("EXECOPTS", Some(value)))
            .transpose()?;

        Ok(Self {
            compiler: compiler.to_path_buf(),
            compiler_kind,
            chpl_home,
            util_dir,
            test_root,
            machine,
            platform,
            comm: lookup("CHPL_COMM").map(|v| v.trim().to_string()).unwrap_or_else(|| "none".into()),
            launcher: lookup("CHPL_LAUNCHER").map(|v| v.trim().to_string()).unwrap_or_else(|| "none".into()),
            locale_model: lookup("CHPL_LOCALE_MODEL")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| "flat".into()),
            global_timeout,
            exec_time_warn_limit,
            futures_mode,
            honor_notest: lookup("CHPL_TEST_NOTESTS").is_none_or(|v| v == "0"),
            honor_skipif: lookup("CHPL_TEST_SINGLES").is_none_or(|v| v == "0"),
            perf,
            comp_perf,
            num_trials,
            default_numlocales,
            max_locales,
            valgrind,
            redirect_stdin: lookup("CHPL_NO_STDIN_REDIRECT").is_none(),
            one_test: non_empty("CHPL_ONETEST"),
            uniquify_exe: lookup("CHPL_TEST_UNIQUIFY_EXE").is_some(),
            exec_limit,
            launcher_timeout,
            launch_cmd,
            interpret: is_on("CHPL_TEST_INTERP"),
            compile_only: non_empty("CHPL_COMPONLY").is_some(),
            system_preexec,
            system_prediff,
            env_compopts,
            env_execopts,
            env_chpldocopts,
            timeout_strategy,
        })
    }

    /// The performance label, or an empty string outside performance mode.
    pub fn perf_label(&self) -> &str {
        self.perf.as_ref().map(|p| p.label.as_str()).unwrap_or("")
    }

    pub fn is_perf(&self) -> bool {
        self.perf.is_some()
    }

    /// Per-test suffix: `keys` becomes `.perfkeys` in perf mode, `compopts` stays `.compopts` otherwise.
    /// 测试级文件后缀：性能模式下 `keys` 变为 `.perfkeys`，否则 `compopts` 保持 `.compopts`。
    pub fn perf_suffix(&self, suffix: &str) -> String {
        format!(".{}{}", self.perf_label(), suffix)
    }

    /// Directory-wide file name: `COMPOPTS` becomes `PERFCOMPOPTS` in perf mode.
    pub fn perf_dir_file(&self, name: &str) -> String {
        format!("{}{}", self.perf_label().to_uppercase(), name.to_uppercase())
    }

    pub fn future_suffix(&self) -> &'static str {
        if self.interpret { ".ifuture" } else { ".future" }
    }

    /// The directory label printed in log lines: `dir` relative to the test root.
    /// 日志行中打印的目录标签：相对于测试根目录的 `dir`。
    pub fn directory_label(&self, dir: &Path) -> String {
        let dir = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let root = std::fs::canonicalize(&self.test_root).unwrap_or_else(|_| self.test_root.clone());
        match dir.strip_prefix(&root) {
            Ok(relative) => relative.display().to_string(),
            Err(_) => dir.display().to_string(),
        }
    }

    /// The helper program shipped in `<util>/test/<name>`.
    pub fn util_test_helper(&self, name: &str) -> PathBuf {
        self.util_dir.join("test").join(name)
    }
}

fn home_from_compiler(compiler: &Path) -> PathBuf {
    // The compiler binary lives two directory levels below the installation.
    let absolute = std::path::absolute(compiler).unwrap_or_else(|_| compiler.to_path_buf());
    absolute
        .parent()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_test_root(chpl_home: &Path) -> Result<PathBuf, ConfigError> {
    let test_dir = chpl_home.join("test");
    if test_dir.is_dir() {
        return Ok(std::fs::canonicalize(&test_dir).unwrap_or(test_dir));
    }
    let examples = chpl_home.join("examples");
    if examples.is_dir() {
        return Ok(std::fs::canonicalize(&examples).unwrap_or(examples));
    }
    Err(ConfigError::new(format!(
        "Cannot find test directory {} or {}",
        test_dir.display(),
        examples.display()
    )))
}

async fn query_platform(util_dir: &Path) -> String {
    let script = util_dir.join("chplenv").join("chpl_platform.py");
    if is_executable(&script) {
        if let Ok(output) = tokio::process::Command::new(&script).arg("--target").output().await {
            let platform = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if output.status.success() && !platform.is_empty() {
                return platform;
            }
        }
    }
    std::env::consts::OS.to_string()
}

fn required_helper(path: Option<String>, what: &str) -> Result<Option<PathBuf>, ConfigError> {
    match path.map(PathBuf::from) {
        Some(path) if !is_executable(&path) => Err(ConfigError::new(format!(
            "Cannot execute {what} '{}'",
            path.display()
        ))),
        other => Ok(other),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::new(format!("Invalid integer value in ${key} ('{v}')")))
        })
        .transpose()
}

fn split_option_var(key: &str, value: Option<String>) -> Result<Vec<String>, ConfigError> {
    match value {
        Some(value) => shlex::split(&value)
            .ok_or_else(|| ConfigError::new(format!("Cannot parse ${key} '{value}'"))),
        None => Ok(Vec::new()),
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
