//! # Option Files and the Option Matrix / 选项文件与选项矩阵
//!
//! Reads directory-wide and per-test option files and expands compile and
//! execute options into the variant lists the driver iterates over.
//!
//! 读取目录级和测试级选项文件，并将编译和执行选项展开为驱动迭代的变体列表。

use anyhow::Result;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::core::config::{ConfigError, Environment};
use crate::infra::command::StdinSource;
use crate::infra::fs::{is_executable, is_readable_file};
use crate::reporting::Reporter;

/// The single-space placeholder standing for "no options".
/// 代表“无选项”的单个空格占位符。
pub const BLANK_OPTION: &str = " ";

/// Reads an option file, or runs it and reads its stdout when it is executable.
///
/// Blank lines and comment lines are dropped and `$VAR` references expanded
/// (unknown variables stay verbatim). With `ignore_leading_space` a line whose
/// first non-blank character is `#` is a comment; without it only a `#` in the
/// first column is, so ` #name.good` survives as a golden-file override.
///
/// 读取选项文件；若文件可执行，则运行它并读取其标准输出。
///
/// # Errors
/// Returns the I/O error of reading or running the file.
pub async fn read_option_file(path: &Path, env: &Environment, ignore_leading_space: bool) -> std::io::Result<Vec<String>> {
    let content = if is_executable(path) {
        let absolute = std::path::absolute(path)?;
        let mut cmd = tokio::process::Command::new(&absolute);
        if let Some(parent) = absolute.parent() {
            cmd.current_dir(parent);
        }
        cmd.envs(printchplenv_overlay(env).await);
        let output = cmd.stderr(std::process::Stdio::inherit()).output().await?;
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        tokio::fs::read_to_string(path).await?
    };
    Ok(parse_option_lines(&content, ignore_leading_space))
}

/// Applies the comment, blank-line and variable-expansion rules to file contents.
pub fn parse_option_lines(content: &str, ignore_leading_space: bool) -> Vec<String> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            let probe = if ignore_leading_space { line.trim_start() } else { line };
            !probe.starts_with('#')
        })
        .map(|line| expand_vars(line).into_owned())
        .collect()
}

fn expand_vars(line: &str) -> Cow<'_, str> {
    shellexpand::env_with_context_no_errors(line, |var: &str| std::env::var(var).ok())
}

/// `printchplenv --simple` output as environment overrides for executable option files.
async fn printchplenv_overlay(env: &Environment) -> Vec<(String, String)> {
    let printchplenv = env.util_dir.join("printchplenv");
    if !is_executable(&printchplenv) {
        return Vec::new();
    }
    match tokio::process::Command::new(&printchplenv).arg("--simple").output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Reads the first integer of an option file.
///
/// 读取选项文件中的第一个整数。
///
/// # Errors
/// Returns a [`ConfigError`] when the first non-comment line is not an integer.
pub async fn read_integer_file(path: &Path, env: &Environment, label: &str) -> Result<u64> {
    let invalid = || ConfigError::new(format!("Invalid integer value in {} ({label})", path.display()));
    let lines = read_option_file(path, env, true).await.map_err(|_| invalid())?;
    lines
        .first()
        .and_then(|line| line.trim().parse::<u64>().ok())
        .ok_or_else(|| invalid().into())
}

/// Whitespace-joined file contents split into tokens, as for `LASTCOMPOPTS` and `.lastexecopts`.
pub async fn read_tokens(path: &Path) -> std::io::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content.split_whitespace().map(str::to_string).collect())
}

/// Shell-style tokenisation, falling back to plain whitespace splitting for unbalanced quotes.
pub fn split_opts(opts: &str) -> Vec<String> {
    shlex::split(opts).unwrap_or_else(|| opts.split_whitespace().map(str::to_string).collect())
}

/// Parses `VAR=value` lines. Lines without `=` are ignored.
/// 解析 `VAR=value` 行。不含 `=` 的行会被忽略。
pub fn parse_env_assignments(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(|line| line.split_once('='))
        .map(|(var, value)| (var.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Overlays `overrides` on `base`, keeping first-seen order.
pub fn merge_env(base: &[(String, String)], overrides: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for (var, value) in base.iter().chain(overrides) {
        match merged.iter_mut().find(|(existing, _)| existing == var) {
            Some(slot) => slot.1 = value.clone(),
            None => merged.push((var.clone(), value.clone())),
        }
    }
    merged
}

/// Cross product of directory-level and test-level option lines.
///
/// Empty inputs count as a single blank entry, so the result always has
/// `max(1, |dir|) * max(1, |test|)` entries. All-blank combinations collapse
/// to [`BLANK_OPTION`].
///
/// 目录级与测试级选项行的笛卡尔积。空输入视为单个空白条目，结果数量恒为两者之积。
pub fn build_matrix(directory: &[String], test: &[String]) -> Vec<String> {
    let blank = [BLANK_OPTION.to_string()];
    let directory = if directory.is_empty() { &blank[..] } else { directory };
    let test = if test.is_empty() { &blank[..] } else { test };

    let mut merged = Vec::with_capacity(directory.len() * test.len());
    for dir_opts in directory {
        for test_opts in test {
            let joined = format!("{dir_opts} {test_opts}");
            if joined.trim().is_empty() {
                merged.push(BLANK_OPTION.to_string());
            } else {
                merged.push(joined);
            }
        }
    }
    merged
}

/// One compile-option matrix entry: `opts [#name.good]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileVariant {
    pub opts: String,
    /// Golden-file base name named after the `#`, without `.good`.
    pub good_override: Option<String>,
}

impl CompileVariant {
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('#') {
            Some((opts, rest)) => {
                let name = rest.split('#').next().unwrap_or_default().trim();
                Self {
                    opts: opts.to_string(),
                    good_override: (!name.is_empty()).then(|| name.to_string()),
                }
            }
            None => Self {
                opts: entry.to_string(),
                good_override: None,
            },
        }
    }

    /// Blank variants do not consume a compile-option number.
    pub fn is_blank(&self) -> bool {
        self.opts == BLANK_OPTION
    }

    pub fn tokens(&self) -> Vec<String> {
        split_opts(&self.opts)
    }
}

/// One execute-option entry: `opts [#name.good ...]`; only the first token after `#` counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecVariant {
    pub opts: String,
    pub good_override: Option<String>,
}

impl ExecVariant {
    pub fn parse(entry: &str) -> Self {
        let mut parts = entry.splitn(2, '#');
        let opts = parts.next().unwrap_or_default().trim().to_string();
        let good_override = parts
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string);
        Self { opts, good_override }
    }
}

/// Options shared by every test in one directory.
/// 同一目录下所有测试共享的选项。
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    pub timeout: u64,
    pub kill_timeout: u64,
    pub timer: Option<Vec<String>>,
    /// `NOEXEC` absent and not interpreting.
    pub execute: bool,
    /// `NOVGRBIN` absent.
    pub valgrind_binary: bool,
    pub comp_stdin: StdinSource,
    pub last_compopts: Vec<String>,
    pub last_execopts: Vec<String>,
    pub numlocales: u32,
    pub catfiles: Vec<String>,
    /// `COMPOPTS` (or `PERFCOMPOPTS`) lines.
    pub compopts: Vec<String>,
    /// `CHPLDOCOPTS` tokens followed by `$CHPLDOCOPTS`.
    pub chpldoc_opts: Vec<String>,
    pub num_trials: u32,
    pub compenv: Vec<(String, String)>,
    pub execenv: Vec<(String, String)>,
    /// Tokens of the first `EXECOPTS` (or `PERFEXECOPTS`) line, prepended to every execute variant.
    pub execopts: Vec<String>,
    pub precomp: Option<PathBuf>,
    pub prediff: Option<PathBuf>,
    pub preexec: Option<PathBuf>,
}

impl DirectoryOptions {
    /// Loads the directory-wide option files of `dir`.
    ///
    /// 加载 `dir` 中的目录级选项文件。
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for malformed integer files.
    pub async fn load(dir: &Path, env: &Environment, reporter: &Reporter) -> Result<Self> {
        let label = env.directory_label(dir);
        let file = |name: &str| dir.join(name);
        let readable = |name: &str| is_readable_file(&dir.join(name));

        let timeout = if readable("TIMEOUT") {
            read_integer_file(&file("TIMEOUT"), env, &label).await?
        } else {
            env.global_timeout
        };

        let timer_file = env.perf_dir_file("TIMEEXEC");
        let timer = if env.is_perf() && readable(&timer_file) {
            Some(resolve_timer(&file(&timer_file), env, reporter).await)
        } else {
            None
        };

        let kill_timeout = if readable("KILLTIMEOUT") {
            read_integer_file(&file("KILLTIMEOUT"), env, &label).await?
        } else {
            10
        };

        let comp_stdin = if readable("COMPSTDIN") {
            StdinSource::File(file("COMPSTDIN"))
        } else {
            StdinSource::Null
        };

        let last_compopts = read_tokens_if(&file("LASTCOMPOPTS")).await;
        let last_execopts = read_tokens_if(&file("LASTEXECOPTS")).await;

        let numlocales_file = env.perf_dir_file("NUMLOCALES");
        let numlocales = if readable(&numlocales_file) {
            read_integer_file(&file(&numlocales_file), env, &label).await? as u32
        } else {
            env.default_numlocales
        };

        let catfiles = read_tokens_if(&file("CATFILES")).await;

        let perf_compopts = env.perf_dir_file("COMPOPTS");
        let compopts = if env.is_perf() && readable(&perf_compopts) {
            read_lines(&file(&perf_compopts), env, reporter, &label).await
        } else if readable("COMPOPTS") {
            read_lines(&file("COMPOPTS"), env, reporter, &label).await
        } else {
            vec![BLANK_OPTION.to_string()]
        };

        let mut chpldoc_opts = if readable("CHPLDOCOPTS") {
            read_lines(&file("CHPLDOCOPTS"), env, reporter, &label)
                .await
                .first()
                .map(|line| split_opts(line))
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        chpldoc_opts.extend(env.env_chpldocopts.iter().cloned());

        let numtrials_file = env.perf_dir_file("NUMTRIALS");
        let num_trials = if env.is_perf() && readable(&numtrials_file) {
            read_integer_file(&file(&numtrials_file), env, &label).await? as u32
        } else {
            env.num_trials
        };

        let execenv = if readable("EXECENV") {
            parse_env_assignments(&read_lines(&file("EXECENV"), env, reporter, &label).await)
        } else {
            Vec::new()
        };
        let compenv = if readable("COMPENV") {
            parse_env_assignments(&read_lines(&file("COMPENV"), env, reporter, &label).await)
        } else {
            Vec::new()
        };

        let perf_execopts = env.perf_dir_file("EXECOPTS");
        let execopts_file = if env.is_perf() && readable(&perf_execopts) {
            Some(file(&perf_execopts))
        } else if readable("EXECOPTS") {
            Some(file("EXECOPTS"))
        } else {
            None
        };
        let execopts = match execopts_file {
            Some(path) => read_lines(&path, env, reporter, &label)
                .await
                .first()
                .map(|line| split_opts(line))
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let hook = |name: &str| {
            let path = dir.join(name);
            is_executable(&path).then_some(path)
        };

        Ok(Self {
            timeout,
            kill_timeout,
            timer,
            execute: !readable("NOEXEC") && !env.interpret,
            valgrind_binary: !readable("NOVGRBIN"),
            comp_stdin,
            last_compopts,
            last_execopts,
            numlocales,
            catfiles,
            compopts,
            chpldoc_opts,
            num_trials,
            compenv,
            execenv,
            execopts,
            precomp: hook("PRECOMP"),
            prediff: hook("PREDIFF"),
            preexec: hook("PREEXEC"),
        })
    }
}

/// Reads an option file, reporting (not propagating) failures to run an executable one.
pub async fn read_lines(path: &Path, env: &Environment, reporter: &Reporter, label: &str) -> Vec<String> {
    read_lines_with(path, env, reporter, label, true).await
}

pub async fn read_lines_with(
    path: &Path,
    env: &Environment,
    reporter: &Reporter,
    label: &str,
    ignore_leading_space: bool,
) -> Vec<String> {
    match read_option_file(path, env, ignore_leading_space).await {
        Ok(lines) => lines,
        Err(e) => {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            reporter.tag(format!("Error trying to execute '{}': {e}", Path::new(label).join(name).display()));
            Vec::new()
        }
    }
}

async fn read_tokens_if(path: &Path) -> Vec<String> {
    if is_readable_file(path) {
        read_tokens(path).await.unwrap_or_default()
    } else {
        Vec::new()
    }
}

/// Picks the timer named by a `PERFTIMEEXEC`/`.perftimeexec` file from `<util>/test/timers`.
///
/// 从 `<util>/test/timers` 中选择 `PERFTIMEEXEC`/`.perftimeexec` 文件所指定的计时器。
pub async fn resolve_timer(path: &Path, env: &Environment, reporter: &Reporter) -> Vec<String> {
    let timers_dir = env.util_test_helper("timers");
    let default_timer = timers_dir.join("defaultTimer");
    let lines = read_option_file(path, env, true).await.unwrap_or_default();
    let timer = if lines.len() == 1 {
        timers_dir.join(lines[0].trim())
    } else {
        reporter.tag(format!(
            "Error \"{}\" must contain exactly one non-comment line with the name of the timer located in {} to use. Using default timer {}.",
            path.display(),
            timers_dir.display(),
            default_timer.display()
        ));
        default_timer
    };
    if !is_executable(&timer) {
        reporter.tag(format!("Error cannot execute timer \"{}\", using \"time -p\"", timer.display()));
        return vec!["time".to_string(), "-p".to_string()];
    }
    vec![timer.display().to_string()]
}
