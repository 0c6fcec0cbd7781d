//! # Test Discovery and Filtering / 测试发现与过滤
//!
//! Enumerates the test sources of a directory and turns each one into either
//! a resolved [`TestCase`] or a skip decision. Filters apply in a fixed order:
//! `.skipif`, then `.notest`, then `.suppressif`, then the remaining markers,
//! the futures mode, the C-test launcher rule and the locale requirement.
//!
//! 枚举目录中的测试源文件，并将每个文件转换为已解析的 [`TestCase`] 或跳过决定。
//! 过滤按固定顺序进行：`.skipif`、`.notest`、`.suppressif`，然后是其余标记、
//! futures 模式、C 测试启动器规则和 locale 需求。

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;

use crate::core::compiler::CompilerMode;
use crate::core::config::{ConfigError, Environment, FuturesMode};
use crate::core::markers::{MarkerKind, TestFiles};
use crate::core::models::{CompilerKind, TestCase};
use crate::core::options::{
    BLANK_OPTION, DirectoryOptions, build_matrix, merge_env, parse_env_assignments, read_integer_file,
    read_lines, read_lines_with, read_tokens, resolve_timer,
};
use crate::infra::command::StdinSource;
use crate::infra::fs::{is_executable, is_readable_file};
use crate::reporting::Reporter;

static TEST_SOURCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.+\.(chpl|test\.c)$").expect("valid regex"));

/// Whether a directory entry is a test source (`*.chpl` or `*.test.c`).
/// 目录项是否为测试源文件（`*.chpl` 或 `*.test.c`）。
pub fn is_test_source(name: &str) -> bool {
    TEST_SOURCE.is_match(name)
}

/// The test base name: the source without `.chpl` or `.test.c`.
pub fn base_name(source: &str) -> &str {
    source
        .strip_suffix(".test.c")
        .or_else(|| source.strip_suffix(".chpl"))
        .unwrap_or(source)
}

/// Sorted directory listing.
pub fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| ConfigError::new(format!("Cannot read directory {}: {e}", dir.display())))? {
        let entry = entry?;
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    entries.sort();
    Ok(entries)
}

/// The sources to run: `CHPL_ONETEST` when set, otherwise every test source in `entries`.
pub fn discover(entries: &[String], env: &Environment) -> Vec<String> {
    match &env.one_test {
        Some(one) => vec![one.clone()],
        None => entries.iter().filter(|name| is_test_source(name)).cloned().collect(),
    }
}

/// `<directory label>/<base>`; just `<base>` at the test root.
pub fn test_label(directory: &str, base: &str) -> String {
    if directory.is_empty() {
        base.to_string()
    } else {
        format!("{directory}/{base}")
    }
}

#[derive(Debug)]
pub enum PlanDecision {
    Run(Box<TestCase>),
    /// The full log message explaining the skip, without brackets.
    Skip(String),
}

/// Resolves tests of one directory.
/// 解析一个目录中的测试。
pub struct Planner<'a> {
    pub env: &'a Environment,
    pub dir: &'a Path,
    pub label: &'a str,
    pub entries: &'a [String],
    pub dir_opts: &'a DirectoryOptions,
    pub reporter: &'a Reporter,
}

impl Planner<'_> {
    /// Applies the discovery filters to `source` and resolves its options.
    ///
    /// 对 `source` 应用发现过滤器并解析其选项。
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for malformed integer option files or a
    /// missing `testEnv` helper, and an I/O error when `testEnv` cannot be run.
    pub async fn plan(&self, source: &str) -> Result<PlanDecision> {
        let env = self.env;
        let base = base_name(source);
        let name = test_label(self.label, base);
        let files = TestFiles::collect(self.entries, base, env);
        let path_of = |kind: MarkerKind| files.get(kind).map(|f| self.dir.join(f));
        let readable = |kind: MarkerKind| path_of(kind).filter(|p| is_readable_file(p));
        let skip = |message: String| Ok(PlanDecision::Skip(message));

        let mode = CompilerMode::select(env.compiler_kind, source);

        if env.is_perf() && !files.has(MarkerKind::PerfKeys) && !files.has(MarkerKind::ExecOpts) {
            return skip(format!("Skipping noperf test: {name}"));
        }

        let mut skipif_processed = false;
        if env.honor_skipif {
            if let Some(file) = files.get(MarkerKind::SkipIf).filter(|_| readable(MarkerKind::SkipIf).is_some()) {
                skipif_processed = true;
                match self.evaluate_predicate(file).await? {
                    Some(true) => {
                        return skip(format!("Skipping test based on .skipif environment settings: {name}"));
                    }
                    Some(false) => {}
                    None => {
                        return skip(format!("Error processing .skipif file {}", test_label(self.label, file)));
                    }
                }
            }
        }

        if env.honor_notest && readable(MarkerKind::NoTest).is_some() {
            return skip(format!("Skipping notest test: {name}"));
        }

        let mut future_label = None;
        if let Some(file) = files.get(MarkerKind::SuppressIf).filter(|_| readable(MarkerKind::SuppressIf).is_some()) {
            match self.evaluate_predicate(file).await? {
                Some(true) => {
                    let reason = suppress_reason(&self.dir.join(file)).await;
                    future_label = Some(format!("Suppress ({reason}) "));
                }
                Some(false) => {}
                None => {
                    return skip(format!("Error processing .suppressif file {}", test_label(self.label, file)));
                }
            }
        }

        let mut timeout = self.dir_opts.timeout;
        if let Some(path) = readable(MarkerKind::Timeout) {
            timeout = read_integer_file(&path, env, self.label).await?;
            self.reporter.tag(format!("Overriding default timeout with {timeout}"));
        }

        let mut timer = if env.is_perf() { self.dir_opts.timer.clone() } else { None };
        if let Some(path) = readable(MarkerKind::PerfTimeExec) {
            timer = Some(resolve_timer(&path, env, self.reporter).await);
        }

        let mut num_trials = self.dir_opts.num_trials;
        if let Some(path) = readable(MarkerKind::PerfNumTrials) {
            num_trials = read_integer_file(&path, env, self.label).await? as u32;
        }

        let kill_timeout = match readable(MarkerKind::KillTimeout) {
            Some(path) => read_integer_file(&path, env, self.label).await?,
            None => self.dir_opts.kill_timeout,
        };

        let mut catfiles = self.dir_opts.catfiles.clone();
        if let Some(path) = readable(MarkerKind::CatFiles) {
            catfiles.extend(read_tokens(&path).await.unwrap_or_default());
        }

        let mut last_compopts = self.dir_opts.last_compopts.clone();
        if let Some(path) = readable(MarkerKind::LastCompOpts) {
            last_compopts.extend(read_tokens(&path).await.unwrap_or_default());
        }
        let mut last_execopts = self.dir_opts.last_execopts.clone();
        if let Some(path) = readable(MarkerKind::LastExecOpts) {
            last_execopts.extend(read_tokens(&path).await.unwrap_or_default());
        }

        let numlocales = match readable(MarkerKind::NumLocales) {
            Some(path) => read_integer_file(&path, env, self.label).await? as u32,
            None => self.dir_opts.numlocales,
        };

        let has_future = files.has(MarkerKind::Future);
        if let Some(path) = readable(MarkerKind::Future) {
            let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            let reason = content.lines().next().unwrap_or_default().trim();
            future_label = Some(format!("Future ({reason}) "));
        }

        let noexec = readable(MarkerKind::NoExec).is_some();
        let hook = |kind: MarkerKind| path_of(kind).filter(|p| is_executable(p));

        let mut stdin = if env.redirect_stdin {
            StdinSource::Null
        } else {
            StdinSource::Inherit
        };
        let mut comp_stdin = self.dir_opts.comp_stdin.clone();
        if let Some(path) = readable(MarkerKind::Stdin) {
            if !env.redirect_stdin {
                return skip(format!(
                    "Skipping test with .stdin input since -nostdinredirect is given: {name}"
                ));
            }
            // The interactive compiler has no execute step, so it gets the input.
            if env.compiler_kind == CompilerKind::Ipe {
                comp_stdin = StdinSource::File(path);
            } else {
                stdin = StdinSource::File(path);
            }
        }

        match env.futures_mode {
            FuturesMode::None if has_future => {
                return skip(format!("Skipping future test: {name}"));
            }
            FuturesMode::OnlyFutures if !has_future => {
                return skip(format!("Skipping non-future test: {name}"));
            }
            FuturesMode::FuturesWithSkipIf if has_future && !skipif_processed => {
                return skip(format!("Skipping future test without a skipif: {name}"));
            }
            _ => {}
        }

        if mode.is_c_test() && env.launcher != "none" {
            return skip(format!("Skipping c test: {name}"));
        }

        let numlocales_execopts = if numlocales == 0 || env.comm == "none" || mode.is_c_test() {
            None
        } else {
            if let Some(max) = env.max_locales {
                if numlocales > max {
                    return skip(format!(
                        "Warning: skipping {name} because it requires {numlocales} locales but only {max} are available"
                    ));
                }
            }
            Some(format!(" -nl {numlocales}"))
        };

        if timeout > env.global_timeout && num_trials != 1 {
            self.reporter.tag(format!("Lowering number of trials for {base} to 1"));
            num_trials = 1;
        }

        let test_compopts = match (mode, readable(MarkerKind::ChpldocOpts), readable(MarkerKind::CompOpts)) {
            (CompilerMode::Chpldoc, Some(path), _) => {
                let lines = read_lines_with(&path, env, self.reporter, self.label, false).await;
                if lines.is_empty() {
                    self.reporter.tag(format!("Warning: ignoring an empty chpldocopts file {}", display_name(&path)));
                }
                lines
            }
            (_, _, Some(path)) => {
                let lines = read_lines_with(&path, env, self.reporter, self.label, false).await;
                if lines.is_empty() {
                    self.reporter.tag(format!("Warning: ignoring an empty compopts file {}", display_name(&path)));
                }
                lines
            }
            _ => Vec::new(),
        };
        let compopts = build_matrix(&self.dir_opts.compopts, &test_compopts);

        let execenv = match readable(MarkerKind::ExecEnv) {
            Some(path) => parse_env_assignments(&read_lines(&path, env, self.reporter, self.label).await),
            None => Vec::new(),
        };
        let compenv = match readable(MarkerKind::CompEnv) {
            Some(path) => parse_env_assignments(&read_lines(&path, env, self.reporter, self.label).await),
            None => Vec::new(),
        };

        let execopts_file = readable(MarkerKind::ExecOpts);
        let mut execopts = match &execopts_file {
            Some(path) => read_lines_with(path, env, self.reporter, self.label, false).await,
            None => Vec::new(),
        };
        if execopts.is_empty() {
            execopts.push(BLANK_OPTION.to_string());
        }

        if env.interpret && (noexec || has_future || execopts_file.is_some()) {
            return skip(format!("Skipping interpretation of: {name}"));
        }

        let mut exec_name = base.to_string();
        if env.uniquify_exe {
            exec_name = format!("{exec_name}.{}", std::process::id());
        }

        Ok(PlanDecision::Run(Box::new(TestCase {
            source: source.to_string(),
            base: base.to_string(),
            exec_name,
            mode,
            future_label,
            numlocales,
            numlocales_execopts,
            timeout,
            kill_timeout,
            num_trials,
            timer,
            catfiles,
            last_compopts,
            last_execopts,
            execute: self.dir_opts.execute && mode.auto_executes() && !noexec,
            precomp: hook(MarkerKind::PreComp),
            prediff: hook(MarkerKind::PreDiff),
            preexec: hook(MarkerKind::PreExec),
            stdin,
            comp_stdin,
            compenv: merge_env(&self.dir_opts.compenv, &compenv),
            execenv: merge_env(&self.dir_opts.execenv, &execenv),
            compopts,
            execopts,
        })))
    }

    /// Runs `<util>/test/testEnv ./<file>`; `None` when its stdout is neither a
    /// boolean nor an integer. Anything the helper writes to stderr is echoed
    /// into the log and takes no part in the decision.
    async fn evaluate_predicate(&self, file: &str) -> Result<Option<bool>> {
        let test_env = self.env.util_test_helper("testEnv");
        if !is_executable(&test_env) {
            return Err(ConfigError::new(format!("Cannot execute testEnv helper '{}'", test_env.display())).into());
        }
        let output = tokio::process::Command::new(&test_env)
            .arg(format!("./{file}"))
            .current_dir(self.dir)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {} on {file}", test_env.display()))?;
        let diagnostics = String::from_utf8_lossy(&output.stderr);
        if !diagnostics.is_empty() {
            self.reporter.raw(&diagnostics);
        }
        Ok(parse_predicate(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// `True`/`1` is true, `False`/other integers are false, anything else is malformed.
pub fn parse_predicate(output: &str) -> Option<bool> {
    match output.trim() {
        "True" => Some(true),
        "False" => Some(false),
        other => other.parse::<i64>().ok().map(|n| n == 1),
    }
}

/// The first `#` comment of a `.suppressif` file (shebang excluded), with the `#`s removed.
async fn suppress_reason(path: &Path) -> String {
    let content = tokio::fs::read_to_string(path).await.unwrap_or_default();
    content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#') && !line.starts_with("#!"))
        .map(|line| line.replace('#', "").trim().to_string())
        .unwrap_or_default()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
