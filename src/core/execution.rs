//! # Test Driver / 测试驱动
//!
//! Runs one test directory. Each test source goes through discovery and
//! filtering, then every compile variant is built, and each successful build
//! is executed under every execute variant and trial. Outputs are compared
//! against golden files and every terminal result is recorded as a
//! [`RunRecord`]. Variants run strictly one after another.
//!
//! 运行一个测试目录。每个测试源文件经过发现和过滤后，构建每个编译变体；
//! 每次成功的构建都会在每个执行变体和试验下运行。输出与 golden 文件比较，
//! 每个最终结果都记录为 [`RunRecord`]。各变体严格按顺序运行。

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::compiler::{CompileInputs, resolve_c_compiler};
use crate::core::config::{ConfigError, Environment};
use crate::core::good_file::{GoodFile, GoodFileResolver};
use crate::core::models::{InfraKind, Outcome, RunRecord, Stage, TestCase, variation_suffix};
use crate::core::options::{BLANK_OPTION, CompileVariant, DirectoryOptions, ExecVariant, split_opts};
use crate::core::perf::{ExecutionSample, PerfStatus, PerformanceRecorder};
use crate::core::planner::{PlanDecision, Planner, base_name, discover, list_dir, test_label};
use crate::infra::command::{ProcessRequest, ProcessRunner, StdinSource, trim_output, shell_escape_command};
use crate::infra::fs::{files_equal, is_executable, is_readable_file, is_resource_busy, remove_if_present, which};
use crate::infra::limiter::{ExecutionLimiter, LimitGuard};
use crate::reporting::Reporter;

/// A known batch-launcher failure found in captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherError {
    Fault(&'static str),
    /// The launcher killed the job at its walltime.
    Timeout,
}

impl LauncherError {
    pub fn message(&self) -> &'static str {
        match self {
            LauncherError::Fault(message) => message,
            LauncherError::Timeout => "Timed out executing program",
        }
    }
}

static LAUNCHER_FAULTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)slurmstepd: Munge decode failed: Expired credential",
            "Jira 18 -- Expired slurm credential for",
        ),
        (r"(?i)output file from job .* does not exist", "Jira 17 -- Missing output file for"),
        (
            r"(?i)aprun: Unexpected close of the apsys control connection",
            "Jira 193 -- Unexpected close of apsys for",
        ),
    ]
    .into_iter()
    .map(|(pattern, message)| (Regex::new(pattern).expect("valid launcher pattern"), message))
    .collect()
});

static LAUNCHER_TIMEOUTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)PBS: job killed: walltime", r"(?i)slurm.* CANCELLED .* DUE TO TIME LIMIT"]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("valid launcher pattern"))
        .collect()
});

/// Scans launcher output for known failure signatures.
/// 在启动器输出中扫描已知的失败特征。
pub fn detect_launcher_error(output: &str) -> Option<LauncherError> {
    if let Some((_, message)) = LAUNCHER_FAULTS.iter().find(|(re, _)| re.is_match(output)) {
        return Some(LauncherError::Fault(message));
    }
    LAUNCHER_TIMEOUTS
        .iter()
        .any(|re| re.is_match(output))
        .then_some(LauncherError::Timeout)
}

/// `<exe>.exec.out.tmp`, or `<exe>.<c>-<e>.exec.out.tmp` when the test has several variants.
pub fn exec_log_name(exec_name: &str, numbers: Option<(usize, usize)>) -> String {
    match numbers {
        None => format!("{exec_name}.exec.out.tmp"),
        Some((c, e)) => format!("{exec_name}.{c}-{e}.exec.out.tmp"),
    }
}

/// `<exe>.comp.out.tmp`, or `<exe>.<c>.comp.out.tmp` for numbered compile variants.
pub fn comp_log_name(exec_name: &str, compopts_num: usize) -> String {
    if compopts_num == 0 {
        format!("{exec_name}.comp.out.tmp")
    } else {
        format!("{exec_name}.{compopts_num}.comp.out.tmp")
    }
}

/// Where one compile variant ended up.
/// 一个编译变体的最终去向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    TimedOut,
    /// The compiler output was compared against a golden file (or could not be).
    Compared(Outcome),
    /// The compiler for this mode is not installed; the remaining variants are skipped.
    ToolMissing,
    /// Built cleanly and ready to execute.
    Succeeded,
}

/// Per-compile-variant state, created fresh for each variant.
struct VariantContext<'a> {
    case: &'a TestCase,
    name: String,
    compile: CompileVariant,
    compopts_num: usize,
    /// The compiler arguments, as passed to prediff hooks.
    compile_args: Vec<String>,
}

impl VariantContext<'_> {
    /// ` (compopts: N, execopts: M)` for lists with more than one entry.
    fn variation(&self, execopts_num: usize) -> String {
        let c = if self.case.compopts.len() > 1 { self.compopts_num } else { 0 };
        let e = if self.case.execopts.len() > 1 { execopts_num } else { 0 };
        variation_suffix(c, e)
    }

    /// `name (compopts: 1 execopts: 2)` as printed on elapsed-time lines.
    fn elapsed_label(&self, execopts_num: usize) -> String {
        let mut parts = Vec::new();
        if self.compopts_num != 0 {
            parts.push(format!("compopts: {}", self.compopts_num));
        }
        if execopts_num != 0 {
            parts.push(format!("execopts: {execopts_num}"));
        }
        if parts.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, parts.join(" "))
        }
    }
}

/// Drives every test of one directory.
/// 驱动一个目录中的所有测试。
pub struct Driver {
    env: Environment,
    dir: PathBuf,
    label: String,
    runner: ProcessRunner,
    limiter: ExecutionLimiter,
    reporter: Reporter,
    resolver: GoodFileResolver,
    perf: PerformanceRecorder,
    c_compiler: Option<Vec<String>>,
    records: Vec<RunRecord>,
}

impl Driver {
    /// Prepares a driver for `dir`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when `dir` does not exist.
    pub fn new(env: Environment, dir: &Path, reporter: Reporter) -> Result<Self> {
        let dir = std::fs::canonicalize(dir)
            .map_err(|e| ConfigError::new(format!("Cannot enter test directory {}: {e}", dir.display())))?;
        let label = env.directory_label(&dir);
        Ok(Self {
            runner: ProcessRunner::new(env.timeout_strategy.clone()),
            limiter: ExecutionLimiter::new(env.exec_limit.clone()),
            resolver: GoodFileResolver::new(&dir, &env),
            perf: PerformanceRecorder::new(&env, &dir),
            c_compiler: None,
            records: Vec::new(),
            env,
            dir,
            label,
            reporter,
        })
    }

    pub fn into_records(self) -> Vec<RunRecord> {
        self.records
    }

    /// The directory label used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs every test of the directory in order.
    ///
    /// 按顺序运行目录中的所有测试。
    ///
    /// # Errors
    /// Configuration errors and failures to read the directory itself propagate;
    /// per-test failures are recorded.
    pub async fn run(&mut self) -> Result<()> {
        let started = Instant::now();
        self.reporter.tag(format!(
            "Starting subtest - {}",
            chrono::Local::now().format("%a %b %d %H:%M:%S %Z %Y")
        ));
        if let Some(preexec) = &self.env.system_preexec {
            self.reporter.tag(format!("system-wide preexec: '{}'", preexec.display()));
        }
        if let Some(prediff) = &self.env.system_prediff {
            self.reporter.tag(format!("system-wide prediff: '{}'", prediff.display()));
        }

        let dir_opts = DirectoryOptions::load(&self.dir, &self.env, &self.reporter).await?;
        let entries = list_dir(&self.dir)?;
        let sources = discover(&entries, &self.env);

        if self.c_compiler.is_none() && sources.iter().any(|s| s.ends_with(".test.c")) {
            self.c_compiler = Some(resolve_c_compiler(&self.env).await?);
        }

        for source in &sources {
            self.reporter.tag(format!("test: {}", test_label(&self.label, source)));
            let planner = Planner {
                env: &self.env,
                dir: &self.dir,
                label: &self.label,
                entries: &entries,
                dir_opts: &dir_opts,
                reporter: &self.reporter,
            };
            let decision = match planner.plan(source).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.contain(test_label(&self.label, base_name(source)), Stage::Filter, e)?;
                    continue;
                }
            };
            match decision {
                PlanDecision::Skip(message) => {
                    self.reporter.tag(&message);
                    let name = test_label(&self.label, base_name(source));
                    self.records.push(RunRecord::skipped(name, message));
                }
                PlanDecision::Run(case) => {
                    let test_started = Instant::now();
                    if let Err(e) = self.run_test(&case, &dir_opts).await {
                        self.contain(test_label(&self.label, &case.base), Stage::Execute, e)?;
                        self.cleanup(&case.exec_name).await;
                    }
                    self.reporter.tag(format!(
                        "Elapsed time to compile and execute all versions of \"{}\" - {:.3} seconds",
                        test_label(&self.label, &case.base),
                        test_started.elapsed().as_secs_f64()
                    ));
                }
            }
        }

        let mut finished = self.label.clone();
        if let Some(one) = &self.env.one_test {
            finished = test_label(&self.label, base_name(one));
        }
        self.reporter.tag(format!(
            "Finished subtest \"{finished}\" - {:.3} seconds",
            started.elapsed().as_secs_f64()
        ));
        self.reporter.line("");
        Ok(())
    }

    /// Keeps a failure inside the test that raised it: configuration errors
    /// still end the directory run, anything else is reported and recorded.
    ///
    /// 将失败限制在引发它的测试内：配置错误仍会结束目录运行，其他错误则被报告并记录。
    fn contain(&mut self, test: String, stage: Stage, err: anyhow::Error) -> Result<()> {
        if err.downcast_ref::<ConfigError>().is_some() {
            return Err(err);
        }
        self.reporter.tag(format!("Error: abandoning {test}: {err:#}"));
        self.records.push(RunRecord {
            test,
            compopts: 0,
            execopts: 0,
            trial: 0,
            stage,
            outcome: Outcome::InfraError(InfraKind::DriverIo),
            future: false,
            duration: Duration::ZERO,
        });
        Ok(())
    }

    /// Runs the full variant matrix of one resolved test.
    ///
    /// 运行一个已解析测试的完整变体矩阵。
    pub async fn run_test(&mut self, case: &TestCase, dir_opts: &DirectoryOptions) -> Result<()> {
        let name = test_label(&self.label, &case.base);
        let mut compopts_num = 0;
        for entry in &case.compopts {
            let compile = CompileVariant::parse(entry);
            if !compile.is_blank() {
                compopts_num += 1;
            }
            let mut ctx = VariantContext {
                case,
                name: name.clone(),
                compile,
                compopts_num,
                compile_args: Vec::new(),
            };

            match self.compile_variant(&mut ctx, dir_opts).await? {
                CompileOutcome::ToolMissing => break,
                CompileOutcome::TimedOut | CompileOutcome::Compared(_) => continue,
                CompileOutcome::Succeeded => {}
            }

            if self.env.comp_perf.is_some() && !case.mode.is_c_test() {
                let compopts_part = if compopts_num == 0 { String::new() } else { compopts_num.to_string() };
                let dat_name = format!("{}~~{}{compopts_part}", self.label.replace('/', "~~"), case.base);
                self.perf
                    .record_compilation(&self.env, &self.runner, &self.reporter, &dat_name, &name)
                    .await;
                self.cleanup_passes_file().await;
            }

            if self.env.compile_only {
                self.reporter.tag("Note: Not executing or comparing the output due to -noexec flags");
                self.cleanup(&case.exec_name).await;
                continue;
            }

            self.execute_variants(&ctx, dir_opts).await?;
            self.cleanup(&case.exec_name).await;
        }
        Ok(())
    }

    /// Builds one compile variant and, when the build is not followed by
    /// execution, compares the compiler output.
    ///
    /// 构建一个编译变体；若构建后不执行，则比较编译器输出。
    async fn compile_variant(&mut self, ctx: &mut VariantContext<'_>, dir_opts: &DirectoryOptions) -> Result<CompileOutcome> {
        let case = ctx.case;
        let future = case.future_prefix().to_string();
        let complog = comp_log_name(&case.exec_name, ctx.compopts_num);
        let compiler = self.env.compiler.display().to_string();
        let hook_args = vec![case.exec_name.clone(), complog.clone(), compiler.clone()];

        if let Some(precomp) = &dir_opts.precomp {
            self.run_hook("Executing ./PRECOMP", precomp, &hook_args).await;
        }
        if let Some(precomp) = &case.precomp {
            self.run_hook(&format!("Executing precomp {}.precomp", case.base), precomp, &hook_args)
                .await;
        }

        let compopt_tokens = ctx.compile.tokens();
        let inputs = CompileInputs {
            env: &self.env,
            exec_name: &case.exec_name,
            source: &case.source,
            compopts: &compopt_tokens,
            last_compopts: &case.last_compopts,
            chpldoc_opts: &dir_opts.chpldoc_opts,
            c_compiler: self.c_compiler.as_deref(),
        };
        let command = match case.mode.build_command(&inputs) {
            Ok(command) => command,
            Err(tool) => {
                self.reporter.tag(format!("Warning: Could not find {tool}, skipping test {}", ctx.name));
                self.push(ctx, 0, 0, Stage::Compile, Outcome::InfraError(InfraKind::MissingCompiler), Duration::ZERO);
                return Ok(CompileOutcome::ToolMissing);
            }
        };
        ctx.compile_args = command.args.clone();

        let stdin_display = case
            .comp_stdin
            .display_target()
            .map(|target| self.display_path(&target))
            .unwrap_or_default();
        let mut announce = format!("Executing compiler {}", shell_escape_command(&command.program));
        if !command.args.is_empty() {
            announce.push(' ');
            announce.push_str(&command.args.join(" "));
        }
        self.reporter.tag(format!("{announce} < {stdin_display}"));

        let mut overlay = case.compenv.clone();
        if let Some(comp_perf) = &self.env.comp_perf {
            overlay.push(("CHPL_PRINT_PASSES_FILE".to_string(), comp_perf.passes_file.clone()));
        }
        let request = ProcessRequest::new(self.spawn_path(&command.program))
            .args(command.args.iter().map(|arg| self.spawn_path(arg)))
            .current_dir(&self.dir)
            .envs(&overlay)
            .stdin(case.comp_stdin.clone())
            .timeout(Some(Duration::from_secs(4 * case.timeout)))
            .kill_grace(Duration::from_secs(case.kill_timeout));

        let started = Instant::now();
        let result = match self.runner.run(&request).await {
            Ok(result) => result,
            Err(e) => {
                self.reporter.prefixed_tag(
                    &future,
                    format!("Error: could not execute compiler {} for {}: {e}", command.program, ctx.name),
                );
                let outcome = Outcome::InfraError(InfraKind::MissingCompiler);
                self.push(ctx, 0, 0, Stage::Compile, outcome.clone(), started.elapsed());
                self.cleanup(&case.exec_name).await;
                return Ok(CompileOutcome::Compared(outcome));
            }
        };
        let elapsed = started.elapsed();

        if result.timed_out() {
            self.reporter.prefixed_tag(
                &future,
                format!("Error: Timed out compilation for {}{}", ctx.name, ctx.variation(0)),
            );
            self.push(ctx, 0, 0, Stage::Compile, Outcome::Timeout, elapsed);
            self.cleanup(&case.exec_name).await;
            self.cleanup_passes_file().await;
            return Ok(CompileOutcome::TimedOut);
        }

        self.reporter.tag(format!(
            "Elapsed compilation time for \"{}\" - {:.3} seconds",
            ctx.elapsed_label(0),
            elapsed.as_secs_f64()
        ));

        let mut output = result.output.clone();
        if case.mode.is_c_test() {
            // Some C compilers echo `file.c:` for every source they compile.
            let mut text = String::from_utf8_lossy(&output).into_owned();
            for arg in command.args.iter().filter(|arg| arg.ends_with(".c")) {
                text = text.replace(&format!("{arg}:\n"), "");
            }
            output = text.into_bytes();
        }

        if result.success() && case.execute {
            let compile_output = output;
            for log in self.initial_exec_logs(ctx) {
                tokio::fs::write(self.dir.join(&log), &compile_output)
                    .await
                    .with_context(|| format!("Failed to write {log}"))?;
            }
            self.reporter.tag(format!("Success compiling {}", ctx.name));
            return Ok(CompileOutcome::Succeeded);
        }

        let original_output = output.clone();
        self.append_catfiles(case, &mut output).await;
        let complog_path = self.dir.join(&complog);
        tokio::fs::write(&complog_path, &output)
            .await
            .with_context(|| format!("Failed to write {complog}"))?;

        self.run_prediff_hooks(ctx, &complog, dir_opts, "prediff ", &ctx.compile_args.clone())
            .await;

        let base = ctx
            .compile
            .good_override
            .as_deref()
            .map(|name| name.replace(".good", ""))
            .unwrap_or_else(|| case.base.clone());
        let good = self.resolver.resolve(&base, &self.env.env_compopts, &[""]);

        let GoodFile::Found(good_name) = &good else {
            if self.env.is_perf() {
                self.reporter.tag(format!("Error compilation failed for {}", ctx.elapsed_label(0)));
            } else {
                self.reporter.tag(format!(
                    "Error cannot locate compiler output comparison file {}",
                    test_label(&self.label, good.name())
                ));
            }
            self.reporter.tag("Compiler output was as follows:");
            self.reporter.raw(&String::from_utf8_lossy(&original_output));
            let outcome = Outcome::InfraError(InfraKind::MissingGoodFile);
            self.push(ctx, 0, 0, Stage::Compile, outcome.clone(), elapsed);
            self.cleanup(&case.exec_name).await;
            self.cleanup_passes_file().await;
            return Ok(CompileOutcome::Compared(outcome));
        };

        let matched = self.compare(good_name, &complog).await;
        if matched {
            let _ = remove_if_present(&complog_path).await;
        }
        let verdict = if matched { "Success" } else { "Error" };
        self.reporter.prefixed_tag(
            &future,
            format!("{verdict} matching compiler output for {}{}", ctx.name, ctx.variation(0)),
        );

        let mut outcome = if matched { Outcome::Success } else { Outcome::Mismatch };
        if !matched && case.is_future() {
            if let Some(bad_outcome) = self.check_bad_file(ctx, &complog, true, 0).await {
                outcome = bad_outcome;
            }
        }

        self.push(ctx, 0, 0, Stage::Compile, outcome.clone(), elapsed);
        self.cleanup(&case.exec_name).await;
        self.cleanup_passes_file().await;
        Ok(CompileOutcome::Compared(outcome))
    }

    /// Exec logs seeded with the compiler output so preexec hooks can edit them.
    fn initial_exec_logs(&self, ctx: &VariantContext<'_>) -> Vec<String> {
        let case = ctx.case;
        let (compopts, execopts) = (case.compopts.len(), case.execopts.len());
        if compopts == 1 && execopts == 1 {
            return vec![exec_log_name(&case.exec_name, None)];
        }
        if execopts == 1 {
            let e = if case.execopts[0] == BLANK_OPTION { 0 } else { 1 };
            return vec![exec_log_name(&case.exec_name, Some((ctx.compopts_num, e)))];
        }
        (1..=execopts)
            .map(|e| exec_log_name(&case.exec_name, Some((ctx.compopts_num, e))))
            .collect()
    }

    /// Runs the built executable under every execute variant and trial.
    ///
    /// 在每个执行变体和试验下运行已构建的可执行文件。
    async fn execute_variants(&mut self, ctx: &VariantContext<'_>, dir_opts: &DirectoryOptions) -> Result<()> {
        let case = ctx.case;
        let future = case.future_prefix().to_string();
        let only_one = case.only_one_variant();
        let compiler = self.env.compiler.display().to_string();
        let mut execopts_num = 0;

        for entry in &case.execopts {
            let execlog = if only_one {
                exec_log_name(&case.exec_name, None)
            } else {
                if entry != BLANK_OPTION {
                    execopts_num += 1;
                }
                exec_log_name(&case.exec_name, Some((ctx.compopts_num, execopts_num)))
            };
            let execlog_path = self.dir.join(&execlog);

            let variant = ExecVariant::parse(entry);
            let mut execopts = variant.opts.clone();
            if let Some(extra) = &case.numlocales_execopts {
                execopts.push_str(extra);
            }
            let good_override = variant.good_override.clone().or_else(|| ctx.compile.good_override.clone());

            let hook_args = vec![case.exec_name.clone(), execlog.clone(), compiler.clone()];
            if let Some(system_preexec) = self.env.system_preexec.clone() {
                self.run_hook("Executing system-wide preexec", &system_preexec, &hook_args).await;
            }
            if let Some(preexec) = &dir_opts.preexec {
                self.run_hook("Executing ./PREEXEC", preexec, &hook_args).await;
            }
            if let Some(preexec) = &case.preexec {
                self.run_hook(&format!("Executing preexec {}.preexec", case.base), preexec, &hook_args)
                    .await;
            }

            let pre_exec_output = tokio::fs::read(&execlog_path).await.unwrap_or_default();

            if !is_executable(&self.dir.join(&case.exec_name)) {
                self.reporter.prefixed_tag(
                    &future,
                    format!(
                        "Error could not locate executable {} for {}{}",
                        case.exec_name,
                        ctx.name,
                        ctx.variation(execopts_num)
                    ),
                );
                self.push(
                    ctx,
                    execopts_num,
                    0,
                    Stage::Execute,
                    Outcome::InfraError(InfraKind::MissingExecutable),
                    Duration::ZERO,
                );
                break;
            }

            let (program, mut args, overlay, launchcmd_time_file) = self.executable_command(case, dir_opts);
            args.extend(dir_opts.execopts.iter().cloned());
            args.extend(split_opts(&execopts));
            if !case.mode.is_c_test() {
                if let Some(env_execopts) = &self.env.env_execopts {
                    args.extend(env_execopts.iter().cloned());
                }
            }
            args.extend(case.last_execopts.iter().cloned());

            let mut stdin = case.stdin.clone();
            if args.len() >= 2 {
                if let Some(idx) = args.iter().position(|arg| arg == "<") {
                    let redirect = args.get(idx + 1).cloned().unwrap_or_default();
                    args.drain(idx..(idx + 2).min(args.len()));
                    match stdin.clone() {
                        StdinSource::Inherit => {
                            let message = format!(
                                "Skipping test with stdin redirection (\"<\") in execopts since -nostdinredirect is given {}",
                                ctx.name
                            );
                            self.reporter.tag(&message);
                            self.records.push(RunRecord::skipped(ctx.name.clone(), message));
                            break;
                        }
                        StdinSource::Null => {
                            let path = self.dir.join(&redirect);
                            if is_readable_file(&path) {
                                stdin = StdinSource::File(path);
                            } else {
                                self.reporter.tag(format!("Error: redirection file {redirect} does not exist"));
                                self.push(
                                    ctx,
                                    execopts_num,
                                    0,
                                    Stage::Execute,
                                    Outcome::InfraError(InfraKind::StdinRedirect),
                                    Duration::ZERO,
                                );
                                break;
                            }
                        }
                        StdinSource::File(existing) => {
                            self.reporter.tag(format!(
                                "Error: a redirection file already exists: {}",
                                self.display_path(&existing.display().to_string())
                            ));
                            self.push(
                                ctx,
                                execopts_num,
                                0,
                                Stage::Execute,
                                Outcome::InfraError(InfraKind::StdinRedirect),
                                Duration::ZERO,
                            );
                            break;
                        }
                    }
                }
            }

            let timeout = match self.env.launcher_timeout {
                Some(launcher) => {
                    args.extend(launcher.walltime_args(case.timeout));
                    None
                }
                None => Some(Duration::from_secs(case.timeout)),
            };

            for trial in 0..case.num_trials {
                let guard = match self.limiter.acquire(Duration::from_secs(case.timeout)).await {
                    Ok(LimitGuard::Expired) => {
                        self.reporter.tag(format!(
                            "Warning: timed out waiting for an execution slot for {}; running without the limit",
                            ctx.name
                        ));
                        LimitGuard::Expired
                    }
                    Ok(guard) => guard,
                    Err(e) => {
                        self.reporter.tag(format!("Warning: execution limiter unavailable: {e}"));
                        LimitGuard::Unlimited
                    }
                };

                let mut announce = format!("Executing program {program} {}", args.join(" "));
                if let Some(target) = stdin.display_target() {
                    announce.push_str(&format!(" < {}", self.display_path(&target)));
                }
                self.reporter.tag(announce);

                let request = ProcessRequest::new(self.spawn_path(&program))
                    .args(args.iter().map(|arg| self.spawn_path(arg)))
                    .current_dir(&self.dir)
                    .envs(&overlay)
                    .stdin(stdin.clone())
                    .timeout(timeout)
                    .kill_grace(Duration::from_secs(case.kill_timeout));

                let started = Instant::now();
                let spawned = self.runner.run(&request).await;
                drop(guard);
                let elapsed = started.elapsed();

                let result = match spawned {
                    Ok(result) => result,
                    Err(e) => {
                        self.reporter.prefixed_tag(
                            &future,
                            format!("Error: could not execute {program} for {}: {e}", ctx.name),
                        );
                        self.push(
                            ctx,
                            execopts_num,
                            trial,
                            Stage::Execute,
                            Outcome::InfraError(InfraKind::MissingExecutable),
                            elapsed,
                        );
                        break;
                    }
                };

                let variation = ctx.variation(execopts_num);
                let mut exec_timeout = result.timed_out();
                let mut launcher_error = None;
                if self.env.launcher_timeout.is_some() {
                    launcher_error = detect_launcher_error(&result.text());
                    if let Some(error) = launcher_error {
                        exec_timeout = error == LauncherError::Timeout;
                        self.reporter.prefixed_tag(
                            &future,
                            format!("Error: {} {}{variation}", error.message(), ctx.name),
                        );
                        self.reporter.tag("Execution output was as follows:");
                        self.reporter.raw(&trim_output(&result.output));
                    }
                } else if exec_timeout {
                    self.reporter.prefixed_tag(
                        &future,
                        format!("Error: Timed out executing program {}{variation}", ctx.name),
                    );
                    self.reporter.tag("Execution output was as follows:");
                    self.reporter.raw(&trim_output(&result.output));
                }

                let elapsed_label = ctx.elapsed_label(execopts_num);
                if let Some(time_file) = &launchcmd_time_file {
                    self.report_launchcmd_time(time_file, &elapsed_label).await;
                }
                self.reporter.tag(format!(
                    "Elapsed execution time for \"{elapsed_label}\" - {:.3} seconds",
                    elapsed.as_secs_f64()
                ));
                if let Some(limit) = self.env.exec_time_warn_limit {
                    if elapsed.as_secs_f64() > limit as f64 {
                        self.reporter.tag(format!("Warning: {} took over {limit} seconds to execute", ctx.name));
                    }
                }

                let mut output = result.output.clone();
                self.append_catfiles(case, &mut output).await;
                let mut log_contents = pre_exec_output.clone();
                log_contents.extend_from_slice(&output);
                tokio::fs::write(&execlog_path, &log_contents)
                    .await
                    .with_context(|| format!("Failed to write {execlog}"))?;

                if exec_timeout {
                    self.push(ctx, execopts_num, trial, Stage::Execute, Outcome::Timeout, elapsed);
                    break;
                }
                if launcher_error.is_some() {
                    let outcome = Outcome::InfraError(InfraKind::LauncherFault);
                    self.push(ctx, execopts_num, trial, Stage::Execute, outcome, elapsed);
                    break;
                }

                let args_for_hooks = args.clone();
                self.run_prediff_hooks(ctx, &execlog, dir_opts, "prediff ./", &args_for_hooks)
                    .await;

                if self.env.is_perf() {
                    let default_keys = format!("{}{}", case.base, self.env.perf_suffix("keys"));
                    let (perf_name, keyfile) = match &good_override {
                        None => (case.base.clone(), default_keys),
                        Some(explicit) => {
                            let name = explicit
                                .strip_suffix(&self.env.perf_suffix("keys"))
                                .unwrap_or(explicit)
                                .to_string();
                            let keyfile = if self.dir.join(explicit).is_file() {
                                explicit.clone()
                            } else {
                                default_keys
                            };
                            (name, keyfile)
                        }
                    };
                    let sample = ExecutionSample {
                        name: &perf_name,
                        keyfile: Path::new(&keyfile),
                        log: Path::new(&execlog),
                        timed_out: false,
                    };
                    let status = self
                        .perf
                        .record_execution(&self.env, &self.runner, &self.reporter, &sample)
                        .await;
                    let outcome = match status {
                        PerfStatus::Recorded => {
                            let _ = remove_if_present(&execlog_path).await;
                            self.reporter
                                .prefixed_tag(&future, format!("Success matching performance keys for {}", ctx.name));
                            Outcome::Success
                        }
                        PerfStatus::KeysMissing => {
                            self.reporter.prefixed_tag(
                                &future,
                                format!("Error matching performance keys for {}{variation}", ctx.name),
                            );
                            Outcome::Mismatch
                        }
                        PerfStatus::SetupFailed => Outcome::InfraError(InfraKind::PerfSetup),
                    };
                    let failed = outcome != Outcome::Success;
                    self.push(ctx, execopts_num, trial, Stage::Performance, outcome, elapsed);
                    if failed || !result.success() {
                        break;
                    }
                    continue;
                }

                let (base, suffixes): (String, Vec<String>) = match &good_override {
                    Some(explicit) => (explicit.replace(".good", ""), vec![String::new()]),
                    None if only_one => (case.base.clone(), vec![String::new()]),
                    None => (
                        case.base.clone(),
                        vec![format!(".{}-{}", ctx.compopts_num, execopts_num), String::new()],
                    ),
                };
                let suffix_refs: Vec<&str> = suffixes.iter().map(String::as_str).collect();
                let good = self.resolver.resolve(&base, &self.env.env_compopts, &suffix_refs);

                let GoodFile::Found(good_name) = &good else {
                    self.reporter.tag(format!(
                        "Error cannot locate program output comparison file {}",
                        test_label(&self.label, good.name())
                    ));
                    self.reporter.tag("Execution output was as follows:");
                    let logged = tokio::fs::read(&execlog_path).await.unwrap_or_default();
                    self.reporter.raw(&trim_output(&logged));
                    let outcome = Outcome::InfraError(InfraKind::MissingGoodFile);
                    self.push(ctx, execopts_num, trial, Stage::Execute, outcome, elapsed);
                    // Every later trial would resolve the same missing file.
                    break;
                };

                let matched = self.compare(good_name, &execlog).await;
                let outcome = if matched {
                    let _ = remove_if_present(&execlog_path).await;
                    self.reporter
                        .prefixed_tag(&future, format!("Success matching program output for {}", ctx.name));
                    Outcome::Success
                } else {
                    self.reporter.prefixed_tag(
                        &future,
                        format!("Error matching program output for {}{variation}", ctx.name),
                    );
                    match case.is_future() {
                        true => self
                            .check_bad_file(ctx, &execlog, false, execopts_num)
                            .await
                            .unwrap_or(Outcome::Mismatch),
                        false => Outcome::Mismatch,
                    }
                };
                self.push(ctx, execopts_num, trial, Stage::Execute, outcome, elapsed);

                if !result.success() {
                    break;
                }
            }

        }
        Ok(())
    }

    /// The program, leading arguments, environment overlay and optional
    /// launchcmd timing file for running the executable.
    fn executable_command(
        &self,
        case: &TestCase,
        dir_opts: &DirectoryOptions,
    ) -> (String, Vec<String>, Vec<(String, String)>, Option<String>) {
        let exe = format!("./{}", case.exec_name);
        let mut overlay = case.execenv.clone();
        let timereal = matches!(self.env.launcher.as_str(), "pbs-aprun" | "aprun" | "slurm-srun");

        let (mut program, mut args) = match &case.timer {
            Some(timer) if timereal => {
                overlay.push(("CHPL_LAUNCHER_REAL_WRAPPER".to_string(), timer.join(" ")));
                (exe, Vec::new())
            }
            Some(timer) => {
                let mut args: Vec<String> = timer[1..].to_vec();
                args.push(exe);
                (timer[0].clone(), args)
            }
            // `NOVGRBIN` turns valgrind off for the executables of a directory.
            None if self.env.valgrind.execute && dir_opts.valgrind_binary => {
                let mut args = self.env.valgrind.opts.clone();
                args.push("-q".to_string());
                if self.env.comm != "none" {
                    args.push("--trace-children=yes".to_string());
                }
                args.push(exe);
                ("valgrind".to_string(), args)
            }
            None => (exe, Vec::new()),
        };

        let mut time_file = None;
        if let Some(launch_cmd) = &self.env.launch_cmd {
            let file = format!("{}_launchcmd_exec_time.txt", case.exec_name);
            overlay.push(("CHPL_LAUNCHCMD_EXEC_TIME_FILE".to_string(), file.clone()));
            time_file = Some(file);
            let mut wrapped: Vec<String> = launch_cmd[1..].to_vec();
            wrapped.push(program);
            wrapped.append(&mut args);
            program = launch_cmd[0].clone();
            args = wrapped;
        }
        (program, args, overlay, time_file)
    }

    async fn report_launchcmd_time(&self, time_file: &str, label: &str) {
        let path = self.dir.join(time_file);
        let Ok(content) = tokio::fs::read_to_string(&path).await else {
            return;
        };
        match content.trim().parse::<f64>() {
            Ok(seconds) => self.reporter.tag(format!(
                "launchcmd reports elapsed execution time for \"{label}\" - {seconds:.3} seconds"
            )),
            Err(_) => self.reporter.line(format!("Could not parse launchcmd time file {time_file}")),
        }
        let _ = remove_if_present(&path).await;
    }

    /// Compares a future test's failing log against its `.bad` snapshot.
    /// `None` when the test has no readable `.bad` file.
    async fn check_bad_file(
        &self,
        ctx: &VariantContext<'_>,
        log: &str,
        ignore_module_lines: bool,
        execopts_num: usize,
    ) -> Option<Outcome> {
        let bad = format!("{}.bad", ctx.case.base);
        if !is_readable_file(&self.dir.join(&bad)) {
            return None;
        }
        let matched = if ignore_module_lines {
            self.compare_ignoring_module_lines(&bad, log).await
        } else {
            self.compare(&bad, log).await
        };
        let variation = ctx.variation(if ignore_module_lines { 0 } else { execopts_num });
        if matched {
            let _ = remove_if_present(&self.dir.join(log)).await;
            self.reporter
                .tag(format!("Clean match against .bad file for {}{variation}", ctx.name));
            Some(Outcome::FutureSuppressed)
        } else {
            self.reporter.tag(format!("Error matching .bad file for {}{variation}", ctx.name));
            Some(Outcome::Mismatch)
        }
    }

    /// Byte comparison of a golden file and a log, showing `diff` output on mismatch.
    ///
    /// golden 文件与日志的逐字节比较，不匹配时显示 `diff` 输出。
    async fn compare(&self, good: &str, log: &str) -> bool {
        self.reporter.tag(format!("Executing diff {good} {log}"));
        let matched = files_equal(&self.dir.join(good), &self.dir.join(log))
            .await
            .unwrap_or(false);
        if !matched && which("diff").is_some() {
            let request = ProcessRequest::new("diff").args([good, log]).current_dir(&self.dir);
            if let Ok(result) = self.runner.run(&request).await {
                self.reporter.raw(&trim_output(&result.output));
            }
        }
        matched
    }

    /// `.bad` comparison through `diff-ignoring-module-line-numbers` when installed.
    async fn compare_ignoring_module_lines(&self, bad: &str, log: &str) -> bool {
        let helper = self.env.util_test_helper("diff-ignoring-module-line-numbers");
        if !is_executable(&helper) {
            return self.compare(bad, log).await;
        }
        self.reporter
            .tag(format!("Executing diff-ignoring-module-line-numbers {bad} {log}"));
        let request = ProcessRequest::new(helper.display().to_string())
            .args([bad, log])
            .current_dir(&self.dir);
        match self.runner.run(&request).await {
            Ok(result) if result.success() => true,
            Ok(result) => {
                self.reporter.raw(&result.text());
                false
            }
            Err(_) => false,
        }
    }

    /// System-wide, directory and per-test prediff hooks, in that order.
    async fn run_prediff_hooks(
        &self,
        ctx: &VariantContext<'_>,
        log: &str,
        dir_opts: &DirectoryOptions,
        test_announce: &str,
        args: &[String],
    ) {
        let case = ctx.case;
        let hook_args = vec![
            case.exec_name.clone(),
            log.to_string(),
            self.env.compiler.display().to_string(),
            format!("{} {}", self.env.env_compopts.join(" "), ctx.compile.opts),
            args.join(" "),
        ];
        if let Some(system_prediff) = &self.env.system_prediff {
            self.run_hook("Executing system-wide prediff", system_prediff, &hook_args).await;
        }
        if let Some(prediff) = &dir_opts.prediff {
            self.run_hook("Executing ./PREDIFF", prediff, &hook_args).await;
        }
        if let Some(prediff) = &case.prediff {
            self.run_hook(&format!("Executing {test_announce}{}.prediff", case.base), prediff, &hook_args)
                .await;
        }
    }

    /// Runs a hook script in the test directory and echoes its output.
    async fn run_hook(&self, announce: &str, program: &Path, args: &[String]) {
        self.reporter.tag(announce);
        let request = ProcessRequest::new(program.display().to_string())
            .args(args.iter().cloned())
            .current_dir(&self.dir);
        match self.runner.run(&request).await {
            Ok(result) => self.reporter.raw(&result.text()),
            Err(e) => self
                .reporter
                .tag(format!("Warning: could not execute {}: {e}", program.display())),
        }
    }

    async fn append_catfiles(&self, case: &TestCase, output: &mut Vec<u8>) {
        if case.catfiles.is_empty() {
            return;
        }
        self.reporter.tag(format!("Concatenating extra files: {}.catfiles", case.base));
        for file in &case.catfiles {
            match tokio::fs::read(self.dir.join(file)).await {
                Ok(bytes) => output.extend_from_slice(&bytes),
                Err(e) => output.extend_from_slice(format!("cat: {file}: {e}\n").as_bytes()),
            }
        }
    }

    /// Removes the executable and its `_real` launcher twin. Never fatal;
    /// a missing file is not an error.
    ///
    /// 删除可执行文件及其 `_real` 启动器副本。从不致命；文件不存在不算错误。
    pub async fn cleanup(&self, exec_name: &str) {
        for name in [exec_name.to_string(), format!("{exec_name}_real")] {
            let path = self.dir.join(&name);
            if !path.is_file() {
                continue;
            }
            let Err(e) = remove_if_present(&path).await else {
                continue;
            };
            let busy = is_resource_busy(&e);
            if busy {
                self.inspect_open_handles(&name).await;
            }
            if !(busy && self.env.platform == "cygwin32") {
                self.reporter.tag(format!("Warning: could not remove {name}: {e}"));
            }
        }
    }

    async fn inspect_open_handles(&self, name: &str) {
        let (program, args) = if let Some(handle) = which("handle") {
            (handle, Vec::new())
        } else if let Some(lsof) = which("lsof") {
            (lsof, vec![name.to_string()])
        } else {
            return;
        };
        let mut shown = program.display().to_string();
        if !args.is_empty() {
            shown = format!("{shown} {}", args.join(" "));
        }
        self.reporter.line(format!("[Inspecting open file handles with: {shown}"));
        let request = ProcessRequest::new(program.display().to_string())
            .args(args)
            .current_dir(&self.dir);
        if let Ok(result) = self.runner.run(&request).await {
            self.reporter.raw(&result.text());
        }
    }

    async fn cleanup_passes_file(&self) {
        if let Some(comp_perf) = &self.env.comp_perf {
            let passes_file = comp_perf.passes_file.clone();
            self.cleanup(&passes_file).await;
        }
    }

    fn push(
        &mut self,
        ctx: &VariantContext<'_>,
        execopts_num: usize,
        trial: u32,
        stage: Stage,
        outcome: Outcome,
        duration: Duration,
    ) {
        self.records.push(RunRecord {
            test: ctx.name.clone(),
            compopts: if ctx.case.compopts.len() > 1 { ctx.compopts_num } else { 0 },
            execopts: if ctx.case.execopts.len() > 1 { execopts_num } else { 0 },
            trial,
            stage,
            outcome,
            future: ctx.case.is_future(),
            duration,
        });
    }

    /// `./name` resolved against the test directory, for spawning.
    fn spawn_path(&self, arg: &str) -> String {
        match arg.strip_prefix("./") {
            Some(rest) => self.dir.join(rest).display().to_string(),
            None => arg.to_string(),
        }
    }

    /// Paths inside the test directory shown relative to it.
    fn display_path(&self, path: &str) -> String {
        match Path::new(path).strip_prefix(&self.dir) {
            Ok(relative) => format!("./{}", relative.display()),
            Err(_) => path.to_string(),
        }
    }
}
