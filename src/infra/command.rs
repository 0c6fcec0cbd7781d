//! # Process Runner / 进程运行器
//!
//! Runs one subprocess with a merged stdout/stderr capture, an optional
//! deadline and a guaranteed termination path. Two interchangeable timeout
//! strategies are supported: an internal deadline on the output pipe, or an
//! external `timedexec` helper that reports a timeout through a sentinel status.
//!
//! 运行单个子进程：合并捕获 stdout/stderr，可选截止时间，并保证能终止进程。
//! 支持两种可互换的超时策略：对输出管道的内部截止时间，或通过哨兵退出码
//! 报告超时的外部 `timedexec` 辅助程序。

use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::core::config::TimeoutStrategy;

/// Exit status the `timedexec` helper uses to report an expired deadline.
/// `timedexec` 辅助程序用于报告超时的退出码。
pub const TIMEDEXEC_TIMEOUT_STATUS: i32 = 222;

/// Upper bound of operator-visible output: half from the head, half from the tail.
pub const TRIM_LIMIT: usize = 256 * 1024;

/// Where a subprocess reads its standard input from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdinSource {
    #[default]
    Null,
    /// The driver's own stdin (stdin redirection disabled).
    Inherit,
    File(PathBuf),
}

impl StdinSource {
    fn to_stdio(&self) -> std::io::Result<Stdio> {
        Ok(match self {
            StdinSource::Null => Stdio::null(),
            StdinSource::Inherit => Stdio::inherit(),
            StdinSource::File(path) => Stdio::from(std::fs::File::open(path)?),
        })
    }

    /// The redirect target shown in `[Executing ... < target]` lines.
    pub fn display_target(&self) -> Option<String> {
        match self {
            StdinSource::Null => Some("/dev/null".to_string()),
            StdinSource::Inherit => None,
            StdinSource::File(path) => Some(path.display().to_string()),
        }
    }
}

/// One invocation handed to the [`ProcessRunner`].
/// 交给 [`ProcessRunner`] 的一次调用。
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Overlay applied on top of the driver's environment for this invocation only.
    pub env: Vec<(String, String)>,
    pub stdin: StdinSource,
    pub timeout: Option<Duration>,
    /// Grace period between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: StdinSource::Null,
            timeout: None,
            kill_grace: Duration::from_secs(10),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend(vars.iter().cloned());
        self
    }

    pub fn stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

/// How a subprocess finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `None` when the process was ended by a signal.
    Exited(Option<i32>),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Interleaved stdout and stderr; partial when the process timed out.
    pub output: Vec<u8>,
    pub completion: Completion,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.completion == Completion::TimedOut
    }

    pub fn success(&self) -> bool {
        self.completion == Completion::Exited(Some(0))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Runs subprocesses with the configured timeout strategy.
/// 使用配置的超时策略运行子进程。
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    strategy: TimeoutStrategy,
}

impl ProcessRunner {
    pub fn new(strategy: TimeoutStrategy) -> Self {
        Self { strategy }
    }

    /// Runs the request to completion or to its deadline.
    ///
    /// 运行请求直至完成或到达截止时间。
    ///
    /// # Errors
    /// Returns the spawn error when the program cannot be started, or the
    /// open error of a stdin redirect file.
    pub async fn run(&self, request: &ProcessRequest) -> std::io::Result<ProcessOutput> {
        match (&self.strategy, request.timeout) {
            (TimeoutStrategy::TimedExec(helper), Some(timeout)) => {
                let mut whole = shell_escape_command(&request.program);
                for arg in &request.args {
                    whole.push(' ');
                    whole.push_str(&shell_escape(arg));
                }
                let mut cmd = Command::new(helper);
                cmd.arg(timeout.as_secs().max(1).to_string()).arg(whole);
                configure(&mut cmd, request)?;
                let mut result = spawn_and_capture(cmd, &request.stdin, None, request.kill_grace).await?;
                if result.completion == Completion::Exited(Some(TIMEDEXEC_TIMEOUT_STATUS)) {
                    result.completion = Completion::TimedOut;
                }
                Ok(result)
            }
            (_, timeout) => {
                let mut cmd = Command::new(&request.program);
                cmd.args(&request.args);
                configure(&mut cmd, request)?;
                spawn_and_capture(cmd, &request.stdin, timeout, request.kill_grace).await
            }
        }
    }
}

fn configure(cmd: &mut Command, request: &ProcessRequest) -> std::io::Result<()> {
    if let Some(dir) = &request.cwd {
        cmd.current_dir(dir);
    }
    cmd.envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd.stdin(request.stdin.to_stdio()?);
    Ok(())
}

/// Spawns a command and captures its stdout and stderr through one shared pipe.
///
/// Both streams point at the same OS pipe so their interleaving is preserved.
/// The pipe is drained on a blocking reader thread; a deadline expiring before
/// EOF terminates the process and returns whatever was captured so far.
///
/// 派生一个命令，并通过同一个共享管道捕获其 stdout 和 stderr。
///
/// 两个流指向同一个操作系统管道，因此保留了交错顺序。
/// 管道由一个阻塞读取线程排空；若截止时间在 EOF 之前到达，
/// 则终止进程并返回迄今为止捕获的内容。
pub async fn spawn_and_capture(
    mut cmd: Command,
    stdin: &StdinSource,
    timeout: Option<Duration>,
    kill_grace: Duration,
) -> std::io::Result<ProcessOutput> {
    let (mut reader, writer) = std::io::pipe()?;
    let writer_err = writer.try_clone()?;
    cmd.stdout(writer).stderr(writer_err).kill_on_drop(true);

    // An interactive stdin must stay in the foreground process group.
    #[cfg(unix)]
    if *stdin != StdinSource::Inherit {
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = stdin;

    let mut child = cmd.spawn()?;
    // Our copies of the write ends must be closed or the reader never sees EOF.
    drop(cmd);

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let (eof_tx, eof_rx) = oneshot::channel::<()>();
    std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut captured) = sink.lock() {
                        captured.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = eof_tx.send(());
    });

    let snapshot = |buffer: &Arc<Mutex<Vec<u8>>>| buffer.lock().map(|b| b.clone()).unwrap_or_default();

    let Some(timeout) = timeout else {
        let _ = eof_rx.await;
        let status = child.wait().await?;
        return Ok(ProcessOutput {
            output: snapshot(&buffer),
            completion: Completion::Exited(status.code()),
        });
    };

    let deadline = Instant::now() + timeout;
    let finished = async {
        let _ = eof_rx.await;
        child.wait().await
    };
    let waited = tokio::time::timeout_at(deadline, finished).await;
    match waited {
        Ok(status) => Ok(ProcessOutput {
            output: snapshot(&buffer),
            completion: Completion::Exited(status?.code()),
        }),
        Err(_) => {
            terminate(&mut child, kill_grace).await;
            Ok(ProcessOutput {
                output: snapshot(&buffer),
                completion: Completion::TimedOut,
            })
        }
    }
}

/// SIGTERM to the process group, wait out the grace period, then SIGKILL.
/// Never blocks longer than twice the grace period.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pid = pid as libc::pid_t;
        // SAFETY: plain signal delivery to a child we spawned.
        unsafe {
            libc::kill(-pid, libc::SIGTERM);
            libc::kill(pid, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pid = pid as libc::pid_t;
        // SAFETY: as above.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
    let _ = tokio::time::timeout(grace, child.wait()).await;
}

/// Keeps the head and tail of large outputs and replaces non-printable bytes with `~`.
///
/// 保留大输出的开头和结尾，并将不可打印字节替换为 `~`。
pub fn trim_output(output: &[u8]) -> String {
    let half = TRIM_LIMIT / 2;
    let bytes: Vec<u8> = if output.len() > TRIM_LIMIT {
        output[..half]
            .iter()
            .chain(&output[output.len() - half..])
            .copied()
            .collect()
    } else {
        output.to_vec()
    };
    bytes
        .into_iter()
        .map(|b| match b {
            b'\t' | b'\n' | b'\r' | 0x0b | 0x0c | 0x20..=0x7e => b as char,
            _ => '~',
        })
        .collect()
}

const SHELL_SPECIALS: &str = "\\!@#$%^&*()?'\"|<>[]{}";

/// Backslash-escapes shell specials and spaces.
pub fn shell_escape(arg: &str) -> String {
    escape_with(arg, |c| SHELL_SPECIALS.contains(c) || c == ' ')
}

/// Backslash-escapes shell specials but leaves spaces alone.
pub fn shell_escape_command(arg: &str) -> String {
    escape_with(arg, |c| SHELL_SPECIALS.contains(c))
}

fn escape_with(arg: &str, special: impl Fn(char) -> bool) -> String {
    let mut escaped = String::with_capacity(arg.len());
    for c in arg.chars() {
        if special(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
