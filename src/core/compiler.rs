//! # Compiler Modes / 编译器模式
//!
//! A closed set of compiler modes, selected once per test file. Each mode
//! owns its argument construction and its auto-execution policy.
//!
//! 编译器模式的封闭集合，每个测试文件选择一次。每种模式负责自己的参数构造和自动执行策略。

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::config::{ConfigError, Environment};
use crate::core::models::CompilerKind;
use crate::infra::fs::{is_executable, which};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerMode {
    /// The regular compiler: `-o <exe> [COMPOPTS] <opts> <src> [lastcompopts]`.
    Chpl,
    /// Documentation build; never executes.
    Chpldoc,
    /// Interactive compiler: no options, compile step only, `.stdin` feeds it.
    Ipe,
    /// A `.test.c` source built with the C compiler of the installation.
    CTest,
}

impl CompilerMode {
    /// Picks the mode for one test source.
    /// 为单个测试源文件选择模式。
    pub fn select(kind: CompilerKind, source: &str) -> Self {
        if source.ends_with(".test.c") {
            Self::CTest
        } else if source.ends_with(".doc.chpl") || kind == CompilerKind::Chpldoc {
            Self::Chpldoc
        } else if kind == CompilerKind::Ipe {
            Self::Ipe
        } else {
            Self::Chpl
        }
    }

    /// Whether a clean compile is followed by running the executable.
    pub fn auto_executes(&self) -> bool {
        matches!(self, Self::Chpl | Self::CTest)
    }

    pub fn is_c_test(&self) -> bool {
        matches!(self, Self::CTest)
    }

    /// Builds the compiler invocation for one compile-option variant.
    ///
    /// 为一个编译选项变体构建编译器调用。
    ///
    /// # Errors
    /// Returns the name of the missing tool when `chpldoc` (or the C compiler)
    /// is not available.
    pub fn build_command(&self, inputs: &CompileInputs<'_>) -> Result<CompileCommand, String> {
        let env = inputs.env;
        let mut args: Vec<String> = Vec::new();
        let program = match self {
            Self::CTest => {
                // COMPOPTS from the environment are compiler flags, not C flags.
                let compiler_line = inputs.c_compiler.filter(|line| !line.is_empty()).ok_or("c compiler")?;
                args.extend(compiler_line[1..].iter().cloned());
                // The execute step runs `./<exec_name>`, so the C build must land there too.
                args.extend(["-o".to_string(), inputs.exec_name.to_string()]);
                args.extend(inputs.compopts.iter().cloned());
                args.push(inputs.source.to_string());
                args.extend(inputs.last_compopts.iter().cloned());
                return Ok(CompileCommand {
                    program: compiler_line[0].clone(),
                    args,
                });
            }
            Self::Chpl => {
                args.extend(["-o".to_string(), inputs.exec_name.to_string()]);
                args.extend(env.env_compopts.iter().cloned());
                args.extend(inputs.compopts.iter().cloned());
                env.compiler.display().to_string()
            }
            Self::Chpldoc => {
                args.extend(inputs.chpldoc_opts.iter().cloned());
                args.extend(inputs.compopts.iter().cloned());
                chpldoc_program(&env.compiler).ok_or("chpldoc")?
            }
            Self::Ipe => env.compiler.display().to_string(),
        };
        args.push(inputs.source.to_string());
        args.extend(inputs.last_compopts.iter().cloned());

        if env.valgrind.compile {
            let mut wrapped = env.valgrind.opts.clone();
            wrapped.push("--gen-suppressions=all".to_string());
            wrapped.push(format!(
                "--suppressions={}/compiler/etc/valgrind.suppressions",
                env.chpl_home.display()
            ));
            wrapped.push("-q".to_string());
            wrapped.push(program);
            wrapped.extend(args);
            return Ok(CompileCommand {
                program: "valgrind".to_string(),
                args: wrapped,
            });
        }

        Ok(CompileCommand { program, args })
    }
}

/// Everything a compiler mode needs to build its argument list.
pub struct CompileInputs<'a> {
    pub env: &'a Environment,
    pub exec_name: &'a str,
    pub source: &'a str,
    /// Tokens of the current compile-option variant.
    pub compopts: &'a [String],
    pub last_compopts: &'a [String],
    /// Directory `CHPLDOCOPTS` followed by `$CHPLDOCOPTS`.
    pub chpldoc_opts: &'a [String],
    /// The C compiler command line, when the directory has C tests.
    pub c_compiler: Option<&'a [String]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// `chpl` is swapped for its `chpldoc` sibling when the driver compiler is not chpldoc.
fn chpldoc_program(compiler: &Path) -> Option<String> {
    let name = compiler.to_string_lossy();
    if name.ends_with("chpldoc") {
        return Some(name.into_owned());
    }
    let candidate = format!("{name}doc");
    if compiler.components().count() > 1 {
        is_executable(Path::new(&candidate)).then_some(candidate)
    } else {
        which(&candidate).map(|path| path.display().to_string())
    }
}

/// Asks `$CHPL_HOME/util/config/compileline --compile` for the C compiler command line.
///
/// 通过 `$CHPL_HOME/util/config/compileline --compile` 查询 C 编译器命令行。
pub async fn resolve_c_compiler(env: &Environment) -> Result<Vec<String>> {
    let compileline: PathBuf = env.chpl_home.join("util").join("config").join("compileline");
    let output = tokio::process::Command::new(&compileline)
        .arg("--compile")
        .output()
        .await
        .map_err(|_| ConfigError::new("Cannot find c compiler"))?;
    if !output.status.success() {
        return Err(ConfigError::new("Cannot find c compiler").into());
    }
    let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
    match shlex::split(&line) {
        Some(parts) if !parts.is_empty() => Ok(parts),
        _ => Err(ConfigError::new("Cannot find c compiler").into()),
    }
}
