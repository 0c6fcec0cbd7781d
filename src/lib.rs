//! # Sub-Test Library / Sub-Test 库
//!
//! This library provides the core functionality for the `sub-test` driver,
//! the per-directory half of a compiler test system: it discovers test
//! sources, compiles each one under every compile-option variant, runs the
//! binaries under every execute-option variant, and diffs the output against
//! golden files.
//!
//! 此库为 `sub-test` 驱动程序提供核心功能，
//! 它是编译器测试系统中按目录运行的部分：发现测试源文件，
//! 在每个编译选项变体下编译，在每个执行选项变体下运行，并将输出与 golden 文件比较。
//!
//! ## Modules / 模块
//!
//! - `core` - Environment snapshot, option matrix, golden-file resolution and the test driver
//! - `infra` - Process runner, file system helpers and the execution limiter
//! - `reporting` - Operator log sink, console summary, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 环境快照、选项矩阵、golden 文件解析和测试驱动
//! - `infra` - 进程运行器、文件系统辅助工具和执行限制器
//! - `reporting` - 操作日志输出、控制台摘要、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::execution;
pub use core::models;

/// Maps a requested locale onto one that has a translation file.
/// 将请求的语言区域映射到存在翻译文件的语言区域。
pub fn resolve_locale(requested: &str) -> String {
    let available_locales = rust_i18n::available_locales!();

    // Full locale first ("zh-CN"), then the language part ("en" from "en-US").
    if available_locales.contains(&requested) {
        return requested.to_string();
    }
    requested
        .split('-')
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
