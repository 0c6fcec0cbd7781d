//! # Core Module / 核心模块
//!
//! This module contains the core functionality of the driver: the
//! environment snapshot, per-directory and per-test option files, the option
//! matrix, golden-file resolution, discovery/filtering and the test state
//! machine itself.
//!
//! 此模块包含驱动程序的核心功能：环境快照、目录级和测试级选项文件、
//! 选项矩阵、golden 文件解析、发现/过滤以及测试状态机本身。

pub mod compiler;
pub mod config;
pub mod execution;
pub mod good_file;
pub mod markers;
pub mod models;
pub mod options;
pub mod perf;
pub mod planner;

// Re-exports
pub use config::Environment;
pub use execution::Driver;
pub use models::{Outcome, RunRecord};
