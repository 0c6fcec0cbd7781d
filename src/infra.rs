//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for the driver,
//! including subprocess execution, file system operations, the execution
//! limiter and i18n support.
//!
//! 此模块为驱动程序提供基础设施服务，
//! 包括子进程执行、文件系统操作、执行限制器和国际化支持。

pub mod command;
pub mod fs;
pub mod limiter;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
