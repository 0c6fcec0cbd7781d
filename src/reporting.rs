//! # Reporting Module / 报告模块
//!
//! This module handles operator-visible output: the bracketed log-line sink
//! the driver writes to, the localised console summary, and HTML and JSON
//! reports of every recorded run.
//!
//! 此模块处理面向操作者的输出：驱动写入的方括号日志行输出、
//! 本地化的控制台摘要，以及所有运行记录的 HTML 和 JSON 报告。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting functions
pub use console::{Reporter, print_summary};
pub use html::generate_html_report;
pub use json::write_json_report;
