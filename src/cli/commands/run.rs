//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command, which drives every test of one
//! directory with the given compiler and then prints the summary and writes
//! the optional reports.
//!
//! 此模块实现了 `run` 命令：使用给定编译器驱动一个目录中的所有测试，
//! 然后打印摘要并写出可选的报告。

use anyhow::Result;
use colored::*;
use std::path::PathBuf;

use crate::{
    core::{config::Environment, execution::Driver},
    infra::t,
    reporting::{Reporter, generate_html_report, print_summary, write_json_report},
};

/// Executes the run command with the provided arguments.
///
/// # Arguments
/// * `locale` - Language of the summary and reports
/// * `compiler` - Path to the compiler under test
/// * `dir` - The test directory
/// * `html` - Optional path for HTML report output
/// * `json` - Optional path for the JSON results file
///
/// # Returns
/// `Ok` whatever the individual tests did; only configuration problems are errors.
pub async fn execute(
    locale: &str,
    compiler: PathBuf,
    dir: PathBuf,
    html: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<()> {
    let env = Environment::from_env(&compiler).await?;
    let mut driver = Driver::new(env, &dir, Reporter::stdout())?;
    driver.run().await?;

    let label = driver.label().to_string();
    let records = driver.into_records();
    print_summary(&records, locale);

    if let Some(path) = html {
        generate_html_report(&records, &label, &path, locale)?;
        println!("{}", t!("report_written", locale = locale, path = path.display()).cyan());
    }
    if let Some(path) = json {
        write_json_report(&records, &label, &path)?;
        println!("{}", t!("report_written", locale = locale, path = path.display()).cyan());
    }
    Ok(())
}
