//! # Good-File Command / Good-File 命令
//!
//! Prints the golden file the driver would compare a test against, using the
//! same fallback chain and the machine facts of the current environment.
//!
//! 打印驱动将用于比较某个测试的 golden 文件，使用相同的回退链和当前环境的机器信息。

use anyhow::Result;
use colored::*;
use std::path::PathBuf;

use crate::{
    core::{config::ConfigError, good_file::GoodFileResolver},
    infra::{fs::host_name, t},
};

pub fn execute(
    locale: &str,
    base: &str,
    dir: PathBuf,
    compopts: Option<String>,
    suffixes: Vec<String>,
) -> Result<()> {
    let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    let machine = var("CHPL_TEST_MACHINE").unwrap_or_else(host_name);
    let machine = machine.split('.').next().unwrap_or_default().to_string();
    let platform = var("CHPL_TARGET_PLATFORM").unwrap_or_else(|| std::env::consts::OS.to_string());
    let comm = var("CHPL_COMM").unwrap_or_else(|| "none".to_string());
    let locale_model = var("CHPL_LOCALE_MODEL").unwrap_or_else(|| "flat".to_string());

    let compopts = match compopts {
        Some(opts) => shlex::split(&opts)
            .ok_or_else(|| ConfigError::new(format!("Cannot parse compile options '{opts}'")))?,
        None => Vec::new(),
    };

    let mut suffixes = suffixes;
    if suffixes.is_empty() {
        suffixes.push(String::new());
    }
    let suffix_refs: Vec<&str> = suffixes.iter().map(String::as_str).collect();

    let resolver = GoodFileResolver::with_facts(&dir, &machine, &platform, &comm, &locale_model);
    let good = resolver.resolve(base, &compopts, &suffix_refs);
    if good.is_found() {
        println!("{}", good.name());
    } else {
        println!("{}", t!("good_file_missing", locale = locale, name = good.name()).yellow());
    }
    Ok(())
}
