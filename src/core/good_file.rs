//! # Golden-File Resolution / Golden 文件解析
//!
//! Finds the expected-output file for a test through an ordered fallback
//! chain, from the most environment-specific name to the plain `<base>.good`.
//! Resolution is stateless: every lookup re-reads the file system.
//!
//! 通过有序的回退链为测试查找期望输出文件，从最依赖环境的名称到普通的 `<base>.good`。
//! 解析是无状态的：每次查找都会重新读取文件系统。

use std::path::{Path, PathBuf};

use crate::core::config::Environment;

/// The outcome of a lookup. Both variants carry a file name relative to the test directory.
/// 查找结果。两个变体都携带相对于测试目录的文件名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoodFile {
    Found(String),
    /// Nothing matched; carries the last candidate tried, for the error message.
    Missing(String),
}

impl GoodFile {
    pub fn name(&self) -> &str {
        match self {
            GoodFile::Found(name) | GoodFile::Missing(name) => name,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, GoodFile::Found(_))
    }
}

#[derive(Debug, Clone)]
pub struct GoodFileResolver {
    dir: PathBuf,
    machine: String,
    platform: String,
    comm: String,
    locale_model: String,
}

impl GoodFileResolver {
    pub fn new(dir: &Path, env: &Environment) -> Self {
        Self {
            dir: dir.to_path_buf(),
            machine: env.machine.clone(),
            platform: env.platform.clone(),
            comm: env.comm.clone(),
            locale_model: env.locale_model.clone(),
        }
    }

    /// Builds a resolver from explicit environment facts.
    pub fn with_facts(dir: &Path, machine: &str, platform: &str, comm: &str, locale_model: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            machine: machine.to_string(),
            platform: platform.to_string(),
            comm: comm.to_string(),
            locale_model: locale_model.to_string(),
        }
    }

    /// The candidate chain for one suffix, most specific first.
    ///
    /// 单个后缀的候选链，最具体的在前。
    pub fn candidates(&self, base: &str, compopts: &[String], suffix: &str) -> Vec<String> {
        let mut chain = vec![format!("{base}.{}{suffix}.good", self.machine)];
        if compopts.iter().any(|opt| opt == "--no-local") {
            chain.push(format!("{base}.no-local{suffix}.good"));
        }
        chain.push(format!("{base}.comm-{}.lm-{}{suffix}.good", self.comm, self.locale_model));
        chain.push(format!("{base}.comm-{}{suffix}.good", self.comm));
        chain.push(format!("{base}.lm-{}{suffix}.good", self.locale_model));
        chain.push(format!("{base}.{}{suffix}.good", self.platform));
        chain.push(format!("{base}{suffix}.good"));
        chain
    }

    /// First existing candidate, trying every chain of `suffixes` in order.
    ///
    /// 按顺序尝试 `suffixes` 的每条候选链，返回第一个存在的候选文件。
    pub fn resolve(&self, base: &str, compopts: &[String], suffixes: &[&str]) -> GoodFile {
        let mut last = format!("{base}.good");
        for suffix in suffixes {
            for candidate in self.candidates(base, compopts, suffix) {
                if self.dir.join(&candidate).is_file() {
                    return GoodFile::Found(candidate);
                }
                last = candidate;
            }
        }
        GoodFile::Missing(last)
    }
}
