//! # Per-Test Marker Files / 测试级标记文件
//!
//! Files named `<base>.<suffix>` next to a test source configure or filter
//! that test. The suffix is mapped once, at discovery time, onto a closed set
//! of marker kinds. Performance mode relabels several suffixes (`.compopts`
//! becomes `.perfcompopts`), and interpreter mode uses `.ifuture`.
//!
//! 测试源文件旁名为 `<base>.<suffix>` 的文件用于配置或过滤该测试。
//! 后缀在发现阶段一次性映射到封闭的标记类型集合。性能模式会重新标记部分后缀，
//! 解释器模式使用 `.ifuture`。

use std::collections::BTreeMap;

use crate::core::config::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKind {
    Good,
    Bad,
    CompOpts,
    ChpldocOpts,
    ExecOpts,
    CompEnv,
    ExecEnv,
    NoTest,
    SkipIf,
    SuppressIf,
    Future,
    NoExec,
    PreComp,
    PreDiff,
    PreExec,
    Stdin,
    Timeout,
    KillTimeout,
    CatFiles,
    LastCompOpts,
    LastExecOpts,
    NumLocales,
    PerfKeys,
    PerfTimeExec,
    PerfNumTrials,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 25] = [
        MarkerKind::Good,
        MarkerKind::Bad,
        MarkerKind::CompOpts,
        MarkerKind::ChpldocOpts,
        MarkerKind::ExecOpts,
        MarkerKind::CompEnv,
        MarkerKind::ExecEnv,
        MarkerKind::NoTest,
        MarkerKind::SkipIf,
        MarkerKind::SuppressIf,
        MarkerKind::Future,
        MarkerKind::NoExec,
        MarkerKind::PreComp,
        MarkerKind::PreDiff,
        MarkerKind::PreExec,
        MarkerKind::Stdin,
        MarkerKind::Timeout,
        MarkerKind::KillTimeout,
        MarkerKind::CatFiles,
        MarkerKind::LastCompOpts,
        MarkerKind::LastExecOpts,
        MarkerKind::NumLocales,
        MarkerKind::PerfKeys,
        MarkerKind::PerfTimeExec,
        MarkerKind::PerfNumTrials,
    ];

    /// The file suffix (with leading dot) this kind uses under `env`.
    /// `None` when the kind only exists in performance mode and `env` is not.
    ///
    /// 在 `env` 下该类型使用的文件后缀（含前导点）。
    pub fn suffix(self, env: &Environment) -> Option<String> {
        let fixed = |s: &str| Some(s.to_string());
        match self {
            MarkerKind::Good => fixed(".good"),
            MarkerKind::Bad => fixed(".bad"),
            MarkerKind::ChpldocOpts => fixed(".chpldocopts"),
            MarkerKind::NoTest => fixed(".notest"),
            MarkerKind::SkipIf => fixed(".skipif"),
            MarkerKind::SuppressIf => fixed(".suppressif"),
            MarkerKind::Future => fixed(env.future_suffix()),
            MarkerKind::NoExec => fixed(".noexec"),
            MarkerKind::PreComp => fixed(".precomp"),
            MarkerKind::PreDiff => fixed(".prediff"),
            MarkerKind::PreExec => fixed(".preexec"),
            MarkerKind::Stdin => fixed(".stdin"),
            MarkerKind::KillTimeout => fixed(".killtimeout"),
            MarkerKind::CatFiles => fixed(".catfiles"),
            MarkerKind::LastCompOpts => fixed(".lastcompopts"),
            MarkerKind::LastExecOpts => fixed(".lastexecopts"),
            MarkerKind::CompOpts => Some(env.perf_suffix("compopts")),
            MarkerKind::ExecOpts => Some(env.perf_suffix("execopts")),
            MarkerKind::CompEnv => Some(env.perf_suffix("compenv")),
            MarkerKind::ExecEnv => Some(env.perf_suffix("execenv")),
            MarkerKind::Timeout => Some(env.perf_suffix("timeout")),
            MarkerKind::NumLocales => Some(env.perf_suffix("numlocales")),
            MarkerKind::PerfKeys => Some(env.perf_suffix("keys")),
            MarkerKind::PerfTimeExec => env.is_perf().then(|| env.perf_suffix("timeexec")),
            MarkerKind::PerfNumTrials => env.is_perf().then(|| env.perf_suffix("numtrials")),
        }
    }

    /// Maps a file suffix such as `.execopts` back onto its marker kind.
    pub fn from_suffix(suffix: &str, env: &Environment) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.suffix(env).as_deref() == Some(suffix))
    }
}

/// The marker files present for one test base name.
/// 某个测试基础名称对应的已存在标记文件。
#[derive(Debug, Clone, Default)]
pub struct TestFiles {
    markers: BTreeMap<MarkerKind, String>,
}

impl TestFiles {
    /// Picks the `<base>.<suffix>` files out of a directory listing. Names with
    /// further dots after the base (`<base>.x.good`) are not markers.
    ///
    /// 从目录列表中挑出 `<base>.<suffix>` 文件。基础名之后还有额外点号的名称不是标记文件。
    pub fn collect(entries: &[String], base: &str, env: &Environment) -> Self {
        let prefix = format!("{base}.");
        let markers = entries
            .iter()
            .filter_map(|name| {
                let rest = name.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('.') {
                    return None;
                }
                let kind = MarkerKind::from_suffix(&format!(".{rest}"), env)?;
                Some((kind, name.clone()))
            })
            .collect();
        Self { markers }
    }

    pub fn get(&self, kind: MarkerKind) -> Option<&str> {
        self.markers.get(&kind).map(String::as_str)
    }

    pub fn has(&self, kind: MarkerKind) -> bool {
        self.markers.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = MarkerKind> + '_ {
        self.markers.keys().copied()
    }
}
