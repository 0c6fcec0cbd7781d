//! # Config Module Unit Tests / Config 模块单元测试
//!
//! This module contains unit tests for the environment snapshot: defaults,
//! overrides and the configuration errors that abort a directory run.
//!
//! 此模块包含环境快照的单元测试：默认值、覆盖以及会中止目录运行的配置错误。

mod common;

use common::{Fixture, write_script};
use sub_test::core::config::{ConfigError, Environment, FuturesMode, LauncherTimeout, TimeoutStrategy};
use sub_test::core::models::CompilerKind;

async fn try_environment(fixture: &Fixture) -> anyhow::Result<Environment> {
    let vars = fixture.vars.clone();
    Environment::from_lookup(&fixture.compiler(), move |key| vars.get(key).cloned()).await
}

#[cfg(test)]
mod default_tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults() {
        let fixture = Fixture::new();
        let env = fixture.environment().await;

        assert_eq!(env.compiler_kind, CompilerKind::Chpl);
        assert!(env.compiler.is_absolute());
        assert_eq!(env.machine, "testhost");
        assert_eq!(env.platform, "linux64");
        assert_eq!(env.launcher, "none");
        assert_eq!(env.locale_model, "flat");
        assert_eq!(env.global_timeout, 300);
        assert_eq!(env.futures_mode, FuturesMode::None);
        assert!(env.honor_notest);
        assert!(env.honor_skipif);
        assert!(env.redirect_stdin);
        assert!(!env.is_perf());
        assert_eq!(env.num_trials, 1);
        assert!(env.exec_limit.is_none());
        assert_eq!(env.timeout_strategy, TimeoutStrategy::Internal);
        assert_eq!(env.future_suffix(), ".future");
    }

    #[tokio::test]
    async fn test_directory_label_is_relative_to_test_root() {
        let fixture = Fixture::new();
        let env = fixture.environment().await;
        let dir = fixture.test_dir("a/b");
        assert_eq!(env.directory_label(&dir), "a/b");
    }

    #[tokio::test]
    async fn test_valgrind_raises_default_timeout() {
        let mut fixture = Fixture::new();
        fixture.set("CHPL_TEST_VGRND_EXE", "on");
        let env = fixture.environment().await;
        assert_eq!(env.global_timeout, 1000);
        assert!(env.valgrind.execute);
        assert_eq!(env.valgrind.opts, vec!["--tool=memcheck".to_string()]);
    }

    #[tokio::test]
    async fn test_option_variables_are_tokenised() {
        let mut fixture = Fixture::new();
        fixture
            .set("COMPOPTS", "--fast -s 'msg=hello world'")
            .set("EXECOPTS", "--n=2")
            .set("LAUNCHCMD", "wrapper --flag");
        let env = fixture.environment().await;
        assert_eq!(env.env_compopts, vec!["--fast", "-s", "msg=hello world"]);
        assert_eq!(env.env_execopts, Some(vec!["--n=2".to_string()]));
        assert_eq!(env.launch_cmd, Some(vec!["wrapper".to_string(), "--flag".to_string()]));
    }

    #[tokio::test]
    async fn test_perf_file_names() {
        let mut fixture = Fixture::new();
        let perf_dir = fixture.root.path().join("perf");
        fixture
            .set("CHPL_TEST_PERF", "on")
            .set("CHPL_TEST_PERF_LABEL", "perf")
            .set("CHPL_TEST_PERF_DIR", &perf_dir.display().to_string())
            .set("CHPL_TEST_PERF_DATE", "01/02/24");
        let env = fixture.environment().await;
        assert_eq!(env.perf_suffix("keys"), ".perfkeys");
        assert_eq!(env.perf_dir_file("compopts"), "PERFCOMPOPTS");
        assert_eq!(env.perf.as_ref().map(|p| p.date.as_str()), Some("01/02/24"));
    }

    #[test]
    fn test_walltime_formatting() {
        assert_eq!(LauncherTimeout::Pbs.walltime_args(3725), vec!["--walltime=01:02:05"]);
        assert_eq!(LauncherTimeout::parse("slurm"), Ok(LauncherTimeout::Slurm));
        assert!(LauncherTimeout::parse("lsf").is_err());
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    fn config_message(err: anyhow::Error) -> String {
        err.downcast_ref::<ConfigError>()
            .map(|e| e.message().to_string())
            .expect("expected a ConfigError")
    }

    #[tokio::test]
    async fn test_missing_util_dir() {
        let mut fixture = Fixture::new();
        fixture.vars.remove("CHPL_TEST_UTIL_DIR");
        let err = try_environment(&fixture).await.unwrap_err();
        assert!(config_message(err).contains("Cannot find test util directory"));
    }

    #[tokio::test]
    async fn test_half_configured_perf_mode() {
        let mut fixture = Fixture::new();
        fixture.set("CHPL_TEST_PERF", "on");
        let err = try_environment(&fixture).await.unwrap_err();
        assert!(config_message(err).contains("CHPL_TEST_PERF_DIR"));
    }

    #[tokio::test]
    async fn test_timedexec_must_be_executable() {
        let mut fixture = Fixture::new();
        fixture.set("CHPL_TEST_TIMEDEXEC", "on");
        let err = try_environment(&fixture).await.unwrap_err();
        assert!(config_message(err).contains("timedexec"));

        write_script(&fixture.util_test_dir().join("timedexec"), "#!/bin/sh\n");
        let env = try_environment(&fixture).await.unwrap();
        assert!(matches!(env.timeout_strategy, TimeoutStrategy::TimedExec(_)));
    }

    #[tokio::test]
    async fn test_bad_numbers_and_modes() {
        let mut fixture = Fixture::new();
        fixture.set("CHPL_TEST_TIMEOUT", "soon");
        assert!(try_environment(&fixture).await.is_err());

        let mut fixture = Fixture::new();
        fixture.set("CHPL_TEST_FUTURES", "7");
        assert!(try_environment(&fixture).await.is_err());
    }

    #[tokio::test]
    async fn test_system_hooks_must_be_executable() {
        let mut fixture = Fixture::new();
        let missing = fixture.root.path().join("no-such-prediff");
        fixture.set("CHPL_SYSTEM_PREDIFF", &missing.display().to_string());
        let err = try_environment(&fixture).await.unwrap_err();
        assert!(config_message(err).contains("system-wide prediff"));
    }

    #[test]
    fn test_sentinel_exit_code() {
        let sum: u32 = "CHAPEL".bytes().map(u32::from).sum();
        assert_eq!(u32::from(ConfigError::EXIT_CODE), sum % 256);
    }
}
