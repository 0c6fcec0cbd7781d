//! # Command Module Unit Tests / Command 模块单元测试
//!
//! Tests for the process runner: merged output, deadlines, stdin sources and
//! output trimming.
//!
//! 进程运行器的测试：合并输出、超时、标准输入来源和输出截断。

mod common;

use common::write_script;
use std::time::{Duration, Instant};
use sub_test::core::config::TimeoutStrategy;
use sub_test::infra::command::{
    Completion, ProcessRequest, ProcessRunner, StdinSource, TRIM_LIMIT, shell_escape, trim_output,
};
use tempfile::tempdir;

fn runner() -> ProcessRunner {
    ProcessRunner::new(TimeoutStrategy::Internal)
}

#[cfg(test)]
mod runner_tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_and_stderr_share_one_stream() {
        let request = ProcessRequest::new("sh").args(["-c", "echo one; echo two >&2; echo three"]);
        let output = runner().run(&request).await.unwrap();
        assert_eq!(output.text(), "one\ntwo\nthree\n");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_exit_status_is_reported() {
        let request = ProcessRequest::new("sh").args(["-c", "exit 3"]);
        let output = runner().run(&request).await.unwrap();
        assert_eq!(output.completion, Completion::Exited(Some(3)));
        assert!(!output.success());
        assert!(!output.timed_out());
    }

    #[tokio::test]
    async fn test_deadline_kills_and_keeps_partial_output() {
        let request = ProcessRequest::new("sh")
            .args(["-c", "echo before; sleep 30; echo after"])
            .timeout(Some(Duration::from_secs(1)))
            .kill_grace(Duration::from_secs(1));

        let started = Instant::now();
        let output = runner().run(&request).await.unwrap();

        assert!(output.timed_out());
        assert!(output.text().contains("before"));
        assert!(!output.text().contains("after"));
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_stdin_file_and_env_overlay() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "piped\n").unwrap();

        let request = ProcessRequest::new("sh")
            .args(["-c", "cat; echo \"$SUB_TEST_VALUE\"; pwd"])
            .current_dir(dir.path())
            .envs(&[("SUB_TEST_VALUE".to_string(), "overlaid".to_string())])
            .stdin(StdinSource::File(input));
        let output = runner().run(&request).await.unwrap();
        let text = output.text();
        let canonical = std::fs::canonicalize(dir.path()).unwrap();

        assert!(text.starts_with("piped\noverlaid\n"));
        assert!(text.trim_end().ends_with(&canonical.display().to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_io_error() {
        let request = ProcessRequest::new("/definitely/not/a/program");
        assert!(runner().run(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_timedexec_sentinel_means_timeout() {
        let dir = tempdir().unwrap();
        let helper = dir.path().join("timedexec");
        write_script(&helper, "#!/bin/sh\necho \"limit $1\"\nexit 222\n");

        let request = ProcessRequest::new("true").timeout(Some(Duration::from_secs(5)));
        let output = ProcessRunner::new(TimeoutStrategy::TimedExec(helper))
            .run(&request)
            .await
            .unwrap();

        assert!(output.timed_out());
        assert!(output.text().contains("limit 5"));
    }
}

#[cfg(test)]
mod formatting_tests {
    use super::*;

    #[test]
    fn test_small_output_is_not_trimmed() {
        assert_eq!(trim_output(b"short\n"), "short\n");
    }

    #[test]
    fn test_large_output_keeps_head_and_tail() {
        let mut big = vec![b'h'; TRIM_LIMIT];
        big.extend(vec![b'm'; TRIM_LIMIT]);
        big.extend(vec![b't'; TRIM_LIMIT]);
        let trimmed = trim_output(&big);
        assert!(trimmed.len() < big.len());
        assert!(trimmed.starts_with('h'));
        assert!(trimmed.trim_end().ends_with('t'));
    }

    #[test]
    fn test_shell_escape_quotes_special_characters() {
        assert_eq!(shell_escape("plain"), "plain");
        assert_ne!(shell_escape("two words"), "two words");
    }
}
