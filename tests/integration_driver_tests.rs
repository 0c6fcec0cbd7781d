//! # Driver Integration Tests / 驱动集成测试
//!
//! End-to-end runs of the driver over small test directories built against a
//! fake shell-script compiler.
//!
//! 使用伪造的 shell 脚本编译器，对小型测试目录进行端到端的驱动运行测试。

mod common;

use common::{Fixture, write_file, write_script};
use sub_test::core::execution::{Driver, LauncherError, detect_launcher_error, exec_log_name};
use sub_test::core::models::{InfraKind, Outcome, RunRecord, Stage};
use sub_test::reporting::Reporter;

async fn run_dir(fixture: &Fixture, label: &str) -> (Vec<RunRecord>, String) {
    let env = fixture.environment().await;
    let reporter = Reporter::buffered();
    let mut driver = Driver::new(env, &fixture.test_dir(label), reporter.clone()).unwrap();
    driver.run().await.unwrap();
    (driver.into_records(), reporter.contents())
}

#[tokio::test]
async fn test_matching_output_succeeds_and_cleans_up() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("basic");
    write_file(&dir, "hello.chpl", "echo hello\n");
    write_file(&dir, "hello.good", "hello\n");

    let (records, log) = run_dir(&fixture, "basic").await;

    assert!(log.contains("[Starting subtest - "));
    assert!(log.contains("[test: basic/hello.chpl]"));
    assert!(log.contains("[Success compiling basic/hello]"));
    assert!(log.contains("[Success matching program output for basic/hello]"));
    assert!(log.contains("[Elapsed execution time for \"basic/hello\" - "));
    assert!(log.contains("[Finished subtest \"basic\" - "));

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Success);
    assert_eq!(records[0].stage, Stage::Execute);
    assert_eq!(records[0].test, "basic/hello");

    assert!(!dir.join("hello").exists(), "executable should be removed");
    assert!(!dir.join("hello.exec.out.tmp").exists(), "matching log should be removed");
}

#[tokio::test]
async fn test_mismatch_keeps_log_and_reports_error() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("mismatch");
    write_file(&dir, "wrong.chpl", "echo actual\n");
    write_file(&dir, "wrong.good", "expected\n");

    let (records, log) = run_dir(&fixture, "mismatch").await;

    assert!(log.contains("[Executing diff wrong.good wrong.exec.out.tmp]"));
    assert!(log.contains("[Error matching program output for mismatch/wrong]"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Mismatch);
    assert!(records[0].is_failure());
    assert_eq!(
        std::fs::read_to_string(dir.join("wrong.exec.out.tmp")).unwrap(),
        "actual\n"
    );
}

#[tokio::test]
async fn test_compile_error_is_compared_against_good_file() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("errors");
    write_file(&dir, "bad.chpl", "#compile-error bad.chpl:1: error: boom\n");
    write_file(&dir, "bad.good", "bad.chpl:1: error: boom\n");

    let (records, log) = run_dir(&fixture, "errors").await;

    assert!(log.contains("[Success matching compiler output for errors/bad]"));
    assert!(!log.contains("Executing program"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage, Stage::Compile);
    assert_eq!(records[0].outcome, Outcome::Success);
    assert!(!dir.join("bad.comp.out.tmp").exists());
}

#[tokio::test]
async fn test_execution_timeout_is_never_diffed() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("slow");
    write_file(&dir, "sleepy.chpl", "echo started\nsleep 20\necho finished\n");
    write_file(&dir, "sleepy.good", "started\nfinished\n");
    write_file(&dir, "sleepy.timeout", "1\n");

    let (records, log) = run_dir(&fixture, "slow").await;

    assert!(log.contains("[Overriding default timeout with 1]"));
    assert!(log.contains("[Error: Timed out executing program slow/sleepy]"));
    assert!(log.contains("[Execution output was as follows:]"));
    assert!(!log.contains("matching program output"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Timeout);
}

#[tokio::test]
async fn test_each_compile_variant_gets_its_own_build_and_log() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("compvars");
    write_file(&dir, "t.chpl", "echo hi\n");
    write_file(&dir, "t.compopts", "--warn\n--fast\n");
    write_file(&dir, "t.good", "hi\n");

    let (records, log) = run_dir(&fixture, "compvars").await;

    assert_eq!(log.matches("[Success compiling compvars/t]").count(), 2);
    assert!(log.contains("[Error matching program output for compvars/t (compopts: 1)]"));
    assert!(log.contains("[Success matching program output for compvars/t]"));

    assert_eq!(records.len(), 2);
    assert_eq!((records[0].compopts, records[0].outcome.clone()), (1, Outcome::Mismatch));
    assert_eq!((records[1].compopts, records[1].outcome.clone()), (2, Outcome::Success));

    // The compiler warning of the first build is seeded into its execution log.
    let first_log = std::fs::read_to_string(dir.join(exec_log_name("t", Some((1, 0))))).unwrap();
    assert_eq!(first_log, "warning: requested by compopts\nhi\n");
    assert!(!dir.join(exec_log_name("t", Some((2, 0)))).exists());
    assert!(!dir.join("t").exists());
}

#[tokio::test]
async fn test_compile_timeout_skips_execution_and_removes_executable() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("hang");
    write_file(&dir, "t.chpl", "#compile-hang\necho never\n");
    write_file(&dir, "t.good", "never\n");
    write_file(&dir, "t.timeout", "1\n");
    // A stale build from an earlier run.
    write_script(&dir.join("t"), "#!/bin/sh\necho stale\n");

    let (records, log) = run_dir(&fixture, "hang").await;

    assert!(log.contains("[Error: Timed out compilation for hang/t]"));
    assert!(!log.contains("Executing program"));
    assert!(!log.contains("matching"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage, Stage::Compile);
    assert_eq!(records[0].outcome, Outcome::Timeout);
    assert!(!dir.join("t").exists(), "executable should be removed");
}

#[tokio::test]
async fn test_helper_failure_is_contained_to_its_test() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("contained");
    write_file(&dir, "a.chpl", "echo a\n");
    write_file(&dir, "a.skipif", "False\n");
    write_file(&dir, "b.chpl", "echo b\n");
    write_file(&dir, "b.good", "b\n");
    // Executable, but its interpreter does not exist, so it cannot be spawned.
    write_script(
        &fixture.util_test_dir().join("testEnv"),
        "#!/nonexistent/interpreter\n",
    );

    let (records, log) = run_dir(&fixture, "contained").await;

    assert!(log.contains("[Error: abandoning contained/a: Failed to run "));
    assert!(log.contains("[Success matching program output for contained/b]"));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].test, "contained/a");
    assert_eq!(records[0].stage, Stage::Filter);
    assert_eq!(records[0].outcome, Outcome::InfraError(InfraKind::DriverIo));
    assert!(records[0].is_failure());
    assert_eq!(records[1].outcome, Outcome::Success);
}

#[tokio::test]
async fn test_execopts_variants_use_good_overrides() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("variants");
    write_file(&dir, "args.chpl", "echo \"got $1\"\n");
    write_file(&dir, "args.execopts", "one #first.good\ntwo #second.good\n");
    write_file(&dir, "first.good", "got one\n");
    write_file(&dir, "second.good", "got three\n");

    let (records, log) = run_dir(&fixture, "variants").await;

    assert!(log.contains("[Success matching program output for variants/args]"));
    assert!(log.contains("[Error matching program output for variants/args (execopts: 2)]"));
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].execopts, records[0].outcome.clone()), (1, Outcome::Success));
    assert_eq!((records[1].execopts, records[1].outcome.clone()), (2, Outcome::Mismatch));
    assert!(dir.join(exec_log_name("args", Some((0, 2)))).exists());
}

#[tokio::test]
async fn test_missing_good_file_is_an_infra_error() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("nogood");
    write_file(&dir, "lonely.chpl", "echo alone\n");

    let (records, log) = run_dir(&fixture, "nogood").await;

    assert!(log.contains("[Error cannot locate program output comparison file nogood/lonely.good]"));
    assert!(log.contains("alone"));
    assert_eq!(
        records[0].outcome,
        Outcome::InfraError(InfraKind::MissingGoodFile)
    );
}

#[tokio::test]
async fn test_filters_produce_skip_records() {
    let mut fixture = Fixture::new();
    fixture.set("CHPL_TEST_FUTURES", "0");
    let dir = fixture.test_dir("filters");
    write_file(&dir, "a_notest.chpl", "echo x\n");
    write_file(&dir, "a_notest.notest", "");
    write_file(&dir, "b_skipif.chpl", "echo x\n");
    write_file(&dir, "b_skipif.skipif", "True\n");
    write_file(&dir, "c_future.chpl", "echo x\n");
    write_file(&dir, "c_future.future", "bug: not yet\n");
    write_file(&dir, "d_broken.chpl", "echo x\n");
    write_file(&dir, "d_broken.skipif", "maybe\n");

    let (records, log) = run_dir(&fixture, "filters").await;

    assert!(log.contains("[Skipping notest test: filters/a_notest]"));
    assert!(log.contains("[Skipping test based on .skipif environment settings: filters/b_skipif]"));
    assert!(log.contains("[Skipping future test: filters/c_future]"));
    assert!(log.contains("[Error processing .skipif file filters/d_broken.skipif]"));
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(RunRecord::is_skipped));
    assert!(!log.contains("Executing compiler"));
}

#[tokio::test]
async fn test_future_results_are_prefixed_and_bad_file_matches() {
    let mut fixture = Fixture::new();
    fixture.set("CHPL_TEST_FUTURES", "1");
    let dir = fixture.test_dir("futures");
    write_file(&dir, "known.chpl", "echo wrong answer\n");
    write_file(&dir, "known.good", "right answer\n");
    write_file(&dir, "known.bad", "wrong answer\n");
    write_file(&dir, "known.future", "bug: arithmetic is off\n");

    let (records, log) = run_dir(&fixture, "futures").await;

    assert!(log.contains(
        "Future (bug: arithmetic is off) [Error matching program output for futures/known]"
    ));
    assert!(log.contains("[Clean match against .bad file for futures/known]"));
    assert_eq!(records.len(), 1);
    assert!(records[0].future);
    assert_eq!(records[0].outcome, Outcome::FutureSuppressed);
    assert!(!records[0].is_failure());
}

#[tokio::test]
async fn test_prediff_and_catfiles_shape_the_log() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("hooks");
    write_file(&dir, "stamp.chpl", "echo run 12345\n");
    write_file(&dir, "stamp.catfiles", "extra.txt\n");
    write_file(&dir, "extra.txt", "appended 9\n");
    write_script(
        &dir.join("stamp.prediff"),
        "#!/bin/sh\nsed 's/[0-9]/N/g' \"$2\" > \"$2.tmp\" && mv \"$2.tmp\" \"$2\"\n",
    );
    write_file(&dir, "stamp.good", "run NNNNN\nappended N\n");

    let (records, log) = run_dir(&fixture, "hooks").await;

    assert!(log.contains("[Concatenating extra files: stamp.catfiles]"));
    assert!(log.contains("[Executing prediff ./stamp.prediff]"));
    assert_eq!(records[0].outcome, Outcome::Success);
}

#[tokio::test]
async fn test_stdin_file_feeds_the_executable() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("input");
    write_file(&dir, "echoer.chpl", "cat\n");
    write_file(&dir, "echoer.stdin", "from stdin\n");
    write_file(&dir, "echoer.good", "from stdin\n");

    let (records, log) = run_dir(&fixture, "input").await;

    assert!(log.contains("< ./echoer.stdin]"));
    assert_eq!(records[0].outcome, Outcome::Success);
}

#[tokio::test]
async fn test_execution_limiter_slot_is_released() {
    let mut fixture = Fixture::new();
    let lock_dir = fixture.root.path().join("locks");
    fixture
        .set("CHPL_TEST_LIMIT_RUNNING_EXECUTABLES", "1")
        .set("CHPL_TEST_LIMIT_DIR", &lock_dir.display().to_string());
    let dir = fixture.test_dir("limited");
    write_file(&dir, "first.chpl", "echo 1\n");
    write_file(&dir, "first.good", "1\n");
    write_file(&dir, "second.chpl", "echo 2\n");
    write_file(&dir, "second.good", "2\n");

    let (records, log) = run_dir(&fixture, "limited").await;

    // With a single slot, the second run only proceeds if the first released it.
    assert!(!log.contains("execution slot"));
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.outcome == Outcome::Success));
    assert!(lock_dir.join("sub_test-exec-limit.0.lock").exists());
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let fixture = Fixture::new();
    let dir = fixture.test_dir("cleanup");
    write_file(&dir, "leftover", "binary");
    write_file(&dir, "leftover_real", "binary");

    let env = fixture.environment().await;
    let reporter = Reporter::buffered();
    let driver = Driver::new(env, &dir, reporter.clone()).unwrap();

    driver.cleanup("leftover").await;
    driver.cleanup("leftover").await;
    driver.cleanup("never-built").await;

    assert!(!dir.join("leftover").exists());
    assert!(!dir.join("leftover_real").exists());
    assert!(!reporter.contents().contains("Warning"));
}

#[tokio::test]
async fn test_missing_directory_is_a_config_error() {
    let fixture = Fixture::new();
    let env = fixture.environment().await;
    let missing = fixture.root.path().join("does-not-exist");
    assert!(Driver::new(env, &missing, Reporter::buffered()).is_err());
}

#[test]
fn test_launcher_error_detection() {
    assert_eq!(
        detect_launcher_error("x\nslurmstepd: Munge decode failed: Expired credential\n"),
        Some(LauncherError::Fault("Jira 18 -- Expired slurm credential for"))
    );
    assert_eq!(
        detect_launcher_error("=>> PBS: job killed: walltime 310 exceeded limit 300"),
        Some(LauncherError::Timeout)
    );
    assert_eq!(
        detect_launcher_error("slurmstepd: *** JOB 12 CANCELLED AT 2020 DUE TO TIME LIMIT ***"),
        Some(LauncherError::Timeout)
    );
    assert_eq!(detect_launcher_error("hello world\n"), None);
    assert_eq!(LauncherError::Timeout.message(), "Timed out executing program");
}
