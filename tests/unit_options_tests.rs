//! # Options Module Unit Tests / Options 模块单元测试
//!
//! Option-file parsing, variant parsing and matrix expansion.
//!
//! 选项文件解析、变体解析和矩阵展开。

mod common;

use common::{Fixture, write_file, write_script};
use sub_test::core::options::{
    BLANK_OPTION, CompileVariant, DirectoryOptions, ExecVariant, build_matrix, merge_env,
    parse_env_assignments, parse_option_lines, read_integer_file, read_option_file,
};
use sub_test::reporting::Reporter;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod matrix_tests {
    use super::*;

    #[test]
    fn test_empty_lists_degenerate_to_one_blank_variant() {
        assert_eq!(build_matrix(&[], &[]), vec![BLANK_OPTION.to_string()]);
    }

    #[test]
    fn test_cross_product_size_and_order() {
        let matrix = build_matrix(&strings(&["--fast", "--debug"]), &strings(&["-sx=1", "-sx=2", "-sx=3"]));
        assert_eq!(matrix.len(), 6);
        assert_eq!(matrix[0], "--fast -sx=1");
        assert_eq!(matrix[5], "--debug -sx=3");
    }

    #[test]
    fn test_one_sided_lists_keep_their_entries() {
        let matrix = build_matrix(&strings(&[BLANK_OPTION]), &strings(&["--a", "--b"]));
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].trim(), "--a");
        assert_eq!(matrix[1].trim(), "--b");
    }
}

#[cfg(test)]
mod variant_tests {
    use super::*;

    #[test]
    fn test_compile_variant_with_good_override() {
        let variant = CompileVariant::parse("--fast #fast.good");
        assert_eq!(variant.opts.trim(), "--fast");
        assert_eq!(variant.good_override.as_deref(), Some("fast.good"));
        assert_eq!(variant.tokens(), vec!["--fast".to_string()]);
        assert!(!variant.is_blank());
    }

    #[test]
    fn test_blank_compile_variant() {
        let variant = CompileVariant::parse(BLANK_OPTION);
        assert!(variant.is_blank());
        assert!(variant.good_override.is_none());
        assert!(variant.tokens().is_empty());
    }

    #[test]
    fn test_exec_variant_takes_first_token_after_hash() {
        let variant = ExecVariant::parse("--n=3 # three.good trailing words");
        assert_eq!(variant.opts, "--n=3");
        assert_eq!(variant.good_override.as_deref(), Some("three.good"));

        let plain = ExecVariant::parse("  --quiet  ");
        assert_eq!(plain.opts, "--quiet");
        assert!(plain.good_override.is_none());
    }
}

#[cfg(test)]
mod file_tests {
    use super::*;

    #[test]
    fn test_comments_and_blank_lines_are_dropped() {
        let content = "# comment\n\n--fast\n   \n  # indented comment\n--debug\n";
        assert_eq!(parse_option_lines(content, true), strings(&["--fast", "--debug"]));
        // Without leading-space handling only column-one comments are dropped.
        assert_eq!(
            parse_option_lines(content, false),
            strings(&["--fast", "  # indented comment", "--debug"])
        );
    }

    #[test]
    fn test_unknown_variables_stay_verbatim() {
        let lines = parse_option_lines("--path=$SUB_TEST_SURELY_UNSET_VARIABLE\n", true);
        assert_eq!(lines, strings(&["--path=$SUB_TEST_SURELY_UNSET_VARIABLE"]));
    }

    #[test]
    fn test_env_assignments_merge_in_order() {
        let base = parse_env_assignments(&strings(&["A=1", "B=2", "not an assignment"]));
        let overrides = parse_env_assignments(&strings(&["B=3", "C=4"]));
        let merged = merge_env(&base, &overrides);
        assert_eq!(
            merged,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "3".to_string()),
                ("C".to_string(), "4".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_executable_option_file_is_run() {
        let fixture = Fixture::new();
        let env = fixture.environment().await;
        let dir = fixture.test_dir("opts");
        let path = dir.join("gen.compopts");
        write_script(&path, "#!/bin/sh\necho --generated\necho '# skipped'\n");

        let lines = read_option_file(&path, &env, true).await.unwrap();
        assert_eq!(lines, strings(&["--generated"]));
    }

    #[tokio::test]
    async fn test_malformed_integer_file_is_a_config_error() {
        let fixture = Fixture::new();
        let env = fixture.environment().await;
        let dir = fixture.test_dir("opts");
        let good = write_file(&dir, "ok.timeout", "# seconds\n42\n");
        let bad = write_file(&dir, "bad.timeout", "forty-two\n");

        assert_eq!(read_integer_file(&good, &env, "opts").await.unwrap(), 42);
        let err = read_integer_file(&bad, &env, "opts").await.unwrap_err();
        assert!(err.to_string().contains("Invalid integer value in"));
    }

    #[tokio::test]
    async fn test_directory_options_load() {
        let mut fixture = Fixture::new();
        fixture.set("CHPLDOCOPTS", "--docs-extra");
        let env = fixture.environment().await;
        let dir = fixture.test_dir("diropts");
        write_file(&dir, "COMPOPTS", "--fast\n--debug\n");
        write_file(&dir, "EXECOPTS", "--verbose --n=2\n");
        write_file(&dir, "TIMEOUT", "77\n");
        write_file(&dir, "NOEXEC", "");
        write_file(&dir, "EXECENV", "FOO=bar\n");
        write_file(&dir, "CATFILES", "a.txt b.txt\n");
        write_script(&dir.join("PREDIFF"), "#!/bin/sh\n");

        let opts = DirectoryOptions::load(&dir, &env, &Reporter::buffered()).await.unwrap();
        assert_eq!(opts.compopts, strings(&["--fast", "--debug"]));
        assert_eq!(opts.execopts, strings(&["--verbose", "--n=2"]));
        assert_eq!(opts.timeout, 77);
        assert_eq!(opts.kill_timeout, 10);
        assert!(!opts.execute);
        assert!(opts.valgrind_binary);
        assert_eq!(opts.execenv, vec![("FOO".to_string(), "bar".to_string())]);
        assert_eq!(opts.catfiles, strings(&["a.txt", "b.txt"]));
        assert_eq!(opts.chpldoc_opts, strings(&["--docs-extra"]));
        assert!(opts.prediff.is_some());
        assert!(opts.precomp.is_none());
    }
}
