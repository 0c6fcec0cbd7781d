//! # Golden-File Resolver Unit Tests / Golden 文件解析器单元测试

mod common;

use common::write_file;
use sub_test::core::good_file::{GoodFile, GoodFileResolver};
use tempfile::tempdir;

fn resolver(dir: &std::path::Path) -> GoodFileResolver {
    GoodFileResolver::with_facts(dir, "testhost", "linux64", "gasnet", "flat")
}

#[test]
fn test_candidate_chain_order() {
    let dir = tempdir().unwrap();
    let chain = resolver(dir.path()).candidates("t", &["--no-local".to_string()], ".1-2");
    assert_eq!(
        chain,
        vec![
            "t.testhost.1-2.good",
            "t.no-local.1-2.good",
            "t.comm-gasnet.lm-flat.1-2.good",
            "t.comm-gasnet.1-2.good",
            "t.lm-flat.1-2.good",
            "t.linux64.1-2.good",
            "t.1-2.good",
        ]
    );
}

#[test]
fn test_no_local_candidate_only_with_flag() {
    let dir = tempdir().unwrap();
    let chain = resolver(dir.path()).candidates("t", &[], "");
    assert!(!chain.iter().any(|c| c.contains("no-local")));
    assert_eq!(chain.last().map(String::as_str), Some("t.good"));
}

#[test]
fn test_most_specific_existing_file_wins() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "t.good", "");
    write_file(dir.path(), "t.linux64.good", "");
    write_file(dir.path(), "t.comm-gasnet.good", "");

    let found = resolver(dir.path()).resolve("t", &[], &[""]);
    assert_eq!(found, GoodFile::Found("t.comm-gasnet.good".to_string()));
}

#[test]
fn test_variant_suffix_falls_back_to_plain_chain() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "t.good", "");
    let r = resolver(dir.path());

    assert_eq!(r.resolve("t", &[], &[".1-2", ""]), GoodFile::Found("t.good".to_string()));

    write_file(dir.path(), "t.1-2.good", "");
    assert_eq!(r.resolve("t", &[], &[".1-2", ""]), GoodFile::Found("t.1-2.good".to_string()));
}

#[test]
fn test_missing_reports_last_candidate() {
    let dir = tempdir().unwrap();
    let missing = resolver(dir.path()).resolve("nothing", &[], &[".1-1", ""]);
    assert!(!missing.is_found());
    assert_eq!(missing.name(), "nothing.good");
}
