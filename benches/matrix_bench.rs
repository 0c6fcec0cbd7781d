use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::path::Path;
use sub_test::core::good_file::GoodFileResolver;
use sub_test::core::options::{CompileVariant, build_matrix, parse_option_lines};

const COMPOPTS: &str = "# variants\n--fast\n--no-checks -sn=4 # one.good\n\n-sa=1 --warn\n--baseline\n";

fn bench_option_matrix(c: &mut Criterion) {
    let directory = parse_option_lines("--fast\n--no-local\n-sdebug=true\n", false);
    let test = parse_option_lines(COMPOPTS, false);

    c.bench_function("build_matrix", |b| {
        b.iter(|| build_matrix(black_box(&directory), black_box(&test)))
    });

    let matrix = build_matrix(&directory, &test);
    c.bench_function("parse_compile_variants", |b| {
        b.iter(|| {
            matrix
                .iter()
                .map(|entry| CompileVariant::parse(black_box(entry)))
                .count()
        })
    });
}

fn bench_good_file_candidates(c: &mut Criterion) {
    let resolver = GoodFileResolver::with_facts(Path::new("."), "host", "linux64", "gasnet", "flat");
    let compopts = vec!["--no-local".to_string(), "--fast".to_string()];

    c.bench_function("good_file_candidates", |b| {
        b.iter(|| resolver.candidates(black_box("hello"), black_box(&compopts), black_box(".1-2")))
    });
}

criterion_group!(benches, bench_option_matrix, bench_good_file_candidates);
criterion_main!(benches);
