#[path = "../tests/common/mod.rs"]
mod common;

use std::sync::OnceLock;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use formfill::content::{ExtractOptions, extract_runs};
use formfill::fields::{FieldNameMapper, ValueResolver};
use formfill::overlay::build_output;
use formfill::parser::load_permissive;
use formfill::scan::TokenScanner;
use formfill::{EngineConfig, detect};

use crate::common::{RunSpec, TemplateBuilder, sample_datasets};

const PAGE_COUNTS: [usize; 3] = [1, 8, 32];

/// A dense questionnaire page: labels with embedded tokens and a row of choice markers.
fn template(pages: usize) -> &'static [u8] {
    static CACHE: OnceLock<Vec<(usize, Vec<u8>)>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| {
        PAGE_COUNTS
            .iter()
            .map(|&n| {
                let labels: Vec<String> = (0..40)
                    .map(|row| match row % 4 {
                        0 => format!("Applicant {row}: {{firstName}} {{lastName}}"),
                        1 => format!("Born {{dob}} in {{city}} ({row})"),
                        2 => format!("{{radio_placard_type_{}}} permanent", row % 3 + 1),
                        _ => format!("Physician {{doctorName}} NPI {{npi}} line {row}"),
                    })
                    .collect();
                let runs: Vec<RunSpec<'_>> = labels
                    .iter()
                    .enumerate()
                    .map(|(row, text)| (text.as_str(), 54.0, 740.0 - row as f64 * 17.0, 9.0))
                    .collect();
                let builder = (0..n).fold(TemplateBuilder::new(), |b, _| b.page(&runs));
                (n, builder.build())
            })
            .collect()
    });
    cache
        .iter()
        .find(|(n, _)| *n == pages)
        .map(|(_, bytes)| bytes.as_slice())
        .expect("benchmark template")
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for pages in PAGE_COUNTS {
        let bytes = template(pages);
        group.bench_with_input(BenchmarkId::from_parameter(pages), bytes, |b, bytes| {
            b.iter(|| {
                let doc = load_permissive(bytes).expect("parse");
                black_box(doc.objects.len());
            })
        });
    }
    group.finish();
}

fn bench_extract_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_runs");
    for pages in PAGE_COUNTS {
        let doc = load_permissive(template(pages)).expect("parse");
        group.bench_function(BenchmarkId::from_parameter(pages), move |b| {
            b.iter(|| {
                let runs = extract_runs(&doc, ExtractOptions::default());
                black_box(runs.len());
            })
        });
    }
    group.finish();
}

fn bench_token_scan(c: &mut Criterion) {
    let config = EngineConfig::default();
    let mapper = FieldNameMapper::new(&config.fields);
    let datasets = sample_datasets();
    let mut group = c.benchmark_group("token_scan");
    for pages in PAGE_COUNTS {
        let doc = load_permissive(template(pages)).expect("parse");
        let page_runs: Vec<_> = extract_runs(&doc, ExtractOptions::default())
            .into_iter()
            .map(|runs| (runs, 792.0))
            .collect();
        group.bench_function(BenchmarkId::from_parameter(pages), |b| {
            b.iter(|| {
                let scanner = TokenScanner::new(&config, &mapper, ValueResolver::new(&datasets));
                let result = scanner.scan(&page_runs);
                black_box(result.fields.len() + result.radios.len());
            })
        });
    }
    group.finish();
}

fn bench_build_output(c: &mut Criterion) {
    let config = EngineConfig::default();
    let mapper = FieldNameMapper::new(&config.fields);
    let datasets = sample_datasets();
    let mut group = c.benchmark_group("build_output");
    for pages in PAGE_COUNTS {
        let bytes = template(pages);
        let detection = detect(bytes, &config, &mapper, &datasets).expect("detect");
        group.bench_function(BenchmarkId::from_parameter(pages), |b| {
            b.iter(|| {
                let out = build_output(bytes, &detection.mode, &config).expect("build");
                black_box(out.len());
            })
        });
    }
    group.finish();
}

fn config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
}

criterion_group! {
    name = benches;
    config = config();
    targets = bench_parse, bench_extract_runs, bench_token_scan, bench_build_output
}
criterion_main!(benches);
