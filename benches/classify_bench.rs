//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use treat::classify::classify;
use treat::query::SearchFields;
use treat::storage::{load_sample, LoadConfig, Storage};
use treat::{Fragment, Template};

// FE carries two edit bases per site, PE none; reads switch at a cycling site.
fn workload(n: usize) -> (Template, Vec<Fragment>) {
    let backbone = "ACGGACAGCCAGGAGCACGACAGACGGCAGAGCG";
    let sites = backbone.len() + 1;
    let render = |counts: &dyn Fn(usize) -> usize| -> String {
        let mut raw = String::new();
        for (i, base) in backbone.chars().enumerate() {
            raw.push_str(&"T".repeat(counts(i)));
            raw.push(base);
        }
        raw.push_str(&"T".repeat(counts(backbone.len())));
        raw
    };

    let config = LoadConfig::default();
    let records = vec![("fe".to_string(), render(&|_| 2)), ("pe".to_string(), render(&|_| 0))];
    let template = config.template("bench", records).expect("valid template");
    let reads = (0..n)
        .map(|i| {
            let switch = i % sites;
            let raw = render(&|s| if s >= switch { 2 } else { 0 });
            config.fragment(format!("read_{i}_{}", i % 7 + 1), raw.as_bytes())
        })
        .collect();
    (template, reads)
}

fn benchmark_classify(c: &mut Criterion) {
    let (template, reads) = workload(1_000);

    c.bench_function("classify_1000_fragments", |b| {
        b.iter(|| {
            for fragment in &reads {
                black_box(classify(black_box(fragment), &template).expect("classifies"));
            }
        });
    });
}

fn benchmark_load_and_scan(c: &mut Criterion) {
    let (template, reads) = workload(1_000);
    let config = LoadConfig::default().with_batch_size(250);

    c.bench_function("load_1000_fragments", |b| {
        b.iter_batched(
            || {
                let mut store = Storage::open_in_memory().expect("in-memory store");
                store.put_template("bench", &template).expect("template stored");
                (store, reads.clone())
            },
            |(mut store, reads)| load_sample(&mut store, "bench", "wt", reads, &config, None).expect("loads"),
            BatchSize::SmallInput,
        );
    });

    let mut store = Storage::open_in_memory().expect("in-memory store");
    store.put_template("bench", &template).expect("template stored");
    load_sample(&mut store, "bench", "wt", reads, &config, None).expect("loads");
    let fields = SearchFields::for_gene("bench").with_all();

    c.bench_function("scan_1000_alignments", |b| {
        b.iter(|| black_box(store.count(&fields).expect("scan succeeds")));
    });
}

criterion_group!(benches, benchmark_classify, benchmark_load_and_scan);
criterion_main!(benches);
