//! Criterion benchmarks for CSV loading and aggregation

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::path::PathBuf;

use claimdash::config::presets;
use claimdash::services::data_loader::SourceFile;
use claimdash::services::{Aggregator, DataLoaderService};
use claimdash::types::FilterSelection;

const CATEGORIES: [&str; 6] = [
    "Represented",
    "Unrepresented",
    "Litigant in person",
    "Claims management company",
    "Direct",
    "Other",
];

/// Synthetic extract in the dashboard layout: `years` of monthly rows per
/// category, with every tenth row duplicated
fn synthetic_csv(years: i32) -> Vec<u8> {
    let mut out = String::from(
        "year_month,representation_status,claims_volume,settlement_volume,total_settlement_value\n",
    );
    let mut n = 0u64;
    for year in 2015..2015 + years {
        for month in 1..=12 {
            for category in CATEGORIES {
                n += 1;
                let volume = 100 + (n * 37) % 900;
                let settled = volume / 2;
                let value = settled as f64 * (1500.0 + (n % 17) as f64 * 25.5);
                let line = format!(
                    "{}-{:02},{},{},{},\"{:.2}\"\n",
                    year, month, category, volume, settled, value
                );
                out.push_str(&line);
                if n % 10 == 0 {
                    out.push_str(&line);
                }
            }
        }
    }
    out.into_bytes()
}

fn bench_load(c: &mut Criterion) {
    let dataset = presets::claims();
    let bytes = synthetic_csv(10);
    let files = vec![SourceFile {
        path: PathBuf::from("oic_dashboard.csv"),
        category: None,
        bytes,
    }];

    let mut group = c.benchmark_group("loader");
    group.throughput(Throughput::Bytes(files[0].bytes.len() as u64));
    group.bench_function("parse_files", |b| {
        b.iter(|| DataLoaderService::parse_files(black_box(&dataset), black_box(&files)))
    });
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let dataset = presets::claims();
    let files = vec![SourceFile {
        path: PathBuf::from("oic_dashboard.csv"),
        category: None,
        bytes: synthetic_csv(10),
    }];
    let load = match DataLoaderService::parse_files(&dataset, &files) {
        Ok(load) => load,
        Err(e) => {
            eprintln!("Warning: synthetic extract failed to load: {}", e);
            return;
        }
    };
    let Some((first, last)) = load.month_range() else {
        return;
    };

    let combined = FilterSelection::combined(first, last);
    let breakdown = FilterSelection::with_categories(CATEGORIES, first, last);
    let recent = FilterSelection::with_categories(
        ["Represented"],
        last.add_months(-11).max(first),
        last,
    );

    let mut group = c.benchmark_group("aggregator");
    group.throughput(Throughput::Elements(load.rows.len() as u64));
    for (name, filter) in [
        ("combined", &combined),
        ("breakdown", &breakdown),
        ("last_12_one_category", &recent),
    ] {
        group.bench_with_input(BenchmarkId::new("aggregate", name), filter, |b, filter| {
            b.iter(|| Aggregator::aggregate(black_box(&load.rows), filter, &dataset.metric_set))
        });
    }
    group.bench_function("summary/combined", |b| {
        b.iter(|| Aggregator::summary(black_box(&load.rows), &combined, &dataset.metric_set))
    });
    group.finish();

}

criterion_group!(benches, bench_load, bench_aggregate);
criterion_main!(benches);
