//! Benchmarks for energy integration and listing parsing
//!
//! Run with: cargo bench

use chrono::{Duration, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gridfeed::listing::{parse_listing, ListingDialect};
use gridfeed::store::{RawSample, SampleStore, SqliteSampleStore};
use gridfeed::{derive_buckets, energy_sum, energy_sum_averages};
use reqwest::Url;
use rust_decimal::Decimal;
use tempfile::tempdir;

fn create_series(count: usize) -> Vec<Option<Decimal>> {
    (0..count)
        .map(|i| match i % 17 {
            0 => None,
            n => Some(Decimal::new(5000 + n as i64 * 37, 1)),
        })
        .collect()
}

fn create_samples(units: usize, intervals: i64) -> Vec<RawSample> {
    let start = NaiveDateTime::parse_from_str("2020-06-11 00:00", "%Y-%m-%d %H:%M").unwrap();

    (0..units)
        .flat_map(|u| {
            (0..intervals).map(move |i| {
                RawSample::new(
                    format!("UNIT{}", u),
                    start + Duration::minutes(5 * i),
                    Some(Decimal::new(1000 + i, 1)),
                )
            })
        })
        .collect()
}

fn bench_energy(c: &mut Criterion) {
    let mut group = c.benchmark_group("energy");

    for size in [13, 289, 8641] {
        let series = create_series(size);

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("energy_sum_{}", size), |b| {
            b.iter(|| energy_sum(black_box(&series), Decimal::from(30)).unwrap())
        });
    }

    // a day of 5 minute intervals into 30 minute buckets
    let day = create_series(289);
    group.bench_function("energy_sum_averages_day", |b| {
        b.iter(|| energy_sum_averages(black_box(&day), 30, 5).unwrap())
    });

    let samples = create_samples(50, 288);
    group.bench_function("derive_buckets_50_units_day", |b| {
        b.iter(|| derive_buckets(black_box(&samples), 30).unwrap())
    });

    group.finish();
}

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing");

    let base = Url::parse("http://nemweb.com.au/Reports/Current/Dispatch_SCADA/").unwrap();
    let lines: Vec<String> = (0..2000)
        .map(|i| {
            let name = format!("PUBLIC_DISPATCHSCADA_2020061{}{:04}_0000000324000181.zip", i % 10, i);
            format!(
                "Thursday, June 11, 2020 12:00 PM  12345 <A HREF=\"/Reports/Current/Dispatch_SCADA/{}\">{}</A>",
                name, name
            )
        })
        .collect();
    let document = format!("<html><body><pre>{}</pre></body></html>", lines.join("<br>"));

    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("parse_server_listing_2000", |b| {
        b.iter(|| parse_listing(black_box(&document), ListingDialect::ServerListing, &base))
    });

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    group.bench_function("upsert_batch_1000", |b| {
        let dir = tempdir().unwrap();
        let store = SqliteSampleStore::open(&dir.path().join("bench.db")).unwrap();
        let samples = create_samples(10, 100);

        b.iter(|| store.upsert(black_box(&samples)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_energy, bench_listing, bench_store);
criterion_main!(benches);
