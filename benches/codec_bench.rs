// Codec performance benchmarks for cellfile

use cellfile::types::{DataType, Order, OrderedFloat64, OrderedInt64, PositionedBuffer, RawBytes};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;

fn random_floats(n: usize) -> Vec<f64> {
    let mut rng = rand::rng();
    (0..n).map(|_| rng.random_range(-1e9..1e9)).collect()
}

fn benchmark_float64(c: &mut Criterion) {
    let mut group = c.benchmark_group("float64");
    let values = random_floats(10000);
    group.throughput(Throughput::Elements(values.len() as u64));

    for order in [Order::Ascending, Order::Descending] {
        let codec = OrderedFloat64::new(order);
        let mut buf = PositionedBuffer::new(8 * values.len());

        group.bench_function(BenchmarkId::new("encode", format!("{:?}", order)), |b| {
            b.iter(|| {
                buf.set_position(0).unwrap();
                for v in &values {
                    codec.encode(&mut buf, v).unwrap();
                }
                black_box(buf.position());
            });
        });

        group.bench_function(BenchmarkId::new("decode", format!("{:?}", order)), |b| {
            b.iter(|| {
                buf.set_position(0).unwrap();
                for _ in 0..values.len() {
                    black_box(codec.decode(&mut buf).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_int64(c: &mut Criterion) {
    let codec = OrderedInt64::new(Order::Ascending);
    let mut rng = rand::rng();
    let values: Vec<i64> = (0..10000).map(|_| rng.random()).collect();
    let mut buf = PositionedBuffer::new(8 * values.len());

    c.bench_function("int64_encode", |b| {
        b.iter(|| {
            buf.set_position(0).unwrap();
            for v in &values {
                codec.encode(&mut buf, v).unwrap();
            }
        });
    });
}

fn benchmark_raw_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("raw_bytes");

    for size in [16, 256, 4096].iter() {
        let value = vec![0x5Au8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        for order in [Order::Ascending, Order::Descending] {
            let codec = RawBytes::new(order);
            group.bench_with_input(BenchmarkId::new(format!("{:?}", order), size), &value, |b, value| {
                b.iter(|| black_box(codec.encode_to_vec(value).unwrap()));
            });
        }
    }

    group.finish();
}

fn benchmark_sort_by_bytes(c: &mut Criterion) {
    let codec = OrderedFloat64::new(Order::Ascending);
    let encoded: Vec<Vec<u8>> =
        random_floats(10000).iter().map(|v| codec.encode_to_vec(v).unwrap()).collect();

    c.bench_function("sort_encoded_float64", |b| {
        b.iter(|| {
            let mut keys = encoded.clone();
            keys.sort_unstable();
            black_box(keys);
        });
    });
}

criterion_group!(benches, benchmark_float64, benchmark_int64, benchmark_raw_bytes, benchmark_sort_by_bytes);
criterion_main!(benches);
