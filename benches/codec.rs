use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netreplay::{FixtureCodec, Request, Response};

fn exchange(size: usize, content_type: &str) -> (Request, Response) {
    let request = Request::new("GET", "https://api.test/items")
        .unwrap()
        .with_header("Accept", content_type);
    let body: Vec<u8> = (0..size).map(|i| b'a' + (i % 26) as u8).collect();
    let response = Response::new(200, body).with_header("Content-Type", content_type);
    (request, response)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode");
    let codec = FixtureCodec::default();

    for content_type in ["application/json", "application/octet-stream"] {
        let (request, response) = exchange(10_000, content_type);
        group.bench_with_input(
            BenchmarkId::from_parameter(content_type),
            &(request, response),
            |b, (request, response)| {
                b.iter(|| codec.encode(black_box(request), black_box(response)).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");
    let codec = FixtureCodec::default();
    let path = Path::new("bench.json");

    for content_type in ["application/json", "application/octet-stream"] {
        let (request, response) = exchange(10_000, content_type);
        let bytes = codec.encode(&request, &response).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(content_type), &bytes, |b, bytes| {
            b.iter(|| codec.decode(black_box(bytes), path).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
