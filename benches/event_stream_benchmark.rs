use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use meetpoint::meeting_point::EventStreamDecoder;

/// a stream of offer/candidate events as a meeting point would push them
fn create_stream(events: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..events {
        if i % 2 == 0 {
            body.extend_from_slice(b"data: {\"type\":\"offer\",\"sdp\":\"v=0\\r\\no=- 46117 2 IN IP4 127.0.0.1\"}\n\n");
        } else {
            body.extend_from_slice(
                b"data: {\"type\":\"candidate\",\"candidate\":\"candidate:1 1 udp 2122260223 10.0.0.1 54321 typ host\"}\n\n",
            );
        }
    }
    body
}

/// whole body in one chunk
fn bench_single_chunk(c: &mut Criterion) {
    let body = create_stream(100);

    let mut group = c.benchmark_group("Decode");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("single_chunk", |b| {
        b.iter(|| {
            let mut decoder = EventStreamDecoder::new();
            let events = decoder.feed(black_box(&body)).unwrap();
            black_box(events)
        })
    });

    group.finish();
}

/// body split into small network-sized chunks
fn bench_small_chunks(c: &mut Criterion) {
    let body = create_stream(100);

    let mut group = c.benchmark_group("Decode");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("chunks_of_64", |b| {
        b.iter(|| {
            let mut decoder = EventStreamDecoder::new();
            let mut count = 0;
            for chunk in black_box(&body).chunks(64) {
                count += decoder.feed(chunk).unwrap().len();
            }
            black_box(count)
        })
    });

    group.finish();
}

/// decode plus JSON parse of every event
fn bench_decode_and_parse(c: &mut Criterion) {
    let body = create_stream(100);

    let mut group = c.benchmark_group("FullCycle");
    group.throughput(Throughput::Elements(100));

    group.bench_function("decode_parse", |b| {
        b.iter(|| {
            let mut decoder = EventStreamDecoder::new();
            for event in decoder.feed(black_box(&body)).unwrap() {
                let value: serde_json::Value = serde_json::from_str(&event.data).unwrap();
                black_box(value);
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_chunk,
    bench_small_chunks,
    bench_decode_and_parse
);
criterion_main!(benches);
