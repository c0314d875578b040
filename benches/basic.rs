use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use telemetry_bridge::{HistoryBuffer, LineCodec};

pub fn bench_line_parsing(c: &mut Criterion) {
    let codec = LineCodec::new();
    c.bench_function("parse_sensor_line", |b| {
        b.iter(|| {
            let reading = codec.parse_line(black_box(b"D:2510,M:1\r")).unwrap();
            black_box(reading);
        })
    });
    c.bench_function("reject_noise_line", |b| {
        b.iter(|| {
            let rejected = codec.parse_line(black_box(b"Sensor board v1.2 ready")).is_err();
            black_box(rejected);
        })
    });
}

pub fn bench_history_append(c: &mut Criterion) {
    let codec = LineCodec::new();
    let reading = codec.parse_line(b"D:2510,M:0").unwrap();
    let mut history = HistoryBuffer::new(120);
    c.bench_function("history_append_full", |b| {
        b.iter(|| history.append(black_box(reading.clone())))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_line_parsing, bench_history_append
}
criterion_main!(benches);
