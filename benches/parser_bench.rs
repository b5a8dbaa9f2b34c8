//! Benchmarks for the last heard frame parser.

use bm_lastheard::parser::{looks_like_event, parse_call_event, parse_frame};
use chrono::Utc;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Sample event frames for benchmarking.
const SAMPLE_FRAMES: &[&str] = &[
    r#"42["mqtt",{"topic":"LH","payload":"{\"Event\":\"Session-Stop\",\"SessionID\":\"a1\",\"SourceCall\":\"OH6ABC\",\"SourceID\":2441234,\"DestinationID\":244,\"Master\":2441,\"Start\":1714566605,\"Stop\":1714566612,\"LinkCall\":\"OH6RAA\",\"LinkTypeName\":\"Repeater\",\"LinkName\":\"Hytera\"}"}]"#,
    r#"42["mqtt",{"topic":"LH","payload":"{\"Event\":\"Session-Start\",\"SessionID\":\"b2\",\"SourceCall\":\"DL1XYZ\",\"SourceID\":2621234,\"DestinationID\":262,\"Master\":2622,\"Start\":1714566610,\"Stop\":0,\"LinkCall\":\"DB0ABC\",\"LinkTypeName\":\"Repeater\",\"LinkName\":\"Motorola\"}"}]"#,
    r#"42["mqtt",{"topic":"LH","payload":"{\"Event\":\"Session-Update\",\"SessionID\":\"c3\",\"SourceCall\":\"W1AW\",\"SourceID\":3100001,\"DestinationID\":91,\"Master\":3102,\"Start\":1714566611,\"Stop\":0,\"LinkCall\":\"\",\"LinkTypeName\":\"Hotspot\",\"LinkName\":\"MMDVM Host\"}"}]"#,
];

fn bench_parse_call_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_call_event");
    let now = Utc::now();

    group.throughput(Throughput::Elements(1));
    group.bench_function("single", |b| {
        b.iter(|| parse_call_event(black_box(SAMPLE_FRAMES[0]), now))
    });

    group.throughput(Throughput::Elements(SAMPLE_FRAMES.len() as u64));
    group.bench_function("batch", |b| {
        b.iter(|| {
            for frame in SAMPLE_FRAMES {
                let _ = parse_call_event(black_box(frame), now);
            }
        })
    });

    group.finish();
}

fn bench_parse_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_frame");

    group.bench_function("event", |b| {
        b.iter(|| parse_frame(black_box(SAMPLE_FRAMES[0])))
    });

    group.bench_function("ping", |b| b.iter(|| parse_frame(black_box("2"))));

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    let now = Utc::now();

    // Mix of event frames and control frames
    let mixed: Vec<&str> = vec![
        SAMPLE_FRAMES[0],
        "2",
        SAMPLE_FRAMES[1],
        r#"40{"sid":"Xyz"}"#,
        SAMPLE_FRAMES[2],
        "3",
    ];

    group.throughput(Throughput::Elements(mixed.len() as u64));
    group.bench_function("mixed_input", |b| {
        b.iter(|| {
            for frame in &mixed {
                if looks_like_event(frame) {
                    let _ = parse_call_event(black_box(frame), now);
                }
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_call_event,
    bench_parse_frame,
    bench_full_pipeline
);
criterion_main!(benches);
