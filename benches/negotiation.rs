//! Caps parsing, intersection and link negotiation benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mediagraph::caps::Caps;
use mediagraph::negotiation::{PadCaps, negotiate};
use mediagraph::pipeline::{ElementFactory, launch};
use std::hint::black_box;

const CAMERA: &str = "video/x-raw, format={ YUY2, NV12, I420 }, width=[ 160, 3840 ], \
                      height=[ 120, 2160 ], framerate=[ 1/1, 60/1 ]";
const ENCODER: &str = "video/x-raw, format={ I420, NV12 }, width={ 640, 1280, 1920 }, \
                       height={ 480, 720, 1080 }, framerate=30/1";

/// Caps with `n` alternatives, each a different media type suffix.
fn alternatives(n: usize) -> Caps {
    let text = (0..n)
        .map(|i| format!("video/x-format{i}, width=[ 1, 4096 ], format={{ A, B, C }}"))
        .collect::<Vec<_>>()
        .join("; ");
    text.parse().unwrap()
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("caps_parse", |b| {
        b.iter(|| black_box(CAMERA).parse::<Caps>().unwrap());
    });
}

fn bench_negotiate(c: &mut Criterion) {
    let mut group = c.benchmark_group("negotiate");

    let camera: Caps = CAMERA.parse().unwrap();
    let encoder: Caps = ENCODER.parse().unwrap();
    group.bench_function("ranges_and_lists", |b| {
        b.iter(|| {
            negotiate(
                &PadCaps::new("camera.src", black_box(&camera)),
                &PadCaps::new("encoder.sink", black_box(&encoder)),
            )
            .unwrap()
        });
    });

    for n in [1usize, 8, 32] {
        let upstream = alternatives(n);
        let downstream: Caps = format!("video/x-format{}, width=640", n - 1).parse().unwrap();
        group.bench_with_input(BenchmarkId::new("alternatives", n), &n, |b, _| {
            b.iter(|| {
                negotiate(
                    &PadCaps::new("src.src", black_box(&upstream)),
                    &PadCaps::new("sink.sink", black_box(&downstream)),
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_launch(c: &mut Criterion) {
    let factory = ElementFactory::with_builtins();
    c.bench_function("launch_tee_pipeline", |b| {
        b.iter(|| {
            launch(
                &factory,
                black_box("testsrc ! video/x-raw, width=320 ! tee name=t t. ! queue ! fakesink t. ! queue ! fakesink"),
            )
            .unwrap()
        });
    });
}

criterion_group!(benches, bench_parse, bench_negotiate, bench_launch);
criterion_main!(benches);
