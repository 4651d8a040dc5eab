//! Criterion benchmarks for the frame hot path.
//!
//! Measures the cost of publishing into and reading from the latest-wins
//! frame slot, and of base64-encoding a frame for the signaling uplink.
//!
//! Run with:
//! ```bash
//! cargo bench --package mirror-core --bench frame_buffer_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirror_core::{encode_frame_payload, Frame, FrameBuffer};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_frame(len: usize) -> Frame {
    let mut data = vec![0u8; len];
    data[0] = 0xFF;
    data[1] = 0xD8;
    Frame::new(data)
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_set(c: &mut Criterion) {
    let buffer = FrameBuffer::new();
    let frame = make_frame(64 * 1024);
    c.bench_function("frame_buffer_set", |b| {
        b.iter(|| buffer.set(black_box(frame.clone())))
    });
}

fn bench_get(c: &mut Criterion) {
    let buffer = FrameBuffer::new();
    buffer.set(make_frame(64 * 1024));
    c.bench_function("frame_buffer_get", |b| b.iter(|| black_box(buffer.get())));
}

fn bench_encode_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame_payload");
    for len in [16 * 1024, 64 * 1024, 256 * 1024] {
        let frame = make_frame(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &frame, |b, f| {
            b.iter(|| encode_frame_payload(black_box(f)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_encode_payload);
criterion_main!(benches);
