// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the pagewerk-detect crate: the edge detector alone
// and the frame pipeline from EDGES through RECTIFY_SIZE.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use pagewerk_core::{Frame, PageDetectParams};
use pagewerk_detect::{EdgeDetector, PageDetectPipeline};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A `size x size` frame with a bright page covering the middle 60% on a dark
/// background, roughly what a well-framed capture looks like after
/// preprocessing.
fn page_frame(size: u32) -> Frame {
    let lo = size / 5;
    let hi = size - lo;
    let mut gray = vec![30u8; (size * size) as usize];
    for y in lo..hi {
        for x in lo..hi {
            gray[(y * size + x) as usize] = 235;
        }
    }
    Frame::from_gray(size, size, gray)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_edges(c: &mut Criterion) {
    let frame = page_frame(512);
    let detector = EdgeDetector::default();
    c.bench_function("edges (512x512)", |b| {
        b.iter(|| black_box(detector.detect(black_box(&frame))))
    });
}

/// Full detection on a 1024x1024 frame (the default detection budget).
fn bench_pipeline(c: &mut Criterion) {
    let frame = page_frame(1024);
    let pipeline = PageDetectPipeline::new(PageDetectParams::default());
    c.bench_function("pipeline run_frame (1024x1024)", |b| {
        b.iter(|| black_box(pipeline.run_frame(black_box(&frame))))
    });
}

criterion_group!(benches, bench_edges, bench_pipeline);
criterion_main!(benches);
