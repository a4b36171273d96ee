// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for YOLO pre- and post-processing: letterboxing a
// page and decoding + suppressing a full 8400-anchor detection head.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};

use lesewerk_segment::{decode_predictions, letterbox, non_max_suppression};

const ANCHORS: usize = 8400;
const CLASSES: usize = 11;

/// 1240x1754 page (A4 at 150 DPI).
fn synthetic_page() -> DynamicImage {
    let img = RgbImage::from_fn(1240, 1754, |x, y| {
        if (y / 20) % 4 == 0 && x > 80 && x < 1160 {
            Rgb([30, 30, 30])
        } else {
            Rgb([240, 240, 235])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Head output with clustered, overlapping boxes so NMS has work to do.
fn synthetic_head() -> Vec<f32> {
    let mut out = vec![0.0f32; (4 + CLASSES) * ANCHORS];
    for anchor in 0..ANCHORS {
        let cluster = (anchor / 40) as f32;
        out[anchor] = 40.0 + (cluster * 13.0) % 560.0 + (anchor % 7) as f32;
        out[ANCHORS + anchor] = 40.0 + (cluster * 29.0) % 560.0 + (anchor % 5) as f32;
        out[2 * ANCHORS + anchor] = 60.0;
        out[3 * ANCHORS + anchor] = 30.0;
        let class = anchor % CLASSES;
        out[(4 + class) * ANCHORS + anchor] = if anchor % 3 == 0 { 0.8 } else { 0.1 };
    }
    out
}

fn bench_letterbox(c: &mut Criterion) {
    let page = synthetic_page();
    c.bench_function("letterbox 1240x1754 -> 640", |b| {
        b.iter(|| black_box(letterbox(black_box(&page), 640)));
    });
}

fn bench_postprocess(c: &mut Criterion) {
    let page = synthetic_page();
    let (_, info) = letterbox(&page, 640);
    let head = synthetic_head();

    c.bench_function("decode + nms (8400 anchors, 11 classes)", |b| {
        b.iter(|| {
            let dets = decode_predictions(black_box(&head), ANCHORS, &info, 1240, 1754, 0.25);
            black_box(non_max_suppression(dets, 0.45, 300))
        });
    });
}

criterion_group!(benches, bench_letterbox, bench_postprocess);
criterion_main!(benches);
