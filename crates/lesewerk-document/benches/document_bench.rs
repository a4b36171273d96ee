// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the page-level hot paths in lesewerk-document:
// region cropping and scan preprocessing on a synthetic A4-ish page.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};

use lesewerk_core::NormalizedBox;
use lesewerk_document::{ImagePreprocessor, ScanPreprocessor, crop_boxes};

/// 620x877 page (A4 at 75 DPI): light background with dark "text" bands.
fn synthetic_page() -> DynamicImage {
    let (width, height) = (620u32, 877u32);
    let img = GrayImage::from_fn(width, height, |x, y| {
        if (y / 12) % 3 == 0 && x > 40 && x < width - 40 {
            Luma([35u8])
        } else {
            Luma([225u8])
        }
    });
    DynamicImage::ImageLuma8(img)
}

fn bench_crop_boxes(c: &mut Criterion) {
    let page = synthetic_page();
    let boxes: Vec<NormalizedBox> = (0..20)
        .map(|i| {
            let top = i as f32 * 0.045;
            NormalizedBox::new(0.05, top, 0.95, top + 0.04)
        })
        .collect();

    c.bench_function("crop_boxes (20 regions)", |b| {
        b.iter(|| black_box(crop_boxes(black_box(&page), black_box(&boxes))));
    });
}

fn bench_scan_preprocess(c: &mut Criterion) {
    let page = synthetic_page();
    let preprocessor = ScanPreprocessor::default();

    c.bench_function("scan_preprocess adaptive (620x877)", |b| {
        b.iter(|| black_box(preprocessor.preprocess_images(vec![black_box(page.clone())])));
    });
}

criterion_group!(benches, bench_crop_boxes, bench_scan_preprocess);
criterion_main!(benches);
