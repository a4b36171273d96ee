// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page preprocessing — hooks that clean up page rasters before they reach
// segmentation and OCR. Preprocessors never change page dimensions: boxes
// found on a preprocessed page are applied to the raw page.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{ThresholdType, adaptive_threshold, otsu_level, threshold};
use imageproc::definitions::Image;
use imageproc::filter::gaussian_blur_f32;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::{debug, info, instrument};

use crate::image::processor::ImageProcessor;

/// Transforms a batch of page images ahead of analysis.
pub trait ImagePreprocessor: Send + Sync {
    /// Return one image per input image, in the same order and of the same size.
    fn preprocess_images(&self, images: Vec<DynamicImage>) -> Vec<DynamicImage>;
}

/// Passes pages through untouched. The default preprocessor.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreprocessor;

impl ImagePreprocessor for IdentityPreprocessor {
    fn preprocess_images(&self, images: Vec<DynamicImage>) -> Vec<DynamicImage> {
        images
    }
}

/// Thresholding applied at the end of [`ScanPreprocessor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binarization {
    /// Keep grey levels.
    None,
    /// Global threshold from the page histogram (Otsu's method).
    Otsu,
    /// Local-mean threshold over a `(2 * block_radius + 1)` square window,
    /// minus `c`. Copes with uneven lighting on phone scans.
    Adaptive { block_radius: u32, c: i32 },
}

/// Cleans up scanned pages: grayscale, optional denoise, contrast stretch,
/// binarisation.
#[derive(Debug, Clone)]
pub struct ScanPreprocessor {
    /// Contrast factor around mid-grey; 1.0 leaves contrast unchanged.
    pub contrast: f32,
    /// Gaussian blur sigma applied before thresholding; `None` skips it.
    pub denoise_sigma: Option<f32>,
    pub binarization: Binarization,
}

impl Default for ScanPreprocessor {
    fn default() -> Self {
        Self {
            contrast: 1.4,
            denoise_sigma: None,
            binarization: Binarization::Adaptive {
                block_radius: 15,
                c: 10,
            },
        }
    }
}

impl ScanPreprocessor {
    /// Run the pipeline on a single page.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn preprocess(&self, image: DynamicImage) -> DynamicImage {
        let mut gray = ImageProcessor::from_dynamic(image)
            .grayscale()
            .into_dynamic()
            .to_luma8();

        if let Some(sigma) = self.denoise_sigma.filter(|sigma| *sigma > 0.0) {
            gray = gaussian_blur_f32(&gray, sigma);
        }

        let gray = ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(gray))
            .adjust_contrast(self.contrast)
            .into_dynamic()
            .to_luma8();

        let out = match self.binarization {
            Binarization::None => gray,
            Binarization::Otsu => {
                let level = otsu_level(&gray);
                debug!(level, "Otsu level computed");
                threshold(&gray, level, ThresholdType::Binary)
            }
            Binarization::Adaptive { .. } if gray.width() == 0 || gray.height() == 0 => gray,
            Binarization::Adaptive { block_radius, c } => adaptive_binarize(&gray, block_radius, c),
        };

        DynamicImage::ImageLuma8(out)
    }
}

impl ImagePreprocessor for ScanPreprocessor {
    fn preprocess_images(&self, images: Vec<DynamicImage>) -> Vec<DynamicImage> {
        info!(pages = images.len(), binarization = ?self.binarization, "Preprocessing scanned pages");
        images
            .into_iter()
            .map(|image| self.preprocess(image))
            .collect()
    }
}

/// Local-mean threshold over a `(2 * block_radius + 1)` square window.
/// Pixels at or above `mean - c` become white, others black.
fn adaptive_binarize(gray: &GrayImage, block_radius: u32, c: i32) -> GrayImage {
    let block_radius = block_radius.max(1);
    if c == 0 {
        return adaptive_threshold(gray, block_radius);
    }

    let (width, height) = gray.dimensions();
    let integral: Image<Luma<u32>> = integral_image(gray);
    GrayImage::from_fn(width, height, |x, y| {
        let (left, top) = (x.saturating_sub(block_radius), y.saturating_sub(block_radius));
        let right = x.saturating_add(block_radius).min(width - 1);
        let bottom = y.saturating_add(block_radius).min(height - 1);
        let area = (right - left + 1) * (bottom - top + 1);
        let mean = sum_image_pixels(&integral, left, top, right, bottom)[0] / area;

        let cutoff = (mean as i32 - c).clamp(0, 255);
        Luma([if i32::from(gray.get_pixel(x, y).0[0]) >= cutoff { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn two_tone(width: u32, height: u32, dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 { Luma([dark]) } else { Luma([light]) }
        })
    }

    #[test]
    fn identity_returns_input() {
        let pages = vec![
            DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 4, Rgb([1, 2, 3]))),
            DynamicImage::ImageLuma8(GrayImage::new(5, 6)),
        ];
        let out = IdentityPreprocessor.preprocess_images(pages.clone());
        assert_eq!(out, pages);
    }

    #[test]
    fn scan_preprocessor_keeps_dimensions_and_count() {
        let pages = vec![
            DynamicImage::ImageRgb8(RgbImage::from_pixel(31, 17, Rgb([200, 10, 10]))),
            DynamicImage::ImageLuma8(two_tone(40, 20, 30, 220)),
        ];
        let out = ScanPreprocessor::default().preprocess_images(pages);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].width(), out[0].height()), (31, 17));
        assert_eq!((out[1].width(), out[1].height()), (40, 20));
    }

    #[test]
    fn otsu_splits_two_tones() {
        let gray = two_tone(20, 10, 40, 210);
        let level = otsu_level(&gray);
        assert!((40..210).contains(&level), "level {level}");

        let pre = ScanPreprocessor {
            contrast: 1.0,
            denoise_sigma: None,
            binarization: Binarization::Otsu,
        };
        let out = pre.preprocess(DynamicImage::ImageLuma8(gray)).to_luma8();
        assert_eq!(out.get_pixel(0, 0), &Luma([0]));
        assert_eq!(out.get_pixel(19, 9), &Luma([255]));
    }

    #[test]
    fn empty_page_survives_every_binarization() {
        for binarization in [
            Binarization::Otsu,
            Binarization::Adaptive { block_radius: 3, c: 5 },
            Binarization::Adaptive { block_radius: 3, c: 0 },
        ] {
            let pre = ScanPreprocessor {
                contrast: 1.0,
                denoise_sigma: None,
                binarization,
            };
            let out = pre.preprocess(DynamicImage::ImageLuma8(GrayImage::new(0, 0)));
            assert_eq!((out.width(), out.height()), (0, 0));
        }
    }

    #[test]
    fn binarization_none_keeps_grey_levels() {
        let pre = ScanPreprocessor {
            contrast: 1.0,
            denoise_sigma: None,
            binarization: Binarization::None,
        };
        let out = pre
            .preprocess(DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([77]))))
            .to_luma8();
        assert_eq!(out.get_pixel(2, 2), &Luma([77]));
    }

    #[test]
    fn adaptive_output_is_black_and_white() {
        let pre = ScanPreprocessor {
            denoise_sigma: Some(1.0),
            ..ScanPreprocessor::default()
        };
        let out = pre
            .preprocess(DynamicImage::ImageLuma8(two_tone(30, 30, 20, 235)))
            .to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn adaptive_offset_whitens_flat_regions() {
        // A flat page sits exactly on its local mean; the offset keeps it white.
        let flat = GrayImage::from_pixel(9, 9, Luma([120]));
        let out = adaptive_binarize(&flat, 2, 10);
        assert!(out.pixels().all(|p| p.0[0] == 255));

        // A dark stroke on a light page stays black.
        let mut page = GrayImage::from_pixel(15, 15, Luma([230]));
        for y in 0..15 {
            page.put_pixel(7, y, Luma([20]));
        }
        let out = adaptive_binarize(&page, 3, 10);
        assert_eq!(out.get_pixel(7, 7), &Luma([0]));
        assert_eq!(out.get_pixel(1, 7), &Luma([255]));
    }

    #[test]
    fn zero_offset_matches_plain_adaptive_threshold() {
        let gray = two_tone(12, 6, 50, 180);
        assert_eq!(adaptive_binarize(&gray, 2, 0), adaptive_threshold(&gray, 2));
    }
}
