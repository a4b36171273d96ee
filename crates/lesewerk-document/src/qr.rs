// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QR code location and decoding on page rasters, via the `rqrr` decoder.

use std::path::Path;

use image::DynamicImage;
use lesewerk_core::error::Result;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::loader::file_to_images;

/// Axis-aligned pixel rectangle on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A decoded QR code and where it sits on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QrCode {
    pub payload: String,
    pub bounds: PixelRect,
}

/// Every QR code on `image` that decodes to UTF-8 text, in detection order.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn decode_qr_codes(image: &DynamicImage) -> Vec<QrCode> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| gray.get_pixel(x as u32, y as u32).0[0],
    );

    let grids = prepared.detect_grids();
    debug!(candidates = grids.len(), "QR grids detected");

    grids
        .into_iter()
        .filter_map(|grid| match grid.decode() {
            Ok((_meta, payload)) => Some(QrCode {
                payload,
                bounds: polygon_bounds(&grid.bounds, width, height),
            }),
            Err(err) => {
                debug!(%err, "QR grid failed to decode");
                None
            }
        })
        .collect()
}

/// Payload of the first decodable QR code, if any.
pub fn read_qr_code(image: &DynamicImage) -> Option<String> {
    decode_qr_codes(image)
        .into_iter()
        .next()
        .map(|code| code.payload)
}

/// Crop every decodable QR code out of `image`.
pub fn detect_and_crop_qr(image: &DynamicImage) -> Vec<DynamicImage> {
    decode_qr_codes(image)
        .iter()
        .map(|code| crop_code(image, code))
        .collect()
}

/// The region of `page` covered by `code`.
pub fn crop_code(page: &DynamicImage, code: &QrCode) -> DynamicImage {
    let PixelRect { x, y, width, height } = code.bounds;
    page.crop_imm(x, y, width, height)
}

/// Cropped QR codes from every page of the document at `path`, page by page.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn extract_qrs(path: impl AsRef<Path>) -> Result<Vec<DynamicImage>> {
    let crops: Vec<DynamicImage> = file_to_images(path)?
        .iter()
        .flat_map(detect_and_crop_qr)
        .collect();
    info!(codes = crops.len(), "QR codes extracted");
    Ok(crops)
}

/// Decoded QR payloads from every page of the document at `path`, page by page.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn extract_qrs_decoded(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let payloads: Vec<String> = file_to_images(path)?
        .iter()
        .flat_map(decode_qr_codes)
        .map(|code| code.payload)
        .collect();
    info!(codes = payloads.len(), "QR codes decoded");
    Ok(payloads)
}

/// Bounding box (min/max of x and y) of the corner polygon, clamped to the image.
fn polygon_bounds(corners: &[rqrr::Point; 4], width: u32, height: u32) -> PixelRect {
    let clamp_x = |v: i32| v.clamp(0, width as i32) as u32;
    let clamp_y = |v: i32| v.clamp(0, height as i32) as u32;

    let min_x = clamp_x(corners.iter().map(|p| p.x).min().unwrap_or(0));
    let max_x = clamp_x(corners.iter().map(|p| p.x).max().unwrap_or(0));
    let min_y = clamp_y(corners.iter().map(|p| p.y).min().unwrap_or(0));
    let max_y = clamp_y(corners.iter().map(|p| p.y).max().unwrap_or(0));

    PixelRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    /// Draw `payload` as a QR code at `(left, top)` on a white page.
    fn page_with_codes(width: u32, height: u32, codes: &[(&str, u32, u32)]) -> DynamicImage {
        let mut page = GrayImage::from_pixel(width, height, Luma([255]));
        for &(payload, left, top) in codes {
            let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
            let modules = code.width() as u32;
            let colors = code.to_colors();
            let scale = 4;
            for my in 0..modules {
                for mx in 0..modules {
                    if colors[(my * modules + mx) as usize] == qrcode::Color::Dark {
                        for dy in 0..scale {
                            for dx in 0..scale {
                                page.put_pixel(
                                    left + mx * scale + dx,
                                    top + my * scale + dy,
                                    Luma([0]),
                                );
                            }
                        }
                    }
                }
            }
        }
        DynamicImage::ImageLuma8(page)
    }

    #[test]
    fn reads_single_code() {
        let page = page_with_codes(200, 200, &[("https://example.org/doc/42", 40, 40)]);
        assert_eq!(
            read_qr_code(&page).as_deref(),
            Some("https://example.org/doc/42")
        );
    }

    #[test]
    fn blank_page_has_no_code() {
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 120, Luma([255])));
        assert_eq!(read_qr_code(&page), None);
        assert!(detect_and_crop_qr(&page).is_empty());
    }

    #[test]
    fn crops_cover_the_code() {
        let page = page_with_codes(240, 240, &[("lesewerk", 60, 80)]);
        let codes = decode_qr_codes(&page);
        assert_eq!(codes.len(), 1);
        let bounds = codes[0].bounds;
        // Version 1 code at scale 4: 21 modules = 84 px.
        assert!(bounds.x >= 56 && bounds.x <= 64, "{bounds:?}");
        assert!(bounds.y >= 76 && bounds.y <= 84, "{bounds:?}");
        assert!(bounds.width >= 76 && bounds.width <= 92, "{bounds:?}");

        let crops = detect_and_crop_qr(&page);
        assert_eq!(crops.len(), 1);
        assert_eq!((crops[0].width(), crops[0].height()), (bounds.width, bounds.height));
    }

    #[test]
    fn polygon_bounds_are_clamped() {
        let corners = [
            rqrr::Point { x: -5, y: 10 },
            rqrr::Point { x: 50, y: -3 },
            rqrr::Point { x: 120, y: 40 },
            rqrr::Point { x: 10, y: 200 },
        ];
        assert_eq!(
            polygon_bounds(&corners, 100, 100),
            PixelRect { x: 0, y: 0, width: 100, height: 100 }
        );
    }

    #[test]
    fn extract_from_multi_page_tiff_in_page_order() {
        let first = page_with_codes(200, 200, &[("page-one", 30, 30)]).to_luma8();
        let second = page_with_codes(200, 200, &[("page-two", 50, 50)]).to_luma8();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.tiff");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut encoder = tiff::encoder::TiffEncoder::new(file).unwrap();
            for page in [&first, &second] {
                encoder
                    .write_image::<tiff::encoder::colortype::Gray8>(200, 200, page.as_raw())
                    .unwrap();
            }
        }

        assert_eq!(
            extract_qrs_decoded(&path).unwrap(),
            vec!["page-one".to_string(), "page-two".to_string()]
        );
        assert_eq!(extract_qrs(&path).unwrap().len(), 2);
    }
}
