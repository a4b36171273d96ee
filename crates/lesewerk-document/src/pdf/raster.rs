// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterisation from embedded image XObjects.
//
// Scanned PDFs carry one full-page image per page. We pick the largest image
// XObject on the page and decode it: DCT streams are JPEG files, some streams
// hold complete image files, and the rest are raw samples described by
// /Width, /Height, /BitsPerComponent and /ColorSpace.

use image::{DynamicImage, GrayImage, RgbImage};
use lesewerk_core::error::{LesewerkError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

/// Hard cap on decoded raster size (width x height) to bound memory use.
pub const MAX_RASTER_PIXELS: u64 = 120_000_000;

/// Decode the largest image XObject placed on `page_id`.
///
/// Returns `Ok(None)` when the page carries no image XObject at all.
pub fn largest_page_image(doc: &Document, page_id: ObjectId) -> Result<Option<DynamicImage>> {
    let Some(xobjects) = page_xobjects(doc, page_id) else {
        return Ok(None);
    };

    let mut best: Option<(u64, &Stream)> = None;
    for (name, entry) in xobjects.iter() {
        let Object::Stream(stream) = resolve(doc, entry) else {
            continue;
        };
        if !is_image(&stream.dict) {
            continue;
        }
        let area = dimension(&stream.dict, b"Width")
            .unwrap_or(0)
            .saturating_mul(dimension(&stream.dict, b"Height").unwrap_or(0));
        debug!(name = %String::from_utf8_lossy(name), area, "Found image XObject");
        if best.is_none_or(|(best_area, _)| area > best_area) {
            best = Some((area, stream));
        }
    }

    match best {
        Some((_, stream)) => decode_image_stream(doc, stream).map(Some),
        None => Ok(None),
    }
}

/// Decode a single image XObject stream into a raster.
pub fn decode_image_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage> {
    if has_filter(&stream.dict, b"DCTDecode") {
        // With DCT last in the chain, decompression stops at the JPEG bytes.
        let jpeg = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        return image::load_from_memory(&jpeg).map_err(|err| {
            LesewerkError::PdfError(format!("failed to decode JPEG image stream: {}", err))
        });
    }

    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    if let Ok(img) = image::load_from_memory(&content) {
        return Ok(img);
    }

    reconstruct_raw(doc, &stream.dict, &content)
}

/// Rebuild an image from raw samples using the stream dictionary.
fn reconstruct_raw(doc: &Document, dict: &Dictionary, samples: &[u8]) -> Result<DynamicImage> {
    let width = dimension(dict, b"Width")
        .ok_or_else(|| LesewerkError::PdfError("image stream has no /Width".into()))?;
    let height = dimension(dict, b"Height")
        .ok_or_else(|| LesewerkError::PdfError("image stream has no /Height".into()))?;
    if width
        .checked_mul(height)
        .is_none_or(|pixels| pixels > MAX_RASTER_PIXELS)
    {
        return Err(LesewerkError::PdfError(format!(
            "embedded image too large: {}x{}",
            width, height
        )));
    }
    let (width, height) = (width as u32, height as u32);

    let bpc = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    let channels = channel_count(doc, dict);

    let samples = match bpc {
        8 => samples.to_vec(),
        16 => samples.chunks_exact(2).map(|pair| pair[0]).collect(),
        1 => unpack_bits(samples, width as usize * channels as usize, height as usize),
        other => {
            return Err(LesewerkError::PdfError(format!(
                "unsupported BitsPerComponent: {}",
                other
            )));
        }
    };

    let expected = width as usize * height as usize * channels as usize;
    if samples.len() < expected {
        return Err(LesewerkError::PdfError(format!(
            "raw image data too short: {} bytes, expected {} ({}x{}x{})",
            samples.len(),
            expected,
            width,
            height,
            channels
        )));
    }
    let mut samples = samples;
    samples.truncate(expected);

    let img = match channels {
        1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        4 => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples)).map(DynamicImage::ImageRgb8),
        other => {
            return Err(LesewerkError::PdfError(format!(
                "unsupported colour channel count: {}",
                other
            )));
        }
    };

    img.ok_or_else(|| LesewerkError::PdfError("raw image buffer has the wrong size".into()))
}

/// Expand 1-bit rows (each padded to a byte boundary) into 0/255 samples.
pub(crate) fn unpack_bits(packed: &[u8], samples_per_row: usize, rows: usize) -> Vec<u8> {
    let row_bytes = samples_per_row.div_ceil(8);
    let mut out = Vec::with_capacity(samples_per_row * rows);
    for row in packed.chunks(row_bytes).take(rows) {
        for index in 0..samples_per_row {
            let byte = row.get(index / 8).copied().unwrap_or(0);
            let bit = (byte >> (7 - (index % 8))) & 1;
            out.push(if bit == 1 { 255 } else { 0 });
        }
    }
    out
}

pub(crate) fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u16;
            [
                ((255 - px[0] as u16) * k / 255) as u8,
                ((255 - px[1] as u16) * k / 255) as u8,
                ((255 - px[2] as u16) * k / 255) as u8,
            ]
        })
        .collect()
}

/// Number of colour components declared by /ColorSpace. Defaults to RGB.
fn channel_count(doc: &Document, dict: &Dictionary) -> u8 {
    let Ok(space) = dict.get(b"ColorSpace") else {
        return 3;
    };
    match resolve(doc, space) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(items) => match items.first() {
            Some(Object::Name(name)) if name == b"ICCBased" => items
                .get(1)
                .map(|profile| resolve(doc, profile))
                .and_then(|profile| match profile {
                    Object::Stream(stream) => stream.dict.get(b"N").and_then(Object::as_i64).ok(),
                    _ => None,
                })
                .map(|n| n as u8)
                .unwrap_or(3),
            // Palette lookup is not applied; indices are read as grey levels.
            Some(Object::Name(name)) if name == b"Indexed" => 1,
            Some(Object::Name(name)) if name == b"CalGray" => 1,
            _ => 3,
        },
        _ => 3,
    }
}

/// Look up a page attribute, following /Parent for inheritable entries.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Page trees are shallow; the bound only guards against cycles.
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    warn!(?page_id, "Page tree too deep while resolving attribute");
    None
}

fn page_xobjects(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let resources = inherited(doc, page_id, b"Resources")?.as_dict().ok()?;
    let xobjects = resources.get(b"XObject").ok()?;
    resolve(doc, xobjects).as_dict().ok()
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
}

fn has_filter(dict: &Dictionary, filter: &[u8]) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == filter,
        Ok(Object::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Object::Name(name) if name == filter)),
        _ => false,
    }
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Option<u64> {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .filter(|value| *value > 0)
        .map(|value| value as u64)
}
