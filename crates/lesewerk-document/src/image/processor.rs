// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — chained page-raster transforms and encoding helpers.

use image::{DynamicImage, ImageFormat};
use lesewerk_core::NormalizedBox;
use lesewerk_core::error::LesewerkError;
use tracing::instrument;

/// Chainable transforms over one in-memory page raster.
///
/// ```ignore
/// ImageProcessor::from_dynamic(page)
///     .rotate_quarter_turns(90)
///     .grayscale()
///     .save("region.png")?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Resize the image to exactly `width` x `height`, ignoring aspect ratio.
    pub fn resize_exact(self, width: u32, height: u32) -> Self {
        let resized =
            self.image
                .resize_exact(width, height, image::imageops::FilterType::Triangle);
        Self { image: resized }
    }

    /// Rotate clockwise by a multiple of 90 degrees (lossless).
    ///
    /// Any other angle is snapped to the nearest quarter turn, which is all a
    /// PDF `/Rotate` entry can express.
    pub fn rotate_quarter_turns(self, degrees: i64) -> Self {
        let normalised = (((degrees as f64) / 90.0).round() as i64).rem_euclid(4);
        let image = match normalised {
            1 => self.image.rotate90(),
            2 => self.image.rotate180(),
            3 => self.image.rotate270(),
            _ => self.image,
        };
        Self { image }
    }

    /// Convert the image to grayscale (luma).
    pub fn grayscale(self) -> Self {
        Self {
            image: self.image.grayscale(),
        }
    }

    /// Adjust contrast by a factor. Values > 1.0 increase contrast; values
    /// < 1.0 decrease it. A value of 1.0 is a no-op.
    #[instrument(skip(self), fields(factor))]
    pub fn adjust_contrast(self, factor: f32) -> Self {
        if (factor - 1.0).abs() < f32::EPSILON {
            return self;
        }

        let luma = self.image.to_luma8();
        let contrasted = image::ImageBuffer::from_fn(luma.width(), luma.height(), |x, y| {
            let image::Luma([value]) = *luma.get_pixel(x, y);
            let stretched = factor * (value as f32 - 128.0) + 128.0;
            image::Luma([stretched.clamp(0.0, 255.0) as u8])
        });

        Self {
            image: DynamicImage::ImageLuma8(contrasted),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Write the image to a file. The format is inferred from the file extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), LesewerkError> {
        self.image.save(path.as_ref()).map_err(|err| {
            LesewerkError::ImageError(format!(
                "failed to save image to {}: {}",
                path.as_ref().display(),
                err
            ))
        })
    }
}

/// Scale a normalized box to clamped pixel bounds `(left, upper, right, lower)`.
pub(crate) fn normalized_to_pixel_bounds(
    bbox: &NormalizedBox,
    width: u32,
    height: u32,
) -> (u32, u32, u32, u32) {
    let w = width as f32;
    let h = height as f32;

    let left = (bbox.x1 * w).clamp(0.0, w);
    let upper = (bbox.y1 * h).clamp(0.0, h);
    let right = (bbox.x2 * w).min(w).max(left);
    let lower = (bbox.y2 * h).min(h).max(upper);

    (
        left.round() as u32,
        upper.round() as u32,
        (right.round() as u32).max(left.round() as u32),
        (lower.round() as u32).max(upper.round() as u32),
    )
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
pub fn encode_to_format(
    image: &DynamicImage,
    format: ImageFormat,
) -> Result<Vec<u8>, LesewerkError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image.write_to(&mut cursor, format).map_err(|err| {
        LesewerkError::ImageError(format!("image encoding failed: {}", err))
    })?;
    Ok(buffer)
}
