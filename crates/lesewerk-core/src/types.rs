// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Lesewerk.

use std::collections::BTreeMap;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Supported input document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    Gif,
    Bmp,
    WebP,
}

impl SourceFormat {
    /// MIME type string, used as the Content-Type when uploading to OCR services.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::WebP => "image/webp",
        }
    }

    /// Infer the format from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Infer the format from a path's extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Numeric class identifier produced by a segmentation model.
pub type ClassId = u32;

/// Class id → human-readable label (e.g. `9 → "Table"`).
pub type LabelMap = BTreeMap<ClassId, String>;

/// Bounding boxes on a single page, grouped by class.
///
/// Within a class, boxes keep the order in which the model reported them.
pub type PageSegments = BTreeMap<ClassId, Vec<NormalizedBox>>;

/// A bounding box in normalized `xyxyn` coordinates.
///
/// All four values are fractions of the image width (x) or height (y), so a
/// box detected on a resized or preprocessed page can be applied to the
/// original raster unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl NormalizedBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a normalized box from pixel coordinates on a `width` x `height` image.
    pub fn from_pixels(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            x1: x1 / w,
            y1: y1 / h,
            x2: x2 / w,
            y2: y2 / h,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

impl From<[f32; 4]> for NormalizedBox {
    fn from(value: [f32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

/// Structured fields extracted from a document.
///
/// Preserves the order in which the caller asked for the fields and
/// serialises as a JSON object. A `None` value means the field was not found
/// (serialised as `null`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    entries: Vec<(String, Option<Value>)>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested field mapped to `None`.
    pub fn all_missing(fields: &[String]) -> Self {
        let mut out = Self::new();
        for field in fields {
            out.insert(field.clone(), None);
        }
        out
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn insert(&mut self, field: impl Into<String>, value: Option<Value>) {
        let field = field.into();
        if let Some(slot) = self.entries.iter_mut().find(|(name, _)| *name == field) {
            slot.1 = value;
        } else {
            self.entries.push((field, value));
        }
    }

    /// Look up a field. Returns `None` both for unknown and missing fields.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no field carries a value.
    pub fn is_all_missing(&self) -> bool {
        self.entries.iter().all(|(_, value)| value.is_none())
    }
}

impl Serialize for ExtractedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Error classification for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blip or rate limit; retry automatically.
    Transient,
    /// Caller must fix something (credentials, missing model file).
    UserAction,
    /// Retrying cannot help: bad input or a malformed response.
    Permanent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(SourceFormat::from_extension("PDF"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::from_extension("Jpeg"), Some(SourceFormat::Jpeg));
        assert_eq!(SourceFormat::from_extension("tif"), Some(SourceFormat::Tiff));
        assert_eq!(SourceFormat::from_extension("docx"), None);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            SourceFormat::from_path("/scans/invoice.GIF"),
            Some(SourceFormat::Gif)
        );
        assert_eq!(SourceFormat::from_path("/scans/no-extension"), None);
    }

    #[test]
    fn normalized_box_from_pixels() {
        let b = NormalizedBox::from_pixels(50.0, 25.0, 100.0, 100.0, 200, 100);
        assert_eq!(b, NormalizedBox::new(0.25, 0.25, 0.5, 1.0));
        assert!((b.area() - 0.1875).abs() < 1e-6);
    }

    #[test]
    fn inverted_box_has_zero_area() {
        let b = NormalizedBox::new(0.6, 0.6, 0.2, 0.2);
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn extracted_fields_keep_request_order() {
        let mut fields = ExtractedFields::new();
        fields.insert("Zeta", Some(json!("z")));
        fields.insert("Alpha", None);
        fields.insert("Mid", Some(json!(3)));

        let serialised = serde_json::to_string(&fields).unwrap();
        assert_eq!(serialised, r#"{"Zeta":"z","Alpha":null,"Mid":3}"#);
    }

    #[test]
    fn extracted_fields_insert_replaces_in_place() {
        let mut fields = ExtractedFields::all_missing(&["a".into(), "b".into()]);
        assert!(fields.is_all_missing());
        fields.insert("a", Some(json!("x")));
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("a"), Some(&json!("x")));
        assert_eq!(fields.iter().next().map(|(name, _)| name), Some("a"));
        assert!(!fields.is_all_missing());
    }
}
