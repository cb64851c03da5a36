// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operation options — the typed form of a request's key/value configuration.
//
// Every field is optional on the wire; `TransformOptions::validate` enforces
// what each operation actually needs. Geometry checks that depend on the input
// (crop bounds, page ranges) happen later, once the input has been inspected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WandelwerkError};
use crate::types::OperationKind;

/// How a resize maps the source onto the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fit inside the box, keep aspect ratio, never enlarge.
    #[default]
    Inside,
    /// Stretch to exactly the box.
    Fill,
}

/// Integer pixel rectangle (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Whether the rectangle lies entirely within a `width` x `height` canvas.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= width && b <= height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rectangle in PDF user-space points (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 8-bit RGB colour, written as `#rrggbb` or a basic colour name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 235, b: 59 };

    /// Parse `#rrggbb`, `rrggbb`, or one of a handful of names.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "black" => return Ok(Self::BLACK),
            "white" => return Ok(Self::WHITE),
            "yellow" => return Ok(Self::YELLOW),
            "red" => return Ok(Self { r: 255, g: 0, b: 0 }),
            "green" => return Ok(Self { r: 0, g: 128, b: 0 }),
            "blue" => return Ok(Self { r: 0, g: 0, b: 255 }),
            _ => {}
        }

        let hex = value.trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WandelwerkError::InvalidOptions(format!(
                "colour {value:?} is not #rrggbb or a known name"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| {
                WandelwerkError::InvalidOptions(format!("colour {value:?}: {e}"))
            })
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// Components scaled to 0.0..=1.0 (PDF colour space).
    pub fn to_unit(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

impl TryFrom<String> for Color {
    type Error = WandelwerkError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A PDF annotation request. `page` is a 0-based page index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    /// Sticky note (`/Text` annotation).
    Note {
        page: u32,
        x: f32,
        y: f32,
        contents: String,
    },
    /// Highlight box over a rectangle.
    Highlight {
        page: u32,
        rect: Rect,
        #[serde(default)]
        color: Option<Color>,
    },
    /// Clickable URI link.
    Link { page: u32, rect: Rect, uri: String },
}

impl Annotation {
    pub fn page(&self) -> u32 {
        match self {
            Self::Note { page, .. } | Self::Highlight { page, .. } | Self::Link { page, .. } => {
                *page
            }
        }
    }
}

/// Options accepted by any operation. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    /// Encoder quality, 1-100.
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Option<FitMode>,
    /// Crop rectangle, or watermark region to blur.
    pub region: Option<Region>,
    /// Clockwise rotation in degrees.
    pub degrees: Option<f32>,
    /// 0-based page index for PDF text insertion.
    pub page: Option<u32>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub font_size: Option<f32>,
    pub color: Option<Color>,
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// OCR language code (e.g. `eng`).
    pub language: Option<String>,
    /// Collage cell edge length in pixels.
    pub cell_size: Option<u32>,
}

/// Upper bound for any requested pixel dimension.
pub const MAX_DIMENSION: u32 = 16_384;

impl TransformOptions {
    /// Build options from a JSON object (the wire form of a request).
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| WandelwerkError::InvalidOptions(format!("malformed options: {e}")))
    }

    /// Check the options an operation needs, independent of the input.
    pub fn validate(&self, operation: OperationKind) -> Result<()> {
        if let Some(q) = self.quality
            && !(1..=100).contains(&q)
        {
            return Err(invalid(format!("quality must be 1-100, got {q}")));
        }
        for (name, dim) in [("width", self.width), ("height", self.height)] {
            if let Some(d) = dim
                && (d == 0 || d > MAX_DIMENSION)
            {
                return Err(invalid(format!("{name} must be 1-{MAX_DIMENSION}, got {d}")));
            }
        }

        match operation {
            OperationKind::Resize => {
                if self.width.is_none() && self.height.is_none() {
                    return Err(invalid("resize needs a width or a height"));
                }
                if self.fit == Some(FitMode::Fill)
                    && (self.width.is_none() || self.height.is_none())
                {
                    return Err(invalid("fill resize needs both width and height"));
                }
            }
            OperationKind::Crop => match self.region {
                None => return Err(invalid("crop needs a region")),
                Some(region) if region.is_empty() => {
                    return Err(invalid("crop region must have a non-zero size"));
                }
                Some(_) => {}
            },
            OperationKind::RemoveWatermark => {
                if self.region.is_some_and(|r| r.is_empty()) {
                    return Err(invalid("watermark region must have a non-zero size"));
                }
            }
            OperationKind::Rotate => match self.degrees {
                None => return Err(invalid("rotate needs degrees")),
                Some(d) if !d.is_finite() => {
                    return Err(invalid("rotation must be a finite number of degrees"));
                }
                Some(_) => {}
            },
            OperationKind::AddText => {
                if self.text.as_deref().is_none_or(|t| t.is_empty()) {
                    return Err(invalid("add-text needs non-empty text"));
                }
                if let Some(size) = self.font_size
                    && !(size > 0.0 && size <= 500.0)
                {
                    return Err(invalid(format!("font size must be in (0, 500], got {size}")));
                }
                for (name, coord) in [("x", self.x), ("y", self.y)] {
                    if coord.is_some_and(|c| !c.is_finite() || c < 0.0) {
                        return Err(invalid(format!("{name} must be a non-negative number")));
                    }
                }
            }
            OperationKind::Annotate => {
                if self.annotations.is_empty() {
                    return Err(invalid("annotate needs at least one annotation"));
                }
            }
            OperationKind::Ocr => {
                if let Some(lang) = self.language.as_deref()
                    && (lang.is_empty()
                        || lang.len() > 16
                        || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
                {
                    return Err(invalid(format!("language code {lang:?} is malformed")));
                }
            }
            OperationKind::Collage => {
                if let Some(cell) = self.cell_size
                    && (cell == 0 || cell > 4096)
                {
                    return Err(invalid(format!("cell size must be 1-4096, got {cell}")));
                }
            }
            OperationKind::Convert
            | OperationKind::Compress
            | OperationKind::RemoveBackground
            | OperationKind::Merge
            | OperationKind::ImagesToPdf => {}
        }

        Ok(())
    }

    /// Pages an operation will touch, for range checking against the input.
    pub fn referenced_pages(&self, operation: OperationKind) -> Vec<u32> {
        match operation {
            OperationKind::AddText => vec![self.page.unwrap_or(0)],
            OperationKind::Annotate => self.annotations.iter().map(Annotation::page).collect(),
            _ => Vec::new(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> WandelwerkError {
    WandelwerkError::InvalidOptions(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn region_bounds() {
        let region = Region { x: 10, y: 10, width: 90, height: 90 };
        assert!(region.fits_within(100, 100));
        assert!(!region.fits_within(99, 100));

        let huge = Region { x: 0, y: 0, width: 5000, height: 5000 };
        assert!(!huge.fits_within(100, 100));

        let overflow = Region { x: u32::MAX, y: 0, width: 2, height: 1 };
        assert!(!overflow.fits_within(u32::MAX, 1));
    }

    #[test]
    fn colour_parsing() {
        assert_eq!(Color::parse("#ff0080").unwrap(), Color { r: 255, g: 0, b: 128 });
        assert_eq!(Color::parse("BLACK").unwrap(), Color::BLACK);
        assert!(Color::parse("#12345").is_err());
        assert!(Color::parse("chartreuse-ish").is_err());
        assert_eq!(Color::WHITE.to_string(), "#ffffff");
    }

    #[test]
    fn options_from_wire_json() {
        let opts = TransformOptions::from_json(json!({
            "region": {"x": 0, "y": 0, "width": 5, "height": 5},
            "quality": 70,
            "color": "#000000",
            "annotations": [
                {"type": "note", "page": 1, "x": 10.0, "y": 20.0, "contents": "check"}
            ]
        }))
        .unwrap();
        assert_eq!(opts.quality, Some(70));
        assert_eq!(opts.color, Some(Color::BLACK));
        assert_eq!(opts.annotations[0].page(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TransformOptions::from_json(json!({"qualty": 10})).unwrap_err();
        assert!(matches!(err, WandelwerkError::InvalidOptions(_)));
    }

    #[test]
    fn per_operation_requirements() {
        let empty = TransformOptions::default();
        assert!(empty.validate(OperationKind::Convert).is_ok());
        assert!(empty.validate(OperationKind::Crop).is_err());
        assert!(empty.validate(OperationKind::Rotate).is_err());
        assert!(empty.validate(OperationKind::Resize).is_err());
        assert!(empty.validate(OperationKind::AddText).is_err());
        assert!(empty.validate(OperationKind::Annotate).is_err());
        assert!(empty.validate(OperationKind::RemoveWatermark).is_ok());

        let bad_quality = TransformOptions { quality: Some(0), ..Default::default() };
        assert!(bad_quality.validate(OperationKind::Convert).is_err());

        let fill_one_side = TransformOptions {
            width: Some(100),
            fit: Some(FitMode::Fill),
            ..Default::default()
        };
        assert!(fill_one_side.validate(OperationKind::Resize).is_err());
    }

    #[test]
    fn referenced_pages_default_to_first() {
        let opts = TransformOptions { text: Some("hi".into()), ..Default::default() };
        assert_eq!(opts.referenced_pages(OperationKind::AddText), vec![0]);
        assert!(opts.referenced_pages(OperationKind::Convert).is_empty());
    }
}
