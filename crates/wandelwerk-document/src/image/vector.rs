// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SVG rasterisation via `resvg`.

use ::image::{DynamicImage, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use tracing::{debug, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::MAX_DIMENSION;

/// Renders SVG documents to RGBA rasters.
#[derive(Debug, Clone, Copy)]
pub struct SvgRasterizer {
    /// Bounding box used when the caller gives neither width nor height.
    default_width: u32,
    default_height: u32,
}

impl SvgRasterizer {
    pub fn new(default_width: u32, default_height: u32) -> Self {
        Self {
            default_width: default_width.max(1),
            default_height: default_height.max(1),
        }
    }

    /// Rasterise `data` so it fits inside the requested box, keeping the
    /// drawing's aspect ratio.
    ///
    /// A missing dimension is unconstrained up to `MAX_DIMENSION`; with
    /// neither given the default box is used. Vector art is resolution
    /// independent, so this may enlarge.
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub fn rasterize(
        &self,
        data: &[u8],
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<DynamicImage> {
        let tree = Tree::from_data(data, &Options::default())
            .map_err(|err| WandelwerkError::ImageError(format!("failed to parse SVG: {err}")))?;

        let size = tree.size();
        let (src_w, src_h) = (size.width(), size.height());
        let (box_w, box_h) = match (width, height) {
            (None, None) => (Some(self.default_width), Some(self.default_height)),
            other => other,
        };
        let scale_w = box_w.map_or(f32::INFINITY, |w| w as f32 / src_w);
        let scale_h = box_h.map_or(f32::INFINITY, |h| h as f32 / src_h);
        let scale_cap = (MAX_DIMENSION as f32 / src_w).min(MAX_DIMENSION as f32 / src_h);
        let scale = scale_w.min(scale_h).min(scale_cap);

        let out_w = ((src_w * scale).round() as u32).clamp(1, MAX_DIMENSION);
        let out_h = ((src_h * scale).round() as u32).clamp(1, MAX_DIMENSION);

        let mut pixmap = Pixmap::new(out_w, out_h).ok_or_else(|| {
            WandelwerkError::ImageError(format!("cannot allocate a {out_w}x{out_h} canvas"))
        })?;
        resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        // tiny-skia stores premultiplied alpha; `image` expects straight alpha.
        let mut raw = Vec::with_capacity(pixmap.pixels().len() * 4);
        for pixel in pixmap.pixels() {
            let c = pixel.demultiply();
            raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        let rgba = RgbaImage::from_raw(out_w, out_h, raw).ok_or_else(|| {
            WandelwerkError::ImageError("rasterised buffer has the wrong size".into())
        })?;

        debug!(src_w, src_h, out_w, out_h, "SVG rasterised");
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50">
        <rect x="0" y="0" width="100" height="50" fill="#ff0000"/>
    </svg>"##;

    #[test]
    fn defaults_fit_inside_box() {
        let img = SvgRasterizer::new(1920, 1080).rasterize(SQUARE, None, None).unwrap();
        // 100x50 scaled by min(19.2, 21.6)
        assert_eq!((img.width(), img.height()), (1920, 960));
    }

    #[test]
    fn single_dimension_keeps_aspect() {
        let img = SvgRasterizer::new(1920, 1080)
            .rasterize(SQUARE, Some(200), None)
            .unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
        let px = img.to_rgba8().get_pixel(100, 50).0;
        assert_eq!(px, [255, 0, 0, 255]);
    }

    #[test]
    fn tall_drawing_is_clamped() {
        let tall = br##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="1000">
            <rect x="0" y="0" width="10" height="1000" fill="#00ff00"/>
        </svg>"##;
        let img = SvgRasterizer::new(1920, 1080)
            .rasterize(tall, Some(1000), None)
            .unwrap();
        assert_eq!(img.height(), MAX_DIMENSION);
        assert!(img.width() <= 200);
    }

    #[test]
    fn malformed_svg_is_an_image_error() {
        let err = SvgRasterizer::new(10, 10)
            .rasterize(b"<svg", None, None)
            .err()
            .unwrap();
        assert!(matches!(err, WandelwerkError::ImageError(_)));
    }
}
