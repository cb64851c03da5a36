// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grid collage composition.

use ::image::imageops::{self, FilterType};
use ::image::{DynamicImage, Rgb, RgbImage};
use tracing::{info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::MAX_DIMENSION;

/// Number of (columns, rows) for `count` tiles: as square as possible,
/// filled row by row.
pub fn grid_dimensions(count: usize) -> (u32, u32) {
    if count == 0 {
        return (0, 0);
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    (cols as u32, rows as u32)
}

/// Lay `images` out on a white canvas, one square cell of `cell_size` pixels
/// per image. Each image is scaled to fit its cell and centred in it.
#[instrument(skip(images), fields(count = images.len()))]
pub fn compose_collage(images: &[DynamicImage], cell_size: u32) -> Result<DynamicImage> {
    if images.is_empty() {
        return Err(WandelwerkError::ImageError("collage needs at least one image".into()));
    }
    if cell_size == 0 {
        return Err(WandelwerkError::ImageError("collage cell size must be non-zero".into()));
    }

    let (cols, rows) = grid_dimensions(images.len());
    let canvas_w = cols.checked_mul(cell_size);
    let canvas_h = rows.checked_mul(cell_size);
    let (Some(canvas_w), Some(canvas_h)) = (canvas_w, canvas_h) else {
        return Err(WandelwerkError::ImageError("collage canvas is too large".into()));
    };
    if canvas_w > MAX_DIMENSION || canvas_h > MAX_DIMENSION {
        return Err(WandelwerkError::Validation(format!(
            "collage of {} images at {cell_size}px cells needs a {canvas_w}x{canvas_h} canvas, \
             limit is {MAX_DIMENSION}px per side",
            images.len()
        )));
    }

    let mut canvas = RgbImage::from_pixel(canvas_w, canvas_h, Rgb([255, 255, 255]));
    for (index, image) in images.iter().enumerate() {
        let col = index as u32 % cols;
        let row = index as u32 / cols;
        let tile = image.resize(cell_size, cell_size, FilterType::Triangle).to_rgb8();
        let x = col * cell_size + (cell_size - tile.width()) / 2;
        let y = row * cell_size + (cell_size - tile.height()) / 2;
        imageops::overlay(&mut canvas, &tile, x as i64, y as i64);
    }

    info!(cols, rows, canvas_w, canvas_h, "Collage composed");
    Ok(DynamicImage::ImageRgb8(canvas))
}
