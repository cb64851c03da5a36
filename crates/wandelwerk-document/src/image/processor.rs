// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — resize, crop, rotate, re-encode, compress, and the
// best-effort cleanup operations (background flattening, watermark blurring).
// Operates on in-memory images using the `image` and `imageproc` crates.

use ::image::codecs::jpeg::JpegEncoder;
use ::image::imageops::{self, FilterType};
use ::image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use imageproc::geometric_transformations::{self, Interpolation};
use tracing::{debug, info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::options::{FitMode, Region};
use wandelwerk_core::types::FileFormat;

/// Sigma used when blurring a watermark region.
pub const WATERMARK_BLUR_SIGMA: f32 = 10.0;

/// Per-channel distance under which a pixel counts as background.
const BACKGROUND_TOLERANCE: u32 = 40;

/// Image processing pipeline operating on a single in-memory image.
///
/// Infallible transformations consume `self` and return a new processor so
/// calls can be chained; operations that can reject their arguments (crop,
/// region blur) return `Result<Self>`.
///
/// ```ignore
/// let png = ImageProcessor::from_bytes(&bytes)?
///     .resize(Some(800), Some(600), FitMode::Inside)
///     .rotate(90.0)
///     .encode(FileFormat::Png, 90)?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Create a processor from raw encoded bytes (JPEG, PNG, WebP, ...).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let img = ::image::load_from_memory(data).map_err(|err| {
            WandelwerkError::ImageError(format!("failed to decode image: {err}"))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Read only the header of an encoded image and return its dimensions.
    ///
    /// Much cheaper than a full decode; used to validate geometry up front.
    pub fn probe_dimensions(data: &[u8]) -> Result<(u32, u32)> {
        ImageReader::new(std::io::Cursor::new(data))
            .with_guessed_format()
            .map_err(|err| WandelwerkError::ImageError(format!("cannot sniff format: {err}")))?
            .into_dimensions()
            .map_err(|err| WandelwerkError::ImageError(format!("cannot read dimensions: {err}")))
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Resize towards `width` x `height`.
    ///
    /// [`FitMode::Inside`] keeps the aspect ratio and never enlarges; a missing
    /// dimension is unconstrained. [`FitMode::Fill`] stretches to the exact box.
    #[instrument(skip(self), fields(from_w = self.image.width(), from_h = self.image.height()))]
    pub fn resize(self, width: Option<u32>, height: Option<u32>, fit: FitMode) -> Self {
        let (cur_w, cur_h) = (self.image.width(), self.image.height());
        let resized = match fit {
            FitMode::Fill => {
                let w = width.unwrap_or(cur_w);
                let h = height.unwrap_or(cur_h);
                self.image.resize_exact(w, h, FilterType::Lanczos3)
            }
            FitMode::Inside => {
                let max_w = width.unwrap_or(u32::MAX).min(cur_w);
                let max_h = height.unwrap_or(u32::MAX).min(cur_h);
                if max_w == cur_w && max_h == cur_h {
                    debug!("Image already fits, skipping resize");
                    return self;
                }
                self.image.resize(max_w, max_h, FilterType::Lanczos3)
            }
        };
        info!(
            new_w = resized.width(),
            new_h = resized.height(),
            ?fit,
            "Resize complete"
        );
        Self { image: resized }
    }

    /// Rotate clockwise by an arbitrary angle in degrees.
    ///
    /// Quarter turns are lossless. Any other angle is resampled with bilinear
    /// interpolation onto a canvas grown to hold the whole rotated image; the
    /// uncovered corners are transparent.
    #[instrument(skip(self), fields(degrees))]
    pub fn rotate(self, degrees: f32) -> Self {
        let normalised = degrees.rem_euclid(360.0);
        let near = |target: f32| (normalised - target).abs() < 0.01;

        if near(0.0) || near(360.0) {
            return self;
        }
        if near(90.0) {
            return Self { image: self.image.rotate90() };
        }
        if near(180.0) {
            return Self { image: self.image.rotate180() };
        }
        if near(270.0) {
            return Self { image: self.image.rotate270() };
        }

        let rgba = self.image.to_rgba8();
        let (w, h) = (rgba.width() as f32, rgba.height() as f32);
        let radians = normalised.to_radians();
        let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
        let new_w = (w * cos + h * sin).ceil() as u32;
        let new_h = (w * sin + h * cos).ceil() as u32;

        // Centre the source on the enlarged canvas, then rotate about the centre.
        let mut canvas = RgbaImage::from_pixel(new_w, new_h, Rgba([0, 0, 0, 0]));
        let offset_x = (new_w as i64 - rgba.width() as i64) / 2;
        let offset_y = (new_h as i64 - rgba.height() as i64) / 2;
        imageops::overlay(&mut canvas, &rgba, offset_x, offset_y);

        let rotated = geometric_transformations::rotate_about_center(
            &canvas,
            radians,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        );

        info!(new_w, new_h, "Rotated with canvas expansion");
        Self {
            image: DynamicImage::ImageRgba8(rotated),
        }
    }

    /// Crop a rectangular region. The region must lie inside the image.
    #[instrument(skip(self), fields(?region))]
    pub fn crop(self, region: Region) -> Result<Self> {
        check_region(&region, self.image.width(), self.image.height())?;
        let cropped = self
            .image
            .crop_imm(region.x, region.y, region.width, region.height);
        info!(width = region.width, height = region.height, "Cropped image");
        Ok(Self { image: cropped })
    }

    /// Blur a region in place — a best-effort watermark removal.
    #[instrument(skip(self), fields(?region))]
    pub fn blur_region(self, region: Region, sigma: f32) -> Result<Self> {
        check_region(&region, self.image.width(), self.image.height())?;

        let patch = self
            .image
            .crop_imm(region.x, region.y, region.width, region.height)
            .blur(sigma);
        let mut image = self.image;
        imageops::replace(&mut image, &patch, region.x as i64, region.y as i64);

        debug!(sigma, "Region blurred");
        Ok(Self { image })
    }

    /// Make the dominant border colour transparent — a best-effort background
    /// removal that works for flat backdrops only.
    ///
    /// The background colour is the average of the four corner pixels; every
    /// pixel within a fixed per-channel tolerance of it becomes transparent.
    #[instrument(skip(self))]
    pub fn remove_background(self) -> Self {
        let mut rgba = self.image.to_rgba8();
        let (w, h) = rgba.dimensions();
        if w == 0 || h == 0 {
            return Self { image: DynamicImage::ImageRgba8(rgba) };
        }

        let corners = [
            *rgba.get_pixel(0, 0),
            *rgba.get_pixel(w - 1, 0),
            *rgba.get_pixel(0, h - 1),
            *rgba.get_pixel(w - 1, h - 1),
        ];
        let mut background = [0u32; 3];
        for Rgba([r, g, b, _]) in corners {
            background[0] += r as u32;
            background[1] += g as u32;
            background[2] += b as u32;
        }
        let background = background.map(|c| c / 4);

        let mut cleared = 0u64;
        for pixel in rgba.pixels_mut() {
            let Rgba([r, g, b, _]) = *pixel;
            let close = [r, g, b]
                .iter()
                .zip(background)
                .all(|(&c, bg)| (c as u32).abs_diff(bg) <= BACKGROUND_TOLERANCE);
            if close {
                pixel.0[3] = 0;
                cleared += 1;
            }
        }

        info!(?background, cleared, "Background flattened to transparency");
        Self {
            image: DynamicImage::ImageRgba8(rgba),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode to `format`. `quality` (1-100) only affects JPEG.
    pub fn encode(&self, format: FileFormat, quality: u8) -> Result<Vec<u8>> {
        match format {
            FileFormat::Jpeg => self.to_jpeg_bytes(quality),
            FileFormat::Png => encode_to_format(&self.image, ImageFormat::Png),
            FileFormat::Webp => encode_to_format(&self.image, ImageFormat::WebP),
            FileFormat::Gif => encode_to_format(&self.image, ImageFormat::Gif),
            FileFormat::Tiff => encode_to_format(&self.image, ImageFormat::Tiff),
            FileFormat::Bmp => encode_to_format(&self.image, ImageFormat::Bmp),
            other => Err(WandelwerkError::ImageError(format!(
                "{other} is not a raster output format"
            ))),
        }
    }

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        encode_to_format(&self.image, ImageFormat::Png)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    ///
    /// Alpha is dropped; JPEG has no transparency.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder).map_err(|err| {
            WandelwerkError::ImageError(format!("JPEG encoding failed: {err}"))
        })?;
        Ok(buffer)
    }
}

fn check_region(region: &Region, width: u32, height: u32) -> Result<()> {
    if region.is_empty() || !region.fits_within(width, height) {
        return Err(WandelwerkError::Validation(format!(
            "region {}x{} at ({}, {}) does not fit inside the {width}x{height} image",
            region.width, region.height, region.x, region.y
        )));
    }
    Ok(())
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
///
/// The image is widened to RGBA8 first: it is accepted by every encoder we
/// target, whereas 16-bit or luma-alpha buffers are not.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    DynamicImage::ImageRgba8(image.to_rgba8())
        .write_to(&mut cursor, format)
        .map_err(|err| WandelwerkError::ImageError(format!("image encoding failed: {err}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, colour: [u8; 4]) -> ImageProcessor {
        ImageProcessor::from_dynamic(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba(colour),
        )))
    }

    #[test]
    fn crop_inside_bounds() {
        let cropped = solid(100, 80, [10, 20, 30, 255])
            .crop(Region { x: 10, y: 10, width: 50, height: 40 })
            .unwrap();
        assert_eq!((cropped.width(), cropped.height()), (50, 40));
    }

    #[test]
    fn crop_out_of_bounds_is_validation_error() {
        let err = solid(100, 100, [0, 0, 0, 255])
            .crop(Region { x: 0, y: 0, width: 5000, height: 5000 })
            .err()
            .unwrap();
        assert!(matches!(err, WandelwerkError::Validation(_)));
    }

    #[test]
    fn resize_inside_keeps_aspect_and_never_enlarges() {
        let resized = solid(200, 100, [0, 0, 0, 255]).resize(Some(100), Some(100), FitMode::Inside);
        assert_eq!((resized.width(), resized.height()), (100, 50));

        let untouched = solid(50, 50, [0, 0, 0, 255]).resize(Some(400), None, FitMode::Inside);
        assert_eq!((untouched.width(), untouched.height()), (50, 50));
    }

    #[test]
    fn resize_fill_is_exact() {
        let resized = solid(200, 100, [0, 0, 0, 255]).resize(Some(30), Some(70), FitMode::Fill);
        assert_eq!((resized.width(), resized.height()), (30, 70));
    }

    #[test]
    fn quarter_rotation_swaps_dimensions() {
        let rotated = solid(40, 10, [0, 0, 0, 255]).rotate(90.0);
        assert_eq!((rotated.width(), rotated.height()), (10, 40));
        let back = solid(40, 10, [0, 0, 0, 255]).rotate(-360.0);
        assert_eq!((back.width(), back.height()), (40, 10));
    }

    #[test]
    fn arbitrary_rotation_expands_canvas() {
        let rotated = solid(100, 100, [0, 0, 0, 255]).rotate(45.0);
        // 100 * sqrt(2) ~= 141.4
        assert!(rotated.width() >= 141 && rotated.width() <= 143);
        assert_eq!(rotated.width(), rotated.height());
    }

    #[test]
    fn background_removal_clears_flat_backdrop() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([250, 250, 250, 255]));
        for y in 5..15 {
            for x in 5..15 {
                img.put_pixel(x, y, Rgba([200, 0, 0, 255]));
            }
        }
        let cleaned = ImageProcessor::from_dynamic(DynamicImage::ImageRgba8(img))
            .remove_background()
            .into_dynamic()
            .to_rgba8();
        assert_eq!(cleaned.get_pixel(0, 0).0[3], 0);
        assert_eq!(cleaned.get_pixel(10, 10).0[3], 255);
    }

    #[test]
    fn blur_region_must_fit() {
        assert!(solid(10, 10, [0, 0, 0, 255])
            .blur_region(Region { x: 5, y: 5, width: 10, height: 10 }, 2.0)
            .is_err());
        let blurred = solid(10, 10, [0, 0, 0, 255])
            .blur_region(Region { x: 0, y: 0, width: 5, height: 5 }, 2.0)
            .unwrap();
        assert_eq!(blurred.width(), 10);
    }

    #[test]
    fn encode_and_probe() {
        let processor = solid(12, 7, [1, 2, 3, 255]);
        let png = processor.encode(FileFormat::Png, 90).unwrap();
        assert_eq!(ImageProcessor::probe_dimensions(&png).unwrap(), (12, 7));
        let jpeg = processor.encode(FileFormat::Jpeg, 50).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert!(processor.encode(FileFormat::Pdf, 90).is_err());
    }

    #[test]
    fn corrupt_bytes_are_image_errors() {
        let err = ImageProcessor::from_bytes(b"definitely not a jpeg").err().unwrap();
        assert!(matches!(err, WandelwerkError::ImageError(_)));
    }
}
