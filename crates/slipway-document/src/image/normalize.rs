// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image normalizer — turns an arbitrary decoded image into a bitmap the
// thermal print head can reproduce: 1-bit or 8-bit grayscale, bounded to the
// head width, rotated when it is wider than the head.

use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use slipway_core::error::SlipwayError;
use tracing::{debug, info, instrument};

/// Addressable dots across the print head.
pub const MAX_PRINT_WIDTH: u32 = 384;

/// Pixel modes the printer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    /// Bilevel: every pixel is 0 (black) or 255 (white).
    Mono,
    /// 8-bit grayscale, thresholded at print time.
    Gray,
}

/// A bitmap ready to be sent to the printer.
#[derive(Debug, Clone)]
pub struct PrintableImage {
    mode: PixelMode,
    pixels: GrayImage,
}

impl PrintableImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn mode(&self) -> PixelMode {
        self.mode
    }

    /// Borrow the underlying luma buffer.
    pub fn as_luma(&self) -> &GrayImage {
        &self.pixels
    }

    /// Pack the image into raster rows, MSB first, 1 = black dot.
    ///
    /// Returns the number of bytes per row and the packed data
    /// (`row_bytes * height` bytes).
    pub fn pack_rows(&self) -> (u32, Vec<u8>) {
        let (width, height) = self.pixels.dimensions();
        let row_bytes = width.div_ceil(8);
        let mut data = Vec::with_capacity((row_bytes * height) as usize);

        for y in 0..height {
            for x_byte in 0..row_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x < width && self.pixels.get_pixel(x, y)[0] < 128 {
                        byte |= 1 << (7 - bit);
                    }
                }
                data.push(byte);
            }
        }
        (row_bytes, data)
    }
}

/// Decode raw encoded bytes (PNG, JPEG, BMP, GIF, ...) into an image.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode(data: &[u8]) -> Result<DynamicImage, SlipwayError> {
    let img = image::load_from_memory(data)
        .map_err(|err| SlipwayError::ImageError(format!("failed to decode image: {}", err)))?;
    debug!(
        width = img.width(),
        height = img.height(),
        "Image decoded from bytes"
    );
    Ok(img)
}

/// Normalize an image for printing.
///
/// 1. Anything other than 8-bit grayscale is flattened onto white and
///    Floyd–Steinberg dithered to 1-bit.
/// 2. If *both* sides exceed [`MAX_PRINT_WIDTH`], the image is scaled so its
///    longer side becomes exactly `MAX_PRINT_WIDTH` (integer truncation on
///    the shorter side).
/// 3. If the width still exceeds `MAX_PRINT_WIDTH`, the image is rotated 90°
///    counter-clockwise so the long side runs along the paper.
///
/// The input is never modified.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn normalize(image: &DynamicImage) -> PrintableImage {
    let (mode, mut pixels) = coerce_mode(image);

    let (width, height) = pixels.dimensions();
    if width > MAX_PRINT_WIDTH && height > MAX_PRINT_WIDTH {
        let (new_w, new_h) = scaled_dimensions(width, height, MAX_PRINT_WIDTH);
        info!(
            from_w = width,
            from_h = height,
            new_w,
            new_h,
            "Downscaling image to print width"
        );
        // Nearest keeps a dithered image bilevel.
        pixels = imageops::resize(&pixels, new_w, new_h, FilterType::Nearest);
    }

    if pixels.width() > MAX_PRINT_WIDTH {
        info!(
            width = pixels.width(),
            height = pixels.height(),
            "Rotating image to fit print head"
        );
        pixels = imageops::rotate270(&pixels);
    }

    debug!(
        mode = ?mode,
        width = pixels.width(),
        height = pixels.height(),
        "Image normalized"
    );
    PrintableImage { mode, pixels }
}

/// Dimensions after scaling the longer side down to `bound`.
pub fn scaled_dimensions(width: u32, height: u32, bound: u32) -> (u32, u32) {
    let longest = u64::from(width.max(height)).max(1);
    let scale = |d: u32| ((u64::from(d) * u64::from(bound)) / longest).max(1) as u32;
    (scale(width), scale(height))
}

fn coerce_mode(image: &DynamicImage) -> (PixelMode, GrayImage) {
    match image {
        DynamicImage::ImageLuma8(gray) => (PixelMode::Gray, gray.clone()),
        other => {
            let luma_alpha = other.to_luma_alpha8();
            // Transparent areas print as paper, not as black.
            let mut gray: GrayImage =
                ImageBuffer::from_fn(luma_alpha.width(), luma_alpha.height(), |x, y| {
                    let px = luma_alpha.get_pixel(x, y);
                    let (l, a) = (u32::from(px[0]), u32::from(px[1]));
                    Luma([((l * a + 255 * (255 - a)) / 255) as u8])
                });
            imageops::dither(&mut gray, &BiLevel);
            (PixelMode::Mono, gray)
        }
    }
}
