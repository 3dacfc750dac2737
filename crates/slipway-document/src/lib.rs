// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// slipway-document — Document preparation for the Slipway receipt printer.
//
// Provides image normalization (mode coercion, bounded downscaling, rotation
// to fit the print head) and hard wrapping of plain text to the paper width.

pub mod image;
pub mod text;

// Re-export the primary items so callers can use `slipway_document::normalize` etc.
pub use image::normalize::{MAX_PRINT_WIDTH, PixelMode, PrintableImage, decode, normalize};
pub use text::wrap;
