// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — decoding and normalization to printer-ready bitmaps.

pub mod normalize;

pub use normalize::{MAX_PRINT_WIDTH, PixelMode, PrintableImage, decode, normalize};
