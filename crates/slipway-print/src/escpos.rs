// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS thermal printer driver.
//
// Text styling is tracked as a single print-mode byte (ESC !) so that
// toggling one attribute never clears another.

use std::io::Write;
use std::path::Path;

use serial2::SerialPort;
use slipway_core::error::{Result, SlipwayError};
use slipway_document::PrintableImage;
use tracing::{debug, info, instrument};

use crate::device::PrinterDevice;
use crate::richtext::{Directive, Justify, TextSize};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

const INVERSE_MASK: u8 = 1 << 1;
const UPDOWN_MASK: u8 = 1 << 2;
const BOLD_MASK: u8 = 1 << 3;
const DOUBLE_HEIGHT_MASK: u8 = 1 << 4;
const DOUBLE_WIDTH_MASK: u8 = 1 << 5;
const STRIKE_MASK: u8 = 1 << 6;

/// Minimum line spacing in dots; below this rows of text overlap.
const MIN_LINE_HEIGHT: u8 = 24;

/// Rows per raster block when printing a normalized image.
const IMAGE_BAND_ROWS: u32 = 255;

/// A printer speaking ESC/POS over any byte sink.
pub struct EscPosPrinter<W: Write + Send> {
    sink: W,
    print_mode: u8,
}

impl EscPosPrinter<SerialPort> {
    /// Open a serial-attached printer and send the init sequence.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open_serial(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let port = SerialPort::open(path, baud_rate).map_err(|e| {
            SlipwayError::Device(format!("cannot open {}: {e}", path.display()))
        })?;
        info!("serial printer opened");
        let mut printer = Self::new(port);
        printer.begin()?;
        Ok(printer)
    }
}

impl<W: Write + Send> EscPosPrinter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            print_mode: 0,
        }
    }

    /// Initialize the printer (ESC @) and clear tracked styling.
    pub fn begin(&mut self) -> Result<()> {
        self.print_mode = 0;
        self.write(&[ESC, b'@'])?;
        self.flush()
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink
            .write_all(bytes)
            .map_err(|e| SlipwayError::Device(format!("write failed: {e}")))
    }

    fn flush(&mut self) -> Result<()> {
        self.sink
            .flush()
            .map_err(|e| SlipwayError::Device(format!("flush failed: {e}")))
    }

    fn write_print_mode(&mut self) -> Result<()> {
        let mode = self.print_mode;
        self.write(&[ESC, b'!', mode])
    }

    fn set_mode(&mut self, mask: u8) -> Result<()> {
        self.print_mode |= mask;
        self.write_print_mode()
    }

    fn unset_mode(&mut self, mask: u8) -> Result<()> {
        self.print_mode &= !mask;
        self.write_print_mode()
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let bytes: Vec<u8> = text
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect();
        self.write(&bytes)
    }

    /// GS v 0: raster bit image, `row_bytes` bytes per row.
    fn write_raster(&mut self, row_bytes: u16, rows: u16, data: &[u8]) -> Result<()> {
        let [xl, xh] = row_bytes.to_le_bytes();
        let [yl, yh] = rows.to_le_bytes();
        self.write(&[GS, b'v', b'0', 0, xl, xh, yl, yh])?;
        self.write(data)
    }

    fn apply(&mut self, directive: &Directive) -> Result<()> {
        match directive {
            Directive::Reset => {
                self.print_mode = 0;
                self.write(&[ESC, b'@'])
            }
            Directive::SetDefault => {
                self.print_mode = 0;
                // Online, left aligned, plain style, default spacing and sizes.
                self.write(&[ESC, b'=', 1])?;
                self.write(&[ESC, b'a', 0])?;
                self.write_print_mode()?;
                self.write(&[ESC, b'3', 30])?;
                self.write(&[ESC, b'-', 0])?;
                self.write(&[GS, b'h', 50])?;
                self.write(&[GS, b'!', 0])
            }
            Directive::PrintBarcode { text, kind } => {
                // Human-readable text below, module width 3.
                self.write(&[GS, b'H', 2])?;
                self.write(&[GS, b'w', 3])?;
                self.write(&[GS, b'k', *kind])?;
                self.write_text(text)?;
                self.write(&[0])
            }
            Directive::SetBarcodeHeight(height) => self.write(&[GS, b'h', (*height).max(1)]),
            Directive::Normal => {
                self.print_mode = 0;
                self.write_print_mode()
            }
            Directive::InverseOn => self.set_mode(INVERSE_MASK),
            Directive::InverseOff => self.unset_mode(INVERSE_MASK),
            Directive::UpsideDownOn => self.set_mode(UPDOWN_MASK),
            Directive::UpsideDownOff => self.unset_mode(UPDOWN_MASK),
            Directive::DoubleHeightOn => self.set_mode(DOUBLE_HEIGHT_MASK),
            Directive::DoubleHeightOff => self.unset_mode(DOUBLE_HEIGHT_MASK),
            Directive::DoubleWidthOn => self.set_mode(DOUBLE_WIDTH_MASK),
            Directive::DoubleWidthOff => self.unset_mode(DOUBLE_WIDTH_MASK),
            Directive::StrikeOn => self.set_mode(STRIKE_MASK),
            Directive::StrikeOff => self.unset_mode(STRIKE_MASK),
            Directive::BoldOn => self.set_mode(BOLD_MASK),
            Directive::BoldOff => self.unset_mode(BOLD_MASK),
            Directive::Justify(justify) => {
                let n = match justify {
                    Justify::Left => 0,
                    Justify::Center => 1,
                    Justify::Right => 2,
                };
                self.write(&[ESC, b'a', n])
            }
            Directive::Feed(lines) => self.write(&[ESC, b'd', *lines]),
            Directive::FeedRows(dots) => self.write(&[ESC, b'J', *dots]),
            Directive::SetSize(size) => {
                let n = match size {
                    TextSize::Large => 0x11,
                    TextSize::Medium => 0x01,
                    TextSize::Small => 0x00,
                };
                self.write(&[GS, b'!', n])
            }
            Directive::UnderlineOn(weight) => self.write(&[ESC, b'-', (*weight).min(2)]),
            Directive::UnderlineOff => self.write(&[ESC, b'-', 0]),
            Directive::PrintBitmap {
                width,
                height,
                bitmap,
                line_at_a_time,
            } => {
                let row_bytes = width.div_ceil(8);
                let stride = usize::from(row_bytes);
                let needed = stride * usize::from(*height);
                let data = bitmap.get(..needed).ok_or_else(|| {
                    SlipwayError::Device(format!(
                        "bitmap has {} bytes, {needed} required",
                        bitmap.len()
                    ))
                })?;
                if *line_at_a_time {
                    for row in data.chunks(stride) {
                        self.write_raster(row_bytes, 1, row)?;
                    }
                    Ok(())
                } else {
                    self.write_raster(row_bytes, *height, data)
                }
            }
            Directive::SetLineHeight(dots) => self.write(&[ESC, b'3', (*dots).max(MIN_LINE_HEIGHT)]),
            Directive::Print(text) => self.write_text(text),
            Directive::Println(text) => {
                self.write_text(text)?;
                self.write(b"\n")
            }
        }
    }
}

impl<W: Write + Send> PrinterDevice for EscPosPrinter<W> {
    fn execute(&mut self, directive: &Directive) -> Result<()> {
        debug!(directive = directive.name(), "escpos directive");
        self.apply(directive)?;
        self.flush()
    }

    fn print_image(&mut self, image: &PrintableImage) -> Result<()> {
        let (row_bytes, data) = image.pack_rows();
        let row_bytes = u16::try_from(row_bytes)
            .map_err(|_| SlipwayError::Device(format!("image row too wide: {row_bytes} bytes")))?;
        let stride = usize::from(row_bytes).max(1);
        debug!(
            width = image.width(),
            height = image.height(),
            "escpos raster image"
        );

        for band in data.chunks(stride * IMAGE_BAND_ROWS as usize) {
            let rows = (band.len() / stride) as u16;
            self.write_raster(row_bytes, rows, band)?;
        }
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn bytes_for(directives: &[Directive]) -> Vec<u8> {
        let mut printer = EscPosPrinter::new(Vec::new());
        for d in directives {
            printer.execute(d).expect("execute");
        }
        printer.into_inner()
    }

    #[test]
    fn begin_sends_initialize() {
        let mut printer = EscPosPrinter::new(Vec::new());
        printer.begin().expect("begin");
        assert_eq!(printer.into_inner(), vec![ESC, b'@']);
    }

    #[test]
    #[rustfmt::skip]
    fn style_toggles_accumulate_in_print_mode() {
        let out = bytes_for(&[Directive::BoldOn, Directive::InverseOn, Directive::BoldOff]);
        assert_eq!(
            out,
            vec![
                ESC, b'!', BOLD_MASK,
                ESC, b'!', BOLD_MASK | INVERSE_MASK,
                ESC, b'!', INVERSE_MASK,
            ]
        );
    }

    #[test]
    fn println_appends_newline_and_masks_non_ascii() {
        let out = bytes_for(&[Directive::Println("café".into())]);
        assert_eq!(out, b"caf?\n".to_vec());
    }

    #[test]
    fn layout_directives_map_to_escpos_bytes() {
        assert_eq!(bytes_for(&[Directive::Justify(Justify::Center)]), vec![ESC, b'a', 1]);
        assert_eq!(bytes_for(&[Directive::Feed(3)]), vec![ESC, b'd', 3]);
        assert_eq!(bytes_for(&[Directive::SetSize(TextSize::Large)]), vec![GS, b'!', 0x11]);
        assert_eq!(bytes_for(&[Directive::SetLineHeight(10)]), vec![ESC, b'3', 24]);
        assert_eq!(bytes_for(&[Directive::UnderlineOn(5)]), vec![ESC, b'-', 2]);
    }

    #[test]
    fn barcode_is_nul_terminated() {
        let out = bytes_for(&[Directive::PrintBarcode {
            text: "123".into(),
            kind: 4,
        }]);
        assert_eq!(
            out,
            vec![GS, b'H', 2, GS, b'w', 3, GS, b'k', 4, b'1', b'2', b'3', 0]
        );
    }

    #[test]
    #[rustfmt::skip]
    fn bitmap_line_at_a_time_sends_one_block_per_row() {
        let out = bytes_for(&[Directive::PrintBitmap {
            width: 8,
            height: 2,
            bitmap: vec![0xAA, 0x55],
            line_at_a_time: true,
        }]);
        assert_eq!(
            out,
            vec![
                GS, b'v', b'0', 0, 1, 0, 1, 0, 0xAA,
                GS, b'v', b'0', 0, 1, 0, 1, 0, 0x55,
            ]
        );
    }

    #[test]
    fn image_is_sent_as_raster_bands() {
        let gray = GrayImage::from_pixel(16, 300, Luma([0]));
        let printable = slipway_document::normalize(&DynamicImage::ImageLuma8(gray));

        let mut printer = EscPosPrinter::new(Vec::new());
        printer.print_image(&printable).expect("print");
        let out = printer.into_inner();

        // Two bands: 255 rows then 45 rows, 2 bytes per row.
        assert_eq!(&out[..8], &[GS, b'v', b'0', 0, 2, 0, 255, 0]);
        let second = 8 + 255 * 2;
        assert_eq!(&out[second..second + 8], &[GS, b'v', b'0', 0, 2, 0, 45, 0]);
        assert_eq!(out.len(), 8 + 255 * 2 + 8 + 45 * 2);
    }
}
