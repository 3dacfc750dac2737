// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client-side request helpers shared by both transports.

use async_trait::async_trait;
use slipway_core::error::Result;
use slipway_core::protocol::{Arg, Command, Envelope, Reply};

use crate::richtext::{BarcodeKind, Justify, TextSize};

/// A connection that can send one request and wait for its reply.
#[async_trait]
pub trait JobClient: Send {
    /// Send `envelope` and wait for the matching reply.
    async fn call(&mut self, envelope: &Envelope) -> Result<Reply>;

    async fn send_simple_text(&mut self, text: &str, wrap: bool) -> Result<Reply> {
        self.call(&Envelope::simple_text(text, wrap)).await
    }

    /// Send an encoded image file (PNG, JPEG, ...).
    async fn send_image(&mut self, image_file: Vec<u8>) -> Result<Reply> {
        self.call(&Envelope::image(image_file)).await
    }

    async fn send_rich_text(&mut self, commands: Vec<Command>) -> Result<Reply> {
        self.call(&Envelope::rich_text(commands)).await
    }

    async fn query_job_state(&mut self, job_id: &str) -> Result<Reply> {
        self.call(&Envelope::query_job_state(job_id)).await
    }
}

// ---------------------------------------------------------------------------
// RichTextBuilder
// ---------------------------------------------------------------------------

/// Builds a rich-text command list with one method per printer directive.
///
/// ```
/// use slipway_print::{BarcodeKind, Justify, RichTextBuilder};
///
/// let commands = RichTextBuilder::new()
///     .set_default()
///     .justify(Justify::Center)
///     .bold_on()
///     .println(["RECEIPT"])
///     .bold_off()
///     .print_barcode("012345678905", BarcodeKind::UpcA)
///     .feed(3)
///     .build();
/// assert_eq!(commands.len(), 7);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RichTextBuilder {
    commands: Vec<Command>,
}

macro_rules! bare_directives {
    ($($method:ident => $code:literal),* $(,)?) => {
        $(
            pub fn $method(self) -> Self {
                self.bare($code)
            }
        )*
    };
}

impl RichTextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The commands added so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn build(self) -> Vec<Command> {
        self.commands
    }

    fn bare(mut self, code: &str) -> Self {
        self.commands.push(Command::bare(code));
        self
    }

    fn call(mut self, code: &str, args: Vec<Arg>) -> Self {
        self.commands.push(Command::call(code, args));
        self
    }

    bare_directives! {
        reset => "reset",
        set_default => "setDefault",
        normal => "normal",
        inverse_on => "inverseOn",
        inverse_off => "inverseOff",
        upside_down_on => "upsideDownOn",
        upside_down_off => "upsideDownOff",
        double_height_on => "doubleHeightOn",
        double_height_off => "doubleHeightOff",
        double_width_on => "doubleWidthOn",
        double_width_off => "doubleWidthOff",
        strike_on => "strikeOn",
        strike_off => "strikeOff",
        bold_on => "boldOn",
        bold_off => "boldOff",
        underline_off => "underlineOff",
    }

    pub fn print_barcode(self, text: impl Into<String>, kind: BarcodeKind) -> Self {
        self.call(
            "printBarcode",
            vec![Arg::from(text.into()), Arg::Int(i64::from(kind.code()))],
        )
    }

    /// Barcode height in dots (printer default 50).
    pub fn set_barcode_height(self, dots: u8) -> Self {
        self.call("setBarcodeHeight", vec![Arg::Int(i64::from(dots))])
    }

    pub fn justify(self, justify: Justify) -> Self {
        self.call("justify", vec![Arg::from(justify.code())])
    }

    /// Feed `lines` text lines (printer default 1).
    pub fn feed(self, lines: u8) -> Self {
        self.call("feed", vec![Arg::Int(i64::from(lines))])
    }

    /// Feed `rows` dot rows.
    pub fn feed_rows(self, rows: u8) -> Self {
        self.call("feedRows", vec![Arg::Int(i64::from(rows))])
    }

    pub fn set_size(self, size: TextSize) -> Self {
        self.call("setSize", vec![Arg::from(size.code())])
    }

    /// Underline with a stroke `weight` of 1 or 2 dots (printer default 1).
    pub fn underline_on(self, weight: u8) -> Self {
        self.call("underlineOn", vec![Arg::Int(i64::from(weight))])
    }

    /// A packed 1-bit bitmap, rows MSB-first, `width.div_ceil(8)` bytes per row.
    pub fn print_bitmap(
        self,
        width: u16,
        height: u16,
        bitmap: Vec<u8>,
        line_at_a_time: bool,
    ) -> Self {
        self.call(
            "printBitmap",
            vec![
                Arg::Int(i64::from(width)),
                Arg::Int(i64::from(height)),
                Arg::from(bitmap),
                Arg::Bool(line_at_a_time),
            ],
        )
    }

    /// Line spacing in dots (printer default 32).
    pub fn set_line_height(self, dots: u8) -> Self {
        self.call("setLineHeight", vec![Arg::Int(i64::from(dots))])
    }

    /// Print the concatenated text of `parts`.
    pub fn print<I>(self, parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        self.call("print", parts.into_iter().map(Into::into).collect())
    }

    /// [`RichTextBuilder::print`] followed by a newline.
    pub fn println<I>(self, parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        self.call("println", parts.into_iter().map(Into::into).collect())
    }
}
