// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rich-text interpreter.
//
// A rich-text job is an ordered list of commands, each naming one of the
// printer's capabilities.  Names are resolved through the closed `Directive`
// table below: anything not in the table is skipped, and arguments are
// checked against the directive's signature before the device is touched.

use slipway_core::error::{Result, SlipwayError};
use slipway_core::protocol::{Arg, Command};
use tracing::{debug, warn};

use crate::device::PrinterDevice;

/// Text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
    Right,
}

impl Justify {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l" => Some(Self::Left),
            "c" => Some(Self::Center),
            "r" => Some(Self::Right),
            _ => None,
        }
    }

    /// Wire form: `l`, `c` or `r`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Left => "l",
            Self::Center => "c",
            Self::Right => "r",
        }
    }
}

/// Character size presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Small,
    Medium,
    Large,
}

impl TextSize {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s" => Some(Self::Small),
            "m" => Some(Self::Medium),
            "l" => Some(Self::Large),
            _ => None,
        }
    }

    /// Wire form: `s`, `m` or `l`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Small => "s",
            Self::Medium => "m",
            Self::Large => "l",
        }
    }
}

/// Barcode symbologies, numbered as the printer's `GS k` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BarcodeKind {
    UpcA = 0,
    UpcE = 1,
    Ean13 = 2,
    Ean8 = 3,
    Code39 = 4,
    Itf = 5,
    Codabar = 6,
    Code93 = 7,
    Code128 = 8,
    Code11 = 9,
    Msi = 10,
}

impl BarcodeKind {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Every operation a rich-text job may perform on the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Reset,
    SetDefault,
    PrintBarcode { text: String, kind: u8 },
    SetBarcodeHeight(u8),
    Normal,
    InverseOn,
    InverseOff,
    UpsideDownOn,
    UpsideDownOff,
    DoubleHeightOn,
    DoubleHeightOff,
    DoubleWidthOn,
    DoubleWidthOff,
    StrikeOn,
    StrikeOff,
    BoldOn,
    BoldOff,
    Justify(Justify),
    Feed(u8),
    FeedRows(u8),
    SetSize(TextSize),
    UnderlineOn(u8),
    UnderlineOff,
    /// Packed 1-bit raster, `width.div_ceil(8)` bytes per row.
    PrintBitmap {
        width: u16,
        height: u16,
        bitmap: Vec<u8>,
        line_at_a_time: bool,
    },
    SetLineHeight(u8),
    Print(String),
    Println(String),
}

impl Directive {
    /// Resolve a directive name and its positional arguments.
    ///
    /// Returns `Ok(None)` for names outside the table, and
    /// [`SlipwayError::InvalidCommand`] when the arguments do not fit.
    pub fn parse(code: &str, args: Option<&[Arg]>) -> Result<Option<Self>> {
        let args = args.unwrap_or(&[]);
        let directive = match code {
            "reset" => flag(code, args, Self::Reset)?,
            "setDefault" => flag(code, args, Self::SetDefault)?,
            "printBarcode" => {
                arity(code, args, 2, 2)?;
                Self::PrintBarcode {
                    text: text_arg(code, args, 0)?,
                    kind: u8_arg(code, args, 1)?,
                }
            }
            "setBarcodeHeight" => {
                arity(code, args, 0, 1)?;
                Self::SetBarcodeHeight(opt_u8_arg(code, args, 0, 50)?)
            }
            "normal" => flag(code, args, Self::Normal)?,
            "inverseOn" => flag(code, args, Self::InverseOn)?,
            "inverseOff" => flag(code, args, Self::InverseOff)?,
            "upsideDownOn" => flag(code, args, Self::UpsideDownOn)?,
            "upsideDownOff" => flag(code, args, Self::UpsideDownOff)?,
            "doubleHeightOn" => flag(code, args, Self::DoubleHeightOn)?,
            "doubleHeightOff" => flag(code, args, Self::DoubleHeightOff)?,
            "doubleWidthOn" => flag(code, args, Self::DoubleWidthOn)?,
            "doubleWidthOff" => flag(code, args, Self::DoubleWidthOff)?,
            "strikeOn" => flag(code, args, Self::StrikeOn)?,
            "strikeOff" => flag(code, args, Self::StrikeOff)?,
            "boldOn" => flag(code, args, Self::BoldOn)?,
            "boldOff" => flag(code, args, Self::BoldOff)?,
            "justify" => {
                arity(code, args, 1, 1)?;
                let value = text_arg(code, args, 0)?;
                Self::Justify(Justify::parse(&value).ok_or_else(|| {
                    invalid(code, format!("justify expects l, c or r, got {value:?}"))
                })?)
            }
            "feed" => {
                arity(code, args, 0, 1)?;
                Self::Feed(opt_u8_arg(code, args, 0, 1)?)
            }
            "feedRows" => {
                arity(code, args, 1, 1)?;
                Self::FeedRows(u8_arg(code, args, 0)?)
            }
            "setSize" => {
                arity(code, args, 1, 1)?;
                let value = text_arg(code, args, 0)?;
                Self::SetSize(TextSize::parse(&value).ok_or_else(|| {
                    invalid(code, format!("size expects s, m or l, got {value:?}"))
                })?)
            }
            "underlineOn" => {
                arity(code, args, 0, 1)?;
                Self::UnderlineOn(opt_u8_arg(code, args, 0, 1)?)
            }
            "underlineOff" => flag(code, args, Self::UnderlineOff)?,
            "printBitmap" => parse_bitmap(code, args)?,
            "setLineHeight" => {
                arity(code, args, 0, 1)?;
                Self::SetLineHeight(opt_u8_arg(code, args, 0, 32)?)
            }
            "print" => Self::Print(concat_text(args)),
            "println" => Self::Println(concat_text(args)),
            _ => return Ok(None),
        };
        Ok(Some(directive))
    }

    /// Wire name of this directive.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::SetDefault => "setDefault",
            Self::PrintBarcode { .. } => "printBarcode",
            Self::SetBarcodeHeight(_) => "setBarcodeHeight",
            Self::Normal => "normal",
            Self::InverseOn => "inverseOn",
            Self::InverseOff => "inverseOff",
            Self::UpsideDownOn => "upsideDownOn",
            Self::UpsideDownOff => "upsideDownOff",
            Self::DoubleHeightOn => "doubleHeightOn",
            Self::DoubleHeightOff => "doubleHeightOff",
            Self::DoubleWidthOn => "doubleWidthOn",
            Self::DoubleWidthOff => "doubleWidthOff",
            Self::StrikeOn => "strikeOn",
            Self::StrikeOff => "strikeOff",
            Self::BoldOn => "boldOn",
            Self::BoldOff => "boldOff",
            Self::Justify(_) => "justify",
            Self::Feed(_) => "feed",
            Self::FeedRows(_) => "feedRows",
            Self::SetSize(_) => "setSize",
            Self::UnderlineOn(_) => "underlineOn",
            Self::UnderlineOff => "underlineOff",
            Self::PrintBitmap { .. } => "printBitmap",
            Self::SetLineHeight(_) => "setLineHeight",
            Self::Print(_) => "print",
            Self::Println(_) => "println",
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn invalid(code: &str, detail: impl std::fmt::Display) -> SlipwayError {
    SlipwayError::InvalidCommand(format!("{code}: {detail}"))
}

fn arity(code: &str, args: &[Arg], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}..={max}")
        };
        return Err(invalid(
            code,
            format!("expected {expected} arguments, got {}", args.len()),
        ));
    }
    Ok(())
}

fn flag(code: &str, args: &[Arg], directive: Directive) -> Result<Directive> {
    arity(code, args, 0, 0)?;
    Ok(directive)
}

fn text_arg(code: &str, args: &[Arg], index: usize) -> Result<String> {
    args[index]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid(code, format!("argument {index} must be a string")))
}

fn int_arg(code: &str, args: &[Arg], index: usize) -> Result<i64> {
    args[index]
        .as_int()
        .ok_or_else(|| invalid(code, format!("argument {index} must be an integer")))
}

fn u8_arg(code: &str, args: &[Arg], index: usize) -> Result<u8> {
    let value = int_arg(code, args, index)?;
    u8::try_from(value)
        .map_err(|_| invalid(code, format!("argument {index} out of range 0..=255: {value}")))
}

fn opt_u8_arg(code: &str, args: &[Arg], index: usize, default: u8) -> Result<u8> {
    if index < args.len() {
        u8_arg(code, args, index)
    } else {
        Ok(default)
    }
}

fn u16_arg(code: &str, args: &[Arg], index: usize) -> Result<u16> {
    let value = int_arg(code, args, index)?;
    u16::try_from(value)
        .map_err(|_| invalid(code, format!("argument {index} out of range: {value}")))
}

fn parse_bitmap(code: &str, args: &[Arg]) -> Result<Directive> {
    arity(code, args, 3, 4)?;
    let width = u16_arg(code, args, 0)?;
    let height = u16_arg(code, args, 1)?;
    let bitmap = args[2]
        .to_bytes()
        .ok_or_else(|| invalid(code, "argument 2 must be bitmap bytes"))?;
    let line_at_a_time = match args.get(3) {
        Some(arg) => arg
            .as_bool()
            .ok_or_else(|| invalid(code, "argument 3 must be a boolean"))?,
        None => false,
    };

    if width == 0 || height == 0 {
        return Err(invalid(code, "bitmap dimensions must be non-zero"));
    }
    let needed = usize::from(width).div_ceil(8) * usize::from(height);
    if bitmap.len() < needed {
        return Err(invalid(
            code,
            format!(
                "{width}x{height} bitmap needs {needed} bytes, got {}",
                bitmap.len()
            ),
        ));
    }

    Ok(Directive::PrintBitmap {
        width,
        height,
        bitmap,
        line_at_a_time,
    })
}

fn concat_text(args: &[Arg]) -> String {
    args.iter().map(Arg::to_text).collect()
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Counts reported after interpreting a command list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpretSummary {
    /// Commands sent to the device.
    pub executed: usize,
    /// Unknown directive names.
    pub skipped: usize,
    /// Known directives whose arguments did not fit.
    pub rejected: usize,
}

/// Feed `commands` to `device` in order.
///
/// Unknown names and malformed arguments only affect their own command.
/// A device error stops the sequence and is returned, since the printer
/// channel can no longer be trusted.
pub fn interpret(
    device: &mut dyn PrinterDevice,
    commands: &[Command],
) -> Result<InterpretSummary> {
    let mut summary = InterpretSummary::default();

    for (index, command) in commands.iter().enumerate() {
        let code = command.code();
        match Directive::parse(code, command.args()) {
            Ok(Some(directive)) => {
                device.execute(&directive)?;
                summary.executed += 1;
            }
            Ok(None) => {
                debug!(index, code, "unknown directive skipped");
                summary.skipped += 1;
            }
            Err(e) => {
                warn!(index, code, error = %e, "rich-text command rejected");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, RecordingPrinter};

    fn directives(printer: &RecordingPrinter) -> Vec<Directive> {
        printer
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::Directive(d) => Some(d),
                DeviceCall::Image { .. } => None,
            })
            .collect()
    }

    #[test]
    fn sample_sequence_reaches_device_in_order() {
        let commands = vec![
            Command::bare("inverseOn"),
            Command::call("println", vec![Arg::from("hi")]),
            Command::bare("inverseOff"),
        ];
        let mut printer = RecordingPrinter::new();
        let summary = interpret(&mut printer, &commands).expect("interpret");

        assert_eq!(summary.executed, 3);
        assert_eq!(
            directives(&printer),
            vec![
                Directive::InverseOn,
                Directive::Println("hi".into()),
                Directive::InverseOff
            ]
        );
    }

    #[test]
    fn unknown_directive_anywhere_is_skipped() {
        for position in 0..=3 {
            let mut commands = vec![
                Command::bare("inverseOn"),
                Command::call("println", vec![Arg::from("hi")]),
                Command::bare("inverseOff"),
            ];
            commands.insert(position, Command::bare("selfDestruct"));

            let mut printer = RecordingPrinter::new();
            let summary = interpret(&mut printer, &commands).expect("interpret");

            assert_eq!(summary.skipped, 1);
            assert_eq!(
                directives(&printer),
                vec![
                    Directive::InverseOn,
                    Directive::Println("hi".into()),
                    Directive::InverseOff
                ]
            );
        }
    }

    #[test]
    fn device_internals_are_not_reachable_by_name() {
        for name in ["begin", "writeBytes", "sleep", "offline", "timeoutSet", "printImage"] {
            assert_eq!(Directive::parse(name, None).expect("parse"), None);
        }
    }

    #[test]
    fn bad_arguments_fail_only_that_command() {
        let commands = vec![
            Command::call("feed", vec![Arg::from("lots")]),
            Command::call("printBarcode", vec![Arg::from("123")]),
            Command::bare("boldOn"),
            Command::call("justify", vec![Arg::from("x")]),
            Command::call("boldOff", vec![Arg::Int(1)]),
            Command::call("feed", vec![Arg::Int(2)]),
        ];
        let mut printer = RecordingPrinter::new();
        let summary = interpret(&mut printer, &commands).expect("interpret");

        assert_eq!(summary.rejected, 4);
        assert_eq!(summary.executed, 2);
        assert_eq!(
            directives(&printer),
            vec![Directive::BoldOn, Directive::Feed(2)]
        );
    }

    #[test]
    fn omitted_arguments_take_defaults() {
        let parse = |code| Directive::parse(code, None).expect("parse");
        assert_eq!(parse("feed"), Some(Directive::Feed(1)));
        assert_eq!(parse("setBarcodeHeight"), Some(Directive::SetBarcodeHeight(50)));
        assert_eq!(parse("underlineOn"), Some(Directive::UnderlineOn(1)));
        assert_eq!(parse("setLineHeight"), Some(Directive::SetLineHeight(32)));
        assert_eq!(parse("println"), Some(Directive::Println(String::new())));
    }

    #[test]
    fn print_concatenates_arguments() {
        let args = [Arg::from("here are some"), Arg::from("lines of text."), Arg::Int(7)];
        assert_eq!(
            Directive::parse("print", Some(&args)).expect("parse"),
            Some(Directive::Print("here are somelines of text.7".into()))
        );
    }

    #[test]
    fn barcode_and_layout_arguments_are_typed() {
        let barcode = [Arg::from("012345678905"), Arg::Int(0)];
        assert_eq!(
            Directive::parse("printBarcode", Some(&barcode)).expect("parse"),
            Some(Directive::PrintBarcode {
                text: "012345678905".into(),
                kind: 0
            })
        );
        assert_eq!(
            Directive::parse("justify", Some(&[Arg::from("C")])).expect("parse"),
            Some(Directive::Justify(Justify::Center))
        );
        assert_eq!(
            Directive::parse("setSize", Some(&[Arg::from("l")])).expect("parse"),
            Some(Directive::SetSize(TextSize::Large))
        );
    }

    #[test]
    fn bitmap_length_is_checked_against_dimensions() {
        let short = [Arg::Int(16), Arg::Int(2), Arg::List(vec![Arg::Int(0xFF); 3])];
        assert!(matches!(
            Directive::parse("printBitmap", Some(&short)),
            Err(SlipwayError::InvalidCommand(_))
        ));

        let exact = [
            Arg::Int(16),
            Arg::Int(2),
            Arg::List(vec![Arg::Int(0xFF); 4]),
            Arg::Bool(true),
        ];
        assert_eq!(
            Directive::parse("printBitmap", Some(&exact)).expect("parse"),
            Some(Directive::PrintBitmap {
                width: 16,
                height: 2,
                bitmap: vec![0xFF; 4],
                line_at_a_time: true
            })
        );
    }

    #[test]
    fn device_error_stops_the_sequence() {
        let commands = vec![
            Command::bare("boldOn"),
            Command::call("println", vec![Arg::from("jam")]),
            Command::bare("boldOff"),
        ];
        let mut printer = RecordingPrinter::new().failing_on("println");
        let err = interpret(&mut printer, &commands).unwrap_err();

        assert!(matches!(err, SlipwayError::Device(_)));
        assert_eq!(directives(&printer), vec![Directive::BoldOn]);
    }

    #[test]
    fn every_directive_name_parses_back_to_itself() {
        let samples = [
            ("reset", vec![]),
            ("setDefault", vec![]),
            ("normal", vec![]),
            ("inverseOn", vec![]),
            ("upsideDownOff", vec![]),
            ("doubleHeightOn", vec![]),
            ("doubleWidthOff", vec![]),
            ("strikeOn", vec![]),
            ("underlineOff", vec![]),
            ("feedRows", vec![Arg::Int(4)]),
            ("setLineHeight", vec![Arg::Int(40)]),
        ];
        for (code, args) in samples {
            let directive = Directive::parse(code, Some(&args))
                .expect("parse")
                .expect("known");
            assert_eq!(directive.name(), code);
        }
    }
}
