// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Console device: logs what would have been printed.
//
// Used when no printer is attached (development, CI, dry runs).  Text is
// buffered until a newline so each printed line becomes one log event.

use slipway_core::error::Result;
use slipway_document::PrintableImage;
use tracing::{debug, info};

use crate::device::PrinterDevice;
use crate::richtext::Directive;

#[derive(Debug, Default)]
pub struct ConsolePrinter {
    pending: String,
}

impl ConsolePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_text(&mut self, text: &str) {
        self.pending.push_str(text);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            info!(target: "slipway::paper", "{}", line.trim_end_matches('\n'));
        }
    }
}

impl PrinterDevice for ConsolePrinter {
    fn execute(&mut self, directive: &Directive) -> Result<()> {
        match directive {
            Directive::Print(text) => self.push_text(text),
            Directive::Println(text) => {
                self.push_text(text);
                self.push_text("\n");
            }
            Directive::Feed(lines) => {
                for _ in 0..*lines {
                    self.push_text("\n");
                }
            }
            other => debug!(directive = ?other, "console printer directive"),
        }
        Ok(())
    }

    fn print_image(&mut self, image: &PrintableImage) -> Result<()> {
        info!(
            target: "slipway::paper",
            width = image.width(),
            height = image.height(),
            mode = ?image.mode(),
            "[image]"
        );
        Ok(())
    }
}
