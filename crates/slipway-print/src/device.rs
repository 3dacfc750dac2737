// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer device abstraction.
//
// The dispatcher owns exactly one device and hands it to one job at a time,
// so implementations take `&mut self` and need no internal locking.

use std::sync::{Arc, Mutex};

use slipway_core::error::{Result, SlipwayError};
use slipway_document::PrintableImage;

use crate::richtext::Directive;

/// Something that can put ink (or heat) on paper.
pub trait PrinterDevice: Send {
    /// Perform a single rich-text directive.
    fn execute(&mut self, directive: &Directive) -> Result<()>;

    /// Print a normalized bitmap.
    fn print_image(&mut self, image: &PrintableImage) -> Result<()>;
}

impl<T: PrinterDevice + ?Sized> PrinterDevice for Box<T> {
    fn execute(&mut self, directive: &Directive) -> Result<()> {
        (**self).execute(directive)
    }

    fn print_image(&mut self, image: &PrintableImage) -> Result<()> {
        (**self).print_image(image)
    }
}

// ---------------------------------------------------------------------------
// RecordingPrinter
// ---------------------------------------------------------------------------

/// One operation observed by a [`RecordingPrinter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Directive(Directive),
    Image { width: u32, height: u32 },
}

/// In-memory device that records every call.
///
/// Clones share the same log, so a test can keep one handle while the
/// dispatcher owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingPrinter {
    calls: Arc<Mutex<Vec<DeviceCall>>>,
    fail_on: Option<&'static str>,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with a device error whenever the named directive (or `"image"`)
    /// is requested. The failing call is not recorded.
    pub fn failing_on(mut self, name: &'static str) -> Self {
        self.fail_on = Some(name);
        self
    }

    /// Snapshot of the calls recorded so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().expect("recording lock poisoned").clone()
    }

    fn record(&self, name: &str, call: DeviceCall) -> Result<()> {
        if self.fail_on == Some(name) {
            return Err(SlipwayError::Device(format!("simulated failure on {name}")));
        }
        self.calls
            .lock()
            .expect("recording lock poisoned")
            .push(call);
        Ok(())
    }
}

impl PrinterDevice for RecordingPrinter {
    fn execute(&mut self, directive: &Directive) -> Result<()> {
        self.record(directive.name(), DeviceCall::Directive(directive.clone()))
    }

    fn print_image(&mut self, image: &PrintableImage) -> Result<()> {
        self.record(
            "image",
            DeviceCall::Image {
                width: image.width(),
                height: image.height(),
            },
        )
    }
}
