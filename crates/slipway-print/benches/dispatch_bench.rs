// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the print path in the slipway-print crate: parsing
// and interpreting a receipt-sized rich-text job into ESC/POS bytes, and
// rasterizing a normalized image.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};

use slipway_core::protocol::{Arg, Command};
use slipway_print::{Directive, EscPosPrinter, PrinterDevice, interpret};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A 40-line receipt with headings, item rows and a barcode.
fn receipt_commands() -> Vec<Command> {
    let mut commands = vec![
        Command::bare("setDefault"),
        Command::call("justify", vec![Arg::from("C")]),
        Command::call("setSize", vec![Arg::from("L")]),
        Command::call("println", vec![Arg::from("SLIPWAY CAFE")]),
        Command::call("setSize", vec![Arg::from("S")]),
        Command::call("justify", vec![Arg::from("L")]),
    ];
    for i in 0..40 {
        commands.push(Command::call(
            "println",
            vec![Arg::from(format!("Item {i:02}")), Arg::from("    "), Arg::Int(i * 3)],
        ));
    }
    commands.push(Command::bare("boldOn"));
    commands.push(Command::call("println", vec![Arg::from("TOTAL 2340")]));
    commands.push(Command::bare("boldOff"));
    commands.push(Command::call(
        "printBarcode",
        vec![Arg::from("012345678905"), Arg::Int(2)],
    ));
    commands.push(Command::call("feed", vec![Arg::Int(3)]));
    commands
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_parse_directives(c: &mut Criterion) {
    let commands = receipt_commands();

    c.bench_function("parse receipt directives", |b| {
        b.iter(|| {
            for command in &commands {
                let _ = black_box(Directive::parse(command.code(), command.args()));
            }
        });
    });
}

fn bench_interpret_escpos(c: &mut Criterion) {
    let commands = receipt_commands();

    c.bench_function("interpret receipt to escpos", |b| {
        b.iter(|| {
            let mut printer = EscPosPrinter::new(Vec::with_capacity(4096));
            let summary = interpret(&mut printer, black_box(&commands));
            black_box((summary, printer.into_inner()))
        });
    });
}

fn bench_raster_image(c: &mut Criterion) {
    let gray = GrayImage::from_fn(384, 600, |x, y| Luma([if (x + y) % 3 == 0 { 0 } else { 255 }]));
    let printable = slipway_document::normalize(&DynamicImage::ImageLuma8(gray));

    c.bench_function("raster 384x600 image to escpos", |b| {
        b.iter(|| {
            let mut printer = EscPosPrinter::new(Vec::with_capacity(32 * 1024));
            let result = printer.print_image(black_box(&printable));
            black_box((result, printer.into_inner()))
        });
    });
}

criterion_group!(
    benches,
    bench_parse_directives,
    bench_interpret_escpos,
    bench_raster_image
);
criterion_main!(benches);
