// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for encoding and decoding wire envelopes in the
// slipway-core crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use slipway_core::codec;
use slipway_core::protocol::{Arg, Command, Envelope};

// ---------------------------------------------------------------------------
// Helper: a representative rich-text receipt
// ---------------------------------------------------------------------------

/// A short receipt: a header, a dozen item lines, and a barcode.
fn receipt_commands() -> Vec<Command> {
    let mut commands = vec![
        Command::bare("reset"),
        Command::call("justify", vec![Arg::from("c")]),
        Command::bare("boldOn"),
        Command::call("println", vec![Arg::from("SLIPWAY CAFE")]),
        Command::bare("boldOff"),
        Command::call("justify", vec![Arg::from("l")]),
    ];
    for i in 0..12 {
        commands.push(Command::call(
            "println",
            vec![Arg::from(format!("item {i:02}")), Arg::from("   4.50")],
        ));
    }
    commands.push(Command::call(
        "printBarcode",
        vec![Arg::from("123456789012"), Arg::Int(0)],
    ));
    commands.push(Command::call("feed", vec![Arg::Int(3)]));
    commands
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_encode_rich_text(c: &mut Criterion) {
    let envelope = Envelope::rich_text(receipt_commands());
    c.bench_function("encode rich-text envelope", |b| {
        b.iter(|| black_box(codec::encode(black_box(&envelope)).expect("encode")));
    });
}

fn bench_decode_rich_text(c: &mut Criterion) {
    let bytes = codec::encode(&Envelope::rich_text(receipt_commands())).expect("encode");
    c.bench_function("decode rich-text envelope", |b| {
        b.iter(|| {
            let env: Envelope = codec::decode(black_box(&bytes)).expect("decode");
            black_box(env);
        });
    });
}

/// Decoding a 64 KiB image submission is dominated by the binary copy.
fn bench_decode_image(c: &mut Criterion) {
    let bytes = codec::encode(&Envelope::image(vec![0xA5u8; 64 * 1024])).expect("encode");
    c.bench_function("decode 64KiB image envelope", |b| {
        b.iter(|| {
            let env: Envelope = codec::decode(black_box(&bytes)).expect("decode");
            black_box(env);
        });
    });
}

criterion_group!(
    benches,
    bench_encode_rich_text,
    bench_decode_rich_text,
    bench_decode_image
);
criterion_main!(benches);
