// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Slipway Print — print jobs, the single-device dispatcher, ESC/POS output,
// and the queue and socket RPC transports that feed it.  This crate bridges
// between the wire types defined in `slipway-core` and the printer itself.

pub mod client;
pub mod console;
pub mod device;
pub mod dispatcher;
pub mod escpos;
pub mod handler;
pub mod job;
pub mod queue_rpc;
pub mod richtext;
pub mod socket_rpc;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use client::{JobClient, RichTextBuilder};
pub use console::ConsolePrinter;
pub use device::{PrinterDevice, RecordingPrinter};
pub use dispatcher::{DispatcherConfig, JobDispatcher};
pub use escpos::EscPosPrinter;
pub use job::Job;
pub use queue_rpc::{Broker, BrokerMessage, MemoryBroker, QueueRpcClient, QueueRpcServer};
pub use richtext::{interpret, BarcodeKind, Directive, InterpretSummary, Justify, TextSize};
pub use socket_rpc::{SocketRpcClient, SocketRpcServer};

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
