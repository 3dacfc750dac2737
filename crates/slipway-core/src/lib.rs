// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Slipway — Core types, wire schema, and error definitions shared across all crates.

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::AppConfig;
pub use error::SlipwayError;
pub use protocol::{Arg, Command, Envelope, Reply, ReplyStatus, RequestKind};
pub use types::*;
