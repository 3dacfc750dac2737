// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Slipway.

use thiserror::Error;

/// Top-level error type for all Slipway operations.
#[derive(Debug, Error)]
pub enum SlipwayError {
    // -- Wire errors --
    #[error("message codec error: {0}")]
    Codec(String),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("message broker error: {0}")]
    Broker(String),

    // -- Job execution errors --
    #[error("printer device error: {0}")]
    Device(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("invalid rich-text command: {0}")]
    InvalidCommand(String),

    #[error("job dispatcher error: {0}")]
    Dispatcher(String),

    // -- Configuration / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SlipwayError>;
