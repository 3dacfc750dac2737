// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Configuration file location.

use std::path::PathBuf;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SLIPWAY_CONFIG";

const CONFIG_FILE: &str = "config.json";

/// Resolve the config file path.
///
/// An explicit `SLIPWAY_CONFIG` wins; otherwise the file lives in the
/// application data directory.
pub fn config_path() -> PathBuf {
    resolve_config_path(std::env::var_os(CONFIG_ENV).map(PathBuf::from), data_dir)
}

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = dirs_fallback().join("slipway");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// `data_dir` is only consulted, and so only created, without an override.
fn resolve_config_path(explicit: Option<PathBuf>, data_dir: impl FnOnce() -> PathBuf) -> PathBuf {
    match explicit {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => data_dir().join(CONFIG_FILE),
    }
}

fn dirs_fallback() -> PathBuf {
    // Try XDG data dir, then fallback to home
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort
    PathBuf::from("/tmp")
}
