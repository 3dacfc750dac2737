// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: wires the dispatcher, printer device and RPC listeners
// together from the loaded configuration.

pub mod app_services;
pub mod data_dir;
