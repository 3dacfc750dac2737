// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Slipway — receipt printer job server
//
// Entry point. Initialises logging, loads the configuration, starts the
// dispatcher and RPC listeners, and runs until interrupted.

mod services;

use std::process::ExitCode;

use slipway_core::AppConfig;

use services::app_services::AppServices;
use services::data_dir;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Slipway starting");

    let config_path = data_dir::config_path();
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(path = %config_path.display(), "configuration loaded");

    let mut services = match AppServices::init(config) {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = services.start().await {
        tracing::error!(error = %e, "failed to start RPC listeners");
        services.shutdown().await;
        return ExitCode::FAILURE;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
    services.shutdown().await;
    ExitCode::SUCCESS
}
