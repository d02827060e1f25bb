// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use foreman::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let log_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(log_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(log_filter).init();
    }

    if let Err(err) = config.validate() {
        eprintln!("error: {err}");
        std::process::exit(2);
    }

    if let Err(err) = foreman::run(config).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}
