// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use riskgate::config::{Config, GateNodeConfig};
use riskgate::node::run_gate_node;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Init logging
    let (_log_guard, _filter_handle) = telemetry_subscribers::TelemetryConfig::new(env!("CARGO_BIN_NAME"))
        .with_env()
        .init();

    let config = GateNodeConfig::load(&args.config_path)?;
    let registry = prometheus::Registry::new();

    let node = run_gate_node(config, &registry).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    node.cancel.cancel();
    futures::future::join_all(node.handles).await;
    Ok(())
}
