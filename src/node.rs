// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node wiring: construct the clients from config, spawn the monitor
//! and the API server, and hand back the task handles.

use crate::api::{router, ApiState};
use crate::audit::AuditStore;
use crate::config::GateNodeConfig;
use crate::coordinator::{CoordinatorConfig, SubmitApi, TransactionCoordinator};
use crate::health::HttpHealthProbe;
use crate::ledger::EthLedgerClient;
use crate::metrics::GateMetrics;
use crate::monitor::{classify::EventClassifier, ChainEventMonitor, MonitorConfig};
use crate::risk_client::{HttpRiskApi, RiskClient};
use crate::wallet::{LocalWalletProvider, WalletEvent, WalletProvider};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct GateNode {
    pub handles: Vec<JoinHandle<()>>,
    pub cancel: CancellationToken,
}

pub async fn run_gate_node(
    config: GateNodeConfig,
    registry: &prometheus::Registry,
) -> anyhow::Result<GateNode> {
    info!("Starting config validation");
    config.validate()?;
    let contract_address = config.parsed_contract_address()?;

    let metrics = Arc::new(GateMetrics::new(registry));
    let audit = Arc::new(AuditStore::new(metrics.clone()));
    let probe = Arc::new(HttpHealthProbe::new(
        &config.risk_service_url,
        config.health_timeout(),
    )?);
    let risk = Arc::new(RiskClient::new(
        HttpRiskApi::new(&config.risk_service_url)?,
        metrics.clone(),
    ));
    let ledger = Arc::new(EthLedgerClient::new(
        &config.eth_rpc_url,
        contract_address,
        &config.monitor.event_signatures,
        config.monitor.poll_interval(),
    )?);
    ledger.describe(config.expected_chain_id).await?;

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    // The monitor runs for the lifetime of the process, independent of
    // any submission
    let monitor = ChainEventMonitor::new(
        ledger.clone(),
        risk.clone(),
        audit.clone(),
        EventClassifier::with_defaults(),
        MonitorConfig::from_settings(&config.monitor),
        metrics.clone(),
    );
    handles.push(tokio::spawn(monitor.run(cancel.child_token())));

    // Submissions need a signing key; without one the node is
    // monitor-only
    let submit: Option<Arc<dyn SubmitApi>> = match &config.wallet_key {
        Some(key) => {
            let wallet = Arc::new(LocalWalletProvider::new(&config.eth_rpc_url, key)?);
            info!("Wallet loaded, signing account {:?}", wallet.address());
            handles.push(spawn_wallet_watcher(
                wallet.subscribe_changes(),
                cancel.child_token(),
            ));
            Some(Arc::new(TransactionCoordinator::new(
                probe.clone(),
                risk.clone(),
                wallet,
                ledger.clone(),
                audit.clone(),
                contract_address,
                CoordinatorConfig {
                    confirmation_timeout: config.confirmation_timeout(),
                    confirmation_poll_interval: config.confirmation_poll_interval(),
                },
                metrics.clone(),
            )))
        }
        None => {
            info!("No wallet key configured, running monitor-only");
            None
        }
    };

    let state = Arc::new(ApiState {
        store: audit,
        health: probe,
        submit,
        registry: registry.clone(),
    });
    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        config.server_listen_port,
    );
    let listener = tokio::net::TcpListener::bind(socket_address).await?;
    info!("API server listening on {}", socket_address);

    let api_cancel = cancel.child_token();
    handles.push(tokio::spawn(async move {
        let shutdown = async move { api_cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("API server error: {}", e);
        }
    }));

    Ok(GateNode { handles, cancel })
}

/// A network change from the wallet is a re-initialization signal, not
/// an error.
fn spawn_wallet_watcher(
    mut changes: broadcast::Receiver<WalletEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = changes.recv() => match event {
                    Ok(WalletEvent::NetworkChanged(chain_id)) => {
                        warn!(
                            "Wallet network changed to chain {}; restart the node to re-initialize",
                            chain_id
                        );
                    }
                    Ok(WalletEvent::AccountsChanged(accounts)) => {
                        info!("Wallet accounts changed: {:?}", accounts);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorSettings;

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_any_connection() {
        let config = GateNodeConfig {
            server_listen_port: 0,
            risk_service_url: "http://localhost:5002".to_string(),
            eth_rpc_url: "http://localhost:8545".to_string(),
            contract_address: "not-an-address".to_string(),
            expected_chain_id: None,
            wallet_key: None,
            health_timeout_ms: 1,
            confirmation_timeout_secs: 1,
            confirmation_poll_ms: 1,
            monitor: MonitorSettings::default(),
        };
        let registry = prometheus::Registry::new();
        assert!(run_gate_node(config, &registry).await.is_err());
    }
}
