// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ledger access: receipts, historical logs, and a live event
//! subscription over an HTTP provider.

use crate::error::{GateError, GateResult};
use crate::types::{ChainEvent, ReceiptStatus};
use async_trait::async_trait;
use chrono::Utc;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address as EthAddress, Filter, Log, TxHash, H256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;
use tokio::sync::mpsc;
use tokio::time;

/// Largest block span fetched in one get_logs call; wider ranges are
/// chunked by the caller loop.
const MAX_BLOCK_RANGE: u64 = 1_000;
/// Consecutive provider failures after which a subscription gives up
/// and lets the monitor reconnect.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub status: ReceiptStatus,
    pub block_number: u64,
}

#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    async fn latest_block(&self) -> GateResult<u64>;

    async fn get_transaction_receipt(&self, hash: TxHash) -> GateResult<Option<TxReceipt>>;

    // Note: query may fail if the range is too big. Callsite is
    // responsible for chunking.
    async fn get_events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> GateResult<Vec<ChainEvent>>;

    /// Open a live event subscription. The receiver closing signals a
    /// disconnect; the caller is expected to resubscribe.
    async fn subscribe_events(&self) -> GateResult<mpsc::Receiver<ChainEvent>>;
}

pub struct EthLedgerClient {
    provider: Arc<Provider<Http>>,
    contract_address: EthAddress,
    event_names: Arc<HashMap<H256, String>>,
    poll_interval: Duration,
}

impl EthLedgerClient {
    pub fn new(
        rpc_url: &str,
        contract_address: EthAddress,
        event_signatures: &[String],
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let mut event_names = HashMap::new();
        for signature in event_signatures {
            let name = signature
                .split('(')
                .next()
                .unwrap_or(signature.as_str())
                .to_string();
            let topic = H256::from(ethers::utils::keccak256(signature.as_bytes()));
            event_names.insert(topic, name);
        }
        Ok(Self {
            provider: Arc::new(provider),
            contract_address,
            event_names: Arc::new(event_names),
            poll_interval,
        })
    }

    // Validate chain identifier and log connection info
    pub async fn describe(&self, expected_chain_id: Option<u64>) -> anyhow::Result<()> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| anyhow::anyhow!("failed to query chain id: {}", e))?
            .as_u64();
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| anyhow::anyhow!("failed to query block number: {}", e))?;

        if let Some(expected) = expected_chain_id {
            if chain_id != expected {
                return Err(anyhow::anyhow!(
                    "Chain ID mismatch: expected {}, got {}. This could indicate connecting to the wrong network!",
                    expected,
                    chain_id
                ));
            }
            tracing::info!(
                "[Ledger] Connected to chain {} (verified), current block: {}",
                chain_id,
                block_number
            );
        } else {
            tracing::warn!(
                "[Ledger] Connected to chain {} (NOT VERIFIED - no expected chain ID set), current block: {}",
                chain_id,
                block_number
            );
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for EthLedgerClient {
    async fn latest_block(&self) -> GateResult<u64> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| GateError::ProviderError(format!("get_block_number failed: {}", e)))?;
        Ok(block.as_u64())
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> GateResult<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| GateError::ProviderError(format!("get_transaction_receipt: {}", e)))?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let block_number = receipt
            .block_number
            .ok_or_else(|| {
                GateError::ProviderError("provider returned receipt without block_number".into())
            })?
            .as_u64();
        let status = match receipt.status.map(|s| s.as_u64()) {
            Some(1) => ReceiptStatus::Success,
            _ => ReceiptStatus::Failure,
        };
        Ok(Some(TxReceipt {
            status,
            block_number,
        }))
    }

    async fn get_events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> GateResult<Vec<ChainEvent>> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(self.contract_address);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| GateError::ProviderError(format!("get_logs failed: {}", e)))
            .tap_err(|e| {
                tracing::error!(
                    "get_events_in_range failed. Filter: {:?}. Error {:?}",
                    filter,
                    e
                )
            })?;

        let mut events = Vec::new();
        for log in logs {
            if let Some(event) = convert_log(log, &self.event_names, self.contract_address)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn subscribe_events(&self) -> GateResult<mpsc::Receiver<ChainEvent>> {
        // Surface a dead provider as a subscribe error instead of an
        // immediately-closed channel
        let start_block = self.latest_block().await? + 1;

        let (event_tx, event_rx) = mpsc::channel(1024);
        let provider = self.provider.clone();
        let contract = self.contract_address;
        let event_names = self.event_names.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut cursor = start_block;
            let mut consecutive_failures = 0u32;
            let mut interval = time::interval(poll_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if event_tx.is_closed() {
                    break;
                }

                let latest = match provider.get_block_number().await {
                    Ok(latest) => latest.as_u64(),
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            "[Ledger] Subscription poll failed ({}/{}): {}",
                            consecutive_failures,
                            MAX_CONSECUTIVE_FAILURES,
                            e
                        );
                        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                            // Dropping the sender closes the stream and
                            // hands recovery to the monitor
                            break;
                        }
                        continue;
                    }
                };

                if latest < cursor {
                    continue;
                }
                let end_block = std::cmp::min(cursor + MAX_BLOCK_RANGE - 1, latest);
                let filter = Filter::new()
                    .from_block(cursor)
                    .to_block(end_block)
                    .address(contract);

                match provider.get_logs(&filter).await {
                    Ok(logs) => {
                        consecutive_failures = 0;
                        for log in logs {
                            match convert_log(log, &event_names, contract) {
                                Ok(Some(event)) => {
                                    if event_tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    tracing::warn!(
                                        "[Ledger] Skipping undecodable log in blocks {}-{}: {}",
                                        cursor,
                                        end_block,
                                        e
                                    );
                                }
                            }
                        }
                        cursor = end_block + 1;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            "[Ledger] get_logs failed during subscription ({}/{}): {}",
                            consecutive_failures,
                            MAX_CONSECUTIVE_FAILURES,
                            e
                        );
                        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                            break;
                        }
                    }
                }
            }
        });

        Ok(event_rx)
    }
}

/// Convert a raw log to a [`ChainEvent`]. Returns `Ok(None)` for logs
/// whose topic0 is not one of the watched event signatures.
fn convert_log(
    log: Log,
    event_names: &HashMap<H256, String>,
    expected_contract: EthAddress,
) -> GateResult<Option<ChainEvent>> {
    if log.address != expected_contract {
        return Err(GateError::ProviderError(format!(
            "provider returned log from unexpected contract {:?} (expected {:?})",
            log.address, expected_contract
        )));
    }

    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let Some(event_name) = event_names.get(topic0) else {
        tracing::debug!("[Ledger] Ignoring log with unwatched topic {:?}", topic0);
        return Ok(None);
    };

    let block_number = log
        .block_number
        .ok_or_else(|| GateError::ProviderError("provider returned log without block_number".into()))?
        .as_u64();
    let transaction_hash = log.transaction_hash.ok_or_else(|| {
        GateError::ProviderError("provider returned log without transaction_hash".into())
    })?;
    let log_index = log
        .log_index
        .ok_or_else(|| GateError::ProviderError("provider returned log without log_index".into()))?
        .as_u64();

    let mut args = HashMap::new();
    for (i, topic) in log.topics.iter().enumerate().skip(1) {
        args.insert(format!("topic{}", i), format!("{:#x}", topic));
    }
    args.insert("data".to_string(), format!("{}", log.data));

    Ok(Some(ChainEvent {
        contract_address: log.address,
        event_name: event_name.clone(),
        block_number,
        transaction_hash,
        log_index,
        args,
        observed_at: Utc::now(),
    }))
}
