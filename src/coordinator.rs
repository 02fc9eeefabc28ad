// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The risk-gated transaction coordinator.
//!
//! Drives one submission from health check through risk assessment,
//! signing, broadcast, and confirmation. Every outcome is a terminal
//! [`TransactionAttempt`]; nothing is thrown across the boundary except
//! the concurrency guard. Fee parameters always come verbatim from the
//! approved verdict; the coordinator never computes its own.

use crate::audit::AuditStore;
use crate::error::{GateError, GateResult};
use crate::health::HealthCheck;
use crate::ledger::{LedgerClient, TxReceipt};
use crate::metrics::GateMetrics;
use crate::risk_client::{RiskApi, RiskClient};
use crate::types::{
    AuditEntryType, AuditLevel, AuditLogEntry, AuditStatus, ReceiptStatus, SubmissionIntent,
    TransactionAttempt, TxState,
};
use crate::wallet::{save_user_data_calldata, SignRequest, WalletError, WalletProvider};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address as EthAddress, TxHash};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Ceiling on the confirmation wait; past it the outcome is
    /// surfaced as ConfirmationTimeout, never blocked on indefinitely
    pub confirmation_timeout: Duration,
    pub confirmation_poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(180),
            confirmation_poll_interval: Duration::from_secs(4),
        }
    }
}

/// Submission entry point, object-safe so the API layer can hold any
/// concrete coordinator.
#[async_trait]
pub trait SubmitApi: Send + Sync {
    async fn submit_intent(
        &self,
        intent: SubmissionIntent,
        account: EthAddress,
        cancel: CancellationToken,
    ) -> GateResult<TransactionAttempt>;
}

pub struct TransactionCoordinator<H, W, L, P> {
    health: Arc<H>,
    risk: Arc<RiskClient<P>>,
    wallet: Arc<W>,
    ledger: Arc<L>,
    audit: Arc<AuditStore>,
    contract_address: EthAddress,
    config: CoordinatorConfig,
    metrics: Arc<GateMetrics>,
    // Accounts with a non-terminal attempt in flight
    inflight: Mutex<HashSet<EthAddress>>,
}

impl<H, W, L, P> TransactionCoordinator<H, W, L, P>
where
    H: HealthCheck,
    W: WalletProvider,
    L: LedgerClient,
    P: RiskApi,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        health: Arc<H>,
        risk: Arc<RiskClient<P>>,
        wallet: Arc<W>,
        ledger: Arc<L>,
        audit: Arc<AuditStore>,
        contract_address: EthAddress,
        config: CoordinatorConfig,
        metrics: Arc<GateMetrics>,
    ) -> Self {
        Self {
            health,
            risk,
            wallet,
            ledger,
            audit,
            contract_address,
            config,
            metrics,
            inflight: Mutex::new(HashSet::new()),
        }
    }

    /// Run one submission to a terminal state.
    ///
    /// Returns `Err(SubmissionInProgress)` if the account already has a
    /// non-terminal attempt; interleaved attempts could race on nonces
    /// and fee parameters the server-side scoring did not account for.
    /// Every other outcome is a terminal attempt with `error` set per
    /// the taxonomy.
    pub async fn submit(
        &self,
        intent: SubmissionIntent,
        account: EthAddress,
        cancel: CancellationToken,
    ) -> GateResult<TransactionAttempt> {
        {
            let mut inflight = self.inflight.lock().await;
            if !inflight.insert(account) {
                warn!(
                    "[Coordinator] Rejecting submission for {:?}: another attempt is in flight",
                    account
                );
                return Err(GateError::SubmissionInProgress);
            }
        }
        self.metrics.submissions_started.inc();

        // drive() always returns a terminal attempt, so the guard is
        // released on every path
        let attempt = self.drive(intent, account, cancel).await;

        self.inflight.lock().await.remove(&account);
        self.metrics
            .submissions_terminal
            .with_label_values(&[attempt.state.as_str()])
            .inc();
        Ok(attempt)
    }

    async fn drive(
        &self,
        intent: SubmissionIntent,
        account: EthAddress,
        cancel: CancellationToken,
    ) -> TransactionAttempt {
        let mut attempt = TransactionAttempt::new(intent.clone(), account);
        attempt.advance(TxState::HealthChecking);

        let healthy = tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Coordinator] Submission cancelled during health check");
                attempt.error = Some(GateError::UserCancelled);
                attempt.advance(TxState::CancelledByUser);
                return attempt;
            }
            healthy = self.health.check_health() => healthy,
        };
        self.metrics
            .health_checks
            .with_label_values(&[if healthy { "healthy" } else { "unhealthy" }])
            .inc();
        if !healthy {
            warn!("[Coordinator] Risk service unavailable, refusing submission");
            attempt.error = Some(GateError::ServiceUnavailable);
            attempt.advance(TxState::Unavailable);
            return attempt;
        }
        // Last cancellation point before the intent is scored; a single
        // assessment corresponds to a single submission
        if cancel.is_cancelled() {
            info!("[Coordinator] Submission cancelled before assessment");
            attempt.error = Some(GateError::UserCancelled);
            attempt.advance(TxState::CancelledByUser);
            return attempt;
        }

        attempt.advance(TxState::Assessing);
        let verdict = match self.risk.assess(&intent).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("[Coordinator] Risk assessment failed: {}", e);
                attempt.error = Some(e);
                attempt.advance(TxState::Failed);
                return attempt;
            }
        };

        if !verdict.approved {
            info!(
                "[Coordinator] Submission rejected by risk assessment: score {:.2}, level {}",
                verdict.risk_score, verdict.risk_level
            );
            attempt.error = Some(GateError::RiskRejected {
                risk_score: verdict.risk_score,
                risk_level: verdict.risk_level,
                risk_factors: verdict.risk_factors.clone(),
            });
            attempt.verdict = Some(verdict);
            attempt.advance(TxState::RejectedByRisk);
            self.record_terminal_audit(&attempt).await;
            return attempt;
        }

        let Some(params) = verdict.tx_params.clone() else {
            // The risk client's validation makes this unreachable
            attempt.error = Some(GateError::InternalError(
                "approved verdict without transaction parameters".to_string(),
            ));
            attempt.advance(TxState::Failed);
            return attempt;
        };
        attempt.verdict = Some(verdict);

        attempt.advance(TxState::Preparing);
        // Exactly the server-chosen parameters; substituting
        // client-side estimates would invalidate the scored transaction
        let request = SignRequest {
            to: self.contract_address,
            calldata: save_user_data_calldata(&intent),
            gas_limit: params.gas_limit,
            gas_price_wei: params.gas_price_wei,
            chain_id: params.chain_id,
        };

        attempt.advance(TxState::Signing);
        let hash = tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Coordinator] Submission cancelled while awaiting signature");
                attempt.error = Some(GateError::UserCancelled);
                attempt.advance(TxState::CancelledByUser);
                return attempt;
            }
            result = self.wallet.sign_and_send(request) => match result {
                Ok(hash) => hash,
                Err(WalletError::Rejected) => {
                    info!("[Coordinator] Transaction rejected by user");
                    self.metrics.signing_rejections.inc();
                    attempt.error = Some(GateError::UserCancelled);
                    attempt.advance(TxState::CancelledByUser);
                    return attempt;
                }
                Err(WalletError::InsufficientFunds) => {
                    warn!("[Coordinator] Insufficient funds for gas");
                    attempt.error = Some(GateError::InsufficientFunds);
                    attempt.advance(TxState::Failed);
                    return attempt;
                }
                Err(WalletError::Signing(msg)) => {
                    error!("[Coordinator] Signing failed: {}", msg);
                    attempt.error = Some(GateError::SigningFailed(msg));
                    attempt.advance(TxState::Failed);
                    return attempt;
                }
                Err(WalletError::Broadcast(msg)) => {
                    // No hash was obtained; the caller may retry as a
                    // brand-new attempt, we never resubmit ourselves
                    error!("[Coordinator] Broadcast failed: {}", msg);
                    attempt.error = Some(GateError::BroadcastFailed(msg));
                    attempt.advance(TxState::Failed);
                    return attempt;
                }
            }
        };

        // Record the hash before awaiting confirmation so the
        // transaction stays traceable if the wait is interrupted. From
        // here on cancellation is no longer offered; a broadcast
        // transaction is never abandoned silently.
        attempt.record_hash(hash);
        info!("[Coordinator] Transaction sent: {:?}", hash);
        attempt.advance(TxState::Broadcasting);
        attempt.advance(TxState::Confirming);

        match tokio::time::timeout(
            self.config.confirmation_timeout,
            self.wait_for_receipt(hash),
        )
        .await
        {
            Ok(receipt) => match receipt.status {
                ReceiptStatus::Success => {
                    info!(
                        "[Coordinator] Transaction {:?} confirmed in block {}",
                        hash, receipt.block_number
                    );
                    attempt.receipt_status = Some(ReceiptStatus::Success);
                    attempt.advance(TxState::Confirmed);
                }
                ReceiptStatus::Failure => {
                    warn!(
                        "[Coordinator] Transaction {:?} failed in block {}",
                        hash, receipt.block_number
                    );
                    attempt.receipt_status = Some(ReceiptStatus::Failure);
                    attempt.error = Some(GateError::Generic(
                        "transaction reverted on chain".to_string(),
                    ));
                    attempt.advance(TxState::Failed);
                }
            },
            Err(_) => {
                // Ambiguous outcome: the transaction may still land.
                // Reconciliation belongs to the monitor observing the
                // eventual event, not to this attempt.
                self.metrics.confirmation_timeouts.inc();
                warn!(
                    "[Coordinator] Confirmation of {:?} not observed within {:?}",
                    hash, self.config.confirmation_timeout
                );
                attempt.error = Some(GateError::ConfirmationTimeout {
                    waited_secs: self.config.confirmation_timeout.as_secs(),
                });
                attempt.advance(TxState::Failed);
            }
        }

        self.record_terminal_audit(&attempt).await;
        attempt
    }

    /// Poll for the receipt until the outer timeout cuts us off.
    /// Transient provider errors are logged and retried on the next
    /// tick.
    async fn wait_for_receipt(&self, hash: TxHash) -> TxReceipt {
        loop {
            match self.ledger.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "[Coordinator] Receipt lookup for {:?} failed, will retry: {}",
                        hash, e
                    );
                }
            }
            tokio::time::sleep(self.config.confirmation_poll_interval).await;
        }
    }

    async fn record_terminal_audit(&self, attempt: &TransactionAttempt) {
        let entry = match attempt.state {
            TxState::RejectedByRisk => AuditLogEntry {
                timestamp: Utc::now(),
                entry_type: AuditEntryType::SecurityAlert,
                level: AuditLevel::Warn,
                message: match &attempt.error {
                    Some(e) => format!("Submission blocked: {}", e),
                    None => "Submission blocked by risk assessment".to_string(),
                },
                status: AuditStatus::Blocked,
            },
            TxState::Confirmed => AuditLogEntry {
                timestamp: Utc::now(),
                entry_type: AuditEntryType::Transaction,
                level: AuditLevel::Info,
                message: format!(
                    "Transaction {:?} confirmed",
                    attempt.hash.unwrap_or_default()
                ),
                status: AuditStatus::Success,
            },
            TxState::Failed if attempt.hash.is_some() => AuditLogEntry {
                timestamp: Utc::now(),
                entry_type: AuditEntryType::Transaction,
                level: AuditLevel::Warn,
                message: match &attempt.error {
                    Some(e) => format!(
                        "Transaction {:?} failed: {}",
                        attempt.hash.unwrap_or_default(),
                        e
                    ),
                    None => "Transaction failed".to_string(),
                },
                status: AuditStatus::Failed,
            },
            // Pre-broadcast failures never reached the chain; they are
            // not part of the transaction audit trail
            _ => return,
        };
        self.audit.append(entry, "coordinator").await;
    }
}

#[async_trait]
impl<H, W, L, P> SubmitApi for TransactionCoordinator<H, W, L, P>
where
    H: HealthCheck,
    W: WalletProvider,
    L: LedgerClient,
    P: RiskApi,
{
    async fn submit_intent(
        &self,
        intent: SubmissionIntent,
        account: EthAddress,
        cancel: CancellationToken,
    ) -> GateResult<TransactionAttempt> {
        self.submit(intent, account, cancel).await
    }
}
