// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core data model: submission intents, risk verdicts, transaction
//! attempts and their state machine, observed chain events, and audit
//! log entries.

use crate::error::GateError;
use chrono::{DateTime, Utc};
use ethers::types::{Address as EthAddress, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity/location data submitted by a user. Consumed once by the
/// risk gate; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionIntent {
    pub name: String,
    pub user_address: String,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Server-chosen transaction parameters, present iff the verdict is an
/// approval. The gas price is an arbitrary-precision integer; it is
/// transported as a decimal string on the wire and must never pass
/// through a float.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTxParams {
    pub gas_limit: u64,
    pub gas_price_wei: U256,
    pub chain_id: u64,
}

/// The risk service's approve/reject decision plus supporting
/// explanation. `tx_params` is `Some` iff `approved`.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskVerdict {
    pub approved: bool,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub tx_params: Option<PreparedTxParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// States of a single risk-gated submission. Transitions advance
/// strictly forward; see [`TxState::can_transition_to`] for the full
/// edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    HealthChecking,
    Assessing,
    Preparing,
    Signing,
    Broadcasting,
    Confirming,
    RejectedByRisk,
    Confirmed,
    Failed,
    CancelledByUser,
    Unavailable,
}

impl TxState {
    /// A terminal state admits no further transition for the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxState::RejectedByRisk
                | TxState::Confirmed
                | TxState::Failed
                | TxState::CancelledByUser
                | TxState::Unavailable
        )
    }

    /// The complete transition table. Every legal edge of the
    /// submission lifecycle is enumerated here so it can be tested in
    /// isolation from any network code.
    pub fn can_transition_to(&self, next: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, next),
            (Idle, HealthChecking)
                | (HealthChecking, Assessing)
                | (HealthChecking, Unavailable)
                | (HealthChecking, CancelledByUser)
                | (Assessing, RejectedByRisk)
                | (Assessing, Preparing)
                | (Assessing, Failed)
                | (Preparing, Signing)
                | (Signing, Broadcasting)
                | (Signing, CancelledByUser)
                | (Signing, Failed)
                | (Broadcasting, Confirming)
                | (Confirming, Confirmed)
                | (Confirming, Failed)
        )
    }

    /// Stable lowercase name, used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Idle => "idle",
            TxState::HealthChecking => "health_checking",
            TxState::Assessing => "assessing",
            TxState::Preparing => "preparing",
            TxState::Signing => "signing",
            TxState::Broadcasting => "broadcasting",
            TxState::Confirming => "confirming",
            TxState::RejectedByRisk => "rejected_by_risk",
            TxState::Confirmed => "confirmed",
            TxState::Failed => "failed",
            TxState::CancelledByUser => "cancelled_by_user",
            TxState::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One end-to-end lifecycle of a single user-submitted, risk-gated
/// transaction. Owned exclusively by the coordinator until it reaches a
/// terminal state, then returned to the caller as the structured
/// outcome.
#[derive(Debug, Clone)]
pub struct TransactionAttempt {
    pub intent: SubmissionIntent,
    pub account: EthAddress,
    pub verdict: Option<RiskVerdict>,
    pub state: TxState,
    pub hash: Option<TxHash>,
    pub receipt_status: Option<ReceiptStatus>,
    pub error: Option<GateError>,
}

impl TransactionAttempt {
    pub fn new(intent: SubmissionIntent, account: EthAddress) -> Self {
        Self {
            intent,
            account,
            verdict: None,
            state: TxState::Idle,
            hash: None,
            receipt_status: None,
            error: None,
        }
    }

    /// Advance to `next`, enforcing the transition table. An illegal
    /// transition indicates a coordinator bug: it is logged and the
    /// state is left unchanged rather than corrupting the attempt.
    pub fn advance(&mut self, next: TxState) {
        if !self.state.can_transition_to(next) {
            debug_assert!(
                false,
                "illegal state transition {} -> {}",
                self.state, next
            );
            tracing::error!(
                "[Coordinator] Refusing illegal state transition {} -> {}",
                self.state,
                next
            );
            return;
        }
        tracing::debug!("[Coordinator] State {} -> {}", self.state, next);
        self.state = next;
    }

    /// Record the transaction hash the moment signing returns, before
    /// confirmation is awaited, so the transaction stays traceable even
    /// if the confirmation wait is interrupted.
    pub fn record_hash(&mut self, hash: TxHash) {
        self.hash = Some(hash);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Identity key for observed chain events. A node may redeliver logs
/// during reconnection or reorg handling; two deliveries with the same
/// key are the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub transaction_hash: TxHash,
    pub log_index: u64,
    pub event_name: String,
}

/// A normalized contract event delivered by the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct ChainEvent {
    pub contract_address: EthAddress,
    pub event_name: String,
    pub block_number: u64,
    pub transaction_hash: TxHash,
    pub log_index: u64,
    pub args: HashMap<String, String>,
    pub observed_at: DateTime<Utc>,
}

impl ChainEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
            event_name: self.event_name.clone(),
        }
    }
}

/// Audit entry categories. The taxonomy is expected to grow; adding a
/// variant here plus a classification rule is all an extension needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEntryType {
    #[serde(rename = "Security Alert")]
    SecurityAlert,
    #[serde(rename = "Transaction")]
    Transaction,
    #[serde(rename = "User Activity")]
    UserActivity,
}

impl AuditEntryType {
    pub fn as_display(&self) -> &'static str {
        match self {
            AuditEntryType::SecurityAlert => "Security Alert",
            AuditEntryType::Transaction => "Transaction",
            AuditEntryType::UserActivity => "User Activity",
        }
    }
}

impl std::fmt::Display for AuditEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl std::str::FromStr for AuditEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "security alert" => Ok(AuditEntryType::SecurityAlert),
            "transaction" => Ok(AuditEntryType::Transaction),
            "user activity" => Ok(AuditEntryType::UserActivity),
            other => Err(format!("unknown audit entry type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Success,
    Failed,
    Blocked,
    Info,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "Success"),
            AuditStatus::Failed => write!(f, "Failed"),
            AuditStatus::Blocked => write!(f, "Blocked"),
            AuditStatus::Info => write!(f, "Info"),
        }
    }
}

/// Append-only audit record. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: AuditEntryType,
    pub level: AuditLevel,
    pub message: String,
    pub status: AuditStatus,
}
