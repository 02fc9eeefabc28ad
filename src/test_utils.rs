// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mock collaborators used across unit tests: scripted responses are
//! queued up front, calls are counted, and the last request is kept for
//! assertions.

use crate::error::{GateError, GateResult};
use crate::health::HealthCheck;
use crate::ledger::{LedgerClient, TxReceipt};
use crate::risk_client::{RawTxParams, RawVerdict, RiskApi};
use crate::types::{ChainEvent, RiskLevel, SubmissionIntent};
use crate::wallet::{SignRequest, WalletError, WalletEvent, WalletProvider};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address as EthAddress, TxHash};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub struct MockHealth {
    healthy: AtomicBool,
    delay: Mutex<Option<Duration>>,
    pub calls: AtomicU64,
}

impl MockHealth {
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            delay: Mutex::new(None),
            calls: AtomicU64::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for MockHealth {
    async fn check_health(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.healthy.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockRiskApi {
    assess_responses: Mutex<VecDeque<GateResult<RawVerdict>>>,
    pub assess_calls: AtomicU64,
    pub score_calls: AtomicU64,
}

impl MockRiskApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_assess_response(&self, response: GateResult<RawVerdict>) {
        self.assess_responses.lock().unwrap().push_back(response);
    }

    pub fn assess_call_count(&self) -> u64 {
        self.assess_calls.load(Ordering::SeqCst)
    }

    pub fn score_call_count(&self) -> u64 {
        self.score_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RiskApi for MockRiskApi {
    async fn assess(&self, _intent: &SubmissionIntent) -> GateResult<RawVerdict> {
        self.assess_calls.fetch_add(1, Ordering::SeqCst);
        self.assess_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GateError::ServiceUnavailable))
    }

    async fn score_event(&self, _event: &ChainEvent) -> GateResult<RawVerdict> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        Ok(rejected_raw_verdict(0.1, RiskLevel::Low))
    }
}

pub struct MockWallet {
    accounts: Vec<EthAddress>,
    responses: Mutex<VecDeque<Result<TxHash, WalletError>>>,
    sign_delay: Mutex<Option<Duration>>,
    pub sign_calls: AtomicU64,
    pub last_request: Mutex<Option<SignRequest>>,
    changes: broadcast::Sender<WalletEvent>,
}

impl MockWallet {
    pub fn new(account: EthAddress) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            accounts: vec![account],
            responses: Mutex::new(VecDeque::new()),
            sign_delay: Mutex::new(None),
            sign_calls: AtomicU64::new(0),
            last_request: Mutex::new(None),
            changes,
        }
    }

    pub fn add_response(&self, response: Result<TxHash, WalletError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn set_sign_delay(&self, delay: Duration) {
        *self.sign_delay.lock().unwrap() = Some(delay);
    }

    pub fn sign_call_count(&self) -> u64 {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SignRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn accounts(&self) -> Result<Vec<EthAddress>, WalletError> {
        Ok(self.accounts.clone())
    }

    async fn sign_and_send(&self, request: SignRequest) -> Result<TxHash, WalletError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        let delay = *self.sign_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(WalletError::Signing("no scripted response".to_string())))
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<WalletEvent> {
        self.changes.subscribe()
    }
}

#[derive(Default)]
pub struct MockLedger {
    latest_block: AtomicU64,
    receipts: Mutex<HashMap<TxHash, TxReceipt>>,
    pub receipt_calls: AtomicU64,
    range_events: Mutex<Vec<ChainEvent>>,
    pub range_calls: Mutex<Vec<(u64, u64)>>,
    subscriptions: Mutex<VecDeque<mpsc::Receiver<ChainEvent>>>,
    pub subscribe_calls: AtomicU64,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest_block(&self, block: u64) {
        self.latest_block.store(block, Ordering::SeqCst);
    }

    pub fn add_receipt(&self, hash: TxHash, receipt: TxReceipt) {
        self.receipts.lock().unwrap().insert(hash, receipt);
    }

    /// Events returned by historical queries, filtered by the requested
    /// block range.
    pub fn set_range_events(&self, events: Vec<ChainEvent>) {
        *self.range_events.lock().unwrap() = events;
    }

    /// Queue a subscription stream; each subscribe_events call consumes
    /// one. When the queue is empty, subscribing fails.
    pub fn add_subscription(&self, receiver: mpsc::Receiver<ChainEvent>) {
        self.subscriptions.lock().unwrap().push_back(receiver);
    }

    pub fn receipt_call_count(&self) -> u64 {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn range_call_log(&self) -> Vec<(u64, u64)> {
        self.range_calls.lock().unwrap().clone()
    }

    pub fn subscribe_call_count(&self) -> u64 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn latest_block(&self) -> GateResult<u64> {
        Ok(self.latest_block.load(Ordering::SeqCst))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> GateResult<Option<TxReceipt>> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.receipts.lock().unwrap().get(&hash).copied())
    }

    async fn get_events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> GateResult<Vec<ChainEvent>> {
        self.range_calls.lock().unwrap().push((from_block, to_block));
        Ok(self
            .range_events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn subscribe_events(&self) -> GateResult<mpsc::Receiver<ChainEvent>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GateError::ProviderError("no subscription available".to_string()))
    }
}

pub fn test_intent() -> SubmissionIntent {
    SubmissionIntent {
        name: "A".to_string(),
        user_address: "0xAB00000000000000000000000000000000000000".to_string(),
        location: "X".to_string(),
    }
}

pub fn approved_raw_verdict() -> RawVerdict {
    RawVerdict {
        approved: Some(true),
        risk_score: Some(0.1),
        risk_level: Some(RiskLevel::Low),
        risk_factors: Some(vec![]),
        tx_params: Some(RawTxParams {
            gas_limit: 300_000,
            gas_price_wei: "20000000000".to_string(),
            chain_id: 1,
        }),
    }
}

pub fn rejected_raw_verdict(risk_score: f64, risk_level: RiskLevel) -> RawVerdict {
    RawVerdict {
        approved: Some(false),
        risk_score: Some(risk_score),
        risk_level: Some(risk_level),
        risk_factors: Some(vec!["known-flagged-address".to_string()]),
        tx_params: None,
    }
}

pub fn test_event(tx: u64, log_index: u64, name: &str, block_number: u64) -> ChainEvent {
    ChainEvent {
        contract_address: EthAddress::repeat_byte(5),
        event_name: name.to_string(),
        block_number,
        transaction_hash: TxHash::from_low_u64_be(tx),
        log_index,
        args: HashMap::new(),
        observed_at: Utc::now(),
    }
}
