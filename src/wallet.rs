// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wallet provider seam.
//!
//! The signing key lives exclusively behind this trait; the coordinator
//! never reads or caches it. User rejection is a distinct signal from
//! other signing failures because it is a deliberate decision, never
//! retried.

use crate::types::SubmissionIntent;
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address as EthAddress, Bytes, TransactionRequest, TxHash, U256};
use once_cell::sync::Lazy;
use tokio::sync::broadcast;

static SAVE_USER_DATA_SELECTOR: Lazy<[u8; 4]> =
    Lazy::new(|| ethers::utils::id("saveUserData(string,string,string)"));

/// A fully specified signing request. Gas parameters come verbatim from
/// an approved risk verdict; the wallet must not substitute its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SignRequest {
    pub to: EthAddress,
    pub calldata: Bytes,
    pub gas_limit: u64,
    pub gas_price_wei: U256,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    // The user explicitly declined to sign
    Rejected,
    InsufficientFunds,
    // Failed to produce a signature
    Signing(String),
    // Signed, but the network rejected the broadcast before a hash
    Broadcast(String),
}

impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletError::Rejected => write!(f, "transaction rejected by user"),
            WalletError::InsufficientFunds => write!(f, "insufficient funds for gas"),
            WalletError::Signing(msg) => write!(f, "signing error: {}", msg),
            WalletError::Broadcast(msg) => write!(f, "broadcast error: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WalletEvent {
    AccountsChanged(Vec<EthAddress>),
    // A network change is a re-initialization signal, not an error
    NetworkChanged(u64),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn accounts(&self) -> Result<Vec<EthAddress>, WalletError>;

    /// Sign and broadcast, returning the transaction hash. The request
    /// parameters are used exactly as given.
    async fn sign_and_send(&self, request: SignRequest) -> Result<TxHash, WalletError>;

    fn subscribe_changes(&self) -> broadcast::Receiver<WalletEvent>;
}

/// ABI calldata for `saveUserData(string,string,string)`.
pub fn save_user_data_calldata(intent: &SubmissionIntent) -> Bytes {
    let selector = *SAVE_USER_DATA_SELECTOR;
    let encoded = encode(&[
        Token::String(intent.name.clone()),
        Token::String(intent.user_address.clone()),
        Token::String(intent.location.clone()),
    ]);
    [selector.as_slice(), &encoded].concat().into()
}

/// Wallet backed by a locally held key, for headless deployments. The
/// account never changes, so the change channel stays silent.
pub struct LocalWalletProvider {
    inner: SignerMiddleware<Provider<Http>, LocalWallet>,
    address: EthAddress,
    changes: broadcast::Sender<WalletEvent>,
}

impl LocalWalletProvider {
    pub fn new(rpc_url: &str, key_hex: &str) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let wallet: LocalWallet = key_hex.trim_start_matches("0x").parse()?;
        let address = wallet.address();
        let (changes, _) = broadcast::channel(16);
        Ok(Self {
            inner: SignerMiddleware::new(provider, wallet),
            address,
            changes,
        })
    }

    pub fn address(&self) -> EthAddress {
        self.address
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn accounts(&self) -> Result<Vec<EthAddress>, WalletError> {
        Ok(vec![self.address])
    }

    async fn sign_and_send(&self, request: SignRequest) -> Result<TxHash, WalletError> {
        let tx = TransactionRequest::new()
            .from(self.address)
            .to(request.to)
            .data(request.calldata)
            .gas(request.gas_limit)
            .gas_price(request.gas_price_wei)
            .chain_id(request.chain_id);

        let pending = self.inner.send_transaction(tx, None).await.map_err(|e| {
            let msg = e.to_string();
            if msg.to_lowercase().contains("insufficient funds") {
                WalletError::InsufficientFunds
            } else {
                WalletError::Broadcast(msg)
            }
        })?;
        Ok(*pending)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<WalletEvent> {
        self.changes.subscribe()
    }
}
