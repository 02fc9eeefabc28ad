// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use ethers::types::Address as EthAddress;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Minimal config file interface: YAML or JSON, selected by extension.
pub trait Config: Serialize + DeserializeOwned {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = if path.extension().and_then(|s| s.to_str()) == Some("yaml")
            || path.extension().and_then(|s| s.to_str()) == Some("yml")
        {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GateNodeConfig {
    // The port the read API listens on.
    pub server_listen_port: u16,
    // Base URL of the risk assessment service.
    pub risk_service_url: String,
    // Rpc url for the Eth fullnode, used for receipts and event logs.
    pub eth_rpc_url: String,
    // The watched contract address.
    pub contract_address: String,
    // The expected chain id; submissions and events are refused if the
    // connected node reports a different one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_chain_id: Option<u64>,
    // Hex-encoded signing key. When absent the node runs monitor-only
    // and the submission endpoint is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_key: Option<String>,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

fn default_health_timeout_ms() -> u64 {
    2_000
}

fn default_confirmation_timeout_secs() -> u64 {
    180
}

fn default_confirmation_poll_ms() -> u64 {
    4_000
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MonitorSettings {
    // Full event signatures of the watched contract events; the name
    // before the parenthesis becomes the event name in audit records.
    #[serde(default = "default_event_signatures")]
    pub event_signatures: Vec<String>,
    #[serde(default = "default_dedupe_window_size")]
    pub dedupe_window_size: usize,
    #[serde(default = "default_dedupe_window_secs")]
    pub dedupe_window_secs: u64,
    #[serde(default = "default_max_backfill_blocks")]
    pub max_backfill_blocks: u64,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub reconnect_max_delay_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_event_signatures() -> Vec<String> {
    vec![
        "UserDataSaved(address,string,string,string)".to_string(),
        "UserRegistered(address,string)".to_string(),
        "UserLoginAttempt(address,bool)".to_string(),
    ]
}

fn default_dedupe_window_size() -> usize {
    5_000
}

fn default_dedupe_window_secs() -> u64 {
    600
}

fn default_max_backfill_blocks() -> u64 {
    5_000
}

fn default_reconnect_initial_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            event_signatures: default_event_signatures(),
            dedupe_window_size: default_dedupe_window_size(),
            dedupe_window_secs: default_dedupe_window_secs(),
            max_backfill_blocks: default_max_backfill_blocks(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config for GateNodeConfig {}

impl GateNodeConfig {
    /// Check the config before any client is constructed. Endpoint URLs
    /// and the contract address must parse; timeouts must be non-zero.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.risk_service_url)
            .map_err(|e| anyhow!("invalid risk-service-url {}: {}", self.risk_service_url, e))?;
        url::Url::parse(&self.eth_rpc_url)
            .map_err(|e| anyhow!("invalid eth-rpc-url {}: {}", self.eth_rpc_url, e))?;
        self.parsed_contract_address()?;
        if self.health_timeout_ms == 0 {
            return Err(anyhow!("health-timeout-ms must be non-zero"));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(anyhow!("confirmation-timeout-secs must be non-zero"));
        }
        if self.confirmation_poll_ms == 0 {
            return Err(anyhow!("confirmation-poll-ms must be non-zero"));
        }
        if self.monitor.event_signatures.is_empty() {
            return Err(anyhow!("at least one event signature is required"));
        }
        for sig in &self.monitor.event_signatures {
            if !sig.contains('(') || !sig.ends_with(')') {
                return Err(anyhow!(
                    "event signature '{}' is not of the form Name(type,..)",
                    sig
                ));
            }
        }
        Ok(())
    }

    pub fn parsed_contract_address(&self) -> Result<EthAddress> {
        EthAddress::from_str(&self.contract_address)
            .map_err(|e| anyhow!("invalid contract-address {}: {}", self.contract_address, e))
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }
}

impl MonitorSettings {
    pub fn dedupe_window(&self) -> Duration {
        Duration::from_secs(self.dedupe_window_secs)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
