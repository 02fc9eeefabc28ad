// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reachability probe for the risk assessment service.
//!
//! The probe is a pre-condition gate: when it reports false the
//! coordinator refuses to start a submission without touching the
//! wallet or the ledger.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Non-throwing reachability check. True only on a successful,
    /// bounded-timeout response; any transport error, non-success
    /// status, or timeout yields false.
    async fn check_health(&self) -> bool;
}

pub struct HttpHealthProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpHealthProbe {
    pub fn new(risk_service_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            health_url: format!("{}/health", risk_service_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthProbe {
    async fn check_health(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                if !healthy {
                    tracing::warn!(
                        "[HealthProbe] Risk service returned non-success status {}",
                        response.status()
                    );
                }
                healthy
            }
            Err(e) => {
                tracing::warn!("[HealthProbe] Risk service unreachable: {}", e);
                false
            }
        }
    }
}
