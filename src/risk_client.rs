// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client for the risk assessment service.
//!
//! One assessment corresponds to one submission: the client never
//! retries internally, so the same intent is never double-scored.
//! Retries, if any, are an explicit new attempt owned by the caller.

use crate::error::{GateError, GateResult};
use crate::metrics::GateMetrics;
use crate::types::{ChainEvent, PreparedTxParams, RiskLevel, RiskVerdict, SubmissionIntent};
use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Verdict as it appears on the wire, before validation. Fields are
/// optional so that protocol violations surface as `MalformedResponse`
/// instead of opaque deserialization failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVerdict {
    pub approved: Option<bool>,
    pub risk_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub risk_factors: Option<Vec<String>>,
    pub tx_params: Option<RawTxParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTxParams {
    pub gas_limit: u64,
    // Decimal string; parsed into U256 to avoid precision loss
    pub gas_price_wei: String,
    pub chain_id: u64,
}

/// Transport seam for the risk service, mockable in tests.
#[async_trait]
pub trait RiskApi: Send + Sync + 'static {
    async fn assess(&self, intent: &SubmissionIntent) -> GateResult<RawVerdict>;
    async fn score_event(&self, event: &ChainEvent) -> GateResult<RawVerdict>;
}

#[async_trait]
impl<T: RiskApi + ?Sized> RiskApi for Arc<T> {
    async fn assess(&self, intent: &SubmissionIntent) -> GateResult<RawVerdict> {
        (**self).assess(intent).await
    }

    async fn score_event(&self, event: &ChainEvent) -> GateResult<RawVerdict> {
        (**self).score_event(event).await
    }
}

pub struct RiskClient<P> {
    api: P,
    metrics: Arc<GateMetrics>,
}

impl<P: RiskApi> RiskClient<P> {
    pub fn new(api: P, metrics: Arc<GateMetrics>) -> Self {
        Self { api, metrics }
    }

    /// Submit an intent for assessment. Fails with `ServiceUnavailable`
    /// when the service cannot be reached and `MalformedResponse` when
    /// the verdict violates the protocol (missing `approved`, or an
    /// approval without transaction parameters).
    pub async fn assess(&self, intent: &SubmissionIntent) -> GateResult<RiskVerdict> {
        let raw = self.api.assess(intent).await?;
        let verdict = validate_verdict(raw)?;
        let label = if verdict.approved { "approved" } else { "rejected" };
        self.metrics.risk_assessments.with_label_values(&[label]).inc();
        Ok(verdict)
    }

    /// Post-hoc scoring of an observed chain event. Called
    /// fire-and-forget by the monitor; the verdict is only logged.
    pub async fn score_observed_event(&self, event: &ChainEvent) -> GateResult<RiskVerdict> {
        let raw = self.api.score_event(event).await?;
        validate_verdict(raw)
    }
}

/// Enforce the verdict invariant: `approved` must be present, and an
/// approved verdict must carry server-chosen transaction parameters.
fn validate_verdict(raw: RawVerdict) -> GateResult<RiskVerdict> {
    let approved = raw
        .approved
        .ok_or_else(|| GateError::MalformedResponse("missing 'approved' field".to_string()))?;

    let tx_params = match (approved, raw.tx_params) {
        (true, None) => {
            return Err(GateError::MalformedResponse(
                "approved verdict without txParams".to_string(),
            ))
        }
        (true, Some(raw_params)) => Some(parse_tx_params(raw_params)?),
        (false, Some(_)) => {
            // A rejection must not smuggle transaction parameters in;
            // drop them but keep the rejection usable.
            warn!("[RiskGate] Rejected verdict carried txParams, ignoring them");
            None
        }
        (false, None) => None,
    };

    Ok(RiskVerdict {
        approved,
        risk_score: raw.risk_score.unwrap_or(0.0),
        risk_level: raw.risk_level.unwrap_or(RiskLevel::Low),
        risk_factors: raw.risk_factors.unwrap_or_default(),
        tx_params,
    })
}

fn parse_tx_params(raw: RawTxParams) -> GateResult<PreparedTxParams> {
    let gas_price_wei = U256::from_dec_str(&raw.gas_price_wei).map_err(|e| {
        GateError::MalformedResponse(format!(
            "gasPriceWei '{}' is not a decimal integer: {}",
            raw.gas_price_wei, e
        ))
    })?;
    Ok(PreparedTxParams {
        gas_limit: raw.gas_limit,
        gas_price_wei,
        chain_id: raw.chain_id,
    })
}

/// HTTP transport against the real service.
pub struct HttpRiskApi {
    client: reqwest::Client,
    assess_url: String,
    score_url: String,
}

impl HttpRiskApi {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            assess_url: format!("{}/assess", base),
            score_url: format!("{}/score-event", base),
        })
    }

    async fn post_for_verdict<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> GateResult<RawVerdict> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("[RiskGate] Request to {} failed: {}", url, e);
                GateError::ServiceUnavailable
            })?;

        if response.status().is_server_error() {
            warn!(
                "[RiskGate] Service returned {} from {}",
                response.status(),
                url
            );
            return Err(GateError::ServiceUnavailable);
        }

        response
            .json::<RawVerdict>()
            .await
            .map_err(|e| GateError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl RiskApi for HttpRiskApi {
    async fn assess(&self, intent: &SubmissionIntent) -> GateResult<RawVerdict> {
        // The service expects the submission fields flat, with the
        // on-chain address under 'address'
        let body = serde_json::json!({
            "name": intent.name,
            "address": intent.user_address,
            "location": intent.location,
        });
        self.post_for_verdict(&self.assess_url, &body).await
    }

    async fn score_event(&self, event: &ChainEvent) -> GateResult<RawVerdict> {
        let body = serde_json::json!({ "event": event });
        self.post_for_verdict(&self.score_url, &body).await
    }
}
