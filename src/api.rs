// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dashboard-facing HTTP API: audit log reads, aggregate stats, a
//! health probe passthrough, and the submission entry point.

use crate::audit::{filter_entries, stats, AuditStats, AuditStore, LogFilter, TimeRange};
use crate::coordinator::SubmitApi;
use crate::error::GateError;
use crate::health::HealthCheck;
use crate::types::{AuditEntryType, AuditLogEntry, SubmissionIntent, TransactionAttempt};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use ethers::types::Address as EthAddress;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ApiState {
    pub store: Arc<AuditStore>,
    pub health: Arc<dyn HealthCheck>,
    // Absent when the node runs monitor-only (no signing key)
    pub submit: Option<Arc<dyn SubmitApi>>,
    pub registry: prometheus::Registry,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/logs", get(logs_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/submit", post(submit_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    if state.health.check_health().await {
        Ok(Json(HealthResponse { status: "healthy" }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
            }),
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    // Exact entry type, e.g. "Transaction" or "Security Alert"
    pub log_type: Option<String>,
    // One of all/1h/24h/7d/today/this-week
    pub range: Option<String>,
    // Case-insensitive substring over message and type
    pub q: Option<String>,
}

impl LogsQuery {
    fn into_filter(self) -> Result<LogFilter, String> {
        let entry_type = match self.log_type.as_deref() {
            None | Some("all") => None,
            Some(raw) => Some(raw.parse::<AuditEntryType>()?),
        };
        let range = match self.range.as_deref() {
            None => TimeRange::All,
            Some(raw) => raw.parse::<TimeRange>()?,
        };
        Ok(LogFilter {
            entry_type,
            range,
            query: self.q.filter(|q| !q.is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<AuditLogEntry>,
    pub stats: AuditStats,
}

async fn logs_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, (StatusCode, String)> {
    let filter = query
        .into_filter()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let snapshot = state.store.snapshot().await;
    let logs = filter_entries(&snapshot, &filter, Utc::now());
    let stats = stats(&logs);
    Ok(Json(LogsResponse { logs, stats }))
}

async fn stats_handler(State(state): State<Arc<ApiState>>) -> Json<AuditStats> {
    let snapshot = state.store.snapshot().await;
    Json(stats(&snapshot))
}

async fn metrics_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<String, (StatusCode, String)> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub name: String,
    pub user_address: String,
    pub location: String,
    pub account: EthAddress,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
}

impl From<&TransactionAttempt> for AttemptResponse {
    fn from(attempt: &TransactionAttempt) -> Self {
        Self {
            state: attempt.state.as_str().to_string(),
            hash: attempt.hash.map(|h| format!("{:?}", h)),
            error: attempt.error.as_ref().map(|e| e.to_string()),
            error_type: attempt.error.as_ref().map(|e| e.error_type()),
        }
    }
}

async fn submit_handler(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<AttemptResponse>, (StatusCode, String)> {
    let Some(submit) = &state.submit else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "node is running monitor-only, submissions are disabled".to_string(),
        ));
    };

    let intent = SubmissionIntent {
        name: request.name,
        user_address: request.user_address,
        location: request.location,
    };
    info!("[Api] Submission received for account {:?}", request.account);

    match submit
        .submit_intent(intent, request.account, CancellationToken::new())
        .await
    {
        Ok(attempt) => Ok(Json(AttemptResponse::from(&attempt))),
        Err(GateError::SubmissionInProgress) => Err((
            StatusCode::CONFLICT,
            GateError::SubmissionInProgress.to_string(),
        )),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
