// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Risk-gated transaction coordination and chain event auditing.
//!
//! A user-submitted intent only reaches the chain after an external
//! risk assessment approves it and supplies the transaction parameters;
//! an independent monitor watches the contract for events and builds a
//! deduplicated audit trail for the operator dashboard.

pub mod api;
pub mod audit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod ledger;
pub mod metrics;
pub mod monitor;
pub mod node;
pub mod risk_client;
pub mod types;
pub mod wallet;

#[cfg(test)]
pub mod test_utils;

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        // For simplicity we treat every error as transient so we can retry until max_elapsed_time
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}
