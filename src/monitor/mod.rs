// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain Event Monitor
//!
//! A single long-lived task that owns a live contract event
//! subscription, deduplicates redelivered events, classifies them into
//! audit records, and hands each appended event to the risk service for
//! post-hoc scoring. Connection loss is survived with exponential
//! backoff plus a bounded historical backfill; the dedupe window
//! persists across reconnects so nothing is double-appended.

pub mod classify;
pub mod dedupe;

use crate::audit::AuditStore;
use crate::config::MonitorSettings;
use crate::error::GateResult;
use crate::ledger::LedgerClient;
use crate::metrics::GateMetrics;
use crate::retry_with_max_elapsed_time;
use crate::risk_client::{RiskApi, RiskClient};
use crate::types::ChainEvent;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use classify::EventClassifier;
use dedupe::EventWindow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub dedupe_window_size: usize,
    pub dedupe_window: Duration,
    /// Blocks older than latest - max_backfill_blocks are accepted as
    /// permanently lost after downtime, never retried indefinitely
    pub max_backfill_blocks: u64,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl MonitorConfig {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            dedupe_window_size: settings.dedupe_window_size,
            dedupe_window: settings.dedupe_window(),
            max_backfill_blocks: settings.max_backfill_blocks,
            reconnect_initial_delay: settings.reconnect_initial_delay(),
            reconnect_max_delay: settings.reconnect_max_delay(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_settings(&MonitorSettings::default())
    }
}

pub struct ChainEventMonitor<L, P> {
    ledger: Arc<L>,
    risk: Arc<RiskClient<P>>,
    audit: Arc<AuditStore>,
    classifier: EventClassifier,
    window: EventWindow,
    // Highest block from which an event has been recorded; the
    // backfill cursor after a disconnect
    last_seen_block: Option<u64>,
    config: MonitorConfig,
    metrics: Arc<GateMetrics>,
}

impl<L, P> ChainEventMonitor<L, P>
where
    L: LedgerClient,
    P: RiskApi,
{
    pub fn new(
        ledger: Arc<L>,
        risk: Arc<RiskClient<P>>,
        audit: Arc<AuditStore>,
        classifier: EventClassifier,
        config: MonitorConfig,
        metrics: Arc<GateMetrics>,
    ) -> Self {
        let window = EventWindow::new(config.dedupe_window_size, config.dedupe_window);
        Self {
            ledger,
            risk,
            audit,
            classifier,
            window,
            last_seen_block: None,
            config,
            metrics,
        }
    }

    /// Run until cancelled. The subscription and the dedupe window are
    /// owned exclusively by this task.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("[Monitor] Starting chain event monitor");

        let mut reconnect = ExponentialBackoff {
            initial_interval: self.config.reconnect_initial_delay,
            max_interval: self.config.reconnect_max_delay,
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut first_connection = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !first_connection {
                self.metrics.monitor_reconnects.inc();
            }

            match self.ledger.subscribe_events().await {
                Ok(mut events) => {
                    info!("[Monitor] Subscription established");
                    reconnect.reset();

                    // Cover the span missed while disconnected. The
                    // dedupe window makes overlap with the live stream
                    // harmless.
                    if let Err(e) = self.backfill_gap().await {
                        warn!("[Monitor] Backfill failed, continuing with live events: {}", e);
                    }
                    first_connection = false;

                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                info!("[Monitor] Cancelled, shutting down");
                                return;
                            }
                            event = events.recv() => match event {
                                Some(event) => {
                                    self.process_event(event, "subscription").await;
                                }
                                None => {
                                    warn!("[Monitor] Subscription closed by provider");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("[Monitor] Failed to subscribe: {}", e);
                    first_connection = false;
                }
            }

            let delay = reconnect
                .next_backoff()
                .unwrap_or(self.config.reconnect_max_delay);
            warn!("[Monitor] Reconnecting in {:?}", delay);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Monitor] Cancelled during reconnect wait");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Re-query historical logs for the disconnected interval, bounded
    /// by the maximum lookback window.
    async fn backfill_gap(&mut self) -> GateResult<()> {
        let Some(last_seen) = self.last_seen_block else {
            // Nothing recorded yet; live events define the baseline
            return Ok(());
        };

        let latest = match retry_with_max_elapsed_time!(
            self.ledger.latest_block(),
            Duration::from_secs(30)
        ) {
            Ok(Ok(latest)) => latest,
            _ => {
                warn!("[Monitor] Could not determine latest block for backfill");
                return Ok(());
            }
        };

        let floor = latest.saturating_sub(self.config.max_backfill_blocks);
        let from_block = std::cmp::max(last_seen + 1, floor);
        if from_block > latest {
            return Ok(());
        }
        if floor > last_seen + 1 {
            warn!(
                "[Monitor] Blocks {}-{} are beyond the backfill window and permanently lost",
                last_seen + 1,
                floor - 1
            );
        }

        info!(
            "[Monitor] Backfilling events for blocks {}-{}",
            from_block, latest
        );
        let events = match retry_with_max_elapsed_time!(
            self.ledger.get_events_in_range(from_block, latest),
            Duration::from_secs(30)
        ) {
            Ok(Ok(events)) => events,
            _ => {
                warn!("[Monitor] Backfill query failed after retries");
                return Ok(());
            }
        };

        let mut recovered = 0usize;
        for event in events {
            if self.process_event(event, "backfill").await {
                recovered += 1;
                self.metrics.monitor_backfilled_events.inc();
            }
        }
        if recovered > 0 {
            info!("[Monitor] Backfill recovered {} events", recovered);
        }
        Ok(())
    }

    /// Handle one delivery: dedupe, classify, append, score. Returns
    /// true if the event produced a new audit entry.
    async fn process_event(&mut self, event: ChainEvent, source: &str) -> bool {
        self.metrics.monitor_events_received.inc();

        if !self.window.insert(event.key()) {
            debug!(
                "[Monitor] Duplicate delivery of {} (tx {:?}, log {}), skipping",
                event.event_name, event.transaction_hash, event.log_index
            );
            self.metrics.monitor_events_deduplicated.inc();
            return false;
        }

        let entry = match self.classifier.classify(&event) {
            Ok(entry) => entry,
            Err(e) => {
                // Per-event failure: skipped, never stops the loop
                warn!(
                    "[Monitor] Skipping unclassifiable event from {}: {}",
                    source, e
                );
                self.metrics.monitor_classification_errors.inc();
                return false;
            }
        };

        self.audit.append(entry, "monitor").await;
        self.metrics.monitor_events_appended.inc();

        let seen = self
            .last_seen_block
            .map_or(event.block_number, |b| b.max(event.block_number));
        self.last_seen_block = Some(seen);
        self.metrics.monitor_last_seen_block.set(seen as i64);

        // Fire-and-forget scoring: the verdict is logged, never blocks
        // event processing
        let risk = self.risk.clone();
        tokio::spawn(async move {
            match risk.score_observed_event(&event).await {
                Ok(verdict) if !verdict.approved => {
                    warn!(
                        "[Monitor] Risk service flagged {} (tx {:?}): score {:.2}, level {}",
                        event.event_name,
                        event.transaction_hash,
                        verdict.risk_score,
                        verdict.risk_level
                    );
                }
                Ok(verdict) => {
                    debug!(
                        "[Monitor] Scored {} (tx {:?}): score {:.2}",
                        event.event_name, event.transaction_hash, verdict.risk_score
                    );
                }
                Err(e) => {
                    warn!(
                        "[Monitor] Post-hoc scoring of {} failed: {}",
                        event.event_name, e
                    );
                }
            }
        });

        true
    }
}
