// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

#[derive(Clone, Debug)]
pub struct GateMetrics {
    pub(crate) health_checks: IntCounterVec,
    pub(crate) risk_assessments: IntCounterVec,
    pub(crate) submissions_started: IntCounter,
    pub(crate) submissions_terminal: IntCounterVec,
    pub(crate) signing_rejections: IntCounter,
    pub(crate) confirmation_timeouts: IntCounter,

    pub(crate) monitor_events_received: IntCounter,
    pub(crate) monitor_events_deduplicated: IntCounter,
    pub(crate) monitor_events_appended: IntCounter,
    pub(crate) monitor_classification_errors: IntCounter,
    pub(crate) monitor_reconnects: IntCounter,
    pub(crate) monitor_backfilled_events: IntCounter,
    pub(crate) monitor_last_seen_block: IntGauge,

    pub(crate) audit_entries_appended: IntCounterVec,
}

impl GateMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            health_checks: register_int_counter_vec_with_registry!(
                "gate_health_checks",
                "Total number of risk service health checks, by result",
                &["result"],
                registry,
            )
            .unwrap(),
            risk_assessments: register_int_counter_vec_with_registry!(
                "gate_risk_assessments",
                "Total number of risk assessments, by verdict",
                &["verdict"],
                registry,
            )
            .unwrap(),
            submissions_started: register_int_counter_with_registry!(
                "gate_submissions_started",
                "Total number of submissions accepted by the coordinator",
                registry,
            )
            .unwrap(),
            submissions_terminal: register_int_counter_vec_with_registry!(
                "gate_submissions_terminal",
                "Total number of submissions by terminal state",
                &["state"],
                registry,
            )
            .unwrap(),
            signing_rejections: register_int_counter_with_registry!(
                "gate_signing_rejections",
                "Total number of signing requests explicitly rejected by the user",
                registry,
            )
            .unwrap(),
            confirmation_timeouts: register_int_counter_with_registry!(
                "gate_confirmation_timeouts",
                "Total number of confirmation waits that hit the ceiling",
                registry,
            )
            .unwrap(),
            monitor_events_received: register_int_counter_with_registry!(
                "gate_monitor_events_received",
                "Total number of chain events delivered to the monitor",
                registry,
            )
            .unwrap(),
            monitor_events_deduplicated: register_int_counter_with_registry!(
                "gate_monitor_events_deduplicated",
                "Total number of redelivered chain events discarded by the dedupe window",
                registry,
            )
            .unwrap(),
            monitor_events_appended: register_int_counter_with_registry!(
                "gate_monitor_events_appended",
                "Total number of chain events appended to the audit store",
                registry,
            )
            .unwrap(),
            monitor_classification_errors: register_int_counter_with_registry!(
                "gate_monitor_classification_errors",
                "Total number of chain events skipped because no classifier recognized them",
                registry,
            )
            .unwrap(),
            monitor_reconnects: register_int_counter_with_registry!(
                "gate_monitor_reconnects",
                "Total number of monitor subscription reconnect attempts",
                registry,
            )
            .unwrap(),
            monitor_backfilled_events: register_int_counter_with_registry!(
                "gate_monitor_backfilled_events",
                "Total number of chain events recovered via historical backfill",
                registry,
            )
            .unwrap(),
            monitor_last_seen_block: register_int_gauge_with_registry!(
                "gate_monitor_last_seen_block",
                "Highest block number from which the monitor has recorded an event",
                registry,
            )
            .unwrap(),
            audit_entries_appended: register_int_counter_vec_with_registry!(
                "gate_audit_entries_appended",
                "Total number of audit log entries appended, by source",
                &["source"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
