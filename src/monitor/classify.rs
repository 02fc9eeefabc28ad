// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Classification of observed chain events into audit records.
//!
//! The mapping is a registry rather than a hardcoded two-way split so
//! that new event kinds only need a new rule.

use crate::error::{GateError, GateResult};
use crate::types::{AuditEntryType, AuditLevel, AuditLogEntry, AuditStatus, ChainEvent};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub entry_type: AuditEntryType,
    pub level: AuditLevel,
    pub status: AuditStatus,
}

pub struct EventClassifier {
    rules: HashMap<String, ClassificationRule>,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Rules for the watched contract events.
    pub fn with_defaults() -> Self {
        let mut classifier = Self::new();
        classifier.register(
            "UserDataSaved",
            ClassificationRule {
                entry_type: AuditEntryType::Transaction,
                level: AuditLevel::Info,
                status: AuditStatus::Success,
            },
        );
        classifier.register(
            "UserRegistered",
            ClassificationRule {
                entry_type: AuditEntryType::UserActivity,
                level: AuditLevel::Info,
                status: AuditStatus::Info,
            },
        );
        classifier.register(
            "UserLoginAttempt",
            ClassificationRule {
                entry_type: AuditEntryType::UserActivity,
                level: AuditLevel::Info,
                status: AuditStatus::Info,
            },
        );
        classifier
    }

    pub fn register(&mut self, event_name: &str, rule: ClassificationRule) {
        self.rules.insert(event_name.to_string(), rule);
    }

    /// Produce exactly one audit entry for the event, or
    /// `UnrecognizedEvent` when no rule matches. Classification
    /// failures are per-event; the caller skips the event and keeps the
    /// subscription alive.
    pub fn classify(&self, event: &ChainEvent) -> GateResult<AuditLogEntry> {
        let rule = self
            .rules
            .get(&event.event_name)
            .ok_or_else(|| GateError::UnrecognizedEvent(event.event_name.clone()))?;

        Ok(AuditLogEntry {
            timestamp: event.observed_at,
            entry_type: rule.entry_type,
            level: rule.level,
            message: format!(
                "{} observed on {:?} (tx {:?}, block {})",
                event.event_name, event.contract_address, event.transaction_hash, event.block_number
            ),
            status: rule.status,
        })
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ethers::types::{Address as EthAddress, TxHash};
    use std::collections::HashMap;

    fn event(name: &str) -> ChainEvent {
        ChainEvent {
            contract_address: EthAddress::repeat_byte(5),
            event_name: name.to_string(),
            block_number: 42,
            transaction_hash: TxHash::from_low_u64_be(7),
            log_index: 0,
            args: HashMap::new(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_rules() {
        let classifier = EventClassifier::with_defaults();

        let saved = classifier.classify(&event("UserDataSaved")).unwrap();
        assert_eq!(saved.entry_type, AuditEntryType::Transaction);
        assert_eq!(saved.status, AuditStatus::Success);
        assert!(saved.message.contains("UserDataSaved"));
        assert!(saved.message.contains("block 42"));

        let registered = classifier.classify(&event("UserRegistered")).unwrap();
        assert_eq!(registered.entry_type, AuditEntryType::UserActivity);
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        let classifier = EventClassifier::with_defaults();
        match classifier.classify(&event("SomethingElse")) {
            Err(GateError::UnrecognizedEvent(name)) => assert_eq!(name, "SomethingElse"),
            other => panic!("expected UnrecognizedEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_is_extensible() {
        let mut classifier = EventClassifier::with_defaults();
        classifier.register(
            "IntrusionDetected",
            ClassificationRule {
                entry_type: AuditEntryType::SecurityAlert,
                level: AuditLevel::Error,
                status: AuditStatus::Blocked,
            },
        );
        let entry = classifier.classify(&event("IntrusionDetected")).unwrap();
        assert_eq!(entry.entry_type, AuditEntryType::SecurityAlert);
        assert_eq!(entry.status, AuditStatus::Blocked);
    }

    #[test]
    fn test_entry_timestamp_is_observation_time() {
        let classifier = EventClassifier::with_defaults();
        let ev = event("UserDataSaved");
        let entry = classifier.classify(&ev).unwrap();
        assert_eq!(entry.timestamp, ev.observed_at);
    }
}
