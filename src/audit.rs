// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Append-only audit store and the dashboard-facing read path.
//!
//! The store is the single shared write surface for the coordinator and
//! the monitor. Entries are never mutated after insertion; readers work
//! on a snapshot and tolerate concurrent appends. The coordinator and
//! the monitor may each record the same underlying transaction; those
//! entries are independent and are never merged.

use crate::metrics::GateMetrics;
use crate::types::{AuditEntryType, AuditLogEntry, AuditStatus};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
    metrics: Arc<GateMetrics>,
}

impl AuditStore {
    pub fn new(metrics: Arc<GateMetrics>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Append one entry. The write lock guarantees entries are never
    /// interleaved partially; `source` labels the appender for metrics.
    pub async fn append(&self, entry: AuditLogEntry, source: &str) {
        tracing::debug!(
            "[AuditStore] Append from {}: {} / {} - {}",
            source,
            entry.entry_type,
            entry.status,
            entry.message
        );
        self.metrics
            .audit_entries_appended
            .with_label_values(&[source])
            .inc();
        let mut entries = self.entries.write().await;
        entries.push(entry);
    }

    /// Snapshot-consistent copy for readers.
    pub async fn snapshot(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Inclusive time windows supported by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[default]
    All,
    LastHour,
    Last24Hours,
    Last7Days,
    Today,
    ThisWeek,
}

impl TimeRange {
    /// Lower bound of the window relative to `now`; `None` means
    /// unbounded. `Today` and `ThisWeek` are calendar windows (UTC,
    /// weeks starting Monday).
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeRange::All => None,
            TimeRange::LastHour => Some(now - ChronoDuration::hours(1)),
            TimeRange::Last24Hours => Some(now - ChronoDuration::hours(24)),
            TimeRange::Last7Days => Some(now - ChronoDuration::days(7)),
            TimeRange::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc()),
            TimeRange::ThisWeek => {
                let days_from_monday = now.weekday().num_days_from_monday() as i64;
                let monday = now.date_naive() - ChronoDuration::days(days_from_monday);
                monday.and_hms_opt(0, 0, 0).map(|start| start.and_utc())
            }
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TimeRange::All),
            "1h" => Ok(TimeRange::LastHour),
            "24h" => Ok(TimeRange::Last24Hours),
            "7d" => Ok(TimeRange::Last7Days),
            "today" => Ok(TimeRange::Today),
            "this-week" | "this week" => Ok(TimeRange::ThisWeek),
            other => Err(format!("unknown time range: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub entry_type: Option<AuditEntryType>,
    pub range: TimeRange,
    // Case-insensitive substring match over message and type name
    pub query: Option<String>,
}

/// Filter a snapshot. Pure function of (snapshot, filter, now); the
/// result is ordered newest-first.
pub fn filter_entries(
    snapshot: &[AuditLogEntry],
    filter: &LogFilter,
    now: DateTime<Utc>,
) -> Vec<AuditLogEntry> {
    let cutoff = filter.range.cutoff(now);
    let needle = filter.query.as_ref().map(|q| q.to_lowercase());

    let mut matched: Vec<AuditLogEntry> = snapshot
        .iter()
        .filter(|entry| {
            if let Some(entry_type) = filter.entry_type {
                if entry.entry_type != entry_type {
                    return false;
                }
            }
            if let Some(cutoff) = cutoff {
                if entry.timestamp < cutoff {
                    return false;
                }
            }
            if let Some(needle) = &needle {
                let in_message = entry.message.to_lowercase().contains(needle);
                let in_type = entry
                    .entry_type
                    .as_display()
                    .to_lowercase()
                    .contains(needle);
                if !in_message && !in_type {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matched
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub successful: usize,
    pub blocked: usize,
    pub failed: usize,
    // Counts keyed by the entry type display name
    pub by_type: BTreeMap<String, usize>,
}

/// Aggregate counts by status and by entry type.
pub fn stats(entries: &[AuditLogEntry]) -> AuditStats {
    let mut by_type = BTreeMap::new();
    for entry in entries {
        *by_type
            .entry(entry.entry_type.as_display().to_string())
            .or_insert(0) += 1;
    }
    AuditStats {
        total: entries.len(),
        successful: entries
            .iter()
            .filter(|e| e.status == AuditStatus::Success)
            .count(),
        blocked: entries
            .iter()
            .filter(|e| e.status == AuditStatus::Blocked)
            .count(),
        failed: entries
            .iter()
            .filter(|e| e.status == AuditStatus::Failed)
            .count(),
        by_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuditLevel;
    use chrono::TimeZone;

    fn entry(
        timestamp: DateTime<Utc>,
        entry_type: AuditEntryType,
        status: AuditStatus,
        message: &str,
    ) -> AuditLogEntry {
        AuditLogEntry {
            timestamp,
            entry_type,
            level: AuditLevel::Info,
            message: message.to_string(),
            status,
        }
    }

    fn now() -> DateTime<Utc> {
        // Wednesday 2024-03-13 12:00:00 UTC
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    fn sample_entries() -> Vec<AuditLogEntry> {
        let now = now();
        vec![
            entry(
                now - ChronoDuration::minutes(10),
                AuditEntryType::Transaction,
                AuditStatus::Success,
                "transaction confirmed",
            ),
            entry(
                now - ChronoDuration::hours(5),
                AuditEntryType::SecurityAlert,
                AuditStatus::Blocked,
                "submission blocked by risk assessment",
            ),
            entry(
                now - ChronoDuration::days(2),
                AuditEntryType::Transaction,
                AuditStatus::Failed,
                "transaction reverted",
            ),
            entry(
                now - ChronoDuration::days(20),
                AuditEntryType::UserActivity,
                AuditStatus::Info,
                "user registered",
            ),
        ]
    }

    #[tokio::test]
    async fn test_append_and_snapshot() {
        let store = AuditStore::new(Arc::new(GateMetrics::new_for_testing()));
        assert!(store.is_empty().await);

        store
            .append(
                entry(
                    Utc::now(),
                    AuditEntryType::Transaction,
                    AuditStatus::Success,
                    "ok",
                ),
                "coordinator",
            )
            .await;
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);

        // A snapshot is detached from later appends
        store
            .append(
                entry(
                    Utc::now(),
                    AuditEntryType::Transaction,
                    AuditStatus::Failed,
                    "later",
                ),
                "monitor",
            )
            .await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_preserve_every_entry() {
        let store = Arc::new(AuditStore::new(Arc::new(GateMetrics::new_for_testing())));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..25 {
                    store
                        .append(
                            entry(
                                Utc::now(),
                                AuditEntryType::Transaction,
                                AuditStatus::Success,
                                &format!("entry {}-{}", i, j),
                            ),
                            "monitor",
                        )
                        .await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 16 * 25);
    }

    #[test]
    fn test_filter_by_type() {
        let entries = sample_entries();
        let filter = LogFilter {
            entry_type: Some(AuditEntryType::Transaction),
            ..Default::default()
        };
        let result = filter_entries(&entries, &filter, now());
        assert_eq!(result.len(), 2);
        assert!(result
            .iter()
            .all(|e| e.entry_type == AuditEntryType::Transaction));
    }

    #[test]
    fn test_filter_by_relative_windows() {
        let entries = sample_entries();
        let cases = [
            (TimeRange::LastHour, 1),
            (TimeRange::Last24Hours, 2),
            (TimeRange::Last7Days, 3),
            (TimeRange::All, 4),
        ];
        for (range, expected) in cases {
            let filter = LogFilter {
                range,
                ..Default::default()
            };
            assert_eq!(
                filter_entries(&entries, &filter, now()).len(),
                expected,
                "range {:?}",
                range
            );
        }
    }

    #[test]
    fn test_today_window_is_calendar_based() {
        let entries = sample_entries();
        let filter = LogFilter {
            range: TimeRange::Today,
            ..Default::default()
        };
        // Only the 10-minute-old and 5-hour-old entries fall on the
        // same calendar day as `now` (12:00)
        assert_eq!(filter_entries(&entries, &filter, now()).len(), 2);
    }

    #[test]
    fn test_this_week_starts_monday() {
        let entries = sample_entries();
        let filter = LogFilter {
            range: TimeRange::ThisWeek,
            ..Default::default()
        };
        // now() is a Wednesday; the 2-day-old entry (Monday) is in the
        // ISO week, the 20-day-old one is not
        assert_eq!(filter_entries(&entries, &filter, now()).len(), 3);

        let cutoff = TimeRange::ThisWeek.cutoff(now()).unwrap();
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_search_is_case_insensitive_over_message_and_type() {
        let entries = sample_entries();
        let filter = LogFilter {
            query: Some("BLOCKED".to_string()),
            ..Default::default()
        };
        let result = filter_entries(&entries, &filter, now());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].status, AuditStatus::Blocked);

        // Matching on the type display name
        let filter = LogFilter {
            query: Some("security".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_entries(&entries, &filter, now()).len(), 1);
    }

    #[test]
    fn test_result_is_newest_first() {
        let entries = sample_entries();
        let result = filter_entries(&entries, &LogFilter::default(), now());
        for pair in result.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn test_stats_counts_by_status_and_type() {
        let entries = sample_entries();
        let stats = stats(&entries);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_type["Transaction"], 2);
        assert_eq!(stats.by_type["Security Alert"], 1);
        assert_eq!(stats.by_type["User Activity"], 1);
    }

    #[test]
    fn test_time_range_parsing() {
        assert_eq!("1h".parse::<TimeRange>().unwrap(), TimeRange::LastHour);
        assert_eq!("24H".parse::<TimeRange>().unwrap(), TimeRange::Last24Hours);
        assert_eq!("7d".parse::<TimeRange>().unwrap(), TimeRange::Last7Days);
        assert_eq!("today".parse::<TimeRange>().unwrap(), TimeRange::Today);
        assert_eq!(
            "this-week".parse::<TimeRange>().unwrap(),
            TimeRange::ThisWeek
        );
        assert!("yesterday".parse::<TimeRange>().is_err());
    }
}
