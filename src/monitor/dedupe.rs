// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded recent-event memory used to discard redelivered chain
//! events. Bounded by both entry count and age: once a block is final a
//! node no longer redelivers its logs, so older identities can be
//! forgotten safely.

use crate::types::EventKey;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub struct EventWindow {
    capacity: usize,
    max_age: Duration,
    seen: HashMap<EventKey, Instant>,
    // Insertion order, oldest first
    order: VecDeque<EventKey>,
}

impl EventWindow {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            capacity,
            max_age,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record an event identity. Returns true if the identity is fresh,
    /// false if it was already within the window.
    pub fn insert(&mut self, key: EventKey) -> bool {
        self.prune(Instant::now());
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key.clone(), Instant::now());
        self.order.push_back(key);
        true
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.seen.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        // Evict for age first, then for capacity. Insertion order is
        // also time order, so only front entries can be expired.
        while let Some(front) = self.order.front() {
            let expired = self
                .seen
                .get(front)
                .map(|at| now.duration_since(*at) >= self.max_age)
                .unwrap_or(true);
            if expired {
                if let Some(front) = self.order.pop_front() {
                    self.seen.remove(&front);
                }
            } else {
                break;
            }
        }
        while self.order.len() >= self.capacity {
            if let Some(front) = self.order.pop_front() {
                self.seen.remove(&front);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::TxHash;

    fn key(tx: u64, log_index: u64, name: &str) -> EventKey {
        EventKey {
            transaction_hash: TxHash::from_low_u64_be(tx),
            log_index,
            event_name: name.to_string(),
        }
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut window = EventWindow::new(100, Duration::from_secs(60));
        assert!(window.insert(key(1, 0, "UserDataSaved")));
        assert!(!window.insert(key(1, 0, "UserDataSaved")));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_identity_is_full_triple() {
        let mut window = EventWindow::new(100, Duration::from_secs(60));
        assert!(window.insert(key(1, 0, "UserDataSaved")));
        // Differing log index or event name is a different event
        assert!(window.insert(key(1, 1, "UserDataSaved")));
        assert!(window.insert(key(1, 0, "UserRegistered")));
        assert!(window.insert(key(2, 0, "UserDataSaved")));
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut window = EventWindow::new(3, Duration::from_secs(600));
        for i in 0..5 {
            assert!(window.insert(key(i, 0, "UserDataSaved")));
        }
        assert!(window.len() <= 3);
        // The oldest identities fell out of the window, so a redelivery
        // of them is no longer detected; the newest are still known
        assert!(window.contains(&key(4, 0, "UserDataSaved")));
        assert!(!window.contains(&key(0, 0, "UserDataSaved")));
    }

    #[test]
    fn test_age_evicts() {
        let mut window = EventWindow::new(100, Duration::from_millis(20));
        assert!(window.insert(key(1, 0, "UserDataSaved")));
        std::thread::sleep(Duration::from_millis(30));
        // Pruning happens on insert; the expired identity is gone and
        // can be re-inserted as fresh
        assert!(window.insert(key(1, 0, "UserDataSaved")));
        assert_eq!(window.len(), 1);
    }
}
