//! Bounded, newest-first retention of committed telemetry records.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::TelemetryRecord;

// ---

/// History shared between the sampling loop (writer) and route handlers.
pub type SharedHistory = Arc<RwLock<History>>;

/// Bounded history ordered by commit time, newest at the front.
///
/// Once `capacity` records are held, every commit evicts the oldest record.
#[derive(Debug, Clone)]
pub struct History {
    records: VecDeque<TelemetryRecord>,
    capacity: usize,
}

impl History {
    // ---
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn shared(capacity: usize) -> SharedHistory {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Push a record to the front, evicting from the back past capacity.
    pub fn commit(&mut self, record: TelemetryRecord) {
        // ---
        self.records.push_front(record);
        while self.records.len() > self.capacity {
            self.records.pop_back();
        }
    }

    /// The `k` most recent records, newest-first.
    pub fn latest(&self, k: usize) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        self.records.iter().take(k)
    }

    pub fn newest(&self) -> Option<&TelemetryRecord> {
        self.records.front()
    }

    /// Drop every record.
    pub fn purge(&mut self) -> usize {
        let dropped = self.records.len();
        self.records.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
