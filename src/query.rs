//! Query and serialization over the retained history.
//!
//! Every read takes the history read lock for the duration of a single
//! serialization, so a document reflects history either before or after a
//! commit, never in between.

use std::sync::Arc;

use serde::Serialize;

use crate::connectivity::{ConnectivitySnapshot, SharedConnectivity};
use crate::history::SharedHistory;
use crate::models::LiveReading;
use crate::scheduler::SharedLive;
use crate::{Config, TelemetryRecord};

// ---

/// Handles shared with route handlers. Cloning is cheap.
#[derive(Clone)]
pub struct QueryService {
    history: SharedHistory,
    live: SharedLive,
    connectivity: SharedConnectivity,
    config: Arc<Config>,
}

impl QueryService {
    // ---
    pub fn new(
        history: SharedHistory,
        live: SharedLive,
        connectivity: SharedConnectivity,
        config: Arc<Config>,
    ) -> Self {
        Self {
            history,
            live,
            connectivity,
            config,
        }
    }

    /// The most recent record as a one-element JSON array (`[]` when empty).
    pub fn get_latest(&self) -> String {
        self.render(1)
    }

    /// The entire retained history as a JSON array, newest-first.
    pub fn get_all(&self) -> String {
        self.render(self.config.history_capacity)
    }

    /// Clear the history and return a confirmation line.
    pub fn purge(&self) -> String {
        let dropped = self.history.write().purge();
        tracing::info!("History purged ({} records dropped)", dropped);
        format!("Purged {dropped} records\n")
    }

    /// Clone of up to `k` newest records, for the HTML pages.
    pub fn records(&self, k: usize) -> Vec<TelemetryRecord> {
        self.history.read().latest(k).cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.history.read().len()
    }

    pub fn live(&self) -> Option<LiveReading> {
        self.live.read().clone()
    }

    pub fn connectivity(&self) -> ConnectivitySnapshot {
        self.connectivity.read().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn render(&self, k: usize) -> String {
        // ---
        let history = self.history.read();
        let records: Vec<&TelemetryRecord> = history.latest(k).collect();
        to_json(&records)
    }
}

/// Serialize a document. Records contain only strings and finite floats, so
/// this cannot fail in practice; an empty array is returned if it ever does.
fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize document: {}", e);
        "[]".to_string()
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::history::History;
    use crate::models::Measurement;
    use parking_lot::RwLock;
    use serde_json::{json, Value};

    fn service(cap: usize) -> QueryService {
        let config = Config {
            history_capacity: cap,
            ..Config::default()
        };
        QueryService::new(
            History::shared(cap),
            Arc::new(RwLock::new(None)),
            SharedConnectivity::default(),
            Arc::new(config),
        )
    }

    fn record(stamp: &str, temps: [f32; 3]) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: stamp.to_string(),
            temp: temps.iter().map(|&t| Measurement::from_raw(t)).collect(),
            humidity: vec![Measurement::valid(45.5); 3],
        }
    }

    #[test]
    fn test_empty_history_is_empty_array() {
        // ---
        let svc = service(5);
        assert_eq!(svc.get_latest(), "[]");
        assert_eq!(svc.get_all(), "[]");
    }

    #[test]
    fn test_latest_returns_just_committed_record() {
        // ---
        let svc = service(5);
        let committed = record("2025-06-01T12:00:05", [70.25, f32::NAN, 81.5]);
        svc.history.write().commit(record("2025-06-01T12:00:00", [1.0, 2.0, 3.0]));
        svc.history.write().commit(committed.clone());

        let doc: Vec<TelemetryRecord> = serde_json::from_str(&svc.get_latest()).unwrap();
        assert_eq!(doc, vec![committed]);

        let raw: Value = serde_json::from_str(&svc.get_latest()).unwrap();
        assert_eq!(
            raw,
            json!([{
                "timestamp": "2025-06-01T12:00:05",
                "temp": [70.25, -99.0, 81.5],
                "humidity": [45.5, 45.5, 45.5]
            }])
        );
    }

    #[test]
    fn test_get_all_newest_first_and_bounded() {
        // ---
        let svc = service(3);
        for (i, stamp) in ["R1", "R2", "R3", "R4"].iter().enumerate() {
            svc.history.write().commit(record(stamp, [i as f32; 3]));
        }

        let doc: Vec<Value> = serde_json::from_str(&svc.get_all()).unwrap();
        let stamps: Vec<&str> = doc.iter().map(|r| r["timestamp"].as_str().unwrap()).collect();
        assert_eq!(stamps, ["R4", "R3", "R2"]);
        for entry in &doc {
            assert_eq!(entry["temp"].as_array().unwrap().len(), 3);
            assert_eq!(entry["humidity"].as_array().unwrap().len(), 3);
        }
    }

    #[test]
    fn test_get_all_is_idempotent() {
        // ---
        let svc = service(10);
        for n in 0..7 {
            svc.history.write().commit(record(&format!("T{n}"), [n as f32, 1.0, 2.0]));
        }
        let first = svc.get_all();
        assert_eq!(first, svc.get_all());
        assert_eq!(first, svc.get_all());
        assert_eq!(svc.record_count(), 7);
    }

    #[test]
    fn test_purge_then_get_all_is_empty() {
        // ---
        let svc = service(4);
        for n in 0..9 {
            svc.history.write().commit(record(&format!("T{n}"), [0.0; 3]));
        }

        assert_eq!(svc.purge(), "Purged 4 records\n");
        assert_eq!(svc.get_all(), "[]");
        assert_eq!(svc.purge(), "Purged 0 records\n");
    }
}
