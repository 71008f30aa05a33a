//! `thermonode`: a multi-sensor telemetry node.
//!
//! The node samples a set of temperature/humidity sensors on a fast cadence,
//! commits a snapshot to a bounded in-memory history on a slower cadence, and
//! serves that history over HTTP once it has network connectivity. Sampling
//! never depends on the network.
//!
//! Module layout:
//! - `sensor`       – driver trait and the all-sensors reader
//! - `history`      – bounded newest-first retention
//! - `scheduler`    – fast/slow sampling cadences
//! - `connectivity` – online/offline state machine, attach retry, clock resync
//! - `clock`        – tick counter and wall-clock sources
//! - `query`        – serialization of history for the routes
//! - `routes`       – HTTP route gateway
//! - `node`         – the control loop tying it all together

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod history;
pub mod models;
pub mod node;
pub mod query;
pub mod routes;
pub mod scheduler;
pub mod sensor;

pub use config::Config;

// Re-exported so sibling modules (and routes/*.rs in particular) depend on
// the crate root rather than on each other's paths.
pub use models::{Measurement, SensorSample, TelemetryRecord};
pub use node::Node;
pub use query::QueryService;
