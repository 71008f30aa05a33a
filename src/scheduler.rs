//! Two-cadence sampling: a fast live-sample tick and a slower commit to
//! history, evaluated only on fast ticks.
//!
//! The scheduler is the single writer of the live reading and the only
//! committer to history. All cadence checks use wrapping tick arithmetic.

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::clock::{self, ClockSource};
use crate::history::SharedHistory;
use crate::models::{LiveReading, TelemetryRecord};
use crate::sensor::SensorReader;
use crate::Config;

// ---

/// Most recent fast-cadence reading, `None` until the first tick.
pub type SharedLive = Arc<RwLock<Option<LiveReading>>>;

/// What a call to [`SamplingScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The fast cadence was not due.
    Idle,
    /// Sensors were read and the live reading updated.
    Sampled,
    /// As `Sampled`, and the reading was committed to history.
    Committed,
}

pub struct SamplingScheduler {
    reader: SensorReader,
    history: SharedHistory,
    live: SharedLive,
    clock: Arc<dyn ClockSource>,
    offset: FixedOffset,
    sample_interval: Duration,
    record_interval: Duration,
    last_sample: Option<u32>,
    last_commit: Option<u32>,
}

impl SamplingScheduler {
    // ---
    pub fn new(
        reader: SensorReader,
        history: SharedHistory,
        live: SharedLive,
        clock: Arc<dyn ClockSource>,
        cfg: &Config,
    ) -> Self {
        Self {
            reader,
            history,
            live,
            clock,
            offset: clock::offset_from_secs(cfg.clock_offset_secs),
            sample_interval: cfg.sample_interval,
            record_interval: cfg.record_interval,
            last_sample: None,
            last_commit: None,
        }
    }

    /// `true` when the fast cadence is due. The first check always is.
    pub fn is_due(&self, now: u32) -> bool {
        self.last_sample
            .map_or(true, |last| clock::has_elapsed(now, last, self.sample_interval))
    }

    /// Run one fast tick if due, committing when history is empty or the
    /// record interval has passed since the last commit.
    pub fn tick(&mut self, now: u32) -> TickOutcome {
        // ---
        if !self.is_due(now) {
            return TickOutcome::Idle;
        }
        self.last_sample = Some(now);

        let samples = self.reader.read_all();
        let timestamp = clock::stamp(self.clock.as_ref(), now, self.offset);

        let record_due = self
            .last_commit
            .map_or(true, |last| clock::has_elapsed(now, last, self.record_interval));

        let committed = {
            let mut history = self.history.write();
            if history.is_empty() || record_due {
                history.commit(TelemetryRecord::from_samples(timestamp.clone(), &samples));
                Some(history.len())
            } else {
                None
            }
        };

        *self.live.write() = Some(LiveReading { timestamp, samples });

        match committed {
            Some(len) => {
                self.last_commit = Some(now);
                info!("Committed telemetry record ({} retained)", len);
                TickOutcome::Committed
            }
            None => {
                debug!("Live sample updated");
                TickOutcome::Sampled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::clock::testing::FixedClock;
    use crate::error::SensorError;
    use crate::history::History;
    use crate::models::Measurement;
    use crate::sensor::testing::ScriptedSensor;
    use chrono::{TimeZone, Utc};

    const SAMPLE_MS: u32 = 5_000;
    const RECORD_MS: u32 = 300_000;

    fn config() -> Config {
        Config {
            sensor_pins: vec![4, 5],
            sample_interval: Duration::from_millis(SAMPLE_MS as u64),
            record_interval: Duration::from_millis(RECORD_MS as u64),
            clock_offset_secs: 0,
            ..Config::default()
        }
    }

    fn scheduler_with(
        sensors: Vec<Box<dyn crate::sensor::Sensor>>,
    ) -> (SamplingScheduler, SharedHistory, SharedLive) {
        // ---
        let history = History::shared(10);
        let live: SharedLive = Arc::new(RwLock::new(None));
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::synced(at));
        let scheduler = SamplingScheduler::new(
            SensorReader::new(sensors),
            history.clone(),
            live.clone(),
            clock,
            &config(),
        );
        (scheduler, history, live)
    }

    fn steady_scheduler() -> (SamplingScheduler, SharedHistory, SharedLive) {
        scheduler_with(vec![
            Box::new(ScriptedSensor::steady(4, 20.0, 40.0)),
            Box::new(ScriptedSensor::steady(5, 25.0, 60.0)),
        ])
    }

    #[test]
    fn test_first_tick_bootstraps_one_record() {
        // ---
        let (mut scheduler, history, live) = steady_scheduler();

        assert_eq!(scheduler.tick(0), TickOutcome::Committed);
        assert_eq!(history.read().len(), 1);

        let record = history.read().newest().cloned().unwrap();
        assert_eq!(record.timestamp, "2025-06-01T12:00:00");
        assert_eq!(record.temp, vec![Measurement::valid(68.0), Measurement::valid(77.0)]);
        assert_eq!(live.read().as_ref().map(|l| l.samples.len()), Some(2));
    }

    #[test]
    fn test_fast_ticks_do_not_commit_until_record_interval() {
        // ---
        let (mut scheduler, history, _live) = steady_scheduler();
        assert_eq!(scheduler.tick(0), TickOutcome::Committed);

        // Not yet due
        assert_eq!(scheduler.tick(SAMPLE_MS - 1), TickOutcome::Idle);

        let mut now = 0;
        let mut commits = 0;
        while now < RECORD_MS - SAMPLE_MS {
            now += SAMPLE_MS;
            if scheduler.tick(now) == TickOutcome::Committed {
                commits += 1;
            }
        }
        assert_eq!(commits, 0);
        assert_eq!(history.read().len(), 1);

        assert_eq!(scheduler.tick(RECORD_MS), TickOutcome::Committed);
        assert_eq!(history.read().len(), 2);
    }

    #[test]
    fn test_purge_triggers_bootstrap_on_next_tick() {
        // ---
        let (mut scheduler, history, _live) = steady_scheduler();
        scheduler.tick(0);

        history.write().purge();
        assert_eq!(scheduler.tick(SAMPLE_MS), TickOutcome::Committed);
        assert_eq!(history.read().len(), 1);
    }

    #[test]
    fn test_cadence_across_counter_wrap() {
        // ---
        let (mut scheduler, history, _live) = steady_scheduler();
        let start = u32::MAX - 2_000;
        scheduler.tick(start);

        // 4 999 ms later, after the counter wrapped
        assert_eq!(scheduler.tick(start.wrapping_add(SAMPLE_MS - 1)), TickOutcome::Idle);
        assert_eq!(scheduler.tick(start.wrapping_add(SAMPLE_MS)), TickOutcome::Sampled);
        assert_eq!(scheduler.tick(start.wrapping_add(RECORD_MS)), TickOutcome::Committed);
        assert_eq!(history.read().len(), 2);
    }

    #[test]
    fn test_sensor_failure_keeps_cadence() {
        // ---
        let (mut scheduler, history, live) = scheduler_with(vec![
            Box::new(ScriptedSensor::steady(4, 20.0, 40.0)),
            Box::new(ScriptedSensor::new(5, vec![Err(SensorError::Timeout(5))])),
        ]);

        assert_eq!(scheduler.tick(0), TickOutcome::Committed);
        let record = history.read().newest().cloned().unwrap();
        assert_eq!(record.temp[0], Measurement::valid(68.0));
        assert_eq!(record.temp[1].or_sentinel(), -99.0);
        assert_eq!(record.humidity[1].or_sentinel(), -99.0);

        assert_eq!(scheduler.tick(SAMPLE_MS), TickOutcome::Sampled);
        let live = live.read().clone().unwrap();
        assert!(live.samples[1].is_degraded());
    }

    #[test]
    fn test_unsynced_clock_uses_uptime_timestamps() {
        // ---
        let history = History::shared(5);
        let live: SharedLive = Arc::new(RwLock::new(None));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let mut scheduler = SamplingScheduler::new(
            SensorReader::new(vec![Box::new(ScriptedSensor::steady(4, 1.0, 2.0))]),
            history.clone(),
            live,
            clock,
            &config(),
        );

        scheduler.tick(90_000);
        let stamp = history.read().newest().map(|r| r.timestamp.clone());
        assert_eq!(stamp.as_deref(), Some("1970-01-01T00:01:30"));
    }
}
