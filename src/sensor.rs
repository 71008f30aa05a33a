//! Sensor polling and unit normalization.
//!
//! Drivers sit behind the [`Sensor`] trait. [`SensorReader`] polls every
//! configured sensor once per call and never fails as a whole: a driver error
//! or a NaN field degrades only that sensor's slot.

use tracing::{trace, warn};

use crate::config::{Config, SensorKind};
use crate::error::SensorError;
use crate::models::{RawReading, SensorSample};

// ---

/// A temperature/humidity sensor driver.
pub trait Sensor: Send {
    /// Data pin the sensor is attached to.
    fn pin(&self) -> u8;

    /// Read temperature in °C and relative humidity. Either field may be NaN.
    fn read(&mut self) -> Result<RawReading, SensorError>;
}

/// Polls all sensors in pin order.
pub struct SensorReader {
    sensors: Vec<Box<dyn Sensor>>,
}

impl SensorReader {
    // ---
    pub fn new(sensors: Vec<Box<dyn Sensor>>) -> Self {
        Self { sensors }
    }

    /// Build the reader for the configured pins and sensor type.
    pub fn from_config(cfg: &Config) -> Self {
        // ---
        if cfg.sensor_kind != SensorKind::Simulated {
            warn!(
                "No GPIO access on this host; {} sensors on pins {:?} are simulated",
                cfg.sensor_kind, cfg.sensor_pins
            );
        }

        let sensors = cfg
            .sensor_pins
            .iter()
            .enumerate()
            .map(|(channel, &pin)| Box::new(SimulatedSensor::new(pin, channel)) as Box<dyn Sensor>)
            .collect();

        Self::new(sensors)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Read every sensor once; the result always has one entry per sensor.
    pub fn read_all(&mut self) -> Vec<SensorSample> {
        // ---
        self.sensors
            .iter_mut()
            .map(|sensor| {
                let raw = match sensor.read() {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("Sensor read failed: {}", e);
                        RawReading::FAILED
                    }
                };

                let sample = SensorSample::from_raw(raw);
                if sample.is_degraded() {
                    warn!("Sensor on pin {} unavailable: {:?}", sensor.pin(), raw);
                } else {
                    trace!("Sensor on pin {}: {:?}", sensor.pin(), sample);
                }
                sample
            })
            .collect()
    }
}

/// Deterministic stand-in for a DHT-class sensor.
///
/// Each channel drifts slowly inside its own temperature band (channel 0 near
/// freezing, channel 1 cool, channel 2 warm) with humidity between 40 and 60 %.
/// When a dropout period is set, every n-th read times out.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    pin: u8,
    channel: usize,
    reads: u32,
    dropout_every: Option<u32>,
}

impl SimulatedSensor {
    // ---
    const BANDS: [(f32, f32); 3] = [(-10.0, 10.0), (10.1, 20.0), (20.1, 40.0)];

    pub fn new(pin: u8, channel: usize) -> Self {
        Self {
            pin,
            channel,
            reads: 0,
            dropout_every: None,
        }
    }

    pub fn with_dropout(mut self, every: u32) -> Self {
        self.dropout_every = Some(every.max(1));
        self
    }
}

impl Sensor for SimulatedSensor {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn read(&mut self) -> Result<RawReading, SensorError> {
        // ---
        self.reads = self.reads.wrapping_add(1);
        if let Some(every) = self.dropout_every {
            if self.reads % every == 0 {
                return Err(SensorError::Timeout(self.pin));
            }
        }

        let (low, high) = Self::BANDS[self.channel % Self::BANDS.len()];
        let phase = self.reads as f32 * 0.05 + self.channel as f32;
        let mid = (low + high) / 2.0;
        let swing = (high - low) / 2.0;

        Ok(RawReading {
            temperature_c: mid + swing * phase.sin(),
            humidity: 50.0 + 10.0 * (phase * 0.7).cos(),
        })
    }
}
