//! Data models for the telemetry node.
//!
//! A [`Measurement`] carries validity explicitly (`Option<f32>`) while it moves
//! through the engine. Only at the JSON boundary does an unavailable value turn
//! into the wire sentinel [`SENTINEL`], which keeps downstream collectors that
//! expect `-99` working unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---

/// Wire value for "sensor unavailable at capture time".
pub const SENTINEL: f32 = -99.0;

/// A single scalar reading that may be unavailable.
///
/// Non-finite values never reach the wire; they are written as the sentinel.
/// The sentinel is also the only encoding of "unavailable", so a genuine
/// reading of exactly `-99.0` reads back as unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement(Option<f32>);

impl Measurement {
    // ---
    pub const UNAVAILABLE: Measurement = Measurement(None);

    pub fn valid(value: f32) -> Self {
        Self(Some(value))
    }

    /// Build from a raw driver value, mapping NaN and infinities to unavailable.
    pub fn from_raw(value: f32) -> Self {
        if value.is_finite() {
            Self(Some(value))
        } else {
            Self(None)
        }
    }

    pub fn value(&self) -> Option<f32> {
        self.0
    }

    pub fn is_available(&self) -> bool {
        self.0.is_some()
    }

    /// Value as it appears on the wire. Never NaN or infinite.
    pub fn or_sentinel(&self) -> f32 {
        self.0.filter(|v| v.is_finite()).unwrap_or(SENTINEL)
    }
}

impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(self.or_sentinel())
    }
}

impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f32::deserialize(deserializer)?;
        if raw == SENTINEL || !raw.is_finite() {
            Ok(Measurement::UNAVAILABLE)
        } else {
            Ok(Measurement::valid(raw))
        }
    }
}

/// Raw driver output: Celsius and relative humidity, NaN on failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    // ---
    pub temperature_c: f32,
    pub humidity: f32,
}

impl RawReading {
    pub const FAILED: RawReading = RawReading {
        temperature_c: f32::NAN,
        humidity: f32::NAN,
    };
}

/// One sensor's normalized instantaneous reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorSample {
    // ---
    /// Degrees Fahrenheit.
    pub temperature: Measurement,
    /// Relative humidity in percent.
    pub humidity: Measurement,
}

impl SensorSample {
    pub const UNAVAILABLE: SensorSample = SensorSample {
        temperature: Measurement::UNAVAILABLE,
        humidity: Measurement::UNAVAILABLE,
    };

    /// Normalize a raw reading: non-finite fields become unavailable, valid
    /// temperatures are converted from Celsius to Fahrenheit.
    pub fn from_raw(raw: RawReading) -> Self {
        // ---
        let temperature = match Measurement::from_raw(raw.temperature_c).value() {
            Some(c) => Measurement::from_raw(celsius_to_fahrenheit(c)),
            None => Measurement::UNAVAILABLE,
        };

        SensorSample {
            temperature,
            humidity: Measurement::from_raw(raw.humidity),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.temperature.is_available() || !self.humidity.is_available()
    }
}

pub fn celsius_to_fahrenheit(c: f32) -> f32 {
    c * 1.8 + 32.0
}

/// A committed, immutable history entry.
///
/// `temp` and `humidity` are index-aligned with physical sensor position and
/// always hold exactly one entry per configured sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    // ---
    pub timestamp: String,
    pub temp: Vec<Measurement>,
    pub humidity: Vec<Measurement>,
}

impl TelemetryRecord {
    // ---
    pub fn from_samples(timestamp: impl Into<String>, samples: &[SensorSample]) -> Self {
        TelemetryRecord {
            timestamp: timestamp.into(),
            temp: samples.iter().map(|s| s.temperature).collect(),
            humidity: samples.iter().map(|s| s.humidity).collect(),
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.temp.len()
    }
}

/// The most recent fast-cadence reading, shown on the status pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReading {
    // ---
    pub timestamp: String,
    pub samples: Vec<SensorSample>,
}
