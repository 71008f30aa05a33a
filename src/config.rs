//! Configuration loader for the `thermonode` telemetry node.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, fmt, net::Ipv4Addr, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Result};

/// Parse an optional environment variable into `$ty` with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Driver family attached to the sensor pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Dht11,
    Dht22,
    Simulated,
}

impl FromStr for SensorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dht11" => Ok(SensorKind::Dht11),
            "dht22" | "am2302" => Ok(SensorKind::Dht22),
            "simulated" | "sim" => Ok(SensorKind::Simulated),
            other => Err(anyhow!("unknown sensor type '{other}'")),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Dht11 => "dht11",
            SensorKind::Dht22 => "dht22",
            SensorKind::Simulated => "simulated",
        };
        f.write_str(name)
    }
}

/// Strongly typed node configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Data pin of each sensor; the list length is the sensor count.
    pub sensor_pins: Vec<u8>,

    pub sensor_kind: SensorKind,

    /// Fast cadence: live sampling.
    pub sample_interval: Duration,

    /// Slow cadence: committing to history.
    pub record_interval: Duration,

    /// Attach retry cadence while offline, link refresh while online.
    pub wifi_interval: Duration,

    /// Clock resync cadence while online.
    pub ntp_interval: Duration,

    /// Upper bound for a single attach attempt.
    pub attach_timeout: Duration,

    /// Maximum number of retained records.
    pub history_capacity: usize,

    pub wifi_ssid: String,
    pub wifi_password: String,

    /// Address to bind the query interface to; all interfaces when unset.
    pub static_ip: Option<Ipv4Addr>,

    pub listen_port: u16,

    /// Local offset from UTC applied to record timestamps.
    pub clock_offset_secs: i32,

    pub time_server_url: String,
    pub attach_probe_url: String,
}

impl Config {
    /// Number of sensors, fixed for the process lifetime.
    pub fn sensor_count(&self) -> usize {
        self.sensor_pins.len()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_pins: vec![4, 5, 14],
            sensor_kind: SensorKind::Dht22,
            sample_interval: Duration::from_millis(5_000),
            record_interval: Duration::from_millis(300_000),
            wifi_interval: Duration::from_millis(5_000),
            ntp_interval: Duration::from_millis(3_600_000),
            attach_timeout: Duration::from_millis(5_000),
            history_capacity: 300,
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            static_ip: None,
            listen_port: 8088,
            clock_offset_secs: -5 * 3600,
            time_server_url: "http://pool.ntp.org".to_string(),
            attach_probe_url: "http://connectivitycheck.gstatic.com/generate_204".to_string(),
        }
    }
}

/// Parse a comma-separated pin list such as `4,5,14`.
fn parse_pins(raw: &str) -> Result<Vec<u8>> {
    // ---
    let pins = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u8>().map_err(|e| anyhow!("Invalid SENSOR_PINS entry '{p}': {e}")))
        .collect::<Result<Vec<_>>>()?;

    if pins.is_empty() {
        bail!("SENSOR_PINS must name at least one pin");
    }
    Ok(pins)
}

/// Interval in milliseconds. Cadences are measured on a wrapping `u32` tick
/// counter, so an interval must fit below its wrap point.
fn millis(var_name: &str, value: u64) -> Result<Duration> {
    if value == 0 {
        bail!("{var_name} must be greater than zero");
    }
    if value >= u64::from(u32::MAX) {
        bail!("{var_name} must be less than {} ms", u32::MAX);
    }
    Ok(Duration::from_millis(value))
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `WIFI_SSID` – network to attach to
///
/// Optional:
/// - `WIFI_PASSWORD` – network password (default: empty)
/// - `SENSOR_PINS` – comma-separated data pins (default: `4,5,14`)
/// - `SENSOR_TYPE` – `dht22`, `dht11` or `simulated` (default: `dht22`)
/// - `SAMPLE_INTERVAL_MS` (default: 5000), `RECORD_INTERVAL_MS` (default: 300000)
/// - `WIFI_INTERVAL_MS` (default: 5000), `NTP_INTERVAL_MS` (default: 3600000)
/// - `ATTACH_TIMEOUT_MS` (default: 5000)
/// - `HISTORY_CAPACITY` (default: 300)
/// - `STATIC_IP` – IPv4 address to bind (default: all interfaces)
/// - `LISTEN_PORT` (default: 8088)
/// - `CLOCK_OFFSET_SECS` (default: -18000)
/// - `TIME_SERVER_URL`, `ATTACH_PROBE_URL`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let wifi_ssid = require_env!("WIFI_SSID");
    let wifi_password = env::var("WIFI_PASSWORD").unwrap_or_default();

    let sensor_pins = match env::var("SENSOR_PINS") {
        Ok(raw) => parse_pins(&raw)?,
        Err(_) => defaults.sensor_pins,
    };
    let sensor_kind = parse_env!("SENSOR_TYPE", SensorKind, defaults.sensor_kind);

    let sample_interval =
        millis("SAMPLE_INTERVAL_MS", parse_env!("SAMPLE_INTERVAL_MS", u64, 5_000))?;
    let record_interval =
        millis("RECORD_INTERVAL_MS", parse_env!("RECORD_INTERVAL_MS", u64, 300_000))?;
    let wifi_interval = millis("WIFI_INTERVAL_MS", parse_env!("WIFI_INTERVAL_MS", u64, 5_000))?;
    let ntp_interval = millis("NTP_INTERVAL_MS", parse_env!("NTP_INTERVAL_MS", u64, 3_600_000))?;
    let attach_timeout = millis("ATTACH_TIMEOUT_MS", parse_env!("ATTACH_TIMEOUT_MS", u64, 5_000))?;

    let history_capacity = parse_env!("HISTORY_CAPACITY", usize, defaults.history_capacity);
    if history_capacity == 0 {
        bail!("HISTORY_CAPACITY must be greater than zero");
    }

    let static_ip = env::var("STATIC_IP")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().parse::<Ipv4Addr>())
        .transpose()
        .map_err(|e| anyhow!("Invalid STATIC_IP: {}", e))?;

    let listen_port = parse_env!("LISTEN_PORT", u16, defaults.listen_port);
    let clock_offset_secs = parse_env!("CLOCK_OFFSET_SECS", i32, defaults.clock_offset_secs);

    let time_server_url = env::var("TIME_SERVER_URL").unwrap_or(defaults.time_server_url);
    let attach_probe_url = env::var("ATTACH_PROBE_URL").unwrap_or(defaults.attach_probe_url);

    Ok(Config {
        sensor_pins,
        sensor_kind,
        sample_interval,
        record_interval,
        wifi_interval,
        ntp_interval,
        attach_timeout,
        history_capacity,
        wifi_ssid,
        wifi_password,
        static_ip,
        listen_port,
        clock_offset_secs,
        time_server_url,
        attach_probe_url,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the network password while showing all other configuration
    /// values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_password = if self.wifi_password.is_empty() {
            "(none)"
        } else {
            "****"
        };
        let bind_ip = self
            .static_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "(all interfaces)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  SENSOR_PINS        : {:?}", self.sensor_pins);
        tracing::info!("  SENSOR_TYPE        : {}", self.sensor_kind);
        tracing::info!("  SAMPLE_INTERVAL_MS : {}", self.sample_interval.as_millis());
        tracing::info!("  RECORD_INTERVAL_MS : {}", self.record_interval.as_millis());
        tracing::info!("  WIFI_INTERVAL_MS   : {}", self.wifi_interval.as_millis());
        tracing::info!("  NTP_INTERVAL_MS    : {}", self.ntp_interval.as_millis());
        tracing::info!("  ATTACH_TIMEOUT_MS  : {}", self.attach_timeout.as_millis());
        tracing::info!("  HISTORY_CAPACITY   : {}", self.history_capacity);
        tracing::info!("  WIFI_SSID          : {}", self.wifi_ssid);
        tracing::info!("  WIFI_PASSWORD      : {}", masked_password);
        tracing::info!("  STATIC_IP          : {}", bind_ip);
        tracing::info!("  LISTEN_PORT        : {}", self.listen_port);
        tracing::info!("  CLOCK_OFFSET_SECS  : {}", self.clock_offset_secs);
        tracing::info!("  TIME_SERVER_URL    : {}", self.time_server_url);
        tracing::info!("  ATTACH_PROBE_URL   : {}", self.attach_probe_url);
    }
}
