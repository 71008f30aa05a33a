//! Time sources: a wrapping millisecond tick counter for cadences and a
//! synchronizable wall clock for record timestamps.
//!
//! Until the wall clock has synchronized at least once, timestamps are derived
//! from uptime (the Unix epoch plus elapsed ticks), the same fallback a node
//! without network time would show.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::ClockError;

// ---

/// Record timestamp layout, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Monotonic millisecond counter that wraps at `u32::MAX`.
pub trait TickSource: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed from `since` to `now`, correct across wraparound.
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// `true` once at least `interval` has passed since `since`.
pub fn has_elapsed(now: u32, since: u32, interval: Duration) -> bool {
    u64::from(elapsed_ms(now, since)) >= interval.as_millis() as u64
}

/// Tick source backed by [`Instant`], starting at zero on creation.
#[derive(Debug)]
pub struct MonotonicTicks {
    start: Instant,
}

impl MonotonicTicks {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicTicks {
    fn now_ms(&self) -> u32 {
        // Truncation is the wraparound.
        self.start.elapsed().as_millis() as u32
    }
}

/// Wall-clock time service.
#[async_trait]
pub trait ClockSource: Send + Sync {
    /// Synchronized UTC time, or `None` before the first successful sync.
    fn now(&self) -> Option<DateTime<Utc>>;

    /// One-time service initialization, run on first attach.
    async fn init(&self);

    /// Re-synchronize against the time service.
    async fn resync(&self) -> Result<(), ClockError>;
}

/// Format the timestamp for a record captured at tick `now_ms`.
///
/// The offset applies to synchronized time only; uptime stamps stay raw.
pub fn stamp(clock: &dyn ClockSource, now_ms: u32, offset: FixedOffset) -> String {
    // ---
    match clock.now() {
        Some(utc) => utc.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string(),
        None => DateTime::<Utc>::from_timestamp_millis(i64::from(now_ms))
            .unwrap_or_default()
            .format(TIMESTAMP_FORMAT)
            .to_string(),
    }
}

/// Build the display offset, falling back to UTC for out-of-range values.
pub fn offset_from_secs(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(|| {
        tracing::warn!("Clock offset {}s out of range, using UTC", secs);
        Utc.fix()
    })
}

/// Wall clock synchronized from the `Date` header of an HTTP time server.
///
/// After a sync, time advances from the local monotonic clock until the next
/// resync corrects it.
#[derive(Debug)]
pub struct HttpClock {
    client: reqwest::Client,
    url: String,
    anchor: RwLock<Option<(DateTime<Utc>, Instant)>>,
}

impl HttpClock {
    // ---
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClockError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            anchor: RwLock::new(None),
        })
    }
}

#[async_trait]
impl ClockSource for HttpClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        let (at, taken) = (*self.anchor.read())?;
        let drift = chrono::Duration::from_std(taken.elapsed()).ok()?;
        Some(at + drift)
    }

    async fn init(&self) {
        info!("Time service initialized against {}", self.url);
    }

    async fn resync(&self) -> Result<(), ClockError> {
        // ---
        let response = self.client.head(&self.url).send().await?;
        let taken = Instant::now();

        let header = response
            .headers()
            .get(reqwest::header::DATE)
            .ok_or_else(|| ClockError::BadResponse("missing Date header".into()))?
            .to_str()
            .map_err(|e| ClockError::BadResponse(e.to_string()))?;

        let at = DateTime::parse_from_rfc2822(header)
            .map_err(|e| ClockError::BadResponse(format!("'{header}': {e}")))?
            .with_timezone(&Utc);

        debug!("Clock synchronized to {}", at);
        *self.anchor.write() = Some((at, taken));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic time sources for engine tests.

    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

    use super::*;

    /// Tick source advanced by hand.
    #[derive(Debug, Default)]
    pub struct ManualTicks(AtomicU32);

    impl ManualTicks {
        pub fn at(ms: u32) -> Self {
            Self(AtomicU32::new(ms))
        }

        pub fn set(&self, ms: u32) {
            self.0.store(ms, Ordering::SeqCst);
        }

        pub fn advance(&self, ms: u32) {
            let now = self.0.load(Ordering::SeqCst);
            self.0.store(now.wrapping_add(ms), Ordering::SeqCst);
        }
    }

    impl TickSource for ManualTicks {
        fn now_ms(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Clock that becomes synchronized to a fixed instant on its first
    /// successful resync.
    #[derive(Debug)]
    pub struct FixedClock {
        at: DateTime<Utc>,
        synced: AtomicBool,
        pub fail_resync: AtomicBool,
        pub hang_resync: AtomicBool,
        pub inits: AtomicUsize,
        pub resyncs: AtomicUsize,
    }

    impl FixedClock {
        pub fn new(at: DateTime<Utc>) -> Self {
            Self {
                at,
                synced: AtomicBool::new(false),
                fail_resync: AtomicBool::new(false),
                hang_resync: AtomicBool::new(false),
                inits: AtomicUsize::new(0),
                resyncs: AtomicUsize::new(0),
            }
        }

        pub fn synced(at: DateTime<Utc>) -> Self {
            let clock = Self::new(at);
            clock.synced.store(true, Ordering::SeqCst);
            clock
        }
    }

    #[async_trait]
    impl ClockSource for FixedClock {
        fn now(&self) -> Option<DateTime<Utc>> {
            self.synced.load(Ordering::SeqCst).then_some(self.at)
        }

        async fn init(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        async fn resync(&self) -> Result<(), ClockError> {
            self.resyncs.fetch_add(1, Ordering::SeqCst);
            if self.hang_resync.load(Ordering::SeqCst) {
                return std::future::pending().await;
            }
            if self.fail_resync.load(Ordering::SeqCst) {
                return Err(ClockError::Unreachable("scripted failure".into()));
            }
            self.synced.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
