//! Online/offline state machine for the node's network link.
//!
//! Offline, the manager re-attempts attachment every `wifi_interval`, each
//! attempt bounded by `attach_timeout`. Online, it refreshes the link status on
//! the same cadence and resynchronizes the clock every `ntp_interval`. Only an
//! explicit [`LinkStatus::Down`] demotes the node; a degraded link or a failed
//! resync is logged and retried. Every call into the link or the clock is
//! bounded by `attach_timeout`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::clock::{self, ClockSource, TickSource};
use crate::error::{ClockError, LinkError};
use crate::Config;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Offline,
    Online,
}

/// Health reported by a link refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    /// Transient trouble; the node stays online.
    Degraded,
    /// The link is gone and must be re-attached.
    Down,
}

/// The network attachment collaborator.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    /// Try to attach. The manager bounds this call with its own timeout.
    async fn attach(&self) -> Result<(), LinkError>;

    /// Refresh and report the link status while online.
    async fn status(&self) -> LinkStatus;
}

/// Read-only view of the manager's state for route handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivitySnapshot {
    pub state: LinkState,
    pub attach_attempts: u64,
    pub resyncs: u64,
    pub resync_failures: u64,
}

impl Default for ConnectivitySnapshot {
    fn default() -> Self {
        Self {
            state: LinkState::Offline,
            attach_attempts: 0,
            resyncs: 0,
            resync_failures: 0,
        }
    }
}

pub type SharedConnectivity = Arc<RwLock<ConnectivitySnapshot>>;

/// State change reported by [`ConnectivityManager::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Attached. `first_attach` is set once per process: the caller should
    /// register the query routes.
    CameOnline { first_attach: bool },
    WentOffline,
}

pub struct ConnectivityManager {
    link: Arc<dyn NetworkLink>,
    clock: Arc<dyn ClockSource>,
    ticks: Arc<dyn TickSource>,
    shared: SharedConnectivity,
    state: LinkState,
    wifi_interval: Duration,
    ntp_interval: Duration,
    attach_timeout: Duration,
    last_attempt: u32,
    last_resync: u32,
    setup_done: bool,
}

impl ConnectivityManager {
    // ---
    pub fn new(
        link: Arc<dyn NetworkLink>,
        clock: Arc<dyn ClockSource>,
        ticks: Arc<dyn TickSource>,
        shared: SharedConnectivity,
        cfg: &Config,
    ) -> Self {
        let now = ticks.now_ms();
        Self {
            link,
            clock,
            ticks,
            shared,
            state: LinkState::Offline,
            wifi_interval: cfg.wifi_interval,
            ntp_interval: cfg.ntp_interval,
            attach_timeout: cfg.attach_timeout,
            last_attempt: now,
            last_resync: now,
            setup_done: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Startup attach; its outcome decides the initial state.
    pub async fn start(&mut self) -> Option<Transition> {
        // ---
        if self.try_attach().await {
            Some(self.go_online().await)
        } else {
            info!("Starting offline; retrying every {:?}", self.wifi_interval);
            None
        }
    }

    /// `true` when [`poll`](Self::poll) has work to do at `now`.
    pub fn is_due(&self, now: u32) -> bool {
        // ---
        let attempt_due = clock::has_elapsed(now, self.last_attempt, self.wifi_interval);
        match self.state {
            LinkState::Offline => attempt_due,
            LinkState::Online => {
                attempt_due || clock::has_elapsed(now, self.last_resync, self.ntp_interval)
            }
        }
    }

    /// Perform at most one due action: an attach retry when offline, or a
    /// link refresh or clock resync when online.
    pub async fn poll(&mut self, now: u32) -> Option<Transition> {
        // ---
        match self.state {
            LinkState::Offline => {
                if !clock::has_elapsed(now, self.last_attempt, self.wifi_interval) {
                    return None;
                }
                if self.try_attach().await {
                    Some(self.go_online().await)
                } else {
                    None
                }
            }
            LinkState::Online => {
                if clock::has_elapsed(now, self.last_attempt, self.wifi_interval) {
                    self.last_attempt = now;
                    self.refresh_link().await
                } else if clock::has_elapsed(now, self.last_resync, self.ntp_interval) {
                    self.last_resync = now;
                    self.resync().await;
                    None
                } else {
                    None
                }
            }
        }
    }

    /// One attach attempt bounded by `attach_timeout`. The retry cadence is
    /// measured from when the attempt ends.
    async fn try_attach(&mut self) -> bool {
        // ---
        let outcome = match tokio::time::timeout(self.attach_timeout, self.link.attach()).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Timeout(self.attach_timeout.as_millis() as u64)),
        };
        self.last_attempt = self.ticks.now_ms();
        self.shared.write().attach_attempts += 1;

        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!("Network attach failed: {}", e);
                false
            }
        }
    }

    async fn go_online(&mut self) -> Transition {
        // ---
        self.state = LinkState::Online;
        self.shared.write().state = LinkState::Online;

        let first_attach = !self.setup_done;
        if first_attach {
            self.clock.init().await;
            self.setup_done = true;
        }
        info!("Network attached (first attach: {})", first_attach);

        self.resync().await;
        self.last_resync = self.ticks.now_ms();

        Transition::CameOnline { first_attach }
    }

    async fn refresh_link(&mut self) -> Option<Transition> {
        // ---
        let status = match tokio::time::timeout(self.attach_timeout, self.link.status()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("Link refresh timed out after {:?}", self.attach_timeout);
                LinkStatus::Degraded
            }
        };

        match status {
            LinkStatus::Up => {
                trace!("Link refresh: up");
                None
            }
            LinkStatus::Degraded => {
                debug!("Link refresh: degraded, staying online");
                None
            }
            LinkStatus::Down => {
                warn!("Link down, going offline");
                self.state = LinkState::Offline;
                self.shared.write().state = LinkState::Offline;
                self.last_attempt = self.ticks.now_ms();
                Some(Transition::WentOffline)
            }
        }
    }

    async fn resync(&mut self) {
        // ---
        let outcome = match tokio::time::timeout(self.attach_timeout, self.clock.resync()).await {
            Ok(result) => result,
            Err(_) => Err(ClockError::Unreachable(format!(
                "no answer within {:?}",
                self.attach_timeout
            ))),
        };

        match outcome {
            Ok(()) => {
                self.shared.write().resyncs += 1;
                debug!("Clock resynchronized");
            }
            Err(e) => {
                self.shared.write().resync_failures += 1;
                warn!("Clock resync failed, keeping current time base: {}", e);
            }
        }
    }
}

/// Link that attaches by reaching a probe URL over HTTP.
///
/// A refresh that fails is reported as degraded until `down_after`
/// consecutive refreshes have failed.
#[derive(Debug)]
pub struct ProbeLink {
    client: reqwest::Client,
    ssid: String,
    probe_url: String,
    down_after: u32,
    failures: AtomicU32,
}

impl ProbeLink {
    // ---
    const DOWN_AFTER: u32 = 3;

    pub fn new(cfg: &Config) -> Result<Self, LinkError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.attach_timeout)
            .build()?;
        Ok(Self {
            client,
            ssid: cfg.wifi_ssid.clone(),
            probe_url: cfg.attach_probe_url.clone(),
            down_after: Self::DOWN_AFTER,
            failures: AtomicU32::new(0),
        })
    }

    async fn probe(&self) -> Result<(), LinkError> {
        let response = self.client.get(&self.probe_url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LinkError::Failed(format!("probe returned {}", response.status())))
        }
    }
}

#[async_trait]
impl NetworkLink for ProbeLink {
    async fn attach(&self) -> Result<(), LinkError> {
        // ---
        debug!("Attaching to '{}' via {}", self.ssid, self.probe_url);
        self.probe().await?;
        self.failures.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn status(&self) -> LinkStatus {
        // ---
        match self.probe().await {
            Ok(()) => {
                self.failures.store(0, Ordering::Relaxed);
                LinkStatus::Up
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Link probe failed ({} in a row): {}", failures, e);
                if failures >= self.down_after {
                    LinkStatus::Down
                } else {
                    LinkStatus::Degraded
                }
            }
        }
    }
}
