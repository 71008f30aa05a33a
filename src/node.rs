//! The node's cooperative control loop.
//!
//! One task owns the sampling scheduler and the connectivity manager. Each
//! pass dispatches at most one of them, sampling first, then sleeps for
//! `loop_idle` so request handlers (running on their own tasks) get served.
//! The HTTP listener is bound the first time the node comes online. A failed
//! bind is logged and retried on the link refresh cadence; it never stops
//! sampling.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::{ClockSource, HttpClock, MonotonicTicks, TickSource};
use crate::connectivity::{
    ConnectivityManager, LinkState, NetworkLink, ProbeLink, SharedConnectivity, Transition,
};
use crate::history::History;
use crate::routes;
use crate::scheduler::{SamplingScheduler, SharedLive};
use crate::sensor::SensorReader;
use crate::{Config, QueryService};

// ---

/// Pause between loop passes.
pub const LOOP_IDLE: Duration = Duration::from_millis(50);

pub struct Node {
    config: Arc<Config>,
    ticks: Arc<dyn TickSource>,
    scheduler: SamplingScheduler,
    connectivity: ConnectivityManager,
    service: QueryService,
    loop_idle: Duration,
}

/// The single action a loop pass dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Idle,
    Sampled,
    Connectivity(Option<Transition>),
}

/// A running HTTP listener and the means to stop it.
struct Server {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<std::io::Result<()>>,
}

impl Node {
    // ---
    /// Wire the node with its production collaborators.
    pub fn new(config: Config) -> Result<Self> {
        // ---
        let reader = SensorReader::from_config(&config);
        let link = ProbeLink::new(&config).context("Failed to build network link")?;
        let clock = HttpClock::new(config.time_server_url.clone(), config.attach_timeout)
            .context("Failed to build time client")?;

        Ok(Self::with_parts(
            config,
            reader,
            Arc::new(link),
            Arc::new(clock),
            Arc::new(MonotonicTicks::new()),
        ))
    }

    /// Wire the node from explicit collaborators.
    pub fn with_parts(
        config: Config,
        reader: SensorReader,
        link: Arc<dyn NetworkLink>,
        clock: Arc<dyn ClockSource>,
        ticks: Arc<dyn TickSource>,
    ) -> Self {
        // ---
        let config = Arc::new(config);
        let history = History::shared(config.history_capacity);
        let live: SharedLive = Arc::new(RwLock::new(None));
        let shared_link = SharedConnectivity::default();

        let scheduler =
            SamplingScheduler::new(reader, history.clone(), live.clone(), clock.clone(), &config);
        let connectivity =
            ConnectivityManager::new(link, clock, ticks.clone(), shared_link.clone(), &config);
        let service = QueryService::new(history, live, shared_link, config.clone());

        Self {
            config,
            ticks,
            scheduler,
            connectivity,
            service,
            loop_idle: LOOP_IDLE,
        }
    }

    /// Handle onto the node's shared state, as served by the routes.
    pub fn service(&self) -> QueryService {
        self.service.clone()
    }

    /// Run the loop until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        // ---
        let mut server: Option<Server> = None;

        if let Some(transition) = self.connectivity.start().await {
            self.on_transition(transition, &mut server).await;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.loop_idle) => {}
            }

            match self.pass().await {
                Pass::Connectivity(Some(transition)) => {
                    self.on_transition(transition, &mut server).await;
                }
                Pass::Connectivity(None)
                    if server.is_none() && self.connectivity.state() == LinkState::Online =>
                {
                    server = try_serve(&self.config, self.service.clone()).await;
                }
                _ => {}
            }
        }

        info!("Shutting down");
        if let Some(server) = server {
            let _ = server.stop.send(true);
            match server.task.await {
                Ok(Ok(())) => debug!("HTTP server on {} stopped", server.addr),
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!("HTTP server task failed: {}", e),
            }
        }
        Ok(())
    }

    /// One loop pass: a due sample tick wins over connectivity work.
    async fn pass(&mut self) -> Pass {
        // ---
        let now = self.ticks.now_ms();
        if self.scheduler.is_due(now) {
            self.scheduler.tick(now);
            Pass::Sampled
        } else if self.connectivity.is_due(now) {
            Pass::Connectivity(self.connectivity.poll(now).await)
        } else {
            Pass::Idle
        }
    }

    async fn on_transition(&mut self, transition: Transition, server: &mut Option<Server>) {
        // ---
        match transition {
            Transition::CameOnline { first_attach } => {
                if first_attach {
                    info!("Online");
                } else {
                    info!("Back online");
                }
                if server.is_none() {
                    *server = try_serve(&self.config, self.service.clone()).await;
                }
            }
            Transition::WentOffline => {
                warn!("Offline; sampling continues, queries unreachable until re-attached");
            }
        }
    }
}

/// Bind the listener, logging a failure instead of returning it.
async fn try_serve(config: &Config, service: QueryService) -> Option<Server> {
    // ---
    match serve(config, service).await {
        Ok(server) => Some(server),
        Err(e) => {
            error!("Query interface unavailable, will retry: {:#}", e);
            None
        }
    }
}

/// Register the query routes and bind the listener.
async fn serve(config: &Config, service: QueryService) -> Result<Server> {
    // ---
    let ip = config.static_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
    let addr = SocketAddr::new(IpAddr::V4(ip), config.listen_port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let addr = listener.local_addr()?;
    info!("Listening on {}", addr);

    let app = routes::router(service);
    let (stop, mut stopped) = watch::channel(false);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stopped.changed().await;
            })
            .await
    });

    Ok(Server { addr, stop, task })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::clock::testing::{FixedClock, ManualTicks};
    use crate::connectivity::LinkStatus;
    use crate::error::LinkError;
    use crate::sensor::testing::ScriptedSensor;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const SAMPLE_MS: u32 = 500;
    const RECORD_MS: u32 = 1_000;
    const WIFI_MS: u32 = 1_000;

    /// Link that is up until told otherwise.
    #[derive(Default)]
    struct SwitchLink {
        down: AtomicBool,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl NetworkLink for SwitchLink {
        async fn attach(&self) -> Result<(), LinkError> {
            if self.down.load(Ordering::SeqCst) {
                Err(LinkError::Failed("no carrier".into()))
            } else {
                Ok(())
            }
        }

        async fn status(&self) -> LinkStatus {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                LinkStatus::Down
            } else {
                LinkStatus::Up
            }
        }
    }

    fn node(link: Arc<SwitchLink>, ticks: Arc<ManualTicks>) -> Node {
        // ---
        let cfg = Config {
            sensor_pins: vec![4, 5],
            sample_interval: Duration::from_millis(SAMPLE_MS as u64),
            record_interval: Duration::from_millis(RECORD_MS as u64),
            wifi_interval: Duration::from_millis(WIFI_MS as u64),
            ..Config::default()
        };
        let reader = SensorReader::new(vec![
            Box::new(ScriptedSensor::steady(4, 20.0, 40.0)),
            Box::new(ScriptedSensor::steady(5, 22.0, 45.0)),
        ]);
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
        Node::with_parts(cfg, reader, link, clock, ticks)
    }

    #[tokio::test]
    async fn test_due_sample_wins_over_connectivity() {
        // ---
        let link = Arc::new(SwitchLink::default());
        let ticks = Arc::new(ManualTicks::at(0));
        let mut node = node(link.clone(), ticks.clone());
        assert!(node.connectivity.start().await.is_some());

        // Both cadences are due: one pass does the sampling only.
        ticks.set(WIFI_MS);
        assert_eq!(node.pass().await, Pass::Sampled);
        assert_eq!(link.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(node.service.record_count(), 1);

        // The next pass at the same instant takes the connectivity work.
        assert_eq!(node.pass().await, Pass::Connectivity(None));
        assert_eq!(link.refreshes.load(Ordering::SeqCst), 1);

        assert_eq!(node.pass().await, Pass::Idle);
    }

    #[tokio::test]
    async fn test_commits_continue_across_link_loss() {
        // ---
        let link = Arc::new(SwitchLink::default());
        let ticks = Arc::new(ManualTicks::at(0));
        let mut node = node(link.clone(), ticks.clone());
        assert_eq!(
            node.connectivity.start().await,
            Some(Transition::CameOnline { first_attach: true })
        );

        let mut records_at_loss = None;
        for step in 1..=40u32 {
            if step == 20 {
                link.down.store(true, Ordering::SeqCst);
            }
            ticks.set(step * 250);
            if node.pass().await == Pass::Connectivity(Some(Transition::WentOffline)) {
                records_at_loss = Some(node.service.record_count());
            }
        }

        let records_at_loss = records_at_loss.expect("link loss observed");
        assert_eq!(node.connectivity.state(), LinkState::Offline);
        assert!(records_at_loss >= 4, "{records_at_loss} records while online");
        assert!(
            node.service.record_count() >= records_at_loss + 3,
            "{} records after going offline",
            node.service.record_count() - records_at_loss
        );
        assert!(node.service.live().is_some());
    }
}
