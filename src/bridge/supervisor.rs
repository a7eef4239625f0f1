// src/bridge/supervisor.rs
//
// Top-level reconnect loop. Owns the socket pair and the cumulative counters,
// finds a device, runs a session on it, and goes back to searching whenever the
// session drops. Only a shutdown request ends the loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::session::{Session, SessionConfig};
use super::stats::BridgeStats;
use crate::io::serial::{DeviceLocator, SerialBackend};
use crate::io::{IoError, SocketPair};

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Wait between discovery attempts (and after a failed open)
    pub retry_delay: Duration,
    /// How often an active session's flag is checked
    pub poll_interval: Duration,
    pub session: SessionConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            retry_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            session: SessionConfig::default(),
        }
    }
}

pub struct Supervisor {
    backend: Arc<dyn SerialBackend>,
    locator: DeviceLocator,
    sockets: Arc<SocketPair>,
    stats: Arc<BridgeStats>,
    config: SupervisorConfig,
    shutdown: Arc<AtomicBool>,
    discovery_attempts: AtomicU64,
    sessions_started: AtomicU64,
}

impl Supervisor {
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        locator: DeviceLocator,
        sockets: SocketPair,
        config: SupervisorConfig,
    ) -> Self {
        Supervisor {
            backend,
            locator,
            sockets: Arc::new(sockets),
            stats: Arc::new(BridgeStats::new()),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            discovery_attempts: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IoError> {
        self.sockets.local_addr()
    }

    pub fn target(&self) -> SocketAddr {
        self.sockets.target
    }

    /// Flag that makes `run` stop the active session and return
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn discovery_attempts(&self) -> u64 {
        self.discovery_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::SeqCst)
    }

    /// Run until shutdown is requested.
    pub async fn run(&self) {
        tlog!("[supervisor] Setting up the serial device...");
        let mut session: Option<Session> = None;

        while !self.shutdown_requested() {
            if let Some(active) = session.take() {
                if active.is_connected() {
                    session = Some(active);
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }

                tlog!(
                    "[supervisor] Lost connection to {}. Trying to re-locate it...",
                    active.device()
                );
                active.join().await;
                continue;
            }

            match self.try_start_session() {
                Some(started) => session = Some(started),
                None => tokio::time::sleep(self.config.retry_delay).await,
            }
        }

        if let Some(active) = session {
            active.stop();
            active.join().await;
        }
        tlog!("[supervisor] Shut down");
    }

    /// One discovery attempt. `None` means "try again after the retry delay".
    fn try_start_session(&self) -> Option<Session> {
        self.discovery_attempts.fetch_add(1, Ordering::SeqCst);

        let port = self.locator.locate(self.backend.as_ref())?;

        let link = match self.backend.open(&port) {
            Ok(link) => link,
            Err(e) => {
                tlog!("[supervisor] Unable to open {}: {}", port.port_name, e);
                return None;
            }
        };

        match Session::start(
            link,
            self.sockets.clone(),
            self.stats.clone(),
            self.config.session.clone(),
        ) {
            Ok(session) => {
                self.sessions_started.fetch_add(1, Ordering::SeqCst);
                tlog!(
                    "[supervisor] OK! Bridging {} <-> {}",
                    port.port_name,
                    self.sockets.target
                );
                Some(session)
            }
            Err(e) => {
                tlog!("[supervisor] Unable to start session on {}: {}", port.port_name, e);
                None
            }
        }
    }
}
