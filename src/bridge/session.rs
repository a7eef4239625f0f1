// src/bridge/session.rs
//
// One bridge session: an open serial device pumped to and from the shared UDP
// socket pair. Three tasks run while the session is up:
//
// - serial -> udp: blocking read, SLIP decode, one datagram per frame
// - udp -> serial: blocking receive, SLIP encode, one device write per datagram
// - stats: periodic throughput report (verbose only)
//
// All three watch the same `ConnectionFlag`. The first task to hit an I/O error
// clears it; the others notice at their next iteration, so shutdown latency is
// bounded by one read timeout or stats interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use super::stats::BridgeStats;
use crate::io::serial::{max_encoded_len, slip_encode_into, SerialLink, SlipDecoder};
use crate::io::{is_timeout, IoError, SocketPair, MAX_DATAGRAM_SIZE};

/// Bytes requested from the device per read
const SERIAL_READ_CHUNK: usize = 4096;

// ============================================================================
// Cancellation
// ============================================================================

/// Shared "connected" flag used as the session's cancellation token.
///
/// Only the session start sets it; every task may clear it, and clearing is
/// idempotent.
#[derive(Clone, Debug)]
pub struct ConnectionFlag(Arc<AtomicBool>);

impl ConnectionFlag {
    pub fn connected() -> Self {
        ConnectionFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag. Returns true only for the call that actually cleared it.
    pub fn disconnect(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// One half of the device, owned by a pump loop.
///
/// Dropping the guard releases the handle and clears the flag, so the device is
/// closed and the other tasks are told to stop on every exit path, panics
/// included.
struct DeviceGuard {
    link: Box<dyn SerialLink>,
    flag: ConnectionFlag,
}

impl DeviceGuard {
    fn new(link: Box<dyn SerialLink>, flag: ConnectionFlag) -> Self {
        DeviceGuard { link, flag }
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        if self.flag.disconnect() {
            tlog!("[session] Closing {}", self.link.name());
        }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// How often the stats task wakes
    pub stats_interval: Duration,
    /// 0 = quiet, 1 = periodic throughput, 2+ = per-frame hex dumps
    pub verbosity: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            stats_interval: Duration::from_secs(1),
            verbosity: 0,
        }
    }
}

pub struct Session {
    device: String,
    flag: ConnectionFlag,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Launch the pump loops and the stats task for an opened device.
    ///
    /// Must be called from within a tokio runtime. Fails only if the device
    /// handle cannot be split into a read half and a write half.
    pub fn start(
        link: Box<dyn SerialLink>,
        sockets: Arc<SocketPair>,
        stats: Arc<BridgeStats>,
        config: SessionConfig,
    ) -> Result<Session, IoError> {
        let device = link.name().to_string();
        tlog!("[session] {:?}: {}", SessionState::Starting, device);

        let read_half = link
            .try_clone_link()
            .map_err(|e| IoError::connection(&device, format!("split handle: {}", e)))?;

        let flag = ConnectionFlag::connected();
        let reader = DeviceGuard::new(read_half, flag.clone());
        let writer = DeviceGuard::new(link, flag.clone());

        let mut tasks = Vec::with_capacity(3);

        {
            let sockets = sockets.clone();
            let stats = stats.clone();
            let verbosity = config.verbosity;
            tasks.push(tokio::task::spawn_blocking(move || {
                let mut reader = reader;
                let result = serial_to_udp(&mut reader, &sockets, &stats, verbosity);
                finish_pump("serial -> udp", result);
            }));
        }

        {
            let sockets = sockets.clone();
            let stats = stats.clone();
            let verbosity = config.verbosity;
            tasks.push(tokio::task::spawn_blocking(move || {
                let mut writer = writer;
                let result = udp_to_serial(&mut writer, &sockets, &stats, verbosity);
                finish_pump("udp -> serial", result);
            }));
        }

        tasks.push(tokio::spawn(run_stats(flag.clone(), stats, config)));

        tlog!("[session] {:?}: {}", SessionState::Running, device);

        Ok(Session {
            device,
            flag,
            tasks,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_connected(&self) -> bool {
        self.flag.is_connected()
    }

    pub fn state(&self) -> SessionState {
        if self.tasks.iter().all(|t| t.is_finished()) {
            SessionState::Stopped
        } else if self.flag.is_connected() {
            SessionState::Running
        } else {
            SessionState::Stopping
        }
    }

    /// Ask every task to stop at its next iteration.
    pub fn stop(&self) {
        if self.flag.disconnect() {
            tlog!("[session] {:?}: {} (requested)", SessionState::Stopping, self.device);
        }
    }

    /// Wait for all tasks to exit. Call after the flag has been cleared,
    /// otherwise this waits for the device to fail.
    pub async fn join(mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tlog!("[session] Task panicked: {:?}", e);
            }
        }
        tlog!("[session] {:?}: {}", SessionState::Stopped, self.device);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropping an unjoined session must still stop its loops
        self.flag.disconnect();
    }
}

// ============================================================================
// Pump loops
// ============================================================================

fn finish_pump(direction: &str, result: Result<(), IoError>) {
    match result {
        Ok(()) => tlog!("[session] {} stopped", direction),
        Err(e) => tlog!("[session] {} failed: {}", direction, e),
    }
}

/// Device bytes -> SLIP decode -> one datagram per frame
fn serial_to_udp(
    device: &mut DeviceGuard,
    sockets: &SocketPair,
    stats: &BridgeStats,
    verbosity: u8,
) -> Result<(), IoError> {
    let mut decoder = SlipDecoder::new();
    let mut buf = vec![0u8; SERIAL_READ_CHUNK];
    let target = sockets.target;

    while device.flag.is_connected() {
        let n = match device.link.read(&mut buf) {
            Ok(0) => return Err(IoError::disconnected(device.link.name())),
            Ok(n) => n,
            Err(ref e) if is_timeout(e) => continue,
            Err(e) => return Err(IoError::read(device.link.name(), e.to_string())),
        };

        for frame in decoder.feed(&buf[..n]) {
            sockets
                .socket
                .send_to(&frame, target)
                .map_err(|e| IoError::send(&target.to_string(), e.to_string()))?;
            stats.record_sent(frame.len());

            if verbosity >= 2 {
                tlog!(
                    "[session] serial -> {} ({} bytes): {}",
                    target,
                    frame.len(),
                    hex::encode(&frame)
                );
            }
        }
    }

    Ok(())
}

/// Datagram -> SLIP encode -> one device write.
/// Every received byte is payload; nothing is stripped from the datagram.
fn udp_to_serial(
    device: &mut DeviceGuard,
    sockets: &SocketPair,
    stats: &BridgeStats,
    verbosity: u8,
) -> Result<(), IoError> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut encoded = Vec::with_capacity(max_encoded_len(MAX_DATAGRAM_SIZE));
    let endpoint = sockets
        .socket
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "udp".to_string());

    while device.flag.is_connected() {
        let (len, from) = match sockets.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(ref e) if is_timeout(e) => continue,
            // Windows reports ICMP port unreachable from an earlier send here
            Err(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
            Err(e) => return Err(IoError::receive(&endpoint, e.to_string())),
        };

        encoded.clear();
        slip_encode_into(&buf[..len], &mut encoded);
        device
            .link
            .write_all(&encoded)
            .map_err(|e| IoError::write(device.link.name(), e.to_string()))?;
        stats.record_received(encoded.len());

        if verbosity >= 2 {
            tlog!(
                "[session] {} -> serial ({} bytes): {}",
                from,
                len,
                hex::encode(&buf[..len])
            );
        }
    }

    Ok(())
}

/// Periodic throughput report. Only logs when verbose, exits once the session
/// is no longer connected.
async fn run_stats(flag: ConnectionFlag, stats: Arc<BridgeStats>, config: SessionConfig) {
    let mut last = stats.snapshot();
    let mut last_at = Instant::now();

    loop {
        tokio::time::sleep(config.stats_interval).await;
        if !flag.is_connected() {
            break;
        }
        if config.verbosity == 0 {
            continue;
        }

        let now = stats.snapshot();
        let rate = now.delta(&last).per_second(last_at.elapsed());
        last = now;
        last_at = Instant::now();

        for line in now.report_lines(&rate) {
            tlog!("[stats] {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::mock::{MockBackend, MockDevice};
    use crate::io::serial::{PortDescriptor, SerialBackend};
    use std::net::UdpSocket;

    const WAIT: Duration = Duration::from_secs(3);

    struct Harness {
        session: Session,
        device: Arc<MockDevice>,
        peer: UdpSocket,
        bridge_addr: std::net::SocketAddr,
        stats: Arc<BridgeStats>,
    }

    fn start_session(stats: Arc<BridgeStats>) -> Harness {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(WAIT)).unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let sockets = Arc::new(
            SocketPair::open(
                "127.0.0.1",
                0,
                "127.0.0.1",
                peer_addr.port(),
                &[],
                Duration::from_millis(20),
            )
            .unwrap(),
        );
        let bridge_addr = sockets.local_addr().unwrap();

        let backend = MockBackend::new();
        let link = backend
            .open(&PortDescriptor::named("/dev/ttyMOCK0", "Teensyduino USB Serial"))
            .unwrap();
        let device = backend.opened().remove(0);

        let config = SessionConfig {
            stats_interval: Duration::from_millis(20),
            verbosity: 1,
        };
        let session = Session::start(link, sockets, stats.clone(), config).unwrap();

        Harness {
            session,
            device,
            peer,
            bridge_addr,
            stats,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_end_to_end_loopback() {
        let h = start_session(Arc::new(BridgeStats::new()));
        assert_eq!(h.session.state(), SessionState::Running);

        // UDP -> serial
        h.peer.send_to(&[0x01, 0x02, 0xC0, 0x03], h.bridge_addr).unwrap();
        let wire = h.device.wait_for_written(7, WAIT);
        assert_eq!(wire, vec![0xC0, 0x01, 0x02, 0xDB, 0xDC, 0x03, 0xC0]);

        // serial -> UDP
        h.device.push_inbound(&wire);
        let mut buf = [0u8; 64];
        let (n, from) = h.peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02, 0xC0, 0x03]);
        assert_eq!(from, h.bridge_addr);

        let snap = h.stats.wait_until(WAIT, |s| s.messages_sent == 1);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.bytes_received, 7);
        assert_eq!(snap.messages_sent, 1);
        assert_eq!(snap.bytes_sent, 4);

        h.session.stop();
        h.session.join().await;
        assert!(h.device.wait_closed(WAIT));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_forwarded_in_order_with_exact_counts() {
        let h = start_session(Arc::new(BridgeStats::new()));

        let payloads: [&[u8]; 3] = [b"/a", &[0xDB, 0xC0], b"/ccc"];
        let mut wire = vec![0xC0, 0xC0];
        for p in payloads {
            slip_encode_into(p, &mut wire);
            wire.push(0xC0);
        }

        // Deliver in awkward pieces to exercise decoder state across reads
        for chunk in wire.chunks(3) {
            h.device.push_inbound(chunk);
        }

        let mut buf = [0u8; 64];
        for expected in payloads {
            let (n, _) = h.peer.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], expected);
        }

        let snap = h.stats.wait_until(WAIT, |s| s.messages_sent == 3);
        assert_eq!(snap.messages_sent, 3);
        assert_eq!(snap.bytes_sent, 2 + 2 + 4);

        h.session.stop();
        h.session.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_whole_datagram_is_payload() {
        let h = start_session(Arc::new(BridgeStats::new()));

        h.peer.send_to(b"/x", h.bridge_addr).unwrap();
        let wire = h.device.wait_for_written(4, WAIT);
        assert_eq!(wire, vec![0xC0, b'/', b'x', 0xC0]);

        h.session.stop();
        h.session.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_write_failure_stops_session() {
        let h = start_session(Arc::new(BridgeStats::new()));
        h.device.fail_writes(true);

        h.peer.send_to(b"boom", h.bridge_addr).unwrap();

        assert!(h.device.wait_closed(WAIT));
        assert!(!h.session.is_connected());
        assert_eq!(h.stats.snapshot().messages_received, 0);

        h.session.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_failure_stops_session() {
        let h = start_session(Arc::new(BridgeStats::new()));
        h.device.fail_reads(true);

        assert!(h.device.wait_closed(WAIT));
        assert!(!h.session.is_connected());
        assert_ne!(h.session.state(), SessionState::Running);

        h.session.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_state_reports_stopped_once_tasks_exit() {
        let h = start_session(Arc::new(BridgeStats::new()));
        h.session.stop();

        let deadline = Instant::now() + WAIT;
        while h.session.state() != SessionState::Stopped && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert!(h.device.is_closed());

        h.session.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_session_stops_tasks() {
        let h = start_session(Arc::new(BridgeStats::new()));
        let device = h.device.clone();

        drop(h.session);

        assert!(device.wait_closed(WAIT));
    }

    #[test]
    fn test_connection_flag_clears_once() {
        let flag = ConnectionFlag::connected();
        let other = flag.clone();
        assert!(flag.is_connected());

        assert!(other.disconnect());
        assert!(!flag.disconnect());
        assert!(!flag.is_connected());
    }
}
