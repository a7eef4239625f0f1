// src/bridge/stats.rs
//
// Throughput counters shared by the pump loops and the stats reporter.
// Counters are cumulative for the life of the process, across reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::format::human_readable_bytes;

/// Cumulative bridge counters.
///
/// "Sent" is serial -> UDP (frames sent to the target address), "received" is
/// UDP -> serial (datagrams received and written to the device).
#[derive(Debug, Default)]
pub struct BridgeStats {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Self {
        BridgeStats::default()
    }

    /// Record a frame forwarded from the device to the network
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a datagram forwarded from the network to the device
    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
}

impl StatsSnapshot {
    /// Counter growth since `earlier`
    pub fn delta(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.saturating_sub(earlier.messages_sent),
            bytes_sent: self.bytes_sent.saturating_sub(earlier.bytes_sent),
            messages_received: self
                .messages_received
                .saturating_sub(earlier.messages_received),
            bytes_received: self.bytes_received.saturating_sub(earlier.bytes_received),
        }
    }

    /// Scale a delta measured over `elapsed` to a one second rate
    pub fn per_second(&self, elapsed: Duration) -> StatsSnapshot {
        let millis = elapsed.as_millis().max(1);
        let scale = |v: u64| (v as u128 * 1000 / millis).min(u64::MAX as u128) as u64;
        StatsSnapshot {
            messages_sent: scale(self.messages_sent),
            bytes_sent: scale(self.bytes_sent),
            messages_received: scale(self.messages_received),
            bytes_received: scale(self.bytes_received),
        }
    }

    /// Report lines for both directions. `rate` is the growth over the last
    /// second; totals come from `self`.
    pub fn report_lines(&self, rate: &StatsSnapshot) -> [String; 2] {
        [
            format!(
                "Sent\t{}\tmessages ({}/s, {} total)",
                self.messages_sent,
                human_readable_bytes(rate.bytes_sent, false),
                human_readable_bytes(self.bytes_sent, false)
            ),
            format!(
                "Recv\t{}\tmessages ({}/s, {} total)",
                self.messages_received,
                human_readable_bytes(rate.bytes_received, false),
                human_readable_bytes(self.bytes_received, false)
            ),
        ]
    }
}

#[cfg(test)]
impl BridgeStats {
    /// Poll until `done` holds or `timeout` passes, returning the last snapshot.
    /// Pumps record after the send completes, so a peer can see data first.
    pub(crate) fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn(&StatsSnapshot) -> bool,
    ) -> StatsSnapshot {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let snap = self.snapshot();
            if done(&snap) || std::time::Instant::now() >= deadline {
                return snap;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
