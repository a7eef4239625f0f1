// src/bridge/mod.rs
//
// Bridge runtime: per-device sessions, the reconnect supervisor around them,
// and the counters both share.

pub mod session;
pub mod stats;
pub mod supervisor;

pub use session::{ConnectionFlag, Session, SessionConfig, SessionState};
pub use stats::{BridgeStats, StatsSnapshot};
pub use supervisor::{Supervisor, SupervisorConfig};
