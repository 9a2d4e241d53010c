//! Relay tuning knobs.

use std::time::Duration;

/// Maximum time to wait for any inbound frame (including Pong) before the
/// connection is considered dead.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(10);

/// Interval between liveness probes. Kept below [`DEFAULT_PONG_WAIT`] so a
/// healthy peer always answers before the read deadline.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(9);

/// Capacity of the coordinator's event queue.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Capacity of each connection's outbound delivery queue.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Largest inbound payload accepted from a client (2 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 2 * 1024 * 1024;

/// Relay configuration shared by the coordinator and connection supervisors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Bounded capacity of the coordinator's event queue
    pub event_queue_capacity: usize,
    /// Bounded capacity of each connection's outbound queue
    pub outbound_queue_capacity: usize,
    /// Interval between heartbeat probes (should be < `pong_wait`)
    pub heartbeat_interval: Duration,
    /// Read deadline; reset by every inbound frame
    pub pong_wait: Duration,
    /// Largest inbound payload accepted
    pub max_payload_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_wait: DEFAULT_PONG_WAIT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl RelayConfig {
    /// Derive the heartbeat interval from a read deadline (nine tenths of it).
    #[must_use]
    pub fn with_pong_wait(mut self, pong_wait: Duration) -> Self {
        self.pong_wait = pong_wait;
        self.heartbeat_interval = pong_wait * 9 / 10;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_heartbeat_fires_before_read_deadline() {
        let config = RelayConfig::default();
        assert!(config.heartbeat_interval < config.pong_wait);
    }

    #[test]
    fn pong_wait_drives_heartbeat_interval() {
        let config = RelayConfig::default().with_pong_wait(Duration::from_secs(20));
        assert_eq!(config.pong_wait, Duration::from_secs(20));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(18));
    }
}
