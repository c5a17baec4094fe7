//! Supervisor timing and buffer configuration.

use std::time::Duration;

use crate::poll::BoundedPoll;

/// Default health check cadence after start.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(500);
/// Default number of health checks before a process counts as stable.
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 6;
/// Default exit check cadence after terminate.
pub const DEFAULT_GRACE_INTERVAL: Duration = Duration::from_millis(200);
/// Default number of exit checks before the process is killed.
pub const DEFAULT_GRACE_ATTEMPTS: u32 = 25;
/// Delay between a forced kill and reporting the outcome.
pub const DEFAULT_KILL_SETTLE: Duration = Duration::from_millis(500);
/// How long the relay waits for a line before re-checking for exit.
pub const DEFAULT_RELAY_POLL: Duration = Duration::from_millis(100);
/// Upper bound on draining output after the process exited.
pub const DEFAULT_RELAY_DRAIN: Duration = Duration::from_secs(1);
/// Upper bound on joining the relay task when a run completes.
pub const DEFAULT_RELAY_JOIN: Duration = Duration::from_secs(1);
/// Maximum number of output lines kept for `recent_output`.
pub const DEFAULT_OUTPUT_LOG_CAPACITY: usize = 5000;
/// Broadcast channel capacity for supervisor events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Supervisor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Observation window after start.
    pub health: BoundedPoll,
    /// Grace window after terminate.
    pub grace: BoundedPoll,
    pub kill_settle: Duration,
    pub relay_poll: Duration,
    pub relay_drain: Duration,
    pub relay_join: Duration,
    pub output_log_capacity: usize,
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health: BoundedPoll::new(DEFAULT_HEALTH_INTERVAL, DEFAULT_HEALTH_ATTEMPTS),
            grace: BoundedPoll::new(DEFAULT_GRACE_INTERVAL, DEFAULT_GRACE_ATTEMPTS),
            kill_settle: DEFAULT_KILL_SETTLE,
            relay_poll: DEFAULT_RELAY_POLL,
            relay_drain: DEFAULT_RELAY_DRAIN,
            relay_join: DEFAULT_RELAY_JOIN,
            output_log_capacity: DEFAULT_OUTPUT_LOG_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SupervisorConfig {
    #[must_use]
    pub const fn with_health(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.health = BoundedPoll::new(interval, max_attempts);
        self
    }

    #[must_use]
    pub const fn with_grace(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.grace = BoundedPoll::new(interval, max_attempts);
        self
    }

    #[must_use]
    pub const fn with_kill_settle(mut self, kill_settle: Duration) -> Self {
        self.kill_settle = kill_settle;
        self
    }

    #[must_use]
    pub const fn with_relay_poll(mut self, relay_poll: Duration) -> Self {
        self.relay_poll = relay_poll;
        self
    }

    #[must_use]
    pub const fn with_relay_drain(mut self, relay_drain: Duration) -> Self {
        self.relay_drain = relay_drain;
        self
    }

    #[must_use]
    pub const fn with_relay_join(mut self, relay_join: Duration) -> Self {
        self.relay_join = relay_join;
        self
    }

    /// Zero is treated as one.
    #[must_use]
    pub const fn with_output_log_capacity(mut self, capacity: usize) -> Self {
        self.output_log_capacity = capacity;
        self
    }

    /// Zero is treated as one.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let config = SupervisorConfig::default();
        assert_eq!(config.health.window(), Duration::from_secs(3));
        assert_eq!(config.grace.window(), Duration::from_secs(5));
        assert_eq!(config.kill_settle, Duration::from_millis(500));
        assert_eq!(config.output_log_capacity, 5000);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SupervisorConfig::default()
            .with_health(Duration::from_millis(10), 2)
            .with_grace(Duration::from_millis(20), 3)
            .with_relay_poll(Duration::from_millis(5));
        assert_eq!(config.health.max_attempts, 2);
        assert_eq!(config.grace.window(), Duration::from_millis(60));
        assert_eq!(config.relay_poll, Duration::from_millis(5));
        assert_eq!(config.relay_join, DEFAULT_RELAY_JOIN);
    }
}
