//! Bounded polling with a deadline.
//!
//! Both post-start health classification and post-terminate escalation are
//! "check every N ms, give up after M checks" loops. [`BoundedPoll`] is that
//! loop, parameterised by a per-tick predicate and an on-timeout action.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Result of a single poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick<T> {
    /// Nothing decided yet; poll again.
    Continue,
    /// Done with a result.
    Finish(T),
    /// Stop polling without a result.
    Abandon,
}

/// Fixed-interval, fixed-count polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoll {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl BoundedPoll {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Total length of the window (`interval * max_attempts`).
    pub fn window(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Run the schedule.
    ///
    /// The first tick fires one `interval` after the call. `predicate` gets
    /// the 1-based attempt number. If the last attempt still returns
    /// [`Tick::Continue`], `on_timeout` runs and its output is the result.
    ///
    /// Returns `None` when cancelled or when the predicate abandons.
    /// `on_timeout` itself is not cancellable.
    pub async fn run<T, P, E, Fut>(
        self,
        cancel: &CancellationToken,
        mut predicate: P,
        on_timeout: E,
    ) -> Option<T>
    where
        P: FnMut(u32) -> Tick<T>,
        E: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for attempt in 1..=self.max_attempts.max(1) {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                _ = ticker.tick() => {}
            }

            match predicate(attempt) {
                Tick::Continue => {}
                Tick::Finish(value) => return Some(value),
                Tick::Abandon => return None,
            }
        }

        Some(on_timeout().await)
    }
}
