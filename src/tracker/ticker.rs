use std::time::Duration;

use tokio::time::Instant;

use crate::utils::clock::Clock;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Cancellable repeating timer. Deadlines are advanced by the period instead of being measured
/// from the moment a tick was handled, so slow ticks don't make the tracker drift.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    /// Starts ticking one period after `now`. Does nothing if already armed.
    pub fn arm(&mut self, now: Instant) {
        if self.next.is_none() {
            self.next = Some(now + self.period);
        }
    }

    pub fn disarm(&mut self) {
        self.next = None;
    }

    /// Resolves on the next deadline. A disarmed ticker never resolves. Cancel-safe: the deadline
    /// only moves once it was reached.
    pub async fn wait(&mut self, clock: &dyn Clock) {
        let Some(next) = self.next else {
            return std::future::pending().await;
        };
        clock.sleep_until(next).await;
        self.next = Some(next + self.period);
    }
}
