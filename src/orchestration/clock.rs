//! Injectable time source for everything that waits on a deadline.

use crate::domain::TimeMs;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> TimeMs;

    /// Resolve once `now() >= deadline`. Never resolves early.
    async fn sleep_until(&self, deadline: TimeMs);
}

/// Wall clock backed by `chrono` and `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> TimeMs {
        TimeMs::now()
    }

    async fn sleep_until(&self, deadline: TimeMs) {
        // tokio sleeps on the monotonic clock; re-check the wall clock in case it lagged.
        loop {
            let remaining = self.now().until(deadline);
            if remaining.is_zero() {
                return;
            }
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Clock that only moves when told to. Sleepers wake as soon as an advance reaches their
/// deadline.
#[derive(Debug)]
pub struct ManualClock {
    now: watch::Sender<TimeMs>,
}

impl ManualClock {
    pub fn new(start: TimeMs) -> Self {
        let (now, _) = watch::channel(start);
        Self { now }
    }

    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|now| *now = now.plus(by));
    }

    /// Jump to `to`. Moving backwards is ignored.
    pub fn set(&self, to: TimeMs) {
        self.now.send_if_modified(|now| {
            if to > *now {
                *now = to;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> TimeMs {
        *self.now.borrow()
    }

    async fn sleep_until(&self, deadline: TimeMs) {
        let mut rx = self.now.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|now| *now >= deadline).await;
    }
}
