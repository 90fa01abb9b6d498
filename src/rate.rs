use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Fixed-interval pacing for one publish loop.
pub struct RateController {
    interval: Duration,
    last_send: Option<Instant>,
}

impl RateController {
    /// Create a controller that spaces sends `interval` apart
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_send: None,
        }
    }

    /// Wait until it's time to send the next message. The first call returns immediately.
    pub async fn wait_for_next(&mut self) {
        if let Some(last) = self.last_send {
            let due = last + self.interval;
            if Instant::now() < due {
                sleep_until(due).await;
            }
        }
        self.last_send = Some(Instant::now());
    }

    /// How many messages make up roughly thirty seconds of traffic; used to space progress logs.
    pub fn messages_per_progress_log(&self) -> u64 {
        let ms = self.interval.as_millis().max(1) as u64;
        (30_000 / ms).max(1)
    }
}
