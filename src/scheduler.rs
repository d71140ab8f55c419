use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Single-deadline timer driving automatic rotation.
///
/// At most one advance is ever pending; re-arming replaces the deadline.
#[derive(Debug)]
pub struct RotationScheduler {
    interval: Duration,
    deadline: Option<Instant>,
    running: bool,
    paused: bool,
}

impl RotationScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            running: false,
            paused: false,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn next_fire(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn start(&mut self) {
        self.running = true;
        self.paused = false;
        self.reset();
    }

    /// Drops any pending advance and schedules one a full interval from now.
    pub fn reset(&mut self) {
        self.deadline = if self.running && !self.paused {
            Some(Instant::now() + self.interval)
        } else {
            None
        };
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.deadline = None;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.reset();
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.deadline = None;
    }

    /// Resolves when the pending deadline passes and disarms it. Never
    /// resolves while nothing is pending. Dropping the future before it
    /// resolves leaves the deadline in place.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
