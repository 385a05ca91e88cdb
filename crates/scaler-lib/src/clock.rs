//! Time source and shutdown signal
//!
//! Both the drain wait and the reconciliation loop read time and sleep
//! through [`Clock`] so tests can simulate elapsed time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Time elapsed from `earlier` to `now`; zero if `earlier` lies in the future
pub fn elapsed_since(earlier: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Shutdown signal that stays raised once observed
pub struct Shutdown {
    rx: broadcast::Receiver<()>,
    fired: bool,
}

impl Shutdown {
    pub fn new(rx: broadcast::Receiver<()>) -> Self {
        Self { rx, fired: false }
    }

    /// Non-blocking check. A closed sender counts as a shutdown request.
    pub fn is_requested(&mut self) -> bool {
        if !self.fired {
            self.fired = !matches!(self.rx.try_recv(), Err(TryRecvError::Empty));
        }
        self.fired
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&mut self) {
        if self.fired {
            return;
        }
        let _ = self.rx.recv().await;
        self.fired = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_elapsed_since() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 30).unwrap();
        assert_eq!(elapsed_since(earlier, now), Duration::from_secs(86_430));
    }

    #[test]
    fn test_elapsed_since_future_is_zero() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(elapsed_since(later, now), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_shutdown_is_sticky() {
        let (tx, rx) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(rx);
        assert!(!shutdown.is_requested());

        tx.send(()).unwrap();
        assert!(shutdown.is_requested());
        assert!(shutdown.is_requested());
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_on_closed_sender() {
        let (tx, rx) = broadcast::channel::<()>(1);
        let mut shutdown = Shutdown::new(rx);
        drop(tx);
        assert!(shutdown.is_requested());
    }
}
