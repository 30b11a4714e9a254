//! Injectable time source for the locator and the engine.

use async_trait::async_trait;
use std::time::Duration;

/// Suspends the current task for a given duration.
///
/// Every wait in the engine goes through this trait so that tests can run
/// without real timers.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}
