//! The `Clock` capability: a cooperative, cancellation-aware sleep seam
//! used for retry backoff (§4.3) and kept deterministic in tests by
//! replacing it with `FakeClock` (§9 "retry/backoff determinism").

use crate::errors::AppError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, ctx: &CancellationToken, dur: Duration) -> Result<(), AppError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn sleep(&self, ctx: &CancellationToken, dur: Duration) -> Result<(), AppError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(AppError::Cancelled("sleep interrupted".to_string())),
            _ = tokio::time::sleep(dur) => Ok(()),
        }
    }
}

/// Records requested sleep durations and resolves instantly, so retry
/// tests assert on `calcDelay` output without paying real wall-clock time.
#[derive(Default)]
pub struct FakeClock {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, ctx: &CancellationToken, dur: Duration) -> Result<(), AppError> {
        if ctx.is_cancelled() {
            return Err(AppError::Cancelled("sleep interrupted".to_string()));
        }
        self.sleeps.lock().unwrap().push(dur);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_clock_records_without_waiting() {
        let clock = FakeClock::new();
        let ctx = CancellationToken::new();
        clock.sleep(&ctx, Duration::from_secs(30)).await.unwrap();
        clock.sleep(&ctx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            clock.recorded(),
            vec![Duration::from_secs(30), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn cancelled_clock_errors_without_recording() {
        let clock = FakeClock::new();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = clock.sleep(&ctx, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(clock.recorded().is_empty());
    }
}
