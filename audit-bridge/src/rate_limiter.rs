use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub current: u32,
    /// How long until the window resets; zero when allowed.
    pub retry_after: Duration,
}

#[async_trait]
pub trait RateLimiterEngine: Send + Sync {
    async fn check(&self) -> RateDecision;

    /// Wait until a token is granted. Callers queue instead of being dropped.
    async fn acquire(&self) {
        loop {
            let decision = self.check().await;
            if decision.allowed {
                return;
            }
            tokio::time::sleep(decision.retry_after.max(Duration::from_millis(1))).await;
        }
    }
}

/// Fixed-window bucket: at most `limit` admissions per `window`, refilled in full
/// when the window rolls over.
#[derive(Clone)]
pub struct WindowRateLimiter {
    inner: Arc<Mutex<WindowState>>,
    limit: u32,
    window: Duration,
}

struct WindowState {
    count: u32,
    started: Instant,
}

impl WindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WindowState { count: 0, started: Instant::now() })),
            limit: limit.max(1),
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[async_trait]
impl RateLimiterEngine for WindowRateLimiter {
    async fn check(&self) -> RateDecision {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(guard.started);
        if elapsed >= self.window {
            guard.started = now;
            guard.count = 0;
        }
        if guard.count < self.limit {
            guard.count += 1;
            RateDecision { allowed: true, current: guard.count, retry_after: Duration::ZERO }
        } else {
            let retry_after = self.window.saturating_sub(now.duration_since(guard.started));
            RateDecision { allowed: false, current: guard.count, retry_after }
        }
    }
}

/// Admits everything immediately.
#[derive(Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiterEngine for Unlimited {
    async fn check(&self) -> RateDecision {
        RateDecision { allowed: true, current: 0, retry_after: Duration::ZERO }
    }
}
