use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Per-origin connection limiter over a sliding window: at most
/// `max_attempts` connection attempts per source within `window`.
pub struct ConnectionRateLimiter {
    attempts: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
    window: Duration,
    max_attempts: usize,
}

impl ConnectionRateLimiter {
    pub fn new(window: Duration, max_attempts: usize) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            window,
            max_attempts,
        }
    }

    /// Record a connection attempt. Returns `true` if it is allowed.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().await;
        let window = attempts.entry(ip).or_default();

        while let Some(&oldest) = window.front()
            && now.duration_since(oldest) >= self.window
        {
            window.pop_front();
        }

        if window.len() >= self.max_attempts {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop origins whose entire window has aged out.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut attempts = self.attempts.lock().await;
        attempts.retain(|_, window| {
            window
                .back()
                .is_some_and(|&last| now.duration_since(last) < self.window)
        });
    }
}

/// Per-connection message limiter (token bucket), applied inside the
/// gateway read loop.
pub struct MessageRateLimiter {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate: f64,
}

impl MessageRateLimiter {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns `true` if the message is allowed; `false` if rate-limited.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_attempts_within_threshold() {
        let limiter = ConnectionRateLimiter::new(Duration::from_secs(60), 10);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check(ip).await);
        }
        assert!(!limiter.check(ip).await);
    }

    #[tokio::test]
    async fn separate_windows_per_origin() {
        let limiter = ConnectionRateLimiter::new(Duration::from_secs(60), 1);
        let ip1: IpAddr = "10.0.0.1".parse().unwrap();
        let ip2: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(ip1).await);
        assert!(!limiter.check(ip1).await);
        assert!(limiter.check(ip2).await);
    }

    #[tokio::test]
    async fn window_slides() {
        let limiter = ConnectionRateLimiter::new(Duration::from_millis(30), 2);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).await);
        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.check(ip).await, "old attempts should age out");
    }

    #[tokio::test]
    async fn cleanup_drops_stale_origins() {
        let limiter = ConnectionRateLimiter::new(Duration::from_millis(10), 5);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        limiter.check(ip).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.cleanup().await;
        assert!(limiter.attempts.lock().await.is_empty());
    }

    #[test]
    fn message_bucket_drains_and_refills() {
        let mut limiter = MessageRateLimiter::new(2.0, 0.0);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }
}
