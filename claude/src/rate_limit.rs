//! Sliding-window request and token budget.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Default requests allowed per minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 50;

/// Default tokens allowed per minute (input plus output).
pub const DEFAULT_TOKENS_PER_MINUTE: usize = 40_000;

#[derive(Debug)]
struct Entry {
    id: u64,
    at: Instant,
    tokens: usize,
}

#[derive(Debug, Default)]
struct Window {
    entries: VecDeque<Entry>,
    next_id: u64,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.at) >= WINDOW {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn tokens_used(&self) -> usize {
        self.entries.iter().map(|e| e.tokens).sum()
    }
}

/// A slot reserved by [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    id: u64,
}

/// Limits requests and tokens over a rolling one-minute window.
///
/// Callers reserve an estimated token count before sending and correct it
/// with the real usage once the response arrives.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: usize,
    tokens_per_minute: usize,
    window: Mutex<Window>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_TOKENS_PER_MINUTE)
    }
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize, tokens_per_minute: usize) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            tokens_per_minute: tokens_per_minute.max(1),
            window: Mutex::new(Window::default()),
        }
    }

    /// Wait until a request of `estimated_tokens` fits in the window.
    pub async fn acquire(&self, estimated_tokens: usize) -> Reservation {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                window.prune(now);

                let under_requests = window.entries.len() < self.requests_per_minute;
                // An oversized request still goes through once the window is empty.
                let under_tokens = window.entries.is_empty()
                    || window.tokens_used() + estimated_tokens <= self.tokens_per_minute;

                if under_requests && under_tokens {
                    let id = window.next_id;
                    window.next_id += 1;
                    window.entries.push_back(Entry {
                        id,
                        at: now,
                        tokens: estimated_tokens,
                    });
                    return Reservation { id };
                }

                match window.entries.front() {
                    Some(oldest) => (oldest.at + WINDOW).saturating_duration_since(now),
                    None => Duration::from_millis(10),
                }
            };
            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }

    /// Replace a reservation's estimate with the tokens actually used.
    pub async fn record(&self, reservation: Reservation, actual_tokens: usize) {
        let mut window = self.window.lock().await;
        if let Some(entry) = window.entries.iter_mut().find(|e| e.id == reservation.id) {
            entry.tokens = actual_tokens;
        }
    }

    /// Requests currently counted against the window.
    pub async fn in_window(&self) -> usize {
        let mut window = self.window.lock().await;
        window.prune(Instant::now());
        window.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_requests_under_limit_do_not_wait() {
        let limiter = RateLimiter::new(3, 10_000);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(100).await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_limit_waits_for_window() {
        let limiter = RateLimiter::new(2, 10_000);
        let start = Instant::now();
        limiter.acquire(10).await;
        limiter.acquire(10).await;
        limiter.acquire(10).await;
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_limit_uses_recorded_usage() {
        let limiter = RateLimiter::new(10, 1_000);
        let start = Instant::now();
        let first = limiter.acquire(900).await;
        // Actual usage was much smaller than the estimate.
        limiter.record(first, 100).await;
        limiter.acquire(800).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_request_allowed_on_empty_window() {
        let limiter = RateLimiter::new(10, 100);
        let start = Instant::now();
        limiter.acquire(5_000).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
