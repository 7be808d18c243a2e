//! Sliding-window rate limiting.
//!
//! Each client key owns an ordered list of recent request instants behind
//! its own lock, under an outer map lock; a check prunes entries older
//! than the window and accepts while the remainder stays below the rate.
//! The limiter is the service's only back-pressure mechanism.
//!
//! Three named tiers are applied as policy: `strict` for authentication
//! and registration, `moderate` for authenticated mutations and admin
//! calls, `generous` for anonymous reads.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Requests-per-window policy for one tier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    pub fn per_minute(max_requests: usize) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

type ClientHistory = Arc<Mutex<VecDeque<Instant>>>;

/// Sliding-window limiter for one tier.
pub struct SlidingWindowLimiter {
    limit: RateLimit,
    clients: Mutex<HashMap<String, ClientHistory>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request for `key` and reports whether it is admitted.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    /// Deterministic core of [`Self::try_acquire`]; tests inject `now`.
    pub fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let history = {
            let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(clients.entry(key.to_string()).or_default())
        };

        // The map lock is already released; only this client's history is
        // held while we prune and decide.
        let mut timestamps = history.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = now.checked_sub(self.limit.window);
        while let Some(front) = timestamps.front() {
            match cutoff {
                Some(cutoff) if *front < cutoff => {
                    timestamps.pop_front();
                }
                _ => break,
            }
        }

        if timestamps.len() < self.limit.max_requests {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Evicts keys with no activity inside the current window.
    pub fn sweep_idle(&self) {
        self.sweep_idle_at(Instant::now());
    }

    fn sweep_idle_at(&self, now: Instant) {
        let cutoff = now.checked_sub(self.limit.window);
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.retain(|_, history| {
            let timestamps = history.lock().unwrap_or_else(PoisonError::into_inner);
            match (timestamps.back(), cutoff) {
                (Some(last), Some(cutoff)) => *last > cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            }
        });
    }

    /// Number of currently tracked client keys.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }
}

/// The three named tiers, shared across handlers and the sweeper.
#[derive(Clone)]
pub struct RateTiers {
    pub strict: Arc<SlidingWindowLimiter>,
    pub moderate: Arc<SlidingWindowLimiter>,
    pub generous: Arc<SlidingWindowLimiter>,
}

impl RateTiers {
    pub fn new(strict: RateLimit, moderate: RateLimit, generous: RateLimit) -> Self {
        Self {
            strict: Arc::new(SlidingWindowLimiter::new(strict)),
            moderate: Arc::new(SlidingWindowLimiter::new(moderate)),
            generous: Arc::new(SlidingWindowLimiter::new(generous)),
        }
    }
}

impl Default for RateTiers {
    fn default() -> Self {
        Self::new(
            RateLimit::per_minute(5),
            RateLimit::per_minute(30),
            RateLimit::per_minute(100),
        )
    }
}

/// Spawns the background sweeper that evicts idle client keys from every
/// tier until the shutdown signal flips.
pub fn spawn_sweeper(
    tiers: RateTiers,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tiers.strict.sweep_idle();
                    tiers.moderate.sweep_idle();
                    tiers.generous.sweep_idle();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("rate-limit sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, window_secs: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimit {
            max_requests: max,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn burst_is_capped_at_the_rate() {
        let limiter = limiter(5, 60);
        let now = Instant::now();

        let admitted = (0..10)
            .filter(|_| limiter.try_acquire_at("10.0.0.1", now))
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn window_expiry_readmits_clients() {
        let limiter = limiter(2, 60);
        let start = Instant::now();

        assert!(limiter.try_acquire_at("c", start));
        assert!(limiter.try_acquire_at("c", start + Duration::from_secs(1)));
        assert!(!limiter.try_acquire_at("c", start + Duration::from_secs(30)));

        // The first request has left the window; one slot frees up.
        assert!(limiter.try_acquire_at("c", start + Duration::from_secs(61)));
        assert!(!limiter.try_acquire_at("c", start + Duration::from_secs(61)));
    }

    #[test]
    fn keys_are_limited_independently() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.try_acquire_at("a", now));
        assert!(limiter.try_acquire_at("b", now));
        assert!(!limiter.try_acquire_at("a", now));
    }

    #[test]
    fn sweeper_evicts_idle_keys_only() {
        let limiter = limiter(5, 60);
        let start = Instant::now();

        limiter.try_acquire_at("old", start);
        limiter.try_acquire_at("fresh", start + Duration::from_secs(50));
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.sweep_idle_at(start + Duration::from_secs(70));
        assert_eq!(limiter.tracked_clients(), 1);
        // "fresh" keeps its history: still one slot consumed.
        assert!(limiter.try_acquire_at("fresh", start + Duration::from_secs(71)));
    }

    #[test]
    fn default_tiers_match_policy() {
        let tiers = RateTiers::default();
        assert_eq!(tiers.strict.limit().max_requests, 5);
        assert_eq!(tiers.moderate.limit().max_requests, 30);
        assert_eq!(tiers.generous.limit().max_requests, 100);
        assert_eq!(tiers.strict.limit().window, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn sweeper_task_stops_on_shutdown() {
        let tiers = RateTiers::default();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(tiers, Duration::from_millis(10), rx);

        tx.send(true).expect("receiver is alive");
        handle.await.expect("sweeper should stop cleanly");
    }
}
