//! Request pacing for the private API.
//!
//! Token bucket with a single slot: one request per refill interval.
//! The platform reports its own allowance back in `x-rate-limit-*` response
//! headers; when it does, the declared reset time overrides the default
//! cadence in either direction.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_millis(1500);

const LIMIT_HEADER: &str = "x-rate-limit-limit";
const RESET_HEADER: &str = "x-rate-limit-reset";

/// One-slot token bucket. `acquire` suspends until the next slot opens and
/// is cancelled by dropping the future; state mutation happens before the
/// suspend, so a cancelled waiter forfeits its slot rather than corrupting
/// the schedule.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

struct LimiterState {
    interval: Duration,
    next_ready: Instant,
    server_limit: i64,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                interval,
                next_ready: Instant::now(),
                server_limit: 0,
            }),
        }
    }

    /// True when a request could go out without waiting.
    pub fn ready(&self) -> bool {
        self.state.lock().next_ready <= Instant::now()
    }

    /// Last limit the server declared, 0 before any header was seen.
    pub fn server_limit(&self) -> i64 {
        self.state.lock().server_limit
    }

    /// Wait for the next request slot.
    pub async fn acquire(&self) {
        let deadline = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let deadline = state.next_ready.max(now);
            state.next_ready = deadline + state.interval;
            deadline
        };
        tokio::time::sleep_until(deadline).await;
    }

    /// Override the schedule with a server-declared reset. A reset in the
    /// past opens the next slot immediately.
    pub fn reset_at(&self, reset_unix: i64, limit: i64) {
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut state = self.state.lock();
        state.server_limit = limit;
        state.next_ready = if reset_unix > now_unix {
            Instant::now() + Duration::from_secs((reset_unix - now_unix) as u64)
        } else {
            Instant::now()
        };
    }

    /// Feed response headers back into the limiter.
    pub fn observe(&self, headers: &HeaderMap) {
        let parse = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
        };

        if let Some(reset) = parse(RESET_HEADER) {
            let limit = parse(LIMIT_HEADER).unwrap_or(0);
            debug!(reset, limit, "rate limit headers observed");
            self.reset_at(reset, limit);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REFILL_INTERVAL)
    }
}
