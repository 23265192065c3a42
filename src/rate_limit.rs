use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Requests allowed per user in one window
pub const DEFAULT_QUOTA: usize = 5;

/// Length of the trailing window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request counter keyed by user id
///
/// Only accepted requests are recorded, so a rejected caller does not push its own
/// window further out. Entries are pruned lazily on each check, and users whose
/// newest request has left the window are swept at most once per window. State
/// lives only in process memory.
#[derive(Debug)]
pub struct RateLimiter {
    quota: usize,
    window: Duration,
    state: Mutex<Windows>,
}

#[derive(Debug, Default)]
struct Windows {
    requests: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl Windows {
    fn sweep(&mut self, now: Instant, window: Duration) {
        if self
            .last_sweep
            .is_some_and(|last| now.saturating_duration_since(last) < window)
        {
            return;
        }
        self.requests.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|t| now.saturating_duration_since(*t) < window)
        });
        self.last_sweep = Some(now);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(quota: usize, window: Duration) -> Self {
        Self {
            quota,
            window,
            state: Mutex::new(Windows::default()),
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check and record a request made now
    pub fn allow(&self, user_id: &str) -> bool {
        self.allow_at(user_id, Instant::now())
    }

    /// Check and record a request made at `now`
    ///
    /// # Arguments
    /// * `user_id` - Caller the quota is charged to
    /// * `now` - Instant of the request; callers pass non-decreasing values
    ///
    /// # Returns
    /// * `bool` - True if the request fits in the caller's window
    pub fn allow_at(&self, user_id: &str, now: Instant) -> bool {
        let mut state = self.lock();
        state.sweep(now, self.window);

        let requests = &mut state.requests;
        let timestamps = requests.entry(user_id.to_string()).or_default();
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let allowed = timestamps.len() < self.quota;
        if allowed {
            timestamps.push_back(now);
        } else {
            log::warn!("Rate limit reached for user {}", user_id);
        }

        if timestamps.is_empty() {
            requests.remove(user_id);
        }

        allowed
    }

    /// Requests still counted against `user_id` at `now`
    pub fn in_window(&self, user_id: &str, now: Instant) -> usize {
        self.lock().requests.get(user_id).map_or(0, |timestamps| {
            timestamps
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < self.window)
                .count()
        })
    }

    /// Number of users with an entry in the limiter
    pub fn tracked_users(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
