//! Retry and backoff policies.
//!
//! Two policies with deliberately different shapes live here:
//!
//! - [`BackoffState`] drives the daemon poll cadence. Polling an in-memory job
//!   is cheap, so the interval ramps quickly (doubling up to a cap) to avoid
//!   hammering the daemon.
//! - [`ReconnectPolicy`] governs shell reconnects. Connection attempts are
//!   expensive, so they are bounded in count and spaced by a fixed delay.
//!
//! [`TimingProfile`] applies the "generous timing" multiplier uniformly to
//! both.

use std::time::Duration;

/// Default first poll interval.
pub const DEFAULT_POLL_INITIAL: Duration = Duration::from_secs(1);

/// Default poll interval cap.
pub const DEFAULT_POLL_MAX: Duration = Duration::from_secs(16);

/// Default number of consecutive poll socket errors that are swallowed.
pub const DEFAULT_POLL_ERROR_ALLOWANCE: u32 = 2;

/// Growth factor applied to the poll interval.
pub const POLL_GROWTH: u32 = 2;

/// Computes the interval following `interval`: `min(interval * growth, cap)`.
#[must_use]
pub fn next_interval(interval: Duration, growth: u32, cap: Duration) -> Duration {
    interval.saturating_mul(growth).min(cap)
}

/// Poll interval state for a single job.
///
/// The interval is monotonically non-decreasing across calls to
/// [`BackoffState::advance`] and only returns to the minimum through
/// [`BackoffState::reset`], which the job client never calls mid-job: a new
/// job receives a fresh state instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BackoffState {
    current: Duration,
    minimum: Duration,
    maximum: Duration,
    multiplier: u32,
}

impl BackoffState {
    /// Creates a doubling backoff starting at `minimum` and capped at
    /// `maximum`. A cap below the minimum is raised to the minimum.
    #[must_use]
    pub fn new(minimum: Duration, maximum: Duration) -> Self {
        Self {
            current: minimum,
            minimum,
            maximum: maximum.max(minimum),
            multiplier: POLL_GROWTH,
        }
    }

    /// Interval that the next call to [`BackoffState::advance`] returns.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Lower bound the state resets to.
    #[must_use]
    pub const fn minimum(&self) -> Duration {
        self.minimum
    }

    /// Upper bound of the interval.
    #[must_use]
    pub const fn maximum(&self) -> Duration {
        self.maximum
    }

    /// Returns the interval to wait now and widens the state for next time.
    pub fn advance(&mut self) -> Duration {
        let interval = self.current;
        self.current = next_interval(self.current, self.multiplier, self.maximum);
        interval
    }

    /// Returns the interval to the minimum.
    pub const fn reset(&mut self) {
        self.current = self.minimum;
    }
}

/// Uniform scaling applied when the "generous timing" mode is enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimingProfile {
    multiplier: u32,
}

impl TimingProfile {
    /// Unscaled timings.
    pub const STANDARD: Self = Self { multiplier: 1 };

    /// Scales durations and allowances by `multiplier` (minimum 1).
    #[must_use]
    pub fn generous(multiplier: u32) -> Self {
        Self {
            multiplier: multiplier.max(1),
        }
    }

    /// Multiplier in effect.
    #[must_use]
    pub const fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Scales a delay.
    #[must_use]
    pub const fn scale(&self, duration: Duration) -> Duration {
        duration.saturating_mul(self.multiplier)
    }

    /// Scales a count such as an error allowance.
    #[must_use]
    pub const fn scale_count(&self, count: u32) -> u32 {
        count.saturating_mul(self.multiplier)
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Poll cadence and error tolerance for daemon jobs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// First interval between polls.
    pub initial: Duration,
    /// Interval cap.
    pub maximum: Duration,
    /// Consecutive poll socket errors swallowed before the poll fails.
    pub error_allowance: u32,
}

impl PollPolicy {
    /// Applies a timing profile to every field.
    #[must_use]
    pub const fn scaled(self, timing: TimingProfile) -> Self {
        Self {
            initial: timing.scale(self.initial),
            maximum: timing.scale(self.maximum),
            error_allowance: timing.scale_count(self.error_allowance),
        }
    }

    /// Fresh backoff state for a new job.
    #[must_use]
    pub fn backoff(&self) -> BackoffState {
        BackoffState::new(self.initial, self.maximum)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_POLL_INITIAL,
            maximum: DEFAULT_POLL_MAX,
            error_allowance: DEFAULT_POLL_ERROR_ALLOWANCE,
        }
    }
}

/// Fixed-delay, bounded-count reconnect policy for shell sessions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy allowing `attempts` connection attempts (minimum 1)
    /// separated by `delay`.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Total connection attempts allowed.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Fixed delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), or
    /// `None` when the attempt budget is exhausted.
    #[must_use]
    pub const fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.attempts {
            Some(self.delay)
        } else {
            None
        }
    }

    /// Applies a timing profile to the delay; the attempt count is unchanged.
    #[must_use]
    pub const fn scaled(self, timing: TimingProfile) -> Self {
        Self {
            attempts: self.attempts,
            delay: timing.scale(self.delay),
        }
    }
}
