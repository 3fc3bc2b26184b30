use std::time::{Duration, Instant};

use rand::Rng;

const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
const DEFAULT_MULTIPLIER: f64 = 1.5;
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(60_000);
const DEFAULT_MAX_ELAPSED: Duration = Duration::from_millis(900_000);

/// Outcome of a single delay computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffDelay {
    /// Sleep for this long before the next attempt.
    Wait(Duration),
    /// The strategy's elapsed-time budget ran out; stop retrying.
    Exhausted,
}

/// Delay-growth policy, decoupled from the executor so callers can swap in
/// their own jitter/backoff behavior.
///
/// Implementations are stateful across one call lifecycle and are NOT safe
/// for concurrent use: either give each in-flight call its own instance (the
/// executor does this through [`BackoffSource`]) or synchronize externally.
pub trait BackoffStrategy: Send {
    /// Computes the delay before the next attempt and advances the strategy's
    /// internal state.
    fn next_delay(&mut self) -> BackoffDelay;

    /// Restores the initial interval and restarts the elapsed-time clock.
    fn reset(&mut self);
}

/// Produces a fresh [`BackoffStrategy`] for each call sequence.
pub trait BackoffSource: Send + Sync {
    fn backoff_for_call(&self) -> Box<dyn BackoffStrategy>;
}

impl<F> BackoffSource for F
where
    F: Fn() -> Box<dyn BackoffStrategy> + Send + Sync,
{
    fn backoff_for_call(&self) -> Box<dyn BackoffStrategy> {
        self()
    }
}

/// Exponential backoff with jitter.
///
/// Each delay is sampled uniformly (inclusive of both ends) from
/// `[current * (1 - r), current * (1 + r)]`, after which the current interval
/// grows by the multiplier up to the max interval. Once the elapsed time
/// since construction or the last [`reset`](BackoffStrategy::reset) exceeds
/// the max elapsed budget, [`BackoffDelay::Exhausted`] is returned.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    randomization_factor: f64,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    current_interval: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    pub fn standard() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: DEFAULT_MAX_INTERVAL,
            max_elapsed: DEFAULT_MAX_ELAPSED,
            current_interval: DEFAULT_INITIAL_INTERVAL,
            started_at: Instant::now(),
        }
    }

    pub fn initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval.max(Duration::from_millis(1));
        self.current_interval = self.initial_interval;
        self
    }

    /// Randomization factor r in `[0, 1)`; values outside are clamped.
    pub fn randomization_factor(mut self, randomization_factor: f64) -> Self {
        self.randomization_factor = randomization_factor.clamp(0.0, 1.0 - f64::EPSILON);
        self
    }

    /// Interval growth multiplier, at least 1.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            DEFAULT_MULTIPLIER
        };
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval.max(Duration::from_millis(1));
        self
    }

    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    fn sample_jittered(&self, base: Duration) -> Duration {
        if self.randomization_factor <= f64::EPSILON {
            return base;
        }

        let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
        let span = (base_ms as f64 * self.randomization_factor).round() as u64;
        let low = base_ms.saturating_sub(span);
        let high = base_ms.saturating_add(span).max(low);
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(low..=high))
    }

    fn advance_interval(&mut self) {
        // Compare against max/multiplier first so the multiplication cannot
        // overflow past the cap.
        let cap_threshold = self.max_interval.as_secs_f64() / self.multiplier;
        if self.current_interval.as_secs_f64() >= cap_threshold {
            self.current_interval = self.max_interval;
        } else {
            self.current_interval = self.current_interval.mul_f64(self.multiplier);
        }
    }

    #[cfg(test)]
    pub(crate) fn current_interval_for_tests(&self) -> Duration {
        self.current_interval
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::standard()
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> BackoffDelay {
        if self.started_at.elapsed() > self.max_elapsed {
            return BackoffDelay::Exhausted;
        }

        let delay = self.sample_jittered(self.current_interval);
        self.advance_interval();
        BackoffDelay::Wait(delay)
    }

    fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.started_at = Instant::now();
    }
}
