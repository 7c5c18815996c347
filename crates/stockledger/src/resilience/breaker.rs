//! Circuit breaker for protecting against cascading failures.
//!
//! When the ledger store is unreachable, every operation goes through the
//! full retry-with-backoff cycle before failing. The circuit breaker detects
//! sustained failures and fails fast, periodically probing to detect
//! recovery.
//!
//! Opening is driven by the failure *ratio* over a sliding window of recent
//! call outcomes, not by a consecutive-failure streak: a streak counter
//! resets on any lucky success and never opens under a steady 50% failure
//! rate, which is exactly the load profile a degrading store produces. The
//! window only counts transient infrastructure failures — business
//! rejections are recorded as successes because the store answered.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  ratio ≥ threshold  ┌──────┐     cooldown      ┌──────────┐
//! │ Closed │ ──(min_calls met)─→ │ Open │ ────elapsed─────→ │ HalfOpen │
//! └────────┘                     └──────┘ ←──probe fails─── └──────────┘
//!      ↑                                                         │
//!      └─────────────── success_threshold met ───────────────────┘
//! ```

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::config::ConfigError;

/// Default failure ratio that opens the circuit.
pub const DEFAULT_FAILURE_RATIO: f64 = 0.5;

/// Default minimum number of recorded calls before the ratio is evaluated.
pub const DEFAULT_MIN_CALLS: usize = 10;

/// Default sliding-window size in calls.
pub const DEFAULT_WINDOW: usize = 64;

/// Default duration the circuit stays open before transitioning to half-open.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Default number of successful probe requests required to close the circuit
/// from the half-open state.
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation — all requests pass through.
    Closed,
    /// Requests are rejected immediately. The `Instant` indicates when the
    /// circuit should transition to [`HalfOpen`](CircuitState::HalfOpen).
    Open {
        /// When the circuit should transition to half-open.
        until: Instant,
    },
    /// A limited number of probe requests are allowed through to test
    /// whether the store has recovered.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open { .. } => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure ratio over the window that opens the circuit.
    failure_ratio: f64,
    /// Minimum recorded calls before the ratio is evaluated.
    min_calls: usize,
    /// Sliding-window size in calls.
    window: usize,
    /// How long the circuit stays open before transitioning to half-open.
    cooldown: Duration,
    /// Successful probes required in half-open to close the circuit.
    success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: DEFAULT_FAILURE_RATIO,
            min_calls: DEFAULT_MIN_CALLS,
            window: DEFAULT_WINDOW,
            cooldown: DEFAULT_COOLDOWN,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

#[bon::bon]
impl BreakerConfig {
    /// Creates a validated circuit breaker configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `failure_ratio` is not in `(0, 1]`
    /// - `min_calls` is zero
    /// - `window` is smaller than `min_calls`
    /// - `cooldown` is zero
    /// - `success_threshold` is zero
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_FAILURE_RATIO)] failure_ratio: f64,
        #[builder(default = DEFAULT_MIN_CALLS)] min_calls: usize,
        #[builder(default = DEFAULT_WINDOW)] window: usize,
        #[builder(default = DEFAULT_COOLDOWN)] cooldown: Duration,
        #[builder(default = DEFAULT_SUCCESS_THRESHOLD)] success_threshold: u32,
    ) -> Result<Self, ConfigError> {
        if !(failure_ratio > 0.0 && failure_ratio <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "failure_ratio",
                min: "0".into(),
                max: "1".into(),
                value: failure_ratio.to_string(),
            });
        }
        if min_calls == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "min_calls",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if window < min_calls {
            return Err(ConfigError::BelowMinimum {
                field: "window",
                min: min_calls.to_string(),
                value: window.to_string(),
            });
        }
        if cooldown.is_zero() {
            return Err(ConfigError::MustBePositive { field: "cooldown", value: "0s".into() });
        }
        if success_threshold == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "success_threshold",
                min: "1".into(),
                value: "0".into(),
            });
        }
        Ok(Self { failure_ratio, min_calls, window, cooldown, success_threshold })
    }

    /// Returns the failure ratio that opens the circuit.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        self.failure_ratio
    }

    /// Returns the minimum evaluated call count.
    #[must_use]
    pub fn min_calls(&self) -> usize {
        self.min_calls
    }

    /// Returns the sliding-window size.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Returns the open-state cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns the half-open success threshold.
    #[must_use]
    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }
}

/// Internal mutable state protected by a mutex.
#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Recent call outcomes, `true` for failure. Bounded at `config.window`.
    outcomes: VecDeque<bool>,
    half_open_successes: u32,
    config: BreakerConfig,

    state_transitions: u64,
    fast_fail_count: u64,
    recovery_attempts: u64,
}

impl Inner {
    fn record_outcome(&mut self, failed: bool) {
        if self.outcomes.len() == self.config.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(failed);
    }

    fn failure_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|failed| **failed).count();
        failures as f64 / self.outcomes.len() as f64
    }

    fn should_open(&self) -> bool {
        self.outcomes.len() >= self.config.min_calls
            && self.failure_ratio() >= self.config.failure_ratio
    }

    /// Opens the circuit if the window shows a sustained failure ratio.
    ///
    /// Evaluated after every recorded outcome, successes included: a
    /// success arriving into a mostly-failed window does not make the
    /// window healthy.
    fn open_if_unhealthy(&mut self) {
        if self.should_open() {
            let until = Instant::now() + self.config.cooldown;
            self.state = CircuitState::Open { until };
            self.state_transitions += 1;
            tracing::warn!(
                failure_ratio = self.failure_ratio(),
                recorded_calls = self.outcomes.len(),
                cooldown_secs = self.config.cooldown.as_secs(),
                "circuit breaker opened on sustained failure ratio",
            );
        }
    }
}

/// Thread-safe circuit breaker.
///
/// All state is behind a `parking_lot::Mutex` with very short critical
/// sections (no I/O under the lock). The breaker is `Clone` via `Arc`.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: std::sync::Arc<Mutex<Inner>>,
}

/// A snapshot of circuit breaker metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    /// Current circuit state.
    pub state: CircuitState,
    /// Total number of state transitions since creation.
    pub state_transitions: u64,
    /// Total number of requests rejected due to open circuit.
    pub fast_fail_count: u64,
    /// Total number of half-open probe requests.
    pub recovery_attempts: u64,
    /// Number of calls currently in the sliding window.
    pub recorded_calls: usize,
    /// Failure ratio over the current window.
    pub failure_ratio: f64,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                outcomes: VecDeque::with_capacity(config.window),
                half_open_successes: 0,
                config,
                state_transitions: 0,
                fast_fail_count: 0,
                recovery_attempts: 0,
            })),
        }
    }

    /// Checks whether the circuit allows a request through.
    ///
    /// Returns `true` if the request should proceed. Returns `false` if
    /// the circuit is open and the request should be rejected immediately.
    ///
    /// In the half-open state, requests are allowed through as probes.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    // Cooldown elapsed — transition to half-open
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.state_transitions += 1;
                    inner.recovery_attempts += 1;
                    tracing::info!(
                        previous_state = "open",
                        new_state = "half_open",
                        "circuit breaker transitioning to half-open for probe requests",
                    );
                    true
                } else {
                    inner.fast_fail_count += 1;
                    false
                }
            },
            CircuitState::HalfOpen => {
                inner.recovery_attempts += 1;
                true
            },
        }
    }

    /// Records a successful operation, potentially closing the circuit.
    ///
    /// Business rejections count here too: the store answered, so they are
    /// evidence of health, not failure.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.record_outcome(false);
                inner.open_if_unhealthy();
            },
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= inner.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.outcomes.clear();
                    inner.half_open_successes = 0;
                    inner.state_transitions += 1;
                    tracing::info!(
                        previous_state = "half_open",
                        new_state = "closed",
                        "circuit breaker closed after successful probes",
                    );
                }
            },
            CircuitState::Open { .. } => {
                // No requests are admitted while open; ignore.
            },
        }
    }

    /// Records a transient failure, potentially opening the circuit.
    ///
    /// Only transient infrastructure failures should be recorded here.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.record_outcome(true);
                inner.open_if_unhealthy();
            },
            CircuitState::HalfOpen => {
                // Probe failed — re-open the circuit
                let until = Instant::now() + inner.config.cooldown;
                inner.state = CircuitState::Open { until };
                inner.half_open_successes = 0;
                inner.outcomes.clear();
                inner.state_transitions += 1;
                tracing::warn!(
                    previous_state = "half_open",
                    new_state = "open",
                    cooldown_secs = inner.config.cooldown.as_secs(),
                    "circuit breaker re-opened after probe failure",
                );
            },
            CircuitState::Open { .. } => {},
        }
    }

    /// Returns the current state of the circuit breaker.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        // Read-only peek: an expired open circuit reports half-open without
        // transitioning.
        match inner.state {
            CircuitState::Open { until } if Instant::now() >= until => CircuitState::HalfOpen,
            other => other,
        }
    }

    /// Returns a snapshot of circuit breaker metrics.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: match inner.state {
                CircuitState::Open { until } if Instant::now() >= until => CircuitState::HalfOpen,
                other => other,
            },
            state_transitions: inner.state_transitions,
            fast_fail_count: inner.fast_fail_count,
            recovery_attempts: inner.recovery_attempts,
            recorded_calls: inner.outcomes.len(),
            failure_ratio: inner.failure_ratio(),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn breaker(min_calls: usize, cooldown: Duration, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig::builder()
                .min_calls(min_calls)
                .window(min_calls.max(DEFAULT_MIN_CALLS))
                .cooldown(cooldown)
                .success_threshold(success_threshold)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn stays_closed_below_min_calls() {
        let cb = breaker(10, Duration::from_secs(30), 2);

        // Nine straight failures: ratio is 1.0 but the sample is too small.
        for _ in 0..9 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
        assert!(!cb.allow_request());
    }

    #[test]
    fn opens_at_half_failure_ratio() {
        let cb = breaker(10, Duration::from_secs(30), 2);

        // 5 successes + 4 failures = 9/10ths of min_calls at 44% — closed.
        for _ in 0..5 {
            cb.record_success();
        }
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        // 10th call fails: ratio hits exactly 0.5.
        cb.record_failure();
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn interleaved_successes_do_not_mask_sustained_failures() {
        // A streak-based breaker would never open on strict
        // fail/success alternation; the ratio-based one opens once the
        // window shows 50%.
        let cb = breaker(10, Duration::from_secs(30), 2);

        for _ in 0..5 {
            cb.record_failure();
            cb.record_success();
        }
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn healthy_majority_keeps_circuit_closed() {
        let cb = CircuitBreaker::new(
            BreakerConfig::builder()
                .min_calls(10)
                .window(64)
                .cooldown(Duration::from_secs(30))
                .build()
                .unwrap(),
        );

        for _ in 0..30 {
            cb.record_success();
        }
        for _ in 0..10 {
            cb.record_failure();
        }
        // 10 failures in a 40-call window is 25% — below threshold.
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn window_evicts_old_outcomes() {
        let cb = CircuitBreaker::new(
            BreakerConfig::builder()
                .failure_ratio(0.75)
                .min_calls(4)
                .window(4)
                .cooldown(Duration::from_secs(30))
                .build()
                .unwrap(),
        );

        // Old failures scroll out of the 4-call window as successes arrive.
        cb.record_failure();
        cb.record_failure();
        for _ in 0..4 {
            cb.record_success();
        }
        assert_eq!(cb.metrics().failure_ratio, 0.0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn transitions_to_half_open_after_cooldown() {
        let cb = breaker(1, Duration::from_millis(10), 1);

        cb.record_failure(); // Opens circuit
        assert!(!cb.allow_request());

        std::thread::sleep(Duration::from_millis(15));

        // Next allow_request should transition to half-open
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = breaker(1, Duration::from_millis(10), 2);

        cb.record_failure(); // Open
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_request()); // Half-open

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen); // Still needs one more

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_reopens_on_failure() {
        let cb = breaker(1, Duration::from_millis(10), 2);

        cb.record_failure(); // Open
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_request()); // Half-open

        cb.record_failure(); // Probe failed — re-open
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
        assert!(!cb.allow_request());
    }

    #[test]
    fn closing_clears_the_window() {
        let cb = breaker(1, Duration::from_millis(10), 1);

        cb.record_failure(); // Open with a 100%-failure window
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_request());
        cb.record_success(); // Close

        // The pre-open failure must not count against the fresh circuit.
        assert_eq!(cb.metrics().recorded_calls, 0);
    }

    #[test]
    fn metrics_tracking() {
        let cb = breaker(2, Duration::from_millis(10), 1);

        cb.record_failure();
        cb.record_failure();

        assert!(!cb.allow_request());
        assert!(!cb.allow_request());

        let m = cb.metrics();
        assert!(matches!(m.state, CircuitState::Open { .. }));
        assert_eq!(m.state_transitions, 1); // closed → open
        assert_eq!(m.fast_fail_count, 2);
        assert_eq!(m.failure_ratio, 1.0);
    }

    #[test]
    fn full_lifecycle() {
        let cb = breaker(4, Duration::from_millis(10), 1);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        cb.record_failure();
        cb.record_failure(); // 3 of 4 = 75%
        assert!(matches!(cb.state(), CircuitState::Open { .. }));

        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_request()); // Half-open

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        // closed→open, open→half_open, half_open→closed
        assert_eq!(cb.metrics().state_transitions, 3);
    }

    #[test]
    fn config_defaults_pass_validation() {
        let config = BreakerConfig::builder().build().unwrap();
        assert_eq!(config.failure_ratio(), DEFAULT_FAILURE_RATIO);
        assert_eq!(config.min_calls(), DEFAULT_MIN_CALLS);
        assert_eq!(config.window(), DEFAULT_WINDOW);
        assert_eq!(config.cooldown(), DEFAULT_COOLDOWN);
        assert_eq!(config.success_threshold(), DEFAULT_SUCCESS_THRESHOLD);
    }

    #[rstest]
    #[case::zero_ratio("failure_ratio_zero")]
    #[case::ratio_above_one("failure_ratio_above_one")]
    #[case::zero_min_calls("min_calls")]
    #[case::window_below_min_calls("window")]
    #[case::zero_cooldown("cooldown")]
    #[case::zero_success_threshold("success_threshold")]
    fn degenerate_config_rejected(#[case] field: &str) {
        let result = match field {
            "failure_ratio_zero" => BreakerConfig::builder().failure_ratio(0.0).build(),
            "failure_ratio_above_one" => BreakerConfig::builder().failure_ratio(1.5).build(),
            "min_calls" => BreakerConfig::builder().min_calls(0).build(),
            "window" => BreakerConfig::builder().min_calls(10).window(5).build(),
            "cooldown" => BreakerConfig::builder().cooldown(Duration::ZERO).build(),
            "success_threshold" => BreakerConfig::builder().success_threshold(0).build(),
            _ => unreachable!(),
        };
        assert!(result.is_err(), "{field} should be rejected");
    }

    #[test]
    fn display_for_circuit_state() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(
            CircuitState::Open { until: Instant::now() + Duration::from_secs(1) }.to_string(),
            "open"
        );
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }
}
