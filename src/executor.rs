use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::stats_source::ResultTable;

/// Uniform random sleep window, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterWindow {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl JitterWindow {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn sample(&self) -> Duration {
        let lo = self.min_secs.max(0.0);
        let hi = self.max_secs.max(lo);
        if hi <= lo {
            return Duration::from_secs_f64(lo);
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /// Inter-request pacing, applied by callers after each request sequence.
    pub pace: JitterWindow,
    /// Slept before every attempt, including the first.
    pub pre_attempt: JitterWindow,
    pub transient_backoff: JitterWindow,
    pub linear_backoff_step: Duration,
    /// Jitter added on top of the linear backoff.
    pub linear_backoff_jitter: JitterWindow,
}

impl RetryPolicy {
    /// Builds the policy from the configured pacing window; the pre-attempt
    /// window sits just below the pacing minimum.
    pub fn from_pacing(
        max_attempts: u32,
        attempt_timeout: Duration,
        rate_limit_min: f64,
        rate_limit_max: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            pace: JitterWindow::new(rate_limit_min, rate_limit_max),
            pre_attempt: JitterWindow::new((rate_limit_min - 0.5).max(0.0), rate_limit_min),
            transient_backoff: JitterWindow::new(1.0, 2.0),
            linear_backoff_step: Duration::from_secs(2),
            linear_backoff_jitter: JitterWindow::new(0.0, 1.0),
        }
    }

    /// Same attempt budget, no sleeping at all.
    pub fn without_delays(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout: Duration::from_secs(45),
            pace: JitterWindow::zero(),
            pre_attempt: JitterWindow::zero(),
            transient_backoff: JitterWindow::zero(),
            linear_backoff_step: Duration::ZERO,
            linear_backoff_jitter: JitterWindow::zero(),
        }
    }

    pub fn backoff_for(&self, attempt: u32, err: &FetchError) -> Duration {
        if err.is_transient() {
            self.transient_backoff.sample()
        } else {
            self.linear_backoff_step * (attempt + 1) + self.linear_backoff_jitter.sample()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_pacing(3, Duration::from_secs(45), 3.0, 5.0)
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

pub struct RequestExecutor<'a> {
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RequestExecutor<'a> {
    pub fn new(policy: RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self { policy, sleeper }
    }

    /// Runs `op` until it yields a non-empty table or the attempt budget is spent.
    /// `op` receives the per-attempt timeout.
    pub fn execute<F>(&self, label: &str, mut op: F) -> Result<ResultTable, FetchError>
    where
        F: FnMut(Duration) -> Result<Option<ResultTable>, FetchError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            debug!(label, attempt = attempt + 1, max_attempts, "request attempt");
            self.sleeper.sleep(self.policy.pre_attempt.sample());

            let err = match op(self.policy.attempt_timeout).and_then(validate_table) {
                Ok(table) => return Ok(table),
                Err(err) => err,
            };

            if attempt + 1 >= max_attempts {
                warn!(label, attempts = max_attempts, error = %err, "final attempt failed");
                return Err(FetchError::Exhausted {
                    label: label.to_string(),
                    attempts: max_attempts,
                    source: Box::new(err),
                });
            }

            let backoff = self.policy.backoff_for(attempt, &err);
            warn!(
                label,
                attempt = attempt + 1,
                error = %err,
                backoff_ms = backoff.as_millis() as u64,
                "request failed, retrying"
            );
            self.sleeper.sleep(backoff);
            attempt += 1;
        }
    }

    pub fn pace(&self) {
        self.sleeper.sleep(self.policy.pace.sample());
    }

    pub fn cool_off(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}

fn validate_table(result: Option<ResultTable>) -> Result<ResultTable, FetchError> {
    let Some(table) = result else {
        return Err(FetchError::InvalidResponse(
            "request returned no result".to_string(),
        ));
    };
    if table.is_empty() {
        return Err(FetchError::InvalidResponse(format!(
            "no rows returned in result set {}",
            table.name
        )));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use serde_json::json;

    use super::{JitterWindow, RequestExecutor, RetryPolicy, Sleeper};
    use crate::error::FetchError;
    use crate::stats_source::ResultTable;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    fn one_row_table() -> ResultTable {
        ResultTable::new("PlayerStats", &["PLAYER_ID"], vec![vec![json!(201939)]])
    }

    fn fixed_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(45),
            pace: JitterWindow::new(4.0, 4.0),
            pre_attempt: JitterWindow::new(0.25, 0.25),
            transient_backoff: JitterWindow::new(1.5, 1.5),
            linear_backoff_step: Duration::from_secs(2),
            linear_backoff_jitter: JitterWindow::zero(),
        }
    }

    #[test]
    fn first_success_sleeps_only_pre_attempt() {
        let sleeper = RecordingSleeper::default();
        let executor = RequestExecutor::new(fixed_policy(), &sleeper);
        let table = executor
            .execute("ok", |_| Ok(Some(one_row_table())))
            .expect("should succeed");
        assert_eq!(table.len(), 1);
        assert_eq!(*sleeper.slept.borrow(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn empty_and_missing_results_are_retried() {
        let sleeper = RecordingSleeper::default();
        let executor = RequestExecutor::new(fixed_policy(), &sleeper);
        let mut calls = 0;
        let table = executor
            .execute("flaky", |_| {
                calls += 1;
                match calls {
                    1 => Ok(None),
                    2 => Ok(Some(ResultTable::new("PlayerStats", &["PLAYER_ID"], vec![]))),
                    _ => Ok(Some(one_row_table())),
                }
            })
            .expect("third attempt succeeds");
        assert_eq!(calls, 3);
        assert_eq!(table.len(), 1);
        // pre, linear backoff 2s, pre, linear backoff 4s, pre
        assert_eq!(
            *sleeper.slept.borrow(),
            vec![
                Duration::from_millis(250),
                Duration::from_secs(2),
                Duration::from_millis(250),
                Duration::from_secs(4),
                Duration::from_millis(250),
            ]
        );
    }

    #[test]
    fn transient_failures_use_short_backoff() {
        let sleeper = RecordingSleeper::default();
        let executor = RequestExecutor::new(fixed_policy(), &sleeper);
        let mut calls = 0;
        executor
            .execute("timeouts", |_| {
                calls += 1;
                if calls < 3 {
                    Err(FetchError::Timeout("read timed out".to_string()))
                } else {
                    Ok(Some(one_row_table()))
                }
            })
            .expect("recovers");
        let slept = sleeper.slept.borrow();
        assert_eq!(slept[1], Duration::from_millis(1500));
        assert_eq!(slept[3], Duration::from_millis(1500));
    }

    #[test]
    fn exhausted_attempts_surface_last_error() {
        let sleeper = RecordingSleeper::default();
        let executor = RequestExecutor::new(fixed_policy(), &sleeper);
        let mut calls = 0;
        let err = executor
            .execute("down", |timeout| {
                assert_eq!(timeout, Duration::from_secs(45));
                calls += 1;
                Err(FetchError::Connection("refused".to_string()))
            })
            .expect_err("must fail");
        assert_eq!(calls, 3);
        match err {
            FetchError::Exhausted {
                label, attempts, ..
            } => {
                assert_eq!(label, "down");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // no backoff after the final attempt
        assert_eq!(sleeper.slept.borrow().len(), 5);
    }

    #[test]
    fn pace_draws_from_pacing_window() {
        let sleeper = RecordingSleeper::default();
        let executor = RequestExecutor::new(fixed_policy(), &sleeper);
        executor.pace();
        assert_eq!(*sleeper.slept.borrow(), vec![Duration::from_secs(4)]);
    }

    #[test]
    fn jitter_stays_inside_window() {
        let window = JitterWindow::new(3.0, 5.0);
        for _ in 0..200 {
            let d = window.sample().as_secs_f64();
            assert!((3.0..=5.0).contains(&d), "{d} outside window");
        }
        assert_eq!(JitterWindow::new(2.0, 1.0).sample(), Duration::from_secs(2));
    }

    #[test]
    fn pre_attempt_window_is_below_pacing_minimum() {
        let policy = RetryPolicy::from_pacing(3, Duration::from_secs(45), 3.0, 5.0);
        assert_eq!(policy.pre_attempt, JitterWindow::new(2.5, 3.0));
        let policy = RetryPolicy::from_pacing(0, Duration::from_secs(45), 0.2, 0.4);
        assert_eq!(policy.pre_attempt, JitterWindow::new(0.0, 0.2));
        assert_eq!(policy.max_attempts, 1);
    }
}
