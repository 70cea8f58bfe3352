//! Bounded polling with exponential backoff, a deadline and cancellation.

use crate::core::domain::error::ValidationError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Delay and deadline settings of one polling loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for the growing delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after every wait.
    pub multiplier: f64,
    /// Overall budget of the loop, measured from the first attempt.
    pub deadline: Duration,
}

impl PollPolicy {
    /// Guest agents usually answer within a minute or two of boot.
    pub fn guest_agent() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            deadline: Duration::from_secs(300),
        }
    }

    /// Full clones copy whole disks and can take several minutes.
    pub fn clone_task() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 1.5,
            deadline: Duration::from_secs(900),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_delay.is_zero() {
            return Err(ValidationError::Field {
                field: "initial_delay".to_string(),
                message: "Poll delay must be positive".to_string(),
            });
        }
        if self.max_delay < self.initial_delay {
            return Err(ValidationError::Field {
                field: "max_delay".to_string(),
                message: "Maximum delay cannot be below the initial delay".to_string(),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ValidationError::Field {
                field: "multiplier".to_string(),
                message: "Backoff multiplier must be a finite number of at least 1".to_string(),
            });
        }
        if self.deadline.is_zero() {
            return Err(ValidationError::Field {
                field: "deadline".to_string(),
                message: "Poll deadline must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Why a [`Poller`] refused another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollStop {
    Cancelled,
    DeadlineExceeded,
}

/// State of one polling loop.
///
/// Call [`Poller::ready`] at the top of every iteration: the first call returns
/// at once, later calls sleep for the current backoff delay.
pub(crate) struct Poller {
    policy: PollPolicy,
    cancel: CancellationToken,
    started: Instant,
    delay: Duration,
    attempts: u32,
}

impl Poller {
    pub(crate) fn new(policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self {
            delay: policy.initial_delay,
            policy,
            cancel,
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// Number of attempts granted so far.
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Waits until the next attempt may start.
    pub(crate) async fn ready(&mut self) -> Result<(), PollStop> {
        if self.cancel.is_cancelled() {
            return Err(PollStop::Cancelled);
        }

        if self.attempts > 0 {
            let remaining = self
                .policy
                .deadline
                .checked_sub(self.elapsed())
                .filter(|r| !r.is_zero())
                .ok_or(PollStop::DeadlineExceeded)?;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PollStop::Cancelled),
                _ = tokio::time::sleep(self.delay.min(remaining)) => {}
            }

            if self.elapsed() >= self.policy.deadline {
                return Err(PollStop::DeadlineExceeded);
            }
            // Saturate instead of panicking when the product overflows.
            let grown = self.delay.as_secs_f64() * self.policy.multiplier.max(1.0);
            self.delay = Duration::try_from_secs_f64(grown)
                .map_or(self.policy.max_delay, |d| d.min(self.policy.max_delay));
        }

        self.attempts += 1;
        Ok(())
    }
}
