//! Interval polling with an injectable sleeper
//!
//! Boot-readiness waits and settle delays go through [`Sleeper`] so tests can run a
//! forty-attempt wait without real delays.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Suspends the current task
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by tokio's timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that records every requested duration and returns at once
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested sleeps, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sum of all requested sleeps
    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

/// Fixed-interval, bounded-attempt polling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: usize) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 40)
    }
}

/// Result of [`poll_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe passed on this attempt
    Ready { attempts: usize },
    /// Every attempt failed
    Exhausted { attempts: usize },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            Self::Ready { attempts } | Self::Exhausted { attempts } => *attempts,
        }
    }
}

/// Probe up to `policy.max_attempts` times, sleeping `policy.interval` between probes
///
/// No sleep follows the last probe. `probe` receives the 1-based attempt number.
pub async fn poll_until<F, Fut>(
    policy: PollPolicy,
    sleeper: &dyn Sleeper,
    mut probe: F,
) -> PollOutcome
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=policy.max_attempts {
        if probe(attempt).await {
            return PollOutcome::Ready { attempts: attempt };
        }
        if attempt < policy.max_attempts {
            sleeper.sleep(policy.interval).await;
        }
    }
    PollOutcome::Exhausted {
        attempts: policy.max_attempts,
    }
}
