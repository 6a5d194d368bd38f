//! Exponential backoff around artefact fetches.
//!
//! Only transient network failures are retried. The delay before retry `n`
//! (counting from zero) is `base_delay * 2^n`.

use crate::artefact::download::{ArtefactFetcher, DownloadError};
use log::warn;
use std::path::Path;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Return the delay to wait after failed attempt `attempt` (zero-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use parcel_installer::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_secs(1) };
    /// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    /// ```
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. `sleep` is called between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation`.
    pub fn run<T, E>(
        &self,
        mut operation: impl FnMut(u32) -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    sleep(self.delay_for(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Function used to wait between attempts.
pub type Sleeper = Box<dyn Fn(Duration)>;

/// An [`ArtefactFetcher`] that retries transient failures of an inner
/// fetcher.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
    sleeper: Sleeper,
}

impl<F: ArtefactFetcher> RetryingFetcher<F> {
    /// Wrap `inner`, sleeping the current thread between attempts.
    #[must_use]
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self::with_sleeper(inner, policy, Box::new(std::thread::sleep))
    }

    /// Wrap `inner` with a custom sleeper, typically a recorder in tests.
    #[must_use]
    pub fn with_sleeper(inner: F, policy: RetryPolicy, sleeper: Sleeper) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }
}

impl<F: ArtefactFetcher> ArtefactFetcher for RetryingFetcher<F> {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.policy.run(
            |_| self.inner.fetch(url, dest),
            DownloadError::is_transient,
            |delay| {
                warn!("fetch of {url} failed; retrying in {delay:?}");
                (self.sleeper)(delay);
            },
        )
    }
}
