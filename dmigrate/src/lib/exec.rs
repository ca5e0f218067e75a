//! Bounded retry around remote calls.
//!
//! Every remote call of the engine goes through [`Executor::execute`], which
//! retries transient failures a fixed number of times and turns permission
//! errors into a soft [`Outcome::Denied`] when the caller accepts it.
//! The executor itself never aborts anything: the caller decides what a call
//! that was not performed means.

use std::time::Duration;

use futures::Future;

use crate::drive::{ApiError, ErrorClass};

/// Result of a remote call run through the [`Executor`]
#[derive(Debug)]
pub enum Outcome<T> {
    Performed(T),
    /// Permission denied on a call that was allowed to fail
    Denied(ApiError),
    /// Not performed: fatal error, or retry budget exhausted
    Failed(ApiError),
}

impl<T> Outcome<T> {
    /// Converts to a result where anything but a performed call is an error
    pub fn into_result(self, what: &str) -> dmig::Result<T> {
        match self {
            Self::Performed(value) => Ok(value),
            Self::Denied(err) | Self::Failed(err) => match dmig::Error::from(err) {
                dmig::Error::Api(msg) => Err(dmig::Error::Api(format!("{what}: {msg}"))),
                other => Err(other),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Executor {
    attempts: u32,
    backoff: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10))
    }
}

impl Executor {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &dmig::Config) -> Self {
        Self::new(config.attempts, config.backoff())
    }

    /// Runs `op` until it succeeds, fails for a non-transient reason,
    /// or the attempt budget is spent.
    pub async fn execute<T, F, Fut>(
        &self,
        what: &str,
        allow_soft_failure: bool,
        mut op: F,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            log::trace!("{what} (attempt {attempt}/{})", self.attempts);
            let err = match op().await {
                Ok(value) => return Outcome::Performed(value),
                Err(err) => err,
            };
            match err.class() {
                ErrorClass::PermissionDenied if allow_soft_failure => {
                    log::info!("{what}: permission denied ({err})");
                    return Outcome::Denied(err);
                }
                ErrorClass::Transient if attempt < self.attempts => {
                    log::warn!(
                        "{what}: attempt {attempt}/{} failed ({err}), retrying in {:?}",
                        self.attempts,
                        self.backoff
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                ErrorClass::Transient => {
                    log::error!("{what}: giving up after {attempt} attempts ({err})");
                    return Outcome::Failed(err);
                }
                ErrorClass::PermissionDenied | ErrorClass::Fatal => {
                    log::error!("{what}: {err}");
                    return Outcome::Failed(err);
                }
            }
        }
    }
}
