//! Fixed-interval polling against a page that exposes no completion events

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::tools::PageDriver;

/// Checks a condition every `interval` until it yields a value or `timeout` passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `check` until it returns `Some`.
    ///
    /// The condition is always checked at least once, even with a zero
    /// timeout. Returns `Ok(None)` once the timeout has passed. An error from
    /// `check` ends the wait immediately.
    pub async fn until<T, F, Fut>(&self, mut check: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(value) = check().await? {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }

    /// Wait for an element matching `selector` to be in the DOM
    pub async fn element(&self, driver: &dyn PageDriver, selector: &str) -> Result<bool> {
        let found = self
            .until(move || async move {
                Ok(driver.element_present(selector).await?.then_some(()))
            })
            .await?;
        Ok(found.is_some())
    }
}
