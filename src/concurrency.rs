//! Bounded parallel map over futures.
//!
//! Futures handed to a [`ConcurrencyLimiter`] are polled concurrently from the
//! calling task, but each one has to take a semaphore permit before it makes
//! progress, so at most `limit` of them run at once. Units are pulled from the
//! input lazily, so a long input never has more than `limit` futures alive.
//! Results come back in submission order regardless of which future finished
//! first.
//!
//! Limiters nest: a unit running under an outer limiter can fan out again with
//! its own inner limiter. The two permit pools are independent.

use std::future::Future;

use futures::{stream, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;

pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// A limit of zero would never admit anything, so it is raised to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Semaphore::new(limit),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs one unit once a permit is free. The permit is held until the unit completes.
    pub async fn run<F: Future>(&self, unit: F) -> F::Output {
        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = self.semaphore.acquire().await;
        unit.await
    }

    /// Runs every unit and waits for all of them.
    pub async fn join_all<I, F>(&self, units: I) -> Vec<F::Output>
    where
        I: IntoIterator<Item = F>,
        F: Future,
    {
        stream::iter(units)
            .map(|unit| self.run(unit))
            .buffered(self.limit)
            .collect()
            .await
    }

    /// Like [`join_all`](Self::join_all), but stops at the first error and
    /// drops the units still pending.
    pub async fn try_join_all<I, F, T, E>(&self, units: I) -> Result<Vec<T>, E>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>>,
    {
        stream::iter(units)
            .map(|unit| self.run(unit))
            .buffered(self.limit)
            .try_collect()
            .await
    }
}

/// One-shot helper for a single fan-out.
pub async fn bounded_join_all<I, F>(limit: usize, units: I) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    ConcurrencyLimiter::new(limit).join_all(units).await
}
