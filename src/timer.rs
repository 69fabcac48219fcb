//! Reusable timers and the first-completion-wins timeout race.
//!
//! Every network-facing step (resolve, connect, TLS, frame write, frame read)
//! runs as its own task and is raced against a pooled timer:
//!
//! ```text
//!            ┌── I/O task wins ──► result returned, timer back to pool
//! race() ────┤
//!            └── timer wins ─────► Timeout returned at once; the I/O task
//!                                  keeps running under a cleanup task that
//!                                  only logs how it ended
//! ```
//!
//! The loser is never cancelled mid-write: once bytes are on the wire the
//! operation either finishes or fails on its own.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

use crate::error::{Result, RntbdError};

/// Default number of idle timers kept for reuse.
pub const DEFAULT_TIMER_POOL_CAPACITY: usize = 256;

/// Lock-free pool of boxed `tokio::time::Sleep` timers.
///
/// Checkout and return never block, so one pool can be shared by every
/// connection on a runtime.
///
/// A pool is per-runtime: pooled timers stay registered with the runtime
/// that created them. Do not share one through
/// [`Connector::with_timer_pool`](crate::Connector::with_timer_pool) across
/// runtimes.
pub struct TimerPool {
    idle: ArrayQueue<Pin<Box<Sleep>>>,
}

impl TimerPool {
    /// Create a pool that keeps at most `capacity` idle timers.
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Take a timer armed to fire after `timeout`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn checkout(&self, timeout: Duration) -> PooledTimer<'_> {
        let deadline = Instant::now() + timeout;
        let sleep = match self.idle.pop() {
            Some(mut sleep) => {
                sleep.as_mut().reset(deadline);
                sleep
            }
            None => Box::pin(tokio::time::sleep_until(deadline)),
        };
        PooledTimer {
            sleep: Some(sleep),
            pool: self,
        }
    }

    /// Number of idle timers ready for checkout.
    #[inline]
    pub fn available(&self) -> usize {
        self.idle.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    fn give_back(&self, sleep: Pin<Box<Sleep>>) {
        // A full pool just drops the surplus timer.
        let _ = self.idle.push(sleep);
    }

    /// Run `io` as a task and race it against a timer of `timeout`.
    ///
    /// If the timer wins, `RntbdError::Timeout` is returned immediately and
    /// the task is handed to a detached cleanup task that awaits it and logs
    /// its outcome. Whatever the task still owns (typically the stream) is
    /// dropped there.
    pub async fn race<T, F>(&self, operation: &'static str, timeout: Duration, io: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = tokio::spawn(io);
        let mut timer = self.checkout(timeout);

        tokio::select! {
            biased;
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) => Err(RntbdError::Io(std::io::Error::other(format!(
                    "{} task failed: {}",
                    operation, e
                )))),
            },
            () = &mut timer => {
                tracing::debug!(operation, ?timeout, "Timer won the race; abandoning I/O task");
                tokio::spawn(observe_abandoned(operation, handle));
                Err(RntbdError::Timeout {
                    operation,
                    elapsed: timeout,
                })
            }
        }
    }
}

impl Default for TimerPool {
    fn default() -> Self {
        Self::new(DEFAULT_TIMER_POOL_CAPACITY)
    }
}

impl std::fmt::Debug for TimerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerPool")
            .field("available", &self.available())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// A checked-out timer; returns itself to the pool on drop.
pub struct PooledTimer<'a> {
    sleep: Option<Pin<Box<Sleep>>>,
    pool: &'a TimerPool,
}

impl Future for PooledTimer<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.get_mut().sleep.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx),
            None => Poll::Ready(()),
        }
    }
}

impl Drop for PooledTimer<'_> {
    fn drop(&mut self) {
        if let Some(sleep) = self.sleep.take() {
            self.pool.give_back(sleep);
        }
    }
}

/// Await an abandoned I/O task and log how it ended. Never propagates.
async fn observe_abandoned<T>(operation: &'static str, handle: JoinHandle<Result<T>>) {
    match handle.await {
        Ok(Ok(_)) => {
            tracing::debug!(operation, "Abandoned I/O completed after its timeout; result discarded");
        }
        Ok(Err(e)) => {
            tracing::debug!(operation, error = %e, "Abandoned I/O failed after its timeout");
        }
        Err(e) => {
            tracing::debug!(operation, error = %e, "Abandoned I/O task did not complete");
        }
    }
}
