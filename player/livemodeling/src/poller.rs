/*
 * SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Repeat-until-condition-or-timeout primitive
//!
//! Container side effects (build-plan execution, instance state changes)
//! complete asynchronously, so the workflows wait on them by polling. A probe
//! is invoked immediately and then once per interval until its result
//! satisfies the predicate or the timeout elapses.
//!
//! Probe failures are not fatal: a resource that is still being created
//! answers 404 for a while, so a failed probe counts as "not yet satisfied"
//! and is retried on the next tick. Only the timeout is surfaced.
//!
//! Every poll runs as its own task and hands back a [`PollTask`] whose
//! cancellation token stops further probes without producing a failure.

use crate::error::PollError;
use common::livemodeling::LiveModelingSettings;
use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Smallest interval accepted; a zero period would spin
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Interval/timeout pair used to schedule probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            timeout,
        }
    }

    pub fn from_settings(settings: &LiveModelingSettings) -> Self {
        Self::new(settings.interval(), settings.timeout())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start polling with a fresh cancellation token
    pub fn poll<T, P, Fut, E, C>(&self, probe: P, predicate: C) -> PollTask<T>
    where
        T: Send + 'static,
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
        C: Fn(&T) -> bool + Send + 'static,
    {
        self.spawn(probe, predicate, CancellationToken::new())
    }

    /// Start polling with a token that is also cancelled when `parent` is
    pub fn poll_linked<T, P, Fut, E, C>(
        &self,
        probe: P,
        predicate: C,
        parent: &CancellationToken,
    ) -> PollTask<T>
    where
        T: Send + 'static,
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
        C: Fn(&T) -> bool + Send + 'static,
    {
        self.spawn(probe, predicate, parent.child_token())
    }

    fn spawn<T, P, Fut, E, C>(&self, probe: P, predicate: C, cancel: CancellationToken) -> PollTask<T>
    where
        T: Send + 'static,
        P: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
        C: Fn(&T) -> bool + Send + 'static,
    {
        let token = cancel.clone();
        let interval = self.interval;
        let timeout = self.timeout;
        let handle =
            tokio::spawn(async move { run_poll(probe, predicate, interval, timeout, token).await });
        PollTask { cancel, handle }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::from_settings(&LiveModelingSettings::default())
    }
}

/// Poll `probe` every `interval` until `predicate` holds or `timeout` elapses
pub fn poll<T, P, Fut, E, C>(
    probe: P,
    predicate: C,
    interval: Duration,
    timeout: Duration,
) -> PollTask<T>
where
    T: Send + 'static,
    P: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
    C: Fn(&T) -> bool + Send + 'static,
{
    Poller::new(interval, timeout).poll(probe, predicate)
}

/// Handle to a running poll
pub struct PollTask<T> {
    cancel: CancellationToken,
    handle: JoinHandle<Result<T, PollError>>,
}

impl<T> PollTask<T> {
    /// Stop scheduling probes; `join` then yields [`PollError::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the poll to settle
    pub async fn join(self) -> Result<T, PollError> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(PollError::Cancelled),
        }
    }
}

async fn run_poll<T, P, Fut, E, C>(
    mut probe: P,
    predicate: C,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<T, PollError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    C: Fn(&T) -> bool,
{
    let started = Instant::now();
    let deadline = time::sleep_until(started + timeout);
    tokio::pin!(deadline);

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempt: u32 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(attempt, "poll cancelled");
                return Err(PollError::Cancelled);
            }
            _ = &mut deadline => {
                tracing::debug!(attempt, ?timeout, "poll timed out");
                return Err(PollError::Timeout(timeout));
            }
            _ = ticker.tick() => {}
        }

        attempt += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = &mut deadline => return Err(PollError::Timeout(timeout)),
            outcome = probe() => outcome,
        };

        match outcome {
            Ok(value) if predicate(&value) => {
                tracing::debug!(attempt, elapsed = ?started.elapsed(), "poll condition met");
                return Ok(value);
            }
            Ok(_) => tracing::trace!(attempt, "poll condition not met yet"),
            Err(e) => tracing::debug!(attempt, error = %e, "probe failed, retrying"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_probe(
        calls: Arc<AtomicU32>,
        fail_before: u32,
    ) -> impl FnMut() -> futures::future::Ready<Result<u32, String>> + Send + 'static {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result = if n <= fail_before {
                Err(format!("transient failure #{n}"))
            } else {
                Ok(n)
            };
            futures::future::ready(result)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_when_never_satisfied() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = poll(
            counting_probe(calls.clone(), 0),
            |_| false,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .join()
        .await;

        let elapsed = started.elapsed();
        assert_eq!(result, Err(PollError::Timeout(Duration::from_millis(50))));
        assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(70), "elapsed {elapsed:?}");
        assert!(calls.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_tolerates_transient_probe_failures() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = poll(
            counting_probe(calls.clone(), 2),
            |n| *n >= 3,
            Duration::from_millis(10),
            Duration::from_millis(1000),
        )
        .join()
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_resolves_on_first_probe_without_waiting() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = poll(
            counting_probe(calls.clone(), 0),
            |_| true,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .join()
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_probes() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = poll(
            counting_probe(calls.clone(), 0),
            |_| false,
            Duration::from_millis(10),
            Duration::from_secs(60),
        );

        time::sleep(Duration::from_millis(25)).await;
        task.cancel();
        let result = task.join().await;
        assert_eq!(result, Err(PollError::Cancelled));

        let seen = calls.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_token_cancels_linked_poll() {
        let parent = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let task = Poller::new(Duration::from_millis(10), Duration::from_secs(60)).poll_linked(
            counting_probe(calls, 0),
            |_| false,
            &parent,
        );

        parent.cancel();
        assert_eq!(task.join().await, Err(PollError::Cancelled));
    }

    #[test]
    fn test_poller_from_settings() {
        let poller = Poller::from_settings(&LiveModelingSettings {
            timeout_ms: 5_000,
            interval_ms: 0,
        });
        assert_eq!(poller.timeout(), Duration::from_secs(5));
        assert_eq!(poller.interval(), MIN_INTERVAL);
    }
}
