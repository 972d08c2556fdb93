//! Helpers for building and consuming data sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

use super::{DataSourceRef, SimpleDataSource, Supplier};
use crate::error::DataSourceError;
use crate::executor::CallerThreadExecutor;
use crate::subscribe::DataSubscriber;

type Outcome<T> = Result<Option<T>, DataSourceError>;

/// A data source that has already failed with `cause`.
pub fn immediate_failed_data_source<T>(cause: DataSourceError) -> DataSourceRef<T>
where
    T: Clone + Send + Sync + 'static,
{
    let source = SimpleDataSource::<T>::create();
    source.set_failure(cause);
    source
}

/// A data source that already holds `value` as its final result.
pub fn immediate_data_source<T>(value: T) -> DataSourceRef<T>
where
    T: Clone + Send + Sync + 'static,
{
    let source = SimpleDataSource::<T>::create();
    source.set_result(value, true);
    source
}

/// A supplier whose data sources have all failed with `cause`.
pub fn failed_data_source_supplier<T>(cause: DataSourceError) -> Arc<dyn Supplier<T>>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move || immediate_failed_data_source::<T>(cause.clone()))
}

/// Block the current thread until `data_source` reaches a final state.
///
/// Returns the final result (`Ok(None)` if the source finished empty or was
/// closed first), or the stored failure cause. With a `timeout`, gives up
/// with [`DataSourceError::Timeout`] and leaves the source open; the caller
/// still owns it and decides whether to close it.
///
/// Must not be called from an async context, use
/// [`wait_for_final_result_async`] there.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use datasource::sources::{immediate_data_source, wait_for_final_result};
///
/// let source = immediate_data_source(42_u32);
/// let value = wait_for_final_result(&source, Some(Duration::from_secs(1))).unwrap();
/// assert_eq!(value, Some(42));
/// ```
pub fn wait_for_final_result<T>(
    data_source: &DataSourceRef<T>,
    timeout: Option<Duration>,
) -> Outcome<T>
where
    T: Clone + Send + Sync + 'static,
{
    let latch = Arc::new(Latch::new());
    let subscriber: Arc<dyn DataSubscriber<T>> = latch.clone();
    data_source.subscribe(subscriber.clone(), Arc::new(CallerThreadExecutor));

    if data_source.is_closed() {
        latch.release(Ok(None));
    }

    let outcome = latch.wait(timeout.map(|timeout| Instant::now() + timeout));
    data_source.unsubscribe(&subscriber);

    if matches!(outcome, Err(DataSourceError::Timeout)) {
        debug!(?timeout, "gave up waiting for final result");
    }
    outcome
}

/// Wait for the final state of `data_source` without blocking the runtime.
///
/// Same outcomes as [`wait_for_final_result`], minus the timeout; wrap the
/// future in `tokio::time::timeout` for one. The handle is dropped once the
/// subscription is in place, so the wait resolves to
/// [`DataSourceError::Dropped`] if every other handle goes away before the
/// source finishes.
pub async fn wait_for_final_result_async<T>(data_source: DataSourceRef<T>) -> Outcome<T>
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let waiter = Arc::new(OneshotWaiter {
        sender: Mutex::new(Some(tx)),
    });
    data_source.subscribe(waiter.clone(), Arc::new(CallerThreadExecutor));

    if data_source.is_closed() {
        waiter.complete(Ok(None));
    }
    drop(waiter);
    drop(data_source);

    rx.await.unwrap_or(Err(DataSourceError::Dropped))
}

/// Count-down latch with a single count, carrying the outcome.
struct Latch<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    released: Condvar,
}

impl<T> Latch<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    fn release(&self, outcome: Outcome<T>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.released.notify_all();
        }
    }

    fn wait(&self, deadline: Option<Instant>) -> Outcome<T> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut slot, deadline).timed_out() {
                        return slot.take().unwrap_or(Err(DataSourceError::Timeout));
                    }
                }
                None => self.released.wait(&mut slot),
            }
        }
    }
}

fn final_outcome<T>(data_source: &DataSourceRef<T>) -> Option<Outcome<T>> {
    if data_source.has_failed() {
        Some(Err(data_source
            .failure_cause()
            .unwrap_or(DataSourceError::NoResult)))
    } else if data_source.is_finished() {
        Some(Ok(data_source.result()))
    } else {
        None
    }
}

impl<T: Send + Sync> DataSubscriber<T> for Latch<T> {
    fn on_new_result(&self, data_source: &DataSourceRef<T>) {
        if let Some(outcome) = final_outcome(data_source) {
            self.release(outcome);
        }
    }

    fn on_failure(&self, data_source: &DataSourceRef<T>) {
        self.release(Err(data_source
            .failure_cause()
            .unwrap_or(DataSourceError::NoResult)));
    }

    fn on_cancellation(&self, _data_source: &DataSourceRef<T>) {
        self.release(Ok(None));
    }
}

struct OneshotWaiter<T> {
    sender: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
}

impl<T> OneshotWaiter<T> {
    fn complete(&self, outcome: Outcome<T>) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(outcome);
        }
    }
}

impl<T: Send + Sync> DataSubscriber<T> for OneshotWaiter<T> {
    fn on_new_result(&self, data_source: &DataSourceRef<T>) {
        if let Some(outcome) = final_outcome(data_source) {
            self.complete(outcome);
        }
    }

    fn on_failure(&self, data_source: &DataSourceRef<T>) {
        self.complete(Err(data_source
            .failure_cause()
            .unwrap_or(DataSourceError::NoResult)));
    }

    fn on_cancellation(&self, _data_source: &DataSourceRef<T>) {
        self.complete(Ok(None));
    }
}
