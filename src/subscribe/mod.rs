//! Observers of data source state changes.
//!
//! A [`DataSubscriber`] is registered on a data source together with an
//! [`Executor`](crate::executor::Executor). Every notification is delivered as
//! a task on that executor, never inline from the producer's call.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  event kind   ┌────────────────────┐
//! │ AbstractDataSource   │──────────────▶│ SubscriberRegistry │
//! │ (state under mutex)  │               │ (snapshot on read) │
//! └──────────────────────┘               └─────────┬──────────┘
//!                                                  │ one task per registration
//!                                                  ▼
//!                                     ┌────────────────────────┐
//!                                     │ Executor → Subscriber  │
//!                                     │ (panics caught + logged)│
//!                                     └────────────────────────┘
//! ```

mod dispatch;
mod registry;

pub(crate) use dispatch::{deliver, notify_all, Event};
pub(crate) use registry::{Registration, SubscriberRegistry};

use std::sync::Arc;

use crate::source::DataSourceRef;

/// Receives notifications from a data source.
///
/// Each callback gets a handle to the notifying source so the subscriber can
/// read the current result, failure cause or progress.
pub trait DataSubscriber<T>: Send + Sync {
    /// A new result is available. Check `is_finished()` to see if it is final.
    fn on_new_result(&self, data_source: &DataSourceRef<T>);

    /// The data source failed.
    fn on_failure(&self, data_source: &DataSourceRef<T>);

    /// The data source was closed before it finished.
    fn on_cancellation(&self, data_source: &DataSourceRef<T>);

    /// Progress changed.
    fn on_progress_update(&self, _data_source: &DataSourceRef<T>) {}
}

type Callback<T> = Box<dyn Fn(&DataSourceRef<T>) + Send + Sync>;

/// Closure-driven subscriber that takes care of closing the data source.
///
/// The source is closed after the final result or a failure has been handed
/// to the callbacks, so the callbacks must copy out whatever they need.
/// Intermediate results that arrive after the source was closed are ignored.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use datasource::{BaseDataSubscriber, CallerThreadExecutor, DataSource, SimpleDataSource};
///
/// let source = SimpleDataSource::<String>::create();
/// let subscriber = BaseDataSubscriber::<String>::builder()
///     .on_new_result(|ds| println!("got {:?}", ds.result()))
///     .on_failure(|ds| eprintln!("failed: {:?}", ds.failure_cause()))
///     .build();
///
/// source.subscribe(Arc::new(subscriber), Arc::new(CallerThreadExecutor));
/// source.set_result("done".to_string(), true);
///
/// assert!(source.is_closed());
/// ```
pub struct BaseDataSubscriber<T> {
    on_new_result: Callback<T>,
    on_failure: Callback<T>,
    on_cancellation: Callback<T>,
    on_progress_update: Callback<T>,
}

impl<T: 'static> BaseDataSubscriber<T> {
    /// Create a builder for configuring the subscriber callbacks.
    pub fn builder() -> BaseDataSubscriberBuilder<T> {
        BaseDataSubscriberBuilder::new()
    }
}

impl<T> std::fmt::Debug for BaseDataSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseDataSubscriber").finish_non_exhaustive()
    }
}

impl<T> DataSubscriber<T> for BaseDataSubscriber<T> {
    fn on_new_result(&self, data_source: &DataSourceRef<T>) {
        let is_finished = data_source.is_finished();
        if !is_finished && data_source.is_closed() {
            return;
        }

        (self.on_new_result)(data_source);

        if is_finished {
            data_source.close();
        }
    }

    fn on_failure(&self, data_source: &DataSourceRef<T>) {
        (self.on_failure)(data_source);
        data_source.close();
    }

    fn on_cancellation(&self, data_source: &DataSourceRef<T>) {
        (self.on_cancellation)(data_source);
    }

    fn on_progress_update(&self, data_source: &DataSourceRef<T>) {
        (self.on_progress_update)(data_source);
    }
}

/// Builder for [`BaseDataSubscriber`]. Unset callbacks do nothing.
pub struct BaseDataSubscriberBuilder<T> {
    on_new_result: Option<Callback<T>>,
    on_failure: Option<Callback<T>>,
    on_cancellation: Option<Callback<T>>,
    on_progress_update: Option<Callback<T>>,
}

impl<T: 'static> BaseDataSubscriberBuilder<T> {
    /// Create a new builder with no callbacks.
    pub fn new() -> Self {
        Self {
            on_new_result: None,
            on_failure: None,
            on_cancellation: None,
            on_progress_update: None,
        }
    }

    /// Called for every result, intermediate or final.
    pub fn on_new_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&DataSourceRef<T>) + Send + Sync + 'static,
    {
        self.on_new_result = Some(Box::new(f));
        self
    }

    /// Called once when the source fails.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&DataSourceRef<T>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Called once when the source is closed before finishing.
    pub fn on_cancellation<F>(mut self, f: F) -> Self
    where
        F: Fn(&DataSourceRef<T>) + Send + Sync + 'static,
    {
        self.on_cancellation = Some(Box::new(f));
        self
    }

    /// Called whenever progress changes.
    pub fn on_progress_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&DataSourceRef<T>) + Send + Sync + 'static,
    {
        self.on_progress_update = Some(Box::new(f));
        self
    }

    /// Build the subscriber.
    pub fn build(self) -> BaseDataSubscriber<T> {
        fn noop<T>() -> Callback<T> {
            Box::new(|_: &DataSourceRef<T>| {})
        }

        BaseDataSubscriber {
            on_new_result: self.on_new_result.unwrap_or_else(noop),
            on_failure: self.on_failure.unwrap_or_else(noop),
            on_cancellation: self.on_cancellation.unwrap_or_else(noop),
            on_progress_update: self.on_progress_update.unwrap_or_else(noop),
        }
    }
}

impl<T: 'static> Default for BaseDataSubscriberBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
