//! Settable data source for producers that push results by hand.

use std::sync::{Arc, Weak};

use super::{AbstractDataSource, DataSource};
use crate::error::DataSourceError;
use crate::executor::Executor;
use crate::subscribe::DataSubscriber;

/// A data source whose result, failure and progress are set directly.
///
/// # Example
///
/// ```
/// use datasource::{DataSource, DataSourceError, SimpleDataSource};
///
/// let source = SimpleDataSource::<&str>::create();
/// source.set_result("low-res", false);
/// source.set_failure(DataSourceError::failure("connection reset"));
///
/// assert!(source.has_failed());
/// assert_eq!(source.result(), Some("low-res"));
/// ```
#[derive(Debug)]
pub struct SimpleDataSource<T> {
    base: AbstractDataSource<T>,
}

impl<T: Clone + Send + Sync + 'static> SimpleDataSource<T> {
    /// Create a data source in progress, without a result.
    pub fn create() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn DataSource<T>> = this.clone();
            Self {
                base: AbstractDataSource::new(owner),
            }
        })
    }

    /// Create a data source that hands superseded and discarded results to
    /// `release`.
    pub fn with_release_hook<F>(release: F) -> Arc<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn DataSource<T>> = this.clone();
            Self {
                base: AbstractDataSource::with_release_hook(owner, release),
            }
        })
    }

    /// Publish a result. `is_last` marks it as the final one.
    pub fn set_result(&self, value: T, is_last: bool) -> bool {
        self.base.set_result(Some(value), is_last)
    }

    /// Finish successfully without a result.
    pub fn finish_empty(&self) -> bool {
        self.base.set_result(None, true)
    }

    pub fn set_failure(&self, cause: DataSourceError) -> bool {
        self.base.set_failure(cause)
    }

    pub fn set_progress(&self, progress: f32) -> bool {
        self.base.set_progress(progress)
    }
}

impl<T: Clone + Send + Sync + 'static> DataSource<T> for SimpleDataSource<T> {
    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    fn is_finished(&self) -> bool {
        self.base.is_finished()
    }

    fn has_result(&self) -> bool {
        self.base.has_result()
    }

    fn result(&self) -> Option<T> {
        self.base.result()
    }

    fn has_failed(&self) -> bool {
        self.base.has_failed()
    }

    fn failure_cause(&self) -> Option<DataSourceError> {
        self.base.failure_cause()
    }

    fn progress(&self) -> f32 {
        self.base.progress()
    }

    fn close(&self) -> bool {
        self.base.close()
    }

    fn subscribe(&self, subscriber: Arc<dyn DataSubscriber<T>>, executor: Arc<dyn Executor>) {
        self.base.subscribe(subscriber, executor)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool {
        self.base.unsubscribe(subscriber)
    }
}
