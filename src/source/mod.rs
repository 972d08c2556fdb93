//! Data source abstraction for asynchronously produced results.
//!
//! A [`DataSource`] represents one logical computation that may publish
//! several intermediate results before a final one, fail, or be cancelled by
//! closing it. Consumers observe it either by polling its state or by
//! subscribing a [`DataSubscriber`](crate::subscribe::DataSubscriber).
//!
//! Producers build on [`AbstractDataSource`], which owns the state machine and
//! subscriber fan-out. [`SimpleDataSource`] is the ready-made settable leaf,
//! and the two combinators compose several producers into one:
//!
//! - [`FirstAvailableDataSourceSupplier`] tries suppliers one after another.
//! - [`IncreasingQualityDataSourceSupplier`] races suppliers ranked by quality.

mod abstract_source;
mod first_available;
mod increasing_quality;
mod simple;
pub mod sources;

pub use abstract_source::AbstractDataSource;
pub use first_available::FirstAvailableDataSourceSupplier;
pub use increasing_quality::{
    IncreasingQualityDataSourceSupplier, IncreasingQualityDataSourceSupplierBuilder,
};
pub use simple::SimpleDataSource;

use std::sync::Arc;

use crate::error::DataSourceError;
use crate::executor::Executor;
use crate::subscribe::DataSubscriber;

/// Shared handle to a data source.
pub type DataSourceRef<T> = Arc<dyn DataSource<T>>;

/// Trait implemented by everything that produces or holds a result.
///
/// All accessors are snapshots of the current state and may be stale by the
/// time the caller looks at them. Subscribers are the way to be told about
/// changes.
///
/// # Example
///
/// ```
/// use datasource::{DataSource, SimpleDataSource};
///
/// let source = SimpleDataSource::<u32>::create();
/// source.set_result(7, true);
///
/// assert!(source.is_finished());
/// assert_eq!(source.result(), Some(7));
/// assert!(source.close());
/// assert!(!source.close());
/// ```
pub trait DataSource<T>: Send + Sync {
    /// Whether the data source has been closed.
    fn is_closed(&self) -> bool;

    /// Whether no further results or failures will arrive.
    fn is_finished(&self) -> bool;

    /// Whether a result is currently retained.
    fn has_result(&self) -> bool;

    /// The most recently published result, if one is retained.
    fn result(&self) -> Option<T>;

    /// Whether the data source finished with a failure.
    fn has_failed(&self) -> bool;

    /// The failure cause, if the data source failed.
    fn failure_cause(&self) -> Option<DataSourceError>;

    /// Progress in the range `[0, 1]`.
    fn progress(&self) -> f32;

    /// Whether the data source can publish several results.
    fn has_multiple_results(&self) -> bool {
        false
    }

    /// Close the data source and release any retained result.
    ///
    /// Returns `true` if this call closed it, `false` if it was already closed.
    fn close(&self) -> bool;

    /// Subscribe to state changes.
    ///
    /// Callbacks are always delivered through `executor`. If the source
    /// already holds a result or has failed, the matching callback is
    /// scheduled right away.
    fn subscribe(&self, subscriber: Arc<dyn DataSubscriber<T>>, executor: Arc<dyn Executor>);

    /// Remove a previously registered subscriber, matched by identity.
    ///
    /// Returns `true` if a registration was removed.
    fn unsubscribe(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool;
}

/// A factory of fresh data sources.
///
/// Every call to [`get`](Supplier::get) must return a new, independent data
/// source. Closures of the form `Fn() -> DataSourceRef<T>` are suppliers.
pub trait Supplier<T>: Send + Sync {
    /// Produce a new data source.
    fn get(&self) -> DataSourceRef<T>;
}

impl<T, F> Supplier<T> for F
where
    F: Fn() -> DataSourceRef<T> + Send + Sync,
{
    fn get(&self) -> DataSourceRef<T> {
        self()
    }
}

/// Identity comparison between two data source handles.
pub(crate) fn same_source<T>(a: &DataSourceRef<T>, b: &DataSourceRef<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Close a data source if there is one.
pub(crate) fn close_safely<T>(source: Option<DataSourceRef<T>>) {
    if let Some(source) = source {
        source.close();
    }
}
