//! Sequential fallback over a list of suppliers.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::{close_safely, same_source, AbstractDataSource, DataSource, DataSourceRef, Supplier};
use crate::error::DataSourceError;
use crate::executor::{CallerThreadExecutor, Executor};
use crate::subscribe::DataSubscriber;

/// Supplier of data sources that try each underlying supplier in turn.
///
/// The produced data source starts with the first supplier. When the active
/// child fails, or finishes without a result, the next supplier is tried.
/// The first child to deliver a result becomes the one whose result is
/// exposed; a later child replaces it only with a final result. If every
/// child fails, the combined source fails with the last child's cause.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use datasource::sources::{failed_data_source_supplier, immediate_data_source};
/// use datasource::{DataSource, DataSourceError, FirstAvailableDataSourceSupplier, Supplier};
///
/// let suppliers: Vec<Arc<dyn Supplier<&str>>> = vec![
///     failed_data_source_supplier(DataSourceError::failure("cache miss")),
///     Arc::new(|| immediate_data_source("from network")),
/// ];
/// let supplier = FirstAvailableDataSourceSupplier::new(suppliers).unwrap();
///
/// let source = supplier.get();
/// assert_eq!(source.result(), Some("from network"));
/// assert!(source.is_finished());
/// ```
#[derive(Clone)]
pub struct FirstAvailableDataSourceSupplier<T> {
    suppliers: Arc<[Arc<dyn Supplier<T>>]>,
}

impl<T: Clone + Send + Sync + 'static> FirstAvailableDataSourceSupplier<T> {
    /// Create a supplier over `suppliers`, tried in order.
    ///
    /// Returns [`DataSourceError::EmptySuppliers`] for an empty list.
    pub fn new(suppliers: Vec<Arc<dyn Supplier<T>>>) -> Result<Self, DataSourceError> {
        if suppliers.is_empty() {
            return Err(DataSourceError::EmptySuppliers);
        }
        Ok(Self {
            suppliers: suppliers.into(),
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Supplier<T> for FirstAvailableDataSourceSupplier<T> {
    fn get(&self) -> DataSourceRef<T> {
        FirstAvailableDataSource::start(self.suppliers.clone())
    }
}

impl<T> std::fmt::Debug for FirstAvailableDataSourceSupplier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirstAvailableDataSourceSupplier")
            .field("suppliers", &self.suppliers.len())
            .finish()
    }
}

struct Children<T> {
    /// Index of the next supplier to try.
    next: usize,
    /// Child currently being waited on.
    current: Option<DataSourceRef<T>>,
    /// Child whose result is exposed.
    with_result: Option<DataSourceRef<T>>,
}

struct FirstAvailableDataSource<T> {
    base: AbstractDataSource<T>,
    suppliers: Arc<[Arc<dyn Supplier<T>>]>,
    children: Mutex<Children<T>>,
    this: Weak<Self>,
}

impl<T: Clone + Send + Sync + 'static> FirstAvailableDataSource<T> {
    fn start(suppliers: Arc<[Arc<dyn Supplier<T>>]>) -> DataSourceRef<T> {
        let source = Arc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn DataSource<T>> = this.clone();
            Self {
                base: AbstractDataSource::new(owner),
                suppliers,
                children: Mutex::new(Children {
                    next: 0,
                    current: None,
                    with_result: None,
                }),
                this: this.clone(),
            }
        });

        if !source.start_next() {
            source.base.set_failure(DataSourceError::NoSupplier);
        }
        source
    }

    fn next_supplier(&self) -> Option<(usize, Arc<dyn Supplier<T>>)> {
        let mut children = self.children.lock();
        if self.base.is_closed() || children.next >= self.suppliers.len() {
            return None;
        }
        let index = children.next;
        children.next += 1;
        Some((index, self.suppliers[index].clone()))
    }

    /// Activate the next supplier. Returns `false` when none is left.
    fn start_next(&self) -> bool {
        let Some((index, supplier)) = self.next_supplier() else {
            return false;
        };
        let child = supplier.get();

        if !self.set_current(&child) {
            child.close();
            return false;
        }

        debug!(index, "activated fallback child");
        child.subscribe(
            Arc::new(ChildSubscriber {
                parent: self.this.clone(),
            }),
            Arc::new(CallerThreadExecutor),
        );
        true
    }

    fn set_current(&self, child: &DataSourceRef<T>) -> bool {
        let mut children = self.children.lock();
        if self.base.is_closed() {
            return false;
        }
        children.current = Some(child.clone());
        true
    }

    fn clear_current(&self, child: &DataSourceRef<T>) -> bool {
        let mut children = self.children.lock();
        if self.base.is_closed() || !is_some_and_same(&children.current, child) {
            return false;
        }
        children.current = None;
        true
    }

    fn with_result(&self) -> Option<DataSourceRef<T>> {
        self.children.lock().with_result.clone()
    }

    fn maybe_set_with_result(&self, child: &DataSourceRef<T>, is_finished: bool) {
        let superseded = {
            let mut children = self.children.lock();
            if !is_some_and_same(&children.current, child)
                || is_some_and_same(&children.with_result, child)
            {
                return;
            }
            if children.with_result.is_some() && !is_finished {
                debug!("ignoring intermediate result, an earlier child holds the result");
                return;
            }
            children.with_result.replace(child.clone())
        };

        if superseded.is_some() {
            debug!("final result from later child supersedes earlier result");
        }
        close_safely(superseded);
    }

    fn on_child_new_result(&self, child: &DataSourceRef<T>) {
        self.maybe_set_with_result(child, child.is_finished());

        if is_some_and_same(&self.with_result(), child) {
            self.base.set_result(None, child.is_finished());
        }
    }

    fn on_child_failed(&self, child: &DataSourceRef<T>) {
        if !self.clear_current(child) {
            return;
        }
        if !is_some_and_same(&self.with_result(), child) {
            child.close();
        }

        if !self.start_next() {
            let cause = child.failure_cause().unwrap_or(DataSourceError::NoResult);
            debug!(%cause, "all fallback children failed");
            self.base.set_failure(cause);
        }
    }

    fn on_child_progress(&self, child: &DataSourceRef<T>) {
        let progress = self.base.progress().max(child.progress());
        self.base.set_progress(progress);
    }
}

fn is_some_and_same<T>(slot: &Option<DataSourceRef<T>>, child: &DataSourceRef<T>) -> bool {
    slot.as_ref().is_some_and(|held| same_source(held, child))
}

impl<T: Clone + Send + Sync + 'static> DataSource<T> for FirstAvailableDataSource<T> {
    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    fn is_finished(&self) -> bool {
        self.base.is_finished()
    }

    fn has_result(&self) -> bool {
        self.with_result().is_some_and(|child| child.has_result())
    }

    fn result(&self) -> Option<T> {
        self.with_result().and_then(|child| child.result())
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
        if !self.base.close() {
            return false;
        }

        let (current, with_result) = {
            let mut children = self.children.lock();
            (children.current.take(), children.with_result.take())
        };
        close_safely(current);
        close_safely(with_result);
        true
    }

    fn subscribe(&self, subscriber: Arc<dyn DataSubscriber<T>>, executor: Arc<dyn Executor>) {
        self.base.subscribe(subscriber, executor)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool {
        self.base.unsubscribe(subscriber)
    }
}

struct ChildSubscriber<T> {
    parent: Weak<FirstAvailableDataSource<T>>,
}

impl<T: Clone + Send + Sync + 'static> DataSubscriber<T> for ChildSubscriber<T> {
    fn on_new_result(&self, data_source: &DataSourceRef<T>) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        if data_source.has_result() {
            parent.on_child_new_result(data_source);
        } else if data_source.is_finished() {
            parent.on_child_failed(data_source);
        }
    }

    fn on_failure(&self, data_source: &DataSourceRef<T>) {
        if let Some(parent) = self.parent.upgrade() {
            parent.on_child_failed(data_source);
        }
    }

    fn on_cancellation(&self, _data_source: &DataSourceRef<T>) {}

    fn on_progress_update(&self, data_source: &DataSourceRef<T>) {
        if let Some(parent) = self.parent.upgrade() {
            parent.on_child_progress(data_source);
        }
    }
}
