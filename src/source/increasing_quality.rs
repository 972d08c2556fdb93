//! Concurrent quality arbitration over a ranked list of suppliers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{same_source, AbstractDataSource, DataSource, DataSourceRef, Supplier};
use crate::error::DataSourceError;
use crate::executor::{CallerThreadExecutor, Executor};
use crate::subscribe::DataSubscriber;

/// Supplier of data sources that race several suppliers ranked by quality.
///
/// Index 0 is the highest quality. The produced data source exposes the
/// first result any child delivers and then upgrades to a higher-quality
/// child once that child has a final result, or as soon as it has any result
/// if the current holder has failed. Every child of lower quality than the
/// holder is closed. The combined source finishes when the top child
/// delivers its final result, and fails once no child can deliver anything
/// better, keeping whatever result it already exposes.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use datasource::{
///     DataSource, DataSourceRef, IncreasingQualityDataSourceSupplier, SimpleDataSource,
///     Supplier,
/// };
///
/// let full = SimpleDataSource::<String>::create();
/// let preview = SimpleDataSource::<String>::create();
///
/// let (f, p) = (full.clone(), preview.clone());
/// let supplier = IncreasingQualityDataSourceSupplier::<String>::builder()
///     .supplier(Arc::new(move || -> DataSourceRef<String> { f.clone() }))
///     .supplier(Arc::new(move || -> DataSourceRef<String> { p.clone() }))
///     .build()
///     .unwrap();
///
/// let source = supplier.get();
/// preview.set_result("thumbnail".to_string(), true);
/// assert_eq!(source.result().as_deref(), Some("thumbnail"));
///
/// full.set_result("full size".to_string(), true);
/// assert_eq!(source.result().as_deref(), Some("full size"));
/// assert!(source.is_finished());
/// assert!(preview.is_closed());
/// ```
#[derive(Clone)]
pub struct IncreasingQualityDataSourceSupplier<T> {
    suppliers: Arc<[Arc<dyn Supplier<T>>]>,
    lazy: bool,
}

impl<T: Clone + Send + Sync + 'static> IncreasingQualityDataSourceSupplier<T> {
    /// Create an eager supplier over `suppliers`, highest quality first.
    ///
    /// Returns [`DataSourceError::EmptySuppliers`] for an empty list.
    pub fn new(suppliers: Vec<Arc<dyn Supplier<T>>>) -> Result<Self, DataSourceError> {
        Self::builder().suppliers(suppliers).build()
    }

    /// Create a builder for configuring the supplier.
    pub fn builder() -> IncreasingQualityDataSourceSupplierBuilder<T> {
        IncreasingQualityDataSourceSupplierBuilder::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Supplier<T> for IncreasingQualityDataSourceSupplier<T> {
    fn get(&self) -> DataSourceRef<T> {
        IncreasingQualityDataSource::start(self.suppliers.clone(), self.lazy)
    }
}

impl<T> std::fmt::Debug for IncreasingQualityDataSourceSupplier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncreasingQualityDataSourceSupplier")
            .field("suppliers", &self.suppliers.len())
            .field("lazy", &self.lazy)
            .finish()
    }
}

/// Builder for [`IncreasingQualityDataSourceSupplier`].
pub struct IncreasingQualityDataSourceSupplierBuilder<T> {
    suppliers: Vec<Arc<dyn Supplier<T>>>,
    lazy: bool,
}

impl<T: Clone + Send + Sync + 'static> IncreasingQualityDataSourceSupplierBuilder<T> {
    /// Create a new builder with no suppliers, in eager mode.
    pub fn new() -> Self {
        Self {
            suppliers: Vec::new(),
            lazy: false,
        }
    }

    /// Append a supplier. Suppliers added earlier rank higher.
    pub fn supplier(mut self, supplier: Arc<dyn Supplier<T>>) -> Self {
        self.suppliers.push(supplier);
        self
    }

    /// Append several suppliers, highest quality first.
    pub fn suppliers<I>(mut self, suppliers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Supplier<T>>>,
    {
        self.suppliers.extend(suppliers);
        self
    }

    /// Defer creating children until the result, progress or a subscription
    /// is first asked for.
    ///
    /// Default is `false`.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Build the supplier.
    pub fn build(self) -> Result<IncreasingQualityDataSourceSupplier<T>, DataSourceError> {
        if self.suppliers.is_empty() {
            return Err(DataSourceError::EmptySuppliers);
        }
        Ok(IncreasingQualityDataSourceSupplier {
            suppliers: self.suppliers.into(),
            lazy: self.lazy,
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Default for IncreasingQualityDataSourceSupplierBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Slot<T> {
    source: Option<DataSourceRef<T>>,
    /// Nothing more will come from this slot.
    settled: bool,
}

struct Arbitration<T> {
    slots: Vec<Slot<T>>,
    /// Index of the child whose result is exposed.
    holder: Option<usize>,
    holder_failed: bool,
    /// Cause reported by the highest-quality failed child.
    failure: Option<(usize, DataSourceError)>,
}

impl<T> Arbitration<T> {
    fn is_current(&self, index: usize, child: &DataSourceRef<T>) -> bool {
        self.slots[index]
            .source
            .as_ref()
            .is_some_and(|held| same_source(held, child))
    }

    fn holder_source(&self) -> Option<DataSourceRef<T>> {
        self.holder
            .and_then(|index| self.slots[index].source.clone())
    }

    /// Settle and take every slot of lower quality than `index`.
    fn settle_below(&mut self, index: usize) -> Vec<DataSourceRef<T>> {
        self.slots[index + 1..]
            .iter_mut()
            .filter_map(|slot| {
                slot.settled = true;
                slot.source.take()
            })
            .collect()
    }
}

struct IncreasingQualityDataSource<T> {
    base: AbstractDataSource<T>,
    suppliers: Arc<[Arc<dyn Supplier<T>>]>,
    arbitration: Mutex<Arbitration<T>>,
    initialized: AtomicBool,
    this: Weak<Self>,
}

impl<T: Clone + Send + Sync + 'static> IncreasingQualityDataSource<T> {
    fn start(suppliers: Arc<[Arc<dyn Supplier<T>>]>, lazy: bool) -> DataSourceRef<T> {
        let count = suppliers.len();
        let source = Arc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn DataSource<T>> = this.clone();
            Self {
                base: AbstractDataSource::new(owner),
                suppliers,
                arbitration: Mutex::new(Arbitration {
                    slots: (0..count)
                        .map(|_| Slot {
                            source: None,
                            settled: false,
                        })
                        .collect(),
                    holder: None,
                    holder_failed: false,
                    failure: None,
                }),
                initialized: AtomicBool::new(false),
                this: this.clone(),
            }
        });

        if !lazy {
            source.ensure_initialized();
        }
        source
    }

    /// Create and subscribe to the children, highest quality first.
    ///
    /// Stops early once a created child already has a result, since every
    /// child after it is of lower quality.
    fn ensure_initialized(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }

        for (index, supplier) in self.suppliers.iter().enumerate() {
            if self.base.is_closed() {
                return;
            }

            let child = supplier.get();
            if !self.store_child(index, &child) {
                child.close();
                return;
            }

            trace!(index, "created quality child");
            child.subscribe(
                Arc::new(ChildSubscriber {
                    parent: self.this.clone(),
                    index,
                }),
                Arc::new(CallerThreadExecutor),
            );

            if child.has_result() {
                debug!(index, "child has a result already, not creating lower quality ones");
                let unused = self.arbitration.lock().settle_below(index);
                for child in unused {
                    child.close();
                }
                self.maybe_fail();
                return;
            }
        }
    }

    fn store_child(&self, index: usize, child: &DataSourceRef<T>) -> bool {
        let mut arbitration = self.arbitration.lock();
        if self.base.is_closed() || arbitration.slots[index].settled {
            return false;
        }
        arbitration.slots[index].source = Some(child.clone());
        true
    }

    fn holder_source(&self) -> Option<DataSourceRef<T>> {
        self.arbitration.lock().holder_source()
    }

    fn on_child_new_result(&self, index: usize, child: &DataSourceRef<T>) {
        let is_finished = child.is_finished();

        let superseded = {
            let mut arbitration = self.arbitration.lock();
            if self.base.is_closed() || !arbitration.is_current(index, child) {
                return;
            }

            let accept = match arbitration.holder {
                None => true,
                Some(holder) if holder == index => false,
                Some(holder) => index < holder && (is_finished || arbitration.holder_failed),
            };

            if accept {
                debug!(index, previous = ?arbitration.holder, is_finished, "new result holder");
                arbitration.holder = Some(index);
                arbitration.holder_failed = false;
            } else if arbitration.holder != Some(index) {
                debug!(index, holder = ?arbitration.holder, "ignoring result");
                return;
            }

            if is_finished {
                arbitration.slots[index].settled = true;
            }
            if accept {
                arbitration.settle_below(index)
            } else {
                Vec::new()
            }
        };

        for child in superseded {
            child.close();
        }

        self.base.set_result(None, index == 0 && is_finished);
        self.maybe_fail();
    }

    fn on_child_failed(&self, index: usize, child: &DataSourceRef<T>) {
        let failed = {
            let mut arbitration = self.arbitration.lock();
            if self.base.is_closed() || !arbitration.is_current(index, child) {
                return;
            }

            arbitration.slots[index].settled = true;
            if arbitration.failure.as_ref().is_none_or(|(at, _)| index < *at) {
                let cause = child.failure_cause().unwrap_or(DataSourceError::NoResult);
                arbitration.failure = Some((index, cause));
            }

            if arbitration.holder == Some(index) {
                arbitration.holder_failed = true;
                None
            } else {
                arbitration.slots[index].source.take()
            }
        };

        debug!(index, "quality child failed");
        if let Some(failed) = failed {
            failed.close();
        }
        self.maybe_fail();
    }

    fn on_child_progress(&self, index: usize, child: &DataSourceRef<T>) {
        if index == 0 {
            self.base.set_progress(child.progress());
        }
    }

    /// Fail once every slot is settled without a final top-quality result.
    fn maybe_fail(&self) {
        let cause = {
            let arbitration = self.arbitration.lock();
            if !arbitration.slots.iter().all(|slot| slot.settled) {
                return;
            }
            arbitration
                .failure
                .as_ref()
                .map(|(_, cause)| cause.clone())
                .unwrap_or(DataSourceError::NoResult)
        };

        if self.base.is_finished() {
            return;
        }
        debug!(%cause, "no child can improve the result");
        self.base.set_failure(cause);
    }
}

impl<T: Clone + Send + Sync + 'static> DataSource<T> for IncreasingQualityDataSource<T> {
    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    fn is_finished(&self) -> bool {
        self.base.is_finished()
    }

    fn has_result(&self) -> bool {
        self.ensure_initialized();
        self.holder_source().is_some_and(|child| child.has_result())
    }

    fn result(&self) -> Option<T> {
        self.ensure_initialized();
        self.holder_source().and_then(|child| child.result())
    }

    fn has_failed(&self) -> bool {
        self.base.has_failed()
    }

    fn failure_cause(&self) -> Option<DataSourceError> {
        self.base.failure_cause()
    }

    fn progress(&self) -> f32 {
        self.ensure_initialized();
        self.base.progress()
    }

    fn close(&self) -> bool {
        if !self.base.close() {
            return false;
        }

        let children: Vec<_> = self
            .arbitration
            .lock()
            .slots
            .iter_mut()
            .filter_map(|slot| slot.source.take())
            .collect();
        for child in children {
            child.close();
        }
        true
    }

    fn subscribe(&self, subscriber: Arc<dyn DataSubscriber<T>>, executor: Arc<dyn Executor>) {
        self.ensure_initialized();
        self.base.subscribe(subscriber, executor)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool {
        self.base.unsubscribe(subscriber)
    }
}

struct ChildSubscriber<T> {
    parent: Weak<IncreasingQualityDataSource<T>>,
    index: usize,
}

impl<T: Clone + Send + Sync + 'static> DataSubscriber<T> for ChildSubscriber<T> {
    fn on_new_result(&self, data_source: &DataSourceRef<T>) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        if data_source.has_result() {
            parent.on_child_new_result(self.index, data_source);
        } else if data_source.is_finished() {
            parent.on_child_failed(self.index, data_source);
        }
    }

    fn on_failure(&self, data_source: &DataSourceRef<T>) {
        if let Some(parent) = self.parent.upgrade() {
            parent.on_child_failed(self.index, data_source);
        }
    }

    fn on_cancellation(&self, _data_source: &DataSourceRef<T>) {}

    fn on_progress_update(&self, data_source: &DataSourceRef<T>) {
        if let Some(parent) = self.parent.upgrade() {
            parent.on_child_progress(self.index, data_source);
        }
    }
}
