//! Subscriber registrations held by a data source.

use std::sync::Arc;

use parking_lot::Mutex;

use super::DataSubscriber;
use crate::executor::Executor;

/// A subscriber paired with the executor its callbacks run on.
pub(crate) struct Registration<T> {
    pub(crate) subscriber: Arc<dyn DataSubscriber<T>>,
    pub(crate) executor: Arc<dyn Executor>,
}

impl<T> Registration<T> {
    pub(crate) fn new(subscriber: Arc<dyn DataSubscriber<T>>, executor: Arc<dyn Executor>) -> Self {
        Self {
            subscriber,
            executor,
        }
    }

    fn is(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.subscriber), Arc::as_ptr(subscriber))
    }
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            executor: self.executor.clone(),
        }
    }
}

/// Ordered list of registrations.
///
/// Readers take a snapshot and iterate it without holding the lock, so a
/// subscriber may subscribe or unsubscribe from inside its own callback.
pub(crate) struct SubscriberRegistry<T> {
    entries: Mutex<Vec<Registration<T>>>,
}

impl<T> SubscriberRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append a registration. The same subscriber may be added more than once.
    pub(crate) fn add(&self, registration: Registration<T>) {
        self.entries.lock().push(registration);
    }

    /// Remove every registration of `subscriber`.
    pub(crate) fn remove(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| !entry.is(subscriber));
        entries.len() != before
    }

    /// Copy of the current registrations in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Registration<T>> {
        self.entries.lock().clone()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
