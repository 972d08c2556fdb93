//! Shared state machine behind every data source.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::DataSource;
use crate::error::DataSourceError;
use crate::executor::Executor;
use crate::subscribe::{self, DataSubscriber, Event, Registration, SubscriberRegistry};

type ReleaseHook<T> = Box<dyn Fn(T) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    InProgress,
    Success,
    Failure,
}

struct State<T> {
    status: Status,
    closed: bool,
    result: Option<T>,
    /// A result has been published, possibly held by a delegate.
    published: bool,
    failure: Option<DataSourceError>,
    progress: f32,
}

/// Result state, failure state, progress and subscriber fan-out of a data
/// source.
///
/// Concrete sources embed an `AbstractDataSource` and forward their
/// [`DataSource`] methods to it. The embedding source is passed in as a weak
/// `owner` so that subscribers receive a handle to the outer object, and so
/// that [`subscribe`](Self::subscribe) sees the outer
/// [`has_result`](DataSource::has_result) when a combinator overrides it.
///
/// ```text
/// IN_PROGRESS ──set_result(_, false)──▶ IN_PROGRESS (with result)
///      │                                      │
///      ├──set_result(_, true)─────────────────┴──▶ SUCCESS
///      └──set_failure────────────────────────────▶ FAILURE
///
/// any state ──close──▶ CLOSED
/// ```
///
/// Every held value is passed to the release hook exactly once: when it is
/// superseded, when the source closes, when `set_result` rejects it, or when
/// the source is dropped still holding it.
pub struct AbstractDataSource<T> {
    owner: Weak<dyn DataSource<T>>,
    state: Mutex<State<T>>,
    subscribers: SubscriberRegistry<T>,
    release: ReleaseHook<T>,
}

impl<T: Clone + Send + Sync + 'static> AbstractDataSource<T> {
    /// Create the state for `owner`. Released values are simply dropped.
    pub fn new(owner: Weak<dyn DataSource<T>>) -> Self {
        Self::with_release_hook(owner, drop)
    }

    /// Create the state for `owner`, handing released values to `release`.
    pub fn with_release_hook<F>(owner: Weak<dyn DataSource<T>>, release: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            owner,
            state: Mutex::new(State {
                status: Status::InProgress,
                closed: false,
                result: None,
                published: false,
                failure: None,
                progress: 0.0,
            }),
            subscribers: SubscriberRegistry::new(),
            release: Box::new(release),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().status != Status::InProgress
    }

    pub fn has_result(&self) -> bool {
        self.state.lock().result.is_some()
    }

    pub fn result(&self) -> Option<T> {
        self.state.lock().result.clone()
    }

    pub fn has_failed(&self) -> bool {
        self.state.lock().status == Status::Failure
    }

    pub fn failure_cause(&self) -> Option<DataSourceError> {
        self.state.lock().failure.clone()
    }

    pub fn progress(&self) -> f32 {
        self.state.lock().progress
    }

    /// Publish a new result.
    ///
    /// `value` may be `None` for sources that keep their result elsewhere and
    /// only need the state transition and notification. Returns `false`, and
    /// releases `value`, if the source is closed or already finished.
    pub fn set_result(&self, value: Option<T>, is_last: bool) -> bool {
        let (previous, registrations) = {
            let mut state = self.state.lock();
            if state.closed || state.status != Status::InProgress {
                drop(state);
                if let Some(value) = value {
                    (self.release)(value);
                }
                return false;
            }

            if is_last {
                state.status = Status::Success;
                state.progress = 1.0;
            }
            state.published = true;
            (
                std::mem::replace(&mut state.result, value),
                self.subscribers.snapshot(),
            )
        };

        trace!(is_last, "data source result set");
        self.notify(registrations, Event::NewResult);

        if let Some(previous) = previous {
            (self.release)(previous);
        }
        true
    }

    /// Mark the source as failed. A result that is already held stays visible.
    pub fn set_failure(&self, cause: DataSourceError) -> bool {
        let registrations = {
            let mut state = self.state.lock();
            if state.closed || state.status != Status::InProgress {
                return false;
            }
            state.status = Status::Failure;
            state.failure = Some(cause);
            self.subscribers.snapshot()
        };

        trace!("data source failed");
        self.notify(registrations, Event::Failure);
        true
    }

    /// Update progress, clamped to `[0, 1]`.
    pub fn set_progress(&self, progress: f32) -> bool {
        let registrations = {
            let mut state = self.state.lock();
            if state.closed || state.status != Status::InProgress {
                return false;
            }
            state.progress = if progress.is_nan() {
                0.0
            } else {
                progress.clamp(0.0, 1.0)
            };
            self.subscribers.snapshot()
        };

        self.notify(registrations, Event::ProgressUpdate);
        true
    }

    /// Close the source, releasing any held result.
    ///
    /// Subscribers are told about the cancellation only if the source had not
    /// finished yet. All registrations are dropped afterwards.
    pub fn close(&self) -> bool {
        let (held, was_finished, registrations) = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            let registrations = self.subscribers.snapshot();
            self.subscribers.clear();
            (
                state.result.take(),
                state.status != Status::InProgress,
                registrations,
            )
        };

        trace!(was_finished, "data source closed");

        if let Some(held) = held {
            (self.release)(held);
        }
        if !was_finished {
            self.notify(registrations, Event::Cancellation);
        }
        true
    }

    /// Register `subscriber`, replaying the current outcome if there is one.
    ///
    /// Closed sources ignore new subscribers. A finished source replays its
    /// outcome without keeping the registration, since nothing else will
    /// happen. Registration and the replay decision happen under the state
    /// lock, so a result committed concurrently is delivered exactly once:
    /// either by its own notification or by the replay.
    pub fn subscribe(&self, subscriber: Arc<dyn DataSubscriber<T>>, executor: Arc<dyn Executor>) {
        let registration = Registration::new(subscriber, executor);

        let replay = {
            let state = self.state.lock();
            if state.closed {
                return;
            }
            match state.status {
                Status::InProgress => {
                    self.subscribers.add(registration.clone());
                    state.published.then_some(Event::NewResult)
                }
                Status::Success => Some(Event::NewResult),
                Status::Failure => Some(Event::Failure),
            }
        };

        let Some(event) = replay else {
            return;
        };
        if let Some(owner) = self.owner.upgrade() {
            subscribe::deliver(registration, owner, event);
        }
    }

    /// Remove every registration of `subscriber`.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn DataSubscriber<T>>) -> bool {
        self.subscribers.remove(subscriber)
    }

    /// Dispatch `event` to the registrations captured when it was committed.
    fn notify(&self, registrations: Vec<Registration<T>>, event: Event) {
        let Some(owner) = self.owner.upgrade() else {
            trace!(?event, "data source owner gone, skipping notification");
            return;
        };
        subscribe::notify_all(registrations, &owner, event);
    }
}

impl<T> Drop for AbstractDataSource<T> {
    fn drop(&mut self) {
        if let Some(held) = self.state.get_mut().result.take() {
            (self.release)(held);
        }
    }
}

impl<T> std::fmt::Debug for AbstractDataSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AbstractDataSource")
            .field("status", &state.status)
            .field("closed", &state.closed)
            .field("has_result", &state.result.is_some())
            .field("progress", &state.progress)
            .finish_non_exhaustive()
    }
}
