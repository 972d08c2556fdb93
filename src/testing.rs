//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use parking_lot::Mutex;

use crate::error::DataSourceError;
use crate::executor::{Executor, Task};
use crate::source::{DataSource, DataSourceRef, SimpleDataSource, Supplier};
use crate::subscribe::DataSubscriber;

/// Executor that queues tasks until the test runs them.
#[derive(Default)]
pub(crate) struct QueueExecutor {
    tasks: Mutex<VecDeque<Task>>,
}

impl QueueExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run queued tasks, including ones queued while running, and return how many ran.
    pub(crate) fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for QueueExecutor {
    fn execute(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

/// What a [`RecordingSubscriber`] saw, with the source state read at callback time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded<T> {
    NewResult { result: Option<T>, finished: bool },
    Failure,
    Cancellation,
    Progress(f32),
}

pub(crate) struct RecordingSubscriber<T> {
    events: Mutex<Vec<Recorded<T>>>,
}

impl<T: Clone + Send + Sync + 'static> RecordingSubscriber<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn handle(self: &Arc<Self>) -> Arc<dyn DataSubscriber<T>> {
        self.clone()
    }

    pub(crate) fn events(&self) -> Vec<Recorded<T>> {
        self.events.lock().clone()
    }

    /// Drain the events recorded so far.
    pub(crate) fn take(&self) -> Vec<Recorded<T>> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl<T: Clone + Send + Sync + 'static> DataSubscriber<T> for RecordingSubscriber<T> {
    fn on_new_result(&self, data_source: &DataSourceRef<T>) {
        self.events.lock().push(Recorded::NewResult {
            result: data_source.result(),
            finished: data_source.is_finished(),
        });
    }

    fn on_failure(&self, _data_source: &DataSourceRef<T>) {
        self.events.lock().push(Recorded::Failure);
    }

    fn on_cancellation(&self, _data_source: &DataSourceRef<T>) {
        self.events.lock().push(Recorded::Cancellation);
    }

    fn on_progress_update(&self, data_source: &DataSourceRef<T>) {
        self.events
            .lock()
            .push(Recorded::Progress(data_source.progress()));
    }
}

/// Collects every value passed to a release hook.
#[derive(Clone)]
pub(crate) struct ReleaseLog<T> {
    released: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + Sync + 'static> ReleaseLog<T> {
    pub(crate) fn new() -> Self {
        Self {
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn hook(&self) -> impl Fn(T) + Send + Sync + 'static {
        let released = self.released.clone();
        move |value| released.lock().push(value)
    }

    pub(crate) fn released(&self) -> Vec<T> {
        self.released.lock().clone()
    }

    /// A leaf whose released values land in this log.
    pub(crate) fn source(&self) -> Arc<SimpleDataSource<T>> {
        SimpleDataSource::with_release_hook(self.hook())
    }
}

/// Supplier that hands out one pre-built source and counts calls.
pub(crate) struct FixedSupplier<T> {
    source: DataSourceRef<T>,
    calls: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> FixedSupplier<T> {
    pub(crate) fn new(source: &Arc<SimpleDataSource<T>>) -> Arc<Self> {
        Arc::new(Self {
            source: source.clone(),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send + Sync + 'static> Supplier<T> for FixedSupplier<T> {
    fn get(&self) -> DataSourceRef<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.source.clone()
    }
}

/// Intermediate results each child publishes in [`race_children`].
const RACE_INTERMEDIATES: u32 = 3;

/// Drive every child from its own thread while another thread closes `source`.
///
/// Child `i` publishes `i * 10 + k` for each intermediate `k`, then either
/// finishes with `i * 10 + RACE_INTERMEDIATES` (when `finishes(i)`) or fails.
/// Once all threads are done, `source` and every child are closed so that
/// each value ends up released. Returns every value handed to a child.
pub(crate) fn race_children(
    children: &[Arc<SimpleDataSource<u32>>],
    source: &DataSourceRef<u32>,
    finishes: impl Fn(usize) -> bool,
) -> Vec<u32> {
    let start = Barrier::new(children.len() + 1);
    let published = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for (i, child) in children.iter().enumerate() {
            let finish = finishes(i);
            let (start, published) = (&start, &published);
            scope.spawn(move || {
                let base = i as u32 * 10;
                start.wait();
                for k in 0..RACE_INTERMEDIATES {
                    child.set_progress((k + 1) as f32 / (RACE_INTERMEDIATES + 1) as f32);
                    child.set_result(base + k, false);
                    published.lock().push(base + k);
                }
                if finish {
                    child.set_result(base + RACE_INTERMEDIATES, true);
                    published.lock().push(base + RACE_INTERMEDIATES);
                } else {
                    child.set_failure(DataSourceError::failure("child failed"));
                }
            });
        }
        scope.spawn(|| {
            start.wait();
            thread::yield_now();
            source.close();
        });
    });

    source.close();
    for child in children {
        child.close();
    }
    published.into_inner()
}

/// Number of failure and cancellation events in `events`.
pub(crate) fn terminal_events<T>(events: &[Recorded<T>]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, Recorded::Failure | Recorded::Cancellation))
        .count()
}
