//! Execution contexts for subscriber callbacks.
//!
//! A data source never calls a subscriber directly. Every notification is
//! packaged as a [`Task`] and handed to the [`Executor`] the subscriber was
//! registered with.
//!
//! - [`CallerThreadExecutor`] runs the task inline on the notifying thread.
//! - [`SerialExecutor`] runs tasks one at a time, in submission order, on a
//!   tokio task.
//!
//! Implementations must run the tasks of one executor in submission order,
//! since a subscriber relies on that to see its events in commit order.

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a [`Task`].
pub trait Executor: Send + Sync {
    /// Submit a task for execution.
    fn execute(&self, task: Task);
}

/// Runs tasks immediately on the calling thread.
///
/// Combinators subscribe to their children with this executor so that child
/// events are processed synchronously from the child's own callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerThreadExecutor;

impl Executor for CallerThreadExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Runs tasks sequentially on a dedicated tokio task.
///
/// Tasks run in the order they were submitted, which gives every subscriber
/// registered on the same `SerialExecutor` a strictly ordered event stream.
/// Dropping every clone of the executor stops the worker once the queue drains.
///
/// # Example
///
/// ```
/// use datasource::{Executor, SerialExecutor};
///
/// # tokio_test::block_on(async {
/// let executor = SerialExecutor::spawn();
/// executor.execute(Box::new(|| println!("first")));
/// executor.execute(Box::new(|| println!("second")));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct SerialExecutor {
    sender: mpsc::UnboundedSender<Task>,
}

impl SerialExecutor {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime, like `tokio::spawn`.
    pub fn spawn() -> Self {
        Self::spawn_on(&Handle::current())
    }

    /// Spawn the worker on the given runtime.
    pub fn spawn_on(handle: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();

        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
            trace!("serial executor drained, worker exiting");
        });

        Self { sender }
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("serial executor worker is gone, dropping task");
        }
    }
}
