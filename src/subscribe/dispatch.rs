//! Delivery of events to subscribers through their executors.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use super::Registration;
use crate::source::DataSourceRef;

/// Kind of notification, decided while the source state is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    NewResult,
    Failure,
    Cancellation,
    ProgressUpdate,
}

/// Submit `event` to a single registration.
pub(crate) fn deliver<T: 'static>(
    registration: Registration<T>,
    source: DataSourceRef<T>,
    event: Event,
) {
    let Registration {
        subscriber,
        executor,
    } = registration;

    executor.execute(Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
            Event::NewResult => subscriber.on_new_result(&source),
            Event::Failure => subscriber.on_failure(&source),
            Event::Cancellation => subscriber.on_cancellation(&source),
            Event::ProgressUpdate => subscriber.on_progress_update(&source),
        }));

        if let Err(payload) = outcome {
            error!(
                ?event,
                panic = %panic_message(payload.as_ref()),
                "data subscriber panicked"
            );
        }
    }));
}

/// Submit `event` to every registration, in order.
pub(crate) fn notify_all<T: 'static>(
    registrations: Vec<Registration<T>>,
    source: &DataSourceRef<T>,
    event: Event,
) {
    for registration in registrations {
        deliver(registration, source.clone(), event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
