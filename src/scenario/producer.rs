//! Simulated producers driven by tokio tasks.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use super::{Outcome, ProducerSpec};
use crate::error::DataSourceError;
use crate::source::{DataSource, DataSourceRef, SimpleDataSource, Supplier};

/// Payload published by a simulated producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Name of the producer that made the frame.
    pub producer: String,
    /// Position in the producer's output, starting at 0.
    pub sequence: u32,
    pub is_final: bool,
}

/// Supplier that starts a fresh simulated producer on every `get`.
///
/// The producer sleeps for its configured delay, split evenly between its
/// intermediate frames and its outcome, and reports progress along the way.
/// It stops as soon as its data source is closed.
#[derive(Debug, Clone)]
pub struct SimulatedProducer {
    spec: ProducerSpec,
    runtime: Handle,
}

impl SimulatedProducer {
    pub fn new(spec: ProducerSpec, runtime: Handle) -> Self {
        Self { spec, runtime }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

impl Supplier<Frame> for SimulatedProducer {
    fn get(&self) -> DataSourceRef<Frame> {
        let source = SimpleDataSource::<Frame>::create();
        debug!(producer = %self.spec.name, "starting simulated producer");
        self.runtime.spawn(drive(self.spec.clone(), source.clone()));
        source
    }
}

/// Number of sleeps and the length of each one.
fn schedule(spec: &ProducerSpec) -> (u32, Duration) {
    let steps = spec.intermediate.saturating_add(1);
    (steps, spec.delay / steps)
}

async fn drive(spec: ProducerSpec, source: Arc<SimpleDataSource<Frame>>) {
    let (steps, step) = schedule(&spec);

    for sequence in 0..spec.intermediate {
        tokio::time::sleep(step).await;
        if source.is_closed() {
            trace!(producer = %spec.name, "source closed, producer stopping");
            return;
        }

        source.set_progress((sequence + 1) as f32 / steps as f32);
        source.set_result(
            Frame {
                producer: spec.name.clone(),
                sequence,
                is_final: false,
            },
            false,
        );
    }

    tokio::time::sleep(step).await;
    if source.is_closed() {
        trace!(producer = %spec.name, "source closed, producer stopping");
        return;
    }

    match spec.outcome {
        Outcome::Success => {
            source.set_result(
                Frame {
                    producer: spec.name.clone(),
                    sequence: spec.intermediate,
                    is_final: true,
                },
                true,
            );
        }
        Outcome::Failure => {
            let message = spec
                .message
                .clone()
                .unwrap_or_else(|| format!("{} failed", spec.name));
            source.set_failure(DataSourceError::failure(message));
        }
        Outcome::Empty => {
            source.finish_empty();
        }
    }
    debug!(producer = %spec.name, outcome = ?spec.outcome, "simulated producer done");
}
