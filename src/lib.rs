//! # datasource
//!
//! Incrementally-refinable, cancelable result containers with multi-subscriber
//! fan-out, plus combinators that compose several producers into one.
//!
//! A [`DataSource`] stands for one asynchronous computation. It may publish
//! intermediate results before its final one, fail, or be cancelled by
//! closing it. Consumers either poll it or subscribe a [`DataSubscriber`]
//! whose callbacks run on an [`Executor`] of their choosing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Consumers                           │
//! │   poll: result() / progress()     subscribe(subscriber, ex) │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!                 ▼                             ▼
//! ┌─────────────────────────────┐   ┌───────────────────────────┐
//! │ FirstAvailable (fallback)   │   │ subscribe                 │
//! │ IncreasingQuality (ranking) │   │ (registry + dispatch)     │
//! └───────────────┬─────────────┘   └─────────────┬─────────────┘
//!                 │ children                      │ tasks
//!                 ▼                               ▼
//! ┌─────────────────────────────┐   ┌───────────────────────────┐
//! │ AbstractDataSource          │   │ executor                  │
//! │ SimpleDataSource (leaves)   │   │ CallerThread | Serial     │
//! └─────────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! - **[`source`]**: the [`DataSource`] contract, the [`AbstractDataSource`]
//!   state machine, the settable [`SimpleDataSource`], the two combinator
//!   suppliers and the [`sources`] helpers
//! - **[`subscribe`]**: the [`DataSubscriber`] trait, the closure-driven
//!   [`BaseDataSubscriber`], and panic-safe delivery through executors
//! - **[`executor`]**: where subscriber callbacks run
//! - **[`error`]**: [`DataSourceError`], shared by failures and helpers
//! - **[`scenario`]**: simulated producer races, used by the
//!   `datasource-race` binary
//!
//! ## Usage
//!
//! ### Falling back between producers
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use datasource::sources::{failed_data_source_supplier, immediate_data_source, wait_for_final_result};
//! use datasource::{DataSourceError, FirstAvailableDataSourceSupplier, Supplier};
//!
//! let suppliers: Vec<Arc<dyn Supplier<u64>>> = vec![
//!     failed_data_source_supplier(DataSourceError::failure("memory cache miss")),
//!     Arc::new(|| immediate_data_source(4096)),
//! ];
//! let source = FirstAvailableDataSourceSupplier::new(suppliers).unwrap().get();
//!
//! let size = wait_for_final_result(&source, Some(Duration::from_secs(1))).unwrap();
//! assert_eq!(size, Some(4096));
//! source.close();
//! ```
//!
//! ### Observing on a tokio runtime
//!
//! ```
//! use std::sync::Arc;
//! use datasource::{BaseDataSubscriber, DataSource, SerialExecutor, SimpleDataSource};
//!
//! # tokio_test::block_on(async {
//! let source = SimpleDataSource::<u32>::create();
//! let subscriber = BaseDataSubscriber::<u32>::builder()
//!     .on_new_result(|ds| println!("result: {:?}", ds.result()))
//!     .build();
//!
//! source.subscribe(Arc::new(subscriber), Arc::new(SerialExecutor::spawn()));
//! source.set_result(1, true);
//! # });
//! ```

pub mod error;
pub mod executor;
pub mod scenario;
pub mod source;
pub mod subscribe;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use error::DataSourceError;
pub use executor::{CallerThreadExecutor, Executor, SerialExecutor, Task};
pub use source::{
    sources, AbstractDataSource, DataSource, DataSourceRef, FirstAvailableDataSourceSupplier,
    IncreasingQualityDataSourceSupplier, IncreasingQualityDataSourceSupplierBuilder,
    SimpleDataSource, Supplier,
};
pub use subscribe::{BaseDataSubscriber, BaseDataSubscriberBuilder, DataSubscriber};
