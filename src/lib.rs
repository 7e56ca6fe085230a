//! # Edgeflow
//!
//! Message pipelines for edge devices.
//!
//! An [`Envelope`] arrives from some transport, is decoded into the configured
//! target type and handed through an ordered chain of [`Transform`]s. The chain
//! can be replaced at any time without blocking or disturbing runs in flight.
//!
//! ## Why Edgeflow?
//!
//! - **Fresh values per message** - Every envelope decodes into a newly built value
//! - **Lock-free reconfiguration** - Runs work on an immutable chain snapshot
//! - **Typed outcomes** - Decode, config and pipeline failures map to distinct status classes
//! - **Store and forward** - Failed deliveries can be kept and resent later
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use edgeflow::{DeliverySender, FilterByDeviceName, PipelineRuntime, TargetType};
//!
//! let sender = DeliverySender::from_config(&config.delivery.unwrap())?;
//! let runtime = PipelineRuntime::new(TargetType::event())
//!     .with_transforms(vec![
//!         Arc::new(FilterByDeviceName::new(["thermostat"])),
//!         Arc::new(sender),
//!     ]);
//!
//! runtime.process_message(&envelope).await?;
//! ```
//!
//! ## Store and Forward
//!
//! With `persist_on_failure`, a failed send leaves a [`RetryRecord`] behind.
//! The runtime appends it to its [`RetryStore`] and [`StoreForward`] resends it:
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryRetryStore::new());
//! let runtime = runtime.with_retry_store(store.clone());
//!
//! let forward = StoreForward::from_config(store, transport, &config.store_forward);
//! tokio::spawn(async move { forward.run().await });
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` - Enable the SQLite-backed retry store

pub mod config;
pub mod context;
pub mod data;
pub mod decode;
pub mod envelope;
pub mod event;
pub mod forward;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod telemetry;
pub mod transform;
pub mod transforms;
pub mod transport;

pub use config::{ConfigError, DeliveryConfig, RuntimeConfig, StoreForwardConfig};
pub use context::PipelineContext;
pub use data::{Data, Marshal, SerializeError};
pub use decode::{decode, DecodeError, Decoded, PayloadFormat, TargetType};
pub use envelope::{
    ContentType, Envelope, CONTENT_TYPE_BINARY, CONTENT_TYPE_CBOR, CONTENT_TYPE_JSON,
};
pub use event::{Event, HasEventId, Reading};
pub use forward::{ForwardReport, StoreForward};
pub use registry::{ChainSnapshot, TransformChain, TransformRegistry};
pub use retry::{RetryPolicy, RetryRecord};
pub use runtime::{execute, PipelineRuntime, RuntimeError, StatusClass};
pub use store::{MemoryRetryStore, RecordId, RetryStore, StoreError, StoredRecord};
pub use transform::{Flow, Input, Transform};
pub use transforms::{
    fn_transform, DeliverySender, FilterByDeviceName, FilterByReadingName, FnTransform,
    TransformToJson,
};
pub use transport::{
    DeliveryError, Destination, HttpTransport, HttpTransportBuilder, Transport,
    CORRELATION_HEADER,
};

#[cfg(feature = "sqlite")]
pub use store::SqliteRetryStore;
