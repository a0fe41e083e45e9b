//! Log-shipping client: accepts structured records from any number of
//! concurrent callers, batches them on a background tokio task and ships
//! them to a remote collector with bounded latency and retries.
//!
//! Front-ends (direct calls, `tracing`, `log`, JSON event dicts) feed a
//! [`Logger`] through the [`adapter::Adapter`] capability.

pub mod record;
pub mod error;
pub mod config;
pub mod context;
pub mod transport;
pub mod noop;
pub mod adapter;
pub mod client;
pub mod stats;
pub mod event_dict;
pub mod layer;
pub mod init;

mod batcher;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "log")]
pub mod log_bridge;

pub use batcher::Backoff;
pub use client::{Client, Logger};
pub use config::ClientConfig;
pub use error::{ConfigurationError, DeliveryError, RecordValidationError, ShutdownReport};
pub use record::{Event, Fields, Level, LogRecord};
pub use stats::StatsSnapshot;
pub use transport::Transport;
