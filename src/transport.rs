use crate::error::DeliveryError;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Asynchronous destination for batches of [`LogRecord`]s.
///
/// Implementations move one batch to a concrete collector. The batcher
/// calls `send` from its background task and never from an application
/// thread, so implementations may block on network I/O freely.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ship one batch in a single call.
    ///
    /// **Parameters**
    /// - `batch`: records in the order they were enqueued; never empty.
    ///
    /// **Returns**
    /// - `Ok(())` if the collector accepted the batch.
    /// - `Err(DeliveryError::Transient(..))` for failures worth retrying
    ///   (network error, timeout, 5xx). The batcher retries with backoff.
    /// - `Err(DeliveryError::Permanent(..))` when retrying cannot help
    ///   (4xx, unencodable batch). The batcher drops the batch.
    ///
    /// Must be safe to call concurrently; the batcher currently keeps a
    /// single send in flight.
    async fn send(&self, batch: &[LogRecord]) -> Result<(), DeliveryError>;
}
