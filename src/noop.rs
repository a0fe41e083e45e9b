use crate::error::DeliveryError;
use crate::record::LogRecord;
use crate::transport::Transport;
use async_trait::async_trait;

/// A transport that accepts and discards every batch.
///
/// Useful for measuring the overhead of the client itself without any
/// network I/O, and for tests that don't care about delivery.
#[derive(Clone, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, _batch: &[LogRecord]) -> Result<(), DeliveryError> {
        Ok(())
    }
}
