use crate::client::Logger;
use crate::error::RecordValidationError;
use crate::record::Event;

/// Bridge from a logging front-end's native record shape to a [`Logger`].
///
/// Implementations translate shape and level only: batching, retries
/// and transport belong to the client. The direct front-end is
/// [`Logger`] itself; [`ShipLayer`](crate::layer::ShipLayer),
/// [`EventDictAdapter`](crate::event_dict::EventDictAdapter) and, with
/// the `log` feature, `LogBridge` cover the others.
pub trait Adapter {
    /// The record type the front-end produces.
    type Native<'a>;

    /// Logger records are submitted to.
    fn logger(&self) -> &Logger;

    /// Turn a native record into an [`Event`].
    fn convert(&self, native: Self::Native<'_>) -> Result<Event, RecordValidationError>;

    /// Convert and submit. Conversion failures become local diagnostics.
    fn forward(&self, native: Self::Native<'_>) {
        match self.convert(native) {
            Ok(event) => self.logger().submit(event),
            Err(err) => self.logger().reject(err),
        }
    }
}
