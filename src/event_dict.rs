use crate::adapter::Adapter;
use crate::client::Logger;
use crate::error::RecordValidationError;
use crate::record::{Event, Fields, Level};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Adapter for structured loggers that hand over a JSON event dict.
///
/// Recognised keys: `event` (or `message`) for the message, `level`
/// (any name [`Level`] parses, `INFO` when absent) and an RFC 3339
/// `timestamp`. Every other key becomes a field, overriding fields bound
/// with [`bind`](Self::bind).
#[derive(Clone)]
pub struct EventDictAdapter {
    logger: Logger,
    bound: Fields,
}

impl EventDictAdapter {
    pub fn new(logger: Logger) -> Self {
        EventDictAdapter {
            logger,
            bound: Fields::new(),
        }
    }

    /// New adapter carrying `fields` in addition to the already bound ones.
    pub fn bind(&self, fields: Fields) -> Self {
        let mut bound = self.bound.clone();
        bound.extend(fields);
        EventDictAdapter {
            logger: self.logger.clone(),
            bound,
        }
    }

    pub fn bound(&self) -> &Fields {
        &self.bound
    }

    pub fn log(&self, event: Map<String, Value>) {
        self.forward(event);
    }

    /// Processor-chain form: ship a copy and hand the dict back unchanged
    /// for the next processor.
    pub fn process(&self, event: Map<String, Value>) -> Map<String, Value> {
        self.forward(event.clone());
        event
    }
}

impl Adapter for EventDictAdapter {
    type Native<'a> = Map<String, Value>;

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn convert(&self, mut event: Map<String, Value>) -> Result<Event, RecordValidationError> {
        let message = match event.remove("event").or_else(|| event.remove("message")) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => return Err(RecordValidationError::MissingMessage),
            Some(other) => other.to_string(),
        };

        let level = match event.remove("level") {
            Some(Value::String(name)) => name.parse()?,
            Some(other) => return Err(RecordValidationError::UnknownLevel(other.to_string())),
            None => Level::Info,
        };

        let timestamp = match event.remove("timestamp") {
            Some(Value::String(raw)) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| RecordValidationError::InvalidTimestamp {
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?
                    .with_timezone(&Utc),
            ),
            Some(other) => {
                return Err(RecordValidationError::InvalidTimestamp {
                    value: other.to_string(),
                    reason: "expected an RFC 3339 string".to_string(),
                })
            }
            None => None,
        };

        let mut fields = self.bound.clone();
        fields.extend(event);

        Ok(Event {
            level,
            message,
            fields,
            timestamp,
        })
    }
}
