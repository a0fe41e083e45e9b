//! Error types shared across the client.
//!
//! Only [`ConfigurationError`] is ever returned to application code. The
//! remaining types are produced and consumed inside the pipeline and end
//! up as local diagnostics and counters.

/// Returned by [`Client::new`](crate::Client::new) when the configuration
/// cannot be used. No background worker is started when this is returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("project_id must not be empty")]
    MissingProjectId,

    #[error("project_id must not contain whitespace: {0:?}")]
    InvalidProjectId(String),

    #[error("host must not be empty")]
    MissingHost,

    #[error("host is not a valid http(s) url: {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("no tokio runtime is running; create the client from within a runtime")]
    NoRuntime,
}

/// Why a single logging call was dropped before reaching the queue.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    #[error("log message must not be empty")]
    EmptyMessage,

    #[error("field keys must not be empty")]
    EmptyFieldKey,

    #[error("fields must serialize to a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("fields could not be serialized: {0}")]
    Serialize(String),

    #[error("unknown log level: {0:?}")]
    UnknownLevel(String),

    #[error("event has no message")]
    MissingMessage,

    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Outcome of a failed [`Transport::send`](crate::transport::Transport::send).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network error, timeout or a 5xx response. Retried with backoff.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// 4xx response or a batch that could not be encoded. Never retried.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

/// Result of [`Client::shutdown`](crate::Client::shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Records delivered to the collector over the client's lifetime.
    pub sent: u64,
    /// Records still queued or in flight when the shutdown deadline hit.
    pub unflushed: u64,
    /// Whether the worker had to be aborted at the deadline.
    pub timed_out: bool,
}

impl ShutdownReport {
    /// `true` when every enqueued record was resolved before the deadline.
    pub fn is_clean(&self) -> bool {
        !self.timed_out && self.unflushed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_error_kind() {
        assert!(DeliveryError::Transient("timeout".into()).is_transient());
        assert!(!DeliveryError::Permanent("400".into()).is_transient());
    }

    #[test]
    fn configuration_error_messages_name_the_field() {
        let err = ConfigurationError::InvalidValue {
            field: "batch_max_size",
            reason: "must be at least 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for batch_max_size: must be at least 1"
        );
    }
}
