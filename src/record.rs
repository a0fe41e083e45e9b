use crate::error::RecordValidationError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Structured key/value payload attached to a record.
pub type Fields = BTreeMap<String, Value>;

/// Severity of a record. Variants are ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = RecordValidationError;

    /// Case-insensitive, accepting the aliases common front-ends use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Level::Debug),
            "info" | "information" | "notice" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warning),
            "error" | "err" | "exception" => Ok(Level::Error),
            "critical" | "crit" | "fatal" | "alert" | "emergency" => Ok(Level::Critical),
            _ => Err(RecordValidationError::UnknownLevel(s.to_string())),
        }
    }
}

/// What a front-end hands to a [`Logger`](crate::Logger) before the
/// client stamps project, context and time onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub level: Level,
    pub message: String,
    pub fields: Fields,
    /// Native timestamp from the front-end; the client's clock is used when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Event {
            level,
            message: message.into(),
            fields: Fields::new(),
            timestamp: None,
        }
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.message.trim().is_empty() {
            return Err(RecordValidationError::EmptyMessage);
        }
        if self.fields.keys().any(|k| k.is_empty()) {
            return Err(RecordValidationError::EmptyFieldKey);
        }
        Ok(())
    }
}

/// Canonical, immutable log record as it is queued, batched and shipped.
#[derive(Debug, Clone)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: Level,
    message: String,
    fields: Fields,
    context: Arc<Fields>,
    project_id: Arc<str>,
}

impl LogRecord {
    /// Build a record outside a client, e.g. for exercising a [`Transport`](crate::Transport).
    pub fn new(event: Event, context: Fields, project_id: &str) -> Self {
        let clock = Clock::default();
        Self::stamp(event, Arc::new(context), Arc::from(project_id), &clock)
    }

    pub(crate) fn stamp(
        event: Event,
        context: Arc<Fields>,
        project_id: Arc<str>,
        clock: &Clock,
    ) -> Self {
        LogRecord {
            timestamp: event.timestamp.unwrap_or_else(|| clock.now()),
            level: event.level,
            message: event.message,
            fields: event.fields,
            context,
            project_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fields supplied on the logging call itself.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Context that was active when the record was enqueued.
    pub fn context(&self) -> &Fields {
        &self.context
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Context overlaid by record fields, without copying either map.
    pub fn merged(&self) -> MergedFields<'_> {
        MergedFields {
            context: &self.context,
            fields: &self.fields,
        }
    }

    pub fn merged_fields(&self) -> Fields {
        let mut merged = (*self.context).clone();
        merged.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Look up a key the way the collector will see it.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).or_else(|| self.context.get(key))
    }
}

/// Wire form of a record: `{timestamp, level, message, fields}`.
impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            timestamp: String,
            level: Level,
            message: &'a str,
            fields: MergedFields<'a>,
        }

        Wire {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            level: self.level,
            message: &self.message,
            fields: self.merged(),
        }
        .serialize(serializer)
    }
}

/// Borrowed view of a record's context merged with its fields.
pub struct MergedFields<'a> {
    context: &'a Fields,
    fields: &'a Fields,
}

impl Serialize for MergedFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let inherited = self
            .context
            .iter()
            .filter(|(k, _)| !self.fields.contains_key(*k));
        serializer.collect_map(inherited.chain(self.fields.iter()))
    }
}

/// Hands out non-decreasing UTC timestamps for one client.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    last_micros: AtomicI64,
}

impl Clock {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let micros = now.timestamp_micros();
        let prev = self.last_micros.fetch_max(micros, Ordering::AcqRel);
        if prev <= micros {
            return now;
        }
        DateTime::from_timestamp_micros(prev).unwrap_or(now)
    }
}

/// Convert any serializable value into a field value; unserializable values become `null`.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Convert a serializable struct or map into [`Fields`].
///
/// `()`/`None` yield empty fields. Anything that does not serialize to a
/// JSON object is rejected.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> Result<Fields, RecordValidationError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(Value::Null) => Ok(Fields::new()),
        Ok(other) => Err(RecordValidationError::NotAnObject(json_kind(&other))),
        Err(e) => Err(RecordValidationError::Serialize(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build [`Fields`] from `key => value` pairs.
///
/// ```
/// let fields = logship::fields! { "user_id" => "12345", "cart_items" => 3 };
/// assert_eq!(fields["cart_items"], 3);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::record::Fields::new()
    };
    ($( $k:expr => $v:expr ),+ $(,)?) => {{
        let mut fields = $crate::record::Fields::new();
        $(
            fields.insert(($k).to_string(), $crate::record::to_value(&$v));
        )+
        fields
    }};
}
