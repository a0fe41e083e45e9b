use crate::adapter::Adapter;
use crate::client::Logger;
use crate::error::RecordValidationError;
use crate::layer::is_own_target;
use crate::record::{Event, Fields, Level};
use log::kv::{self, VisitSource};
use serde_json::Value;

/// `log` crate front-end: intercepts `log::Record`s the way a handler
/// attached to a standard logger would.
///
/// Key-values attached with `log`'s `kv` syntax become fields, alongside
/// `target` and, when known, `module_path` and `source` (`file:line`).
pub struct LogBridge {
    logger: Logger,
}

impl LogBridge {
    pub fn new(logger: Logger) -> Self {
        LogBridge { logger }
    }

    /// Register as the process-wide `log` logger.
    pub fn install(logger: Logger, max_level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(LogBridge::new(logger)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

pub fn map_level(level: log::Level) -> Level {
    match level {
        log::Level::Error => Level::Error,
        log::Level::Warn => Level::Warning,
        log::Level::Info => Level::Info,
        log::Level::Debug | log::Level::Trace => Level::Debug,
    }
}

struct FieldCollector<'f> {
    fields: &'f mut Fields,
}

impl<'kvs> VisitSource<'kvs> for FieldCollector<'_> {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let json = serde_json::to_value(&value).unwrap_or_else(|_| Value::String(value.to_string()));
        self.fields.insert(key.as_str().to_string(), json);
        Ok(())
    }
}

impl Adapter for LogBridge {
    type Native<'a> = &'a log::Record<'a>;

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn convert<'a>(&self, record: &'a log::Record<'a>) -> Result<Event, RecordValidationError> {
        let mut fields = Fields::new();
        record
            .key_values()
            .visit(&mut FieldCollector { fields: &mut fields })
            .map_err(|e| RecordValidationError::Serialize(e.to_string()))?;

        fields
            .entry("target".to_string())
            .or_insert_with(|| Value::from(record.target()));
        if let Some(module_path) = record.module_path() {
            fields
                .entry("module_path".to_string())
                .or_insert_with(|| Value::from(module_path));
        }
        if let (Some(file), Some(line)) = (record.file(), record.line()) {
            fields
                .entry("source".to_string())
                .or_insert_with(|| Value::from(format!("{}:{}", file, line)));
        }

        Ok(Event::new(map_level(record.level()), record.args().to_string()).with_fields(fields))
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        !is_own_target(metadata.target()) && self.logger.is_enabled(map_level(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            self.forward(record);
        }
    }

    // Delivery is asynchronous; use `Client::flush` to wait for it.
    fn flush(&self) {}
}
