use crate::adapter::Adapter;
use crate::client::Logger;
use crate::error::RecordValidationError;
use crate::record::{Event, Fields, Level};
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that forwards events to a [`Logger`].
///
/// Span fields act as bound context: every event inherits the fields of
/// its enclosing spans (root first, inner spans win), and the event's own
/// fields win over both. Events emitted by this crate are ignored so the
/// client's own diagnostics never feed back into the queue.
pub struct ShipLayer {
    logger: Logger,
}

impl ShipLayer {
    pub fn new(logger: Logger) -> Self {
        ShipLayer { logger }
    }
}

/// A `tracing` event together with the fields of its enclosing spans.
pub struct TracingEvent<'a> {
    pub event: &'a tracing::Event<'a>,
    pub span_fields: Fields,
}

/// Fields recorded on a span, stored in its extensions.
struct SpanFields(Fields);

pub fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::ERROR => Level::Error,
        tracing::Level::WARN => Level::Warning,
        tracing::Level::INFO => Level::Info,
        _ => Level::Debug,
    }
}

pub(crate) fn is_own_target(target: &str) -> bool {
    target == "logship" || target.starts_with("logship::")
}

impl Adapter for ShipLayer {
    type Native<'a> = TracingEvent<'a>;

    fn logger(&self) -> &Logger {
        &self.logger
    }

    fn convert(&self, native: TracingEvent<'_>) -> Result<Event, RecordValidationError> {
        let mut fields = native.span_fields;
        let mut message = None;
        native.event.record(&mut FieldVisitor::new(&mut fields, &mut message));

        let meta = native.event.metadata();
        fields
            .entry("target".to_string())
            .or_insert_with(|| Value::from(meta.target()));
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            fields
                .entry("source".to_string())
                .or_insert_with(|| Value::from(format!("{}:{}", file, line)));
        }

        let message = message.ok_or(RecordValidationError::MissingMessage)?;
        Ok(Event::new(map_level(meta.level()), message).with_fields(fields))
    }
}

impl<S> Layer<S> for ShipLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Fields::new();
        let mut message = None;
        attrs.record(&mut FieldVisitor::new(&mut fields, &mut message));
        if let Some(message) = message {
            fields.insert("message".to_string(), Value::String(message));
        }
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            let mut message = None;
            values.record(&mut FieldVisitor::new(fields, &mut message));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_own_target(meta.target()) || !self.logger.is_enabled(map_level(meta.level())) {
            return;
        }

        let mut span_fields = Fields::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }

        self.forward(TracingEvent { event, span_fields });
    }
}

/// Collects `tracing` fields into [`Fields`]; `message` is kept apart.
pub(crate) struct FieldVisitor<'a> {
    fields: &'a mut Fields,
    message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    pub(crate) fn new(fields: &'a mut Fields, message: &'a mut Option<String>) -> Self {
        FieldVisitor { fields, message }
    }

    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(text)) => *self.message = Some(text),
            ("message", other) => *self.message = Some(other.to_string()),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    // Non-finite floats have no JSON form and become `null`.
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    /// Errors are rendered with their source chain, outermost first.
    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut rendered = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        self.put(field, Value::String(rendered));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }
}
