#![allow(dead_code)]

use async_trait::async_trait;
use logship::{DeliveryError, LogRecord, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// One call the batcher made into [`MockTransport`].
#[derive(Clone)]
pub struct Call {
    pub at: Instant,
    pub records: Vec<LogRecord>,
}

/// Transport that records every call and answers from a script.
///
/// Once the script runs out every call succeeds, unless `always` is set.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    always: Option<DeliveryError>,
    latency: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(responses: Vec<Result<(), DeliveryError>>) -> Self {
        MockTransport {
            script: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn failing(err: DeliveryError) -> Self {
        MockTransport {
            always: Some(err),
            ..Self::default()
        }
    }

    /// Every call takes `latency` before it is answered.
    pub fn slow(latency: Duration) -> Self {
        MockTransport {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<LogRecord> {
        self.calls().into_iter().flat_map(|c| c.records).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, batch: &[LogRecord]) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            records: batch.to_vec(),
        });
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        if let Some(err) = &self.always {
            return Err(err.clone());
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// A `tracing` event the client emitted about itself.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: tracing::Level,
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Layer that keeps every event, for asserting on local diagnostics.
///
/// Installed as the thread default, so it sees the batcher too on a
/// current-thread runtime.
#[derive(Clone, Default)]
pub struct Diagnostics(Arc<Mutex<Vec<Diagnostic>>>);

impl Diagnostics {
    pub fn install() -> (Self, DefaultGuard) {
        let diagnostics = Diagnostics::default();
        let guard = tracing::subscriber::set_default(Registry::default().with(diagnostics.clone()));
        (diagnostics, guard)
    }

    pub fn with_message(&self, message: &str) -> Vec<Diagnostic> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.message == message)
            .cloned()
            .collect()
    }
}

struct Collect<'a>(&'a mut Diagnostic);

impl Visit for Collect<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.0.message = rendered;
        } else {
            self.0.fields.insert(field.name().to_string(), rendered);
        }
    }
}

impl<S: Subscriber> Layer<S> for Diagnostics {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut diagnostic = Diagnostic {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: String::new(),
            fields: HashMap::new(),
        };
        event.record(&mut Collect(&mut diagnostic));
        self.0.lock().unwrap().push(diagnostic);
    }
}
