use crate::batcher::Batcher;
use crate::config::ClientConfig;
use crate::context;
use crate::error::{ConfigurationError, RecordValidationError, ShutdownReport};
use crate::record::{self, Clock, Event, Fields, Level, LogRecord};
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::Transport;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// State shared by every logger derived from one client.
struct Shared {
    sender: mpsc::Sender<LogRecord>,
    flush_tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
    config: ClientConfig,
    project_id: Arc<str>,
    stats: Arc<Stats>,
    clock: Clock,
    closed: AtomicBool,
}

/// Cheap, clonable handle for submitting records to a [`Client`].
///
/// Loggers never block and never fail: records below the minimum level,
/// invalid records, records that do not fit in the queue and records
/// submitted after shutdown has begun are all dropped locally.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    bound: Arc<Fields>,
    minimum_level: Level,
}

impl Logger {
    /// A logger carrying `fields` on top of this logger's own bound context.
    ///
    /// The receiver is left untouched, so any number of derived loggers can
    /// coexist.
    pub fn with_context(&self, fields: Fields) -> Logger {
        let mut bound = (*self.bound).clone();
        bound.extend(fields);
        Logger {
            shared: Arc::clone(&self.shared),
            bound: Arc::new(bound),
            minimum_level: self.minimum_level,
        }
    }

    /// A logger with its own minimum level. It can only be raised above
    /// the client's configured level, never lowered.
    pub fn with_minimum_level(&self, level: Level) -> Logger {
        Logger {
            shared: Arc::clone(&self.shared),
            bound: Arc::clone(&self.bound),
            minimum_level: level.max(self.shared.config.minimum_level),
        }
    }

    pub fn minimum_level(&self) -> Level {
        self.minimum_level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.minimum_level
    }

    /// Fields bound through [`with_context`](Self::with_context).
    pub fn bound_context(&self) -> &Fields {
        &self.bound
    }

    pub fn debug(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Info, message, fields);
    }

    pub fn warning(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Warning, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Error, message, fields);
    }

    pub fn critical(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Critical, message, fields);
    }

    pub fn log(&self, level: Level, message: impl Into<String>, fields: Fields) {
        if !self.is_enabled(level) {
            return;
        }
        self.submit(Event::new(level, message).with_fields(fields));
    }

    /// Log with fields taken from any serializable struct or map.
    pub fn log_serialized<T: Serialize + ?Sized>(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: &T,
    ) {
        if !self.is_enabled(level) || self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        match record::to_fields(fields) {
            Ok(fields) => self.submit(Event::new(level, message).with_fields(fields)),
            Err(err) => {
                Stats::incr(&self.shared.stats.submitted);
                self.reject(err);
            }
        }
    }

    /// Stamp and enqueue an event produced by a front-end.
    pub fn submit(&self, event: Event) {
        if !self.is_enabled(event.level) || self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        let stats = &self.shared.stats;
        Stats::incr(&stats.submitted);

        if let Err(err) = event.validate() {
            self.reject(err);
            return;
        }

        let record = LogRecord::stamp(
            event,
            self.context_snapshot(),
            Arc::clone(&self.shared.project_id),
            &self.shared.clock,
        );

        match self.shared.sender.try_send(record) {
            Ok(()) => Stats::incr(&stats.enqueued),
            Err(TrySendError::Full(_)) => {
                let dropped = stats.dropped_overflow.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 1000 == 0 {
                    warn!(
                        dropped,
                        capacity = self.shared.config.queue_capacity,
                        "log queue full, dropping newest record"
                    );
                }
            }
            // The batcher is gone; shutdown is in progress.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Account for a record a front-end could not convert.
    pub fn reject(&self, err: RecordValidationError) {
        Stats::incr(&self.shared.stats.rejected);
        warn!(error = %err, "dropping invalid log record");
    }

    /// Wait until every record enqueued before this call has been sent or dropped.
    ///
    /// The request travels outside the record queue, so it never takes a
    /// slot from a concurrent caller.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.shared.flush_tx.send(ack).is_ok() {
            let _ = done.await;
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Scoped context overlaid by this logger's bound context.
    fn context_snapshot(&self) -> Arc<Fields> {
        let scoped = context::current();
        if self.bound.is_empty() {
            return scoped;
        }
        if scoped.is_empty() {
            return Arc::clone(&self.bound);
        }
        let mut merged = (*scoped).clone();
        merged.extend(self.bound.iter().map(|(k, v)| (k.clone(), v.clone())));
        Arc::new(merged)
    }
}

/// Entry point: owns the record queue and the background batcher.
///
/// Dropping a client without calling [`shutdown`](Self::shutdown) lets
/// the batcher drain in the background for as long as the runtime lives.
pub struct Client {
    logger: Logger,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Client {
    /// Build a client shipping to the collector over HTTP.
    ///
    /// **Returns**
    /// - `Err(ConfigurationError)` if the config is invalid or no tokio
    ///   runtime is running. Nothing is spawned in that case.
    #[cfg(feature = "http")]
    pub fn new(config: ClientConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let transport = crate::http::HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client using a custom [`Transport`].
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;

        let (sender, rx) = mpsc::channel(config.queue_capacity);
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Stats::default());

        let batcher = Batcher::new(
            &config,
            rx,
            flush_rx,
            shutdown_rx,
            transport,
            Arc::clone(&stats),
        );
        let worker = runtime.spawn(batcher.run());

        debug!(
            project_id = %config.project_id,
            host = %config.host,
            batch_max_size = config.batch_max_size,
            "log client started"
        );

        let shared = Arc::new(Shared {
            sender,
            flush_tx,
            project_id: Arc::from(config.project_id.as_str()),
            stats,
            clock: Clock::default(),
            closed: AtomicBool::new(false),
            config,
        });
        let logger = Logger {
            minimum_level: shared.config.minimum_level,
            shared,
            bound: Arc::new(Fields::new()),
        };

        Ok(Client {
            logger,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    /// The root logger, carrying no bound context.
    pub fn logger(&self) -> Logger {
        self.logger.clone()
    }

    pub fn with_context(&self, fields: Fields) -> Logger {
        self.logger.with_context(fields)
    }

    pub fn debug(&self, message: impl Into<String>, fields: Fields) {
        self.logger.debug(message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: Fields) {
        self.logger.info(message, fields);
    }

    pub fn warning(&self, message: impl Into<String>, fields: Fields) {
        self.logger.warning(message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Fields) {
        self.logger.error(message, fields);
    }

    pub fn critical(&self, message: impl Into<String>, fields: Fields) {
        self.logger.critical(message, fields);
    }

    pub fn log(&self, level: Level, message: impl Into<String>, fields: Fields) {
        self.logger.log(level, message, fields);
    }

    pub fn log_serialized<T: Serialize + ?Sized>(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: &T,
    ) {
        self.logger.log_serialized(level, message, fields);
    }

    pub async fn flush(&self) {
        self.logger.flush().await;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.logger.stats()
    }

    pub fn config(&self) -> &ClientConfig {
        self.logger.config()
    }

    /// Stop accepting records, ship what is queued and stop the batcher.
    ///
    /// Draining is bounded by `shutdown_timeout`. Records still pending at
    /// the deadline are dropped, counted in `dropped_shutdown` and reported.
    /// Logging through surviving [`Logger`]s afterwards is a no-op.
    pub async fn shutdown(mut self) -> ShutdownReport {
        let shared = Arc::clone(&self.logger.shared);
        shared.closed.store(true, Ordering::Release);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let timeout = shared.config.shutdown_timeout;
        let mut timed_out = false;
        if let Some(mut worker) = self.worker.take() {
            match tokio::time::timeout(timeout, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "log batcher terminated abnormally"),
                Err(_) => {
                    timed_out = true;
                    worker.abort();
                    let _ = worker.await;
                }
            }
        }

        let unflushed = shared.stats.outstanding();
        if unflushed > 0 {
            Stats::add(&shared.stats.dropped_shutdown, unflushed as usize);
            warn!(
                unflushed,
                ?timeout,
                "shutdown deadline expired before all log records were flushed"
            );
        }

        ShutdownReport {
            sent: shared.stats.snapshot().sent,
            unflushed,
            timed_out,
        }
    }
}

impl crate::adapter::Adapter for Logger {
    type Native<'a> = Event;

    fn logger(&self) -> &Logger {
        self
    }

    fn convert(&self, native: Event) -> Result<Event, RecordValidationError> {
        Ok(native)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::noop::NoopTransport;

    fn config() -> ClientConfig {
        ClientConfig::new("proj", "http://localhost:4005")
    }

    #[test]
    fn requires_a_runtime() {
        let result = Client::with_transport(config(), Arc::new(NoopTransport));
        assert!(matches!(result, Err(ConfigurationError::NoRuntime)));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_spawning() {
        let result = Client::with_transport(
            ClientConfig::new("proj", ""),
            Arc::new(NoopTransport),
        );
        assert!(matches!(result, Err(ConfigurationError::MissingHost)));
    }

    #[tokio::test]
    async fn with_context_does_not_mutate_receiver() {
        let client = Client::with_transport(config(), Arc::new(NoopTransport)).unwrap();
        let root = client.logger();
        let session = root.with_context(fields! { "session_id" => "sess_abc123" });
        let request = session.with_context(fields! { "request_id" => "req_789" });

        assert!(root.bound_context().is_empty());
        assert_eq!(session.bound_context().len(), 1);
        assert_eq!(request.bound_context().len(), 2);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn minimum_level_can_only_be_raised() {
        let client = Client::with_transport(
            config().with_minimum_level(Level::Warning),
            Arc::new(NoopTransport),
        )
        .unwrap();
        let logger = client.logger();
        assert!(!logger.with_minimum_level(Level::Debug).is_enabled(Level::Info));
        assert!(!logger.with_minimum_level(Level::Error).is_enabled(Level::Warning));
        assert!(logger.is_enabled(Level::Warning));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn below_level_and_invalid_calls_have_no_queue_effect() {
        let client = Client::with_transport(config(), Arc::new(NoopTransport)).unwrap();
        client.debug("filtered", Fields::new());
        client.info("", Fields::new());
        client.log_serialized(Level::Info, "not an object", &42);
        client.flush().await;

        let stats = client.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.enqueued, 0);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn logging_after_shutdown_is_a_noop() {
        let client = Client::with_transport(config(), Arc::new(NoopTransport)).unwrap();
        let logger = client.logger();
        logger.info("before", Fields::new());
        let report = client.shutdown().await;
        assert!(report.is_clean());
        assert_eq!(report.sent, 1);

        logger.info("after", Fields::new());
        logger.flush().await;
        assert_eq!(logger.stats().submitted, 1);
    }
}
