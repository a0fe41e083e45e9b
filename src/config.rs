use crate::error::ConfigurationError;
use crate::record::Level;
use tokio::time::Duration;

/// Configuration of a [`Client`](crate::Client).
///
/// `project_id` and `host` are required; everything else has a default
/// suited to a typical service. The config is validated once, when the
/// client is built, and is read-only afterwards.
///
/// **Fields**
/// - `project_id`: collector project the records belong to; sent as `X-Project-Id`.
/// - `host`: collector base URL, e.g. `http://localhost:4005`.
/// - `api_key`: optional bearer token.
/// - `minimum_level`: calls below this level are ignored.
/// - `batch_max_size`: a batch is shipped once it holds this many records.
/// - `batch_max_delay`: a non-full batch is shipped this long after its first record.
/// - `queue_capacity`: records buffered before new ones are dropped.
/// - `max_attempts`: delivery attempts per batch, including the first.
/// - `initial_backoff` / `max_backoff`: retry delay bounds.
/// - `request_timeout`: per-request timeout for the collector call.
/// - `shutdown_timeout`: how long [`Client::shutdown`](crate::Client::shutdown) may drain.
/// - `ingest_path`: path appended to `host` for batch uploads.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub project_id: String,
    pub host: String,
    pub api_key: Option<String>,
    pub minimum_level: Level,
    pub batch_max_size: usize,
    pub batch_max_delay: Duration,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub ingest_path: String,
}

pub const DEFAULT_BATCH_MAX_SIZE: usize = 100;
pub const DEFAULT_BATCH_MAX_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INGEST_PATH: &str = "/api/v1/logs";

const MIN_BATCH_MAX_DELAY: Duration = Duration::from_millis(10);

impl ClientConfig {
    pub fn new(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        ClientConfig {
            project_id: project_id.into(),
            host: host.into(),
            api_key: None,
            minimum_level: Level::Info,
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            batch_max_delay: DEFAULT_BATCH_MAX_DELAY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            ingest_path: DEFAULT_INGEST_PATH.to_string(),
        }
    }

    /// Empty keys are treated as "no key".
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn with_minimum_level(mut self, level: Level) -> Self {
        self.minimum_level = level;
        self
    }

    pub fn with_batching(mut self, max_size: usize, max_delay: Duration) -> Self {
        self.batch_max_size = max_size;
        self.batch_max_delay = max_delay;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, initial: Duration, max: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_ingest_path(mut self, path: impl Into<String>) -> Self {
        self.ingest_path = path.into();
        self
    }

    /// Full URL batches are posted to.
    pub fn ingest_url(&self) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), self.ingest_path)
    }

    /// Check every field. Called by [`Client::new`](crate::Client::new).
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigurationError::MissingProjectId);
        }
        if self.project_id.chars().any(char::is_whitespace) {
            return Err(ConfigurationError::InvalidProjectId(self.project_id.clone()));
        }
        validate_host(&self.host)?;

        if self.batch_max_size == 0 {
            return Err(invalid("batch_max_size", "must be at least 1"));
        }
        if self.batch_max_delay < MIN_BATCH_MAX_DELAY {
            return Err(invalid(
                "batch_max_delay",
                format!("must be at least {:?}", MIN_BATCH_MAX_DELAY),
            ));
        }
        if self.queue_capacity < self.batch_max_size {
            return Err(invalid(
                "queue_capacity",
                format!("must be at least batch_max_size ({})", self.batch_max_size),
            ));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.initial_backoff.is_zero() {
            return Err(invalid("initial_backoff", "must be greater than zero"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(invalid("max_backoff", "must not be below initial_backoff"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be greater than zero"));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(invalid("shutdown_timeout", "must be greater than zero"));
        }
        if !self.ingest_path.starts_with('/') {
            return Err(invalid("ingest_path", "must start with '/'"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn validate_host(host: &str) -> Result<(), ConfigurationError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(ConfigurationError::MissingHost);
    }
    let bad = |reason: &str| ConfigurationError::InvalidHost {
        host: host.to_string(),
        reason: reason.to_string(),
    };

    let lower = trimmed.to_ascii_lowercase();
    let rest = if lower.starts_with("https://") {
        &trimmed["https://".len()..]
    } else if lower.starts_with("http://") {
        &trimmed["http://".len()..]
    } else {
        return Err(bad("scheme must be http or https"));
    };

    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    if authority.is_empty() {
        return Err(bad("missing host name"));
    }
    if authority.chars().any(char::is_whitespace) {
        return Err(bad("host name contains whitespace"));
    }

    #[cfg(feature = "http")]
    if let Err(e) = reqwest::Url::parse(trimmed) {
        return Err(bad(&e.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("3f1c2a9e", "http://localhost:4005")
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(cfg.ingest_url(), "http://localhost:4005/api/v1/logs");
    }

    #[test]
    fn missing_identifiers_are_fatal() {
        assert_eq!(
            ClientConfig::new("", "http://localhost:4005").validate(),
            Err(ConfigurationError::MissingProjectId)
        );
        assert_eq!(
            ClientConfig::new("proj", "  ").validate(),
            Err(ConfigurationError::MissingHost)
        );
        assert!(matches!(
            ClientConfig::new("my project", "http://localhost").validate(),
            Err(ConfigurationError::InvalidProjectId(_))
        ));
    }

    #[test]
    fn host_must_be_http_url() {
        for host in ["localhost:4005", "ftp://example.com", "http://", "http:// bad"] {
            assert!(
                matches!(
                    ClientConfig::new("proj", host).validate(),
                    Err(ConfigurationError::InvalidHost { .. })
                ),
                "{host} should be rejected"
            );
        }
        assert!(ClientConfig::new("proj", "HTTPS://logs.example.com/").validate().is_ok());
    }

    #[test]
    fn degenerate_tunables_are_rejected() {
        let cases = [
            (config().with_batching(0, Duration::from_secs(1)), "batch_max_size"),
            (config().with_batching(10, Duration::from_millis(1)), "batch_max_delay"),
            (config().with_batching(500, Duration::from_secs(1)).with_queue_capacity(100), "queue_capacity"),
            (config().with_retry(0, Duration::from_millis(10), Duration::from_secs(1)), "max_attempts"),
            (config().with_retry(3, Duration::ZERO, Duration::from_secs(1)), "initial_backoff"),
            (config().with_retry(3, Duration::from_secs(2), Duration::from_secs(1)), "max_backoff"),
            (config().with_request_timeout(Duration::ZERO), "request_timeout"),
            (config().with_shutdown_timeout(Duration::ZERO), "shutdown_timeout"),
            (config().with_ingest_path("logs"), "ingest_path"),
        ];
        for (cfg, expected) in cases {
            match cfg.validate() {
                Err(ConfigurationError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_api_key_means_none() {
        assert_eq!(config().with_api_key("").api_key, None);
        assert_eq!(config().with_api_key("secret").api_key.as_deref(), Some("secret"));
    }
}
