use crate::config::ClientConfig;
use crate::error::{ConfigurationError, DeliveryError};
use crate::record::LogRecord;
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};

/// Header carrying the collector project identifier (`X-Project-Id`).
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// How a collector response is treated by the batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Transient,
    Permanent,
}

/// 2xx is success, 5xx is worth retrying, everything else is the
/// client's fault and will not get better on retry.
pub fn classify_status(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Success,
        500..=599 => Outcome::Transient,
        _ => Outcome::Permanent,
    }
}

/// Collector transport that POSTs each batch as a JSON array.
///
/// The underlying [`reqwest::Client`] keeps a connection pool, so one
/// instance should be reused for the lifetime of the client. Cloning is
/// cheap and shares the pool.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    url: Url,
}

impl HttpTransport {
    /// Build a transport targeting `config.ingest_url()`.
    ///
    /// **Returns**
    /// - `Err(ConfigurationError::InvalidHost)` if the ingest URL does not parse.
    /// - `Err(ConfigurationError::InvalidValue)` if the project id or api
    ///   key cannot be sent as an HTTP header, or the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigurationError> {
        let url = Url::parse(&config.ingest_url()).map_err(|e| ConfigurationError::InvalidHost {
            host: config.host.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(PROJECT_ID_HEADER),
            HeaderValue::from_str(&config.project_id).map_err(|e| {
                ConfigurationError::InvalidValue {
                    field: "project_id",
                    reason: e.to_string(),
                }
            })?,
        );
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                ConfigurationError::InvalidValue {
                    field: "api_key",
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigurationError::InvalidValue {
                field: "request_timeout",
                reason: format!("could not build http client: {}", e),
            })?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[LogRecord]) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(batch)
            .map_err(|e| DeliveryError::Permanent(format!("could not encode batch: {}", e)))?;

        let resp = self
            .client
            .post(self.url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Transient(format!("collector request timed out: {}", e))
                } else {
                    DeliveryError::Transient(format!("collector request failed: {}", e))
                }
            })?;

        let status = resp.status();
        match classify_status(status.as_u16()) {
            Outcome::Success => Ok(()),
            outcome => {
                let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                let message = format!("collector responded with status {}: {}", status, text);
                if outcome == Outcome::Transient {
                    Err(DeliveryError::Transient(message))
                } else {
                    Err(DeliveryError::Permanent(message))
                }
            }
        }
    }
}
