use super::StreamError;
use log_parser::LogRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Replaces the default field-alias normalization for one payload.
///
/// Whatever it returns is delivered as-is, ids included.
pub type PayloadParser = Arc<dyn Fn(&Value) -> Vec<LogRecord> + Send + Sync>;

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 5000;
pub const MIN_POLLING_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Connection parameters for one live stream. Fixed for the lifetime of
/// the connection; start a new stream to change them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfig {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Milliseconds between polls.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default)]
    pub use_web_socket: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base reconnect delay in milliseconds; attempt `n` waits `n` times this.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Cap on the in-memory record window. The service default applies when unset.
    #[serde(default)]
    pub max_records: Option<usize>,
    #[serde(skip)]
    pub parser: Option<PayloadParser>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_polling_interval() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl StreamingConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            polling_interval: DEFAULT_POLLING_INTERVAL_MS,
            use_web_socket: false,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY_MS,
            max_records: None,
            parser: None,
        }
    }

    pub fn with_parser(
        mut self,
        parser: impl Fn(&Value) -> Vec<LogRecord> + Send + Sync + 'static,
    ) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval.max(1))
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay) * attempt
    }

    /// Checks a config built from user input before it reaches the service.
    ///
    /// The service itself accepts any config; this is for outer layers.
    pub fn validate(&self) -> Result<(), StreamError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| StreamError::InvalidConfig(format!("endpoint '{}': {}", self.endpoint, e)))?;

        let allowed: &[&str] = if self.use_web_socket {
            &["ws", "wss"]
        } else {
            &["http", "https"]
        };
        if !allowed.contains(&url.scheme()) {
            return Err(StreamError::InvalidConfig(format!(
                "scheme '{}' not usable here, expected one of {:?}",
                url.scheme(),
                allowed
            )));
        }

        if self.polling_interval < MIN_POLLING_INTERVAL_MS {
            return Err(StreamError::InvalidConfig(format!(
                "polling interval {}ms is below the {}ms minimum",
                self.polling_interval, MIN_POLLING_INTERVAL_MS
            )));
        }

        if reqwest::Method::from_bytes(self.method.to_uppercase().as_bytes()).is_err() {
            return Err(StreamError::InvalidConfig(format!("unknown method '{}'", self.method)));
        }

        Ok(())
    }
}

impl fmt::Debug for StreamingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingConfig")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("polling_interval", &self.polling_interval)
            .field("use_web_socket", &self.use_web_socket)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("max_records", &self.max_records)
            .field("parser", &self.parser.as_ref().map(|_| "custom"))
            .finish()
    }
}
