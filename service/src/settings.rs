use crate::stream::DEFAULT_WINDOW;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::warn;

pub const ADDR_ENV: &str = "LOG_SERVICE_ADDR";
pub const BODY_LIMIT_ENV: &str = "LOG_SERVICE_BODY_LIMIT";
pub const STREAM_WINDOW_ENV: &str = "LOG_SERVICE_STREAM_WINDOW";

/// Runtime settings for the HTTP service.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub addr: SocketAddr,
    /// Maximum request body in bytes, sized for large log uploads.
    pub body_limit: usize,
    /// Default cap on the live stream window.
    pub stream_window: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            body_limit: 1024 * 1024 * 1024,
            stream_window: DEFAULT_WINDOW,
        }
    }
}

impl Settings {
    /// Defaults, overridden by any `LOG_SERVICE_*` variables that parse.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        override_parsed(&mut settings.addr, ADDR_ENV, &lookup);
        override_parsed(&mut settings.body_limit, BODY_LIMIT_ENV, &lookup);
        override_parsed(&mut settings.stream_window, STREAM_WINDOW_ENV, &lookup);
        settings
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str, lookup: &impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}
