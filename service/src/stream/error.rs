use tokio_tungstenite::tungstenite;

/// Everything the ingestion service reports on its error channel.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid streaming config: {0}")]
    InvalidConfig(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned HTTP {status}")]
    Status { status: u16 },
    #[error("payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed, gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("stream stopped before the connection was established")]
    Stopped,
    #[error("subscriber panicked: {0}")]
    Subscriber(String),
}
