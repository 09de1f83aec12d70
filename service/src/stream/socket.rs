use super::{ConnectionState, Inner, StreamError, StreamingConfig};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Weak;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(config: &StreamingConfig) -> Result<Socket, StreamError> {
    let mut request = config.endpoint.as_str().into_client_request()?;
    for (key, value) in &config.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| StreamError::InvalidConfig(format!("header '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StreamError::InvalidConfig(format!("header '{}': {}", key, e)))?;
        request.headers_mut().insert(name, value);
    }

    let (socket, response) = connect_async(request).await?;
    debug!(status = %response.status(), "WebSocket handshake complete");
    Ok(socket)
}

/// Open the socket, report the handshake on `ready`, then ingest messages
/// until stopped or the reconnect budget runs out.
pub(super) async fn run(
    inner: Weak<Inner>,
    generation: u64,
    config: StreamingConfig,
    ready: oneshot::Sender<Result<(), StreamError>>,
) {
    let mut socket = match connect(&config).await {
        Ok(socket) => socket,
        Err(e) => {
            if let Some(service) = inner.upgrade() {
                service.fail(generation, &e);
            }
            let _ = ready.send(Err(e));
            return;
        }
    };

    match inner.upgrade() {
        Some(service) => service.transition(generation, ConnectionState::Connected),
        None => return,
    }
    info!(endpoint = %config.endpoint, "WebSocket connected");
    let _ = ready.send(Ok(()));

    loop {
        if !pump(&inner, generation, &config, &mut socket).await {
            return;
        }
        match reconnect(&inner, generation, &config).await {
            Some(fresh) => socket = fresh,
            None => return,
        }
    }
}

/// Ingest messages until the peer goes away. Returns false when the
/// service is gone or this connection was superseded.
async fn pump(inner: &Weak<Inner>, generation: u64, config: &StreamingConfig, socket: &mut Socket) -> bool {
    while let Some(message) = socket.next().await {
        let Some(service) = inner.upgrade() else { return false };
        if !service.is_current(generation) {
            return false;
        }

        let decoded = match message {
            Ok(Message::Text(text)) => serde_json::from_str::<Value>(text.as_str()),
            Ok(Message::Binary(data)) => serde_json::from_slice::<Value>(&data),
            Ok(Message::Close(frame)) => {
                info!(?frame, "WebSocket closed by peer");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket read failed: {}", e);
                break;
            }
        };

        match decoded {
            Ok(payload) => service.ingest(generation, config, &payload),
            Err(e) => service.report(generation, &StreamError::Decode(e)),
        }
    }
    true
}

/// Linear backoff: attempt `n` waits `retry_delay * n`.
async fn reconnect(inner: &Weak<Inner>, generation: u64, config: &StreamingConfig) -> Option<Socket> {
    inner.upgrade()?.transition(generation, ConnectionState::Disconnected);

    for attempt in 1..=config.retry_attempts {
        let delay = config.retry_delay_for(attempt);
        info!(attempt, max = config.retry_attempts, ?delay, "Reconnecting");
        time::sleep(delay).await;

        {
            let service = inner.upgrade()?;
            if !service.is_current(generation) {
                return None;
            }
            service.transition(generation, ConnectionState::Connecting);
        }

        match connect(config).await {
            Ok(socket) => {
                inner.upgrade()?.transition(generation, ConnectionState::Connected);
                info!(attempt, "WebSocket reconnected");
                return Some(socket);
            }
            Err(e) => warn!(attempt, "Reconnect failed: {}", e),
        }
    }

    let err = StreamError::ReconnectExhausted {
        attempts: config.retry_attempts,
    };
    if let Some(service) = inner.upgrade() {
        service.fail(generation, &err);
    }
    None
}
