//! Live log ingestion.
//!
//! A [`StreamService`] owns at most one connection to a remote log API,
//! either an HTTP polling timer or a persistent WebSocket. Payloads are
//! normalized with the same field aliases as file uploads, appended to a
//! bounded in-memory window, and fanned out to subscribers.
//!
//! Every start and stop bumps a connection generation. Background tasks
//! carry the generation they were spawned with and everything they deliver
//! is checked against the current one under the connection lock. Fan-out
//! checks it again before each callback, so a delivery that is underway
//! when a restart happens stops at the next subscriber and a superseded
//! connection never reaches the subscribers of its successor.

mod config;
mod error;
mod payload;
mod polling;
mod socket;
mod subscribers;

pub use config::{
    PayloadParser, StreamingConfig, DEFAULT_POLLING_INTERVAL_MS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_DELAY_MS, MIN_POLLING_INTERVAL_MS,
};
pub use error::StreamError;
pub use subscribers::{BatchCallback, ErrorCallback, StatusCallback};

use log_parser::timestamp::now_iso;
use log_parser::LogRecord;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use subscribers::{invoke, Channel, Subscribers};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Records kept in the live window when the config sets no cap.
pub const DEFAULT_WINDOW: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Snapshot published to status subscribers on every transition.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_update: Option<String>,
    pub messages_received: u64,
}

impl StreamStatus {
    fn enter(&mut self, state: ConnectionState, error: Option<String>) {
        self.state = state;
        self.is_connected = state == ConnectionState::Connected;
        self.is_loading = state == ConnectionState::Connecting;
        self.error = error;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// New records to add after what the consumer already has.
    Append,
    /// Discard everything and show `window` instead.
    Replace,
}

/// One delivery to stream subscribers.
///
/// Both slices are immutable snapshots; later batches never touch them.
#[derive(Debug, Clone)]
pub struct StreamBatch {
    pub mode: BatchMode,
    pub records: Arc<[LogRecord]>,
    /// The whole live window after this batch was applied.
    pub window: Arc<[LogRecord]>,
}

struct Connection {
    generation: u64,
    status: StreamStatus,
    window: VecDeque<LogRecord>,
    capacity: usize,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    fn push(&mut self, records: &[LogRecord]) {
        self.window.extend(records.iter().cloned());
        let excess = self.window.len().saturating_sub(self.capacity);
        self.window.drain(..excess);
    }

    fn snapshot(&self) -> Arc<[LogRecord]> {
        self.window.iter().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Lock order is always `conn` then `subscribers`. Callbacks run with
// neither held.
struct Inner {
    default_window: usize,
    conn: Mutex<Connection>,
    subscribers: Mutex<Subscribers>,
    id_seq: AtomicU64,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        lock(&self.conn).generation == generation
    }

    fn transition(&self, generation: u64, state: ConnectionState) {
        let published = {
            let mut conn = lock(&self.conn);
            if conn.generation != generation {
                return;
            }
            conn.status.enter(state, None);
            (conn.status.clone(), lock(&self.subscribers).status_callbacks())
        };
        debug!(?state, "Stream state changed");
        self.publish_status(generation, &published.0, &published.1);
    }

    /// Moves to `Error` and reports `err`, unless the connection was superseded.
    fn fail(&self, generation: u64, err: &StreamError) {
        let (status, status_cbs, error_cbs) = {
            let mut conn = lock(&self.conn);
            if conn.generation != generation {
                return;
            }
            conn.status.enter(ConnectionState::Error, Some(err.to_string()));
            let subs = lock(&self.subscribers);
            (conn.status.clone(), subs.status_callbacks(), subs.error_callbacks())
        };
        error!("Stream error: {}", err);
        self.publish_status(generation, &status, &status_cbs);
        self.report_to(generation, &error_cbs, err);
    }

    /// Reports a non-fatal error without changing state.
    fn report(&self, generation: u64, err: &StreamError) {
        let callbacks = {
            let conn = lock(&self.conn);
            if conn.generation != generation {
                return;
            }
            lock(&self.subscribers).error_callbacks()
        };
        warn!("Stream error: {}", err);
        self.report_to(generation, &callbacks, err);
    }

    fn ingest(&self, generation: u64, config: &StreamingConfig, payload: &Value) {
        let records = payload::normalize_payload(payload, config, &self.id_seq);
        debug!("Normalized payload into {} records", records.len());
        self.accept(generation, records);
    }

    fn accept(&self, generation: u64, records: Vec<LogRecord>) {
        let (batch, status, batch_cbs, status_cbs) = {
            let mut conn = lock(&self.conn);
            if conn.generation != generation {
                debug!("Dropping {} records from a superseded connection", records.len());
                return;
            }
            conn.push(&records);
            conn.status.enter(ConnectionState::Connected, None);
            conn.status.messages_received += records.len() as u64;
            conn.status.last_update = Some(now_iso());

            let batch = (!records.is_empty()).then(|| StreamBatch {
                mode: BatchMode::Append,
                records: Arc::from(records),
                window: conn.snapshot(),
            });
            let subs = lock(&self.subscribers);
            (batch, conn.status.clone(), subs.batch_callbacks(), subs.status_callbacks())
        };

        if let Some(batch) = batch {
            self.publish_batch(generation, &batch, &batch_cbs);
        }
        self.publish_status(generation, &status, &status_cbs);
    }

    /// False once `generation` was superseded while a fan-out was underway.
    fn still_current(&self, generation: u64) -> bool {
        let current = self.is_current(generation);
        if !current {
            debug!("Abandoning delivery from a superseded connection");
        }
        current
    }

    fn publish_batch(&self, generation: u64, batch: &StreamBatch, callbacks: &[BatchCallback]) {
        for cb in callbacks {
            if !self.still_current(generation) {
                return;
            }
            if let Err(msg) = invoke(cb, batch) {
                self.report_panic(generation, msg);
            }
        }
    }

    fn publish_status(&self, generation: u64, status: &StreamStatus, callbacks: &[StatusCallback]) {
        for cb in callbacks {
            if !self.still_current(generation) {
                return;
            }
            if let Err(msg) = invoke(cb, status) {
                self.report_panic(generation, msg);
            }
        }
    }

    fn report_panic(&self, generation: u64, msg: String) {
        let err = StreamError::Subscriber(msg);
        warn!("{}", err);
        let callbacks = lock(&self.subscribers).error_callbacks();
        self.report_to(generation, &callbacks, &err);
    }

    fn report_to(&self, generation: u64, callbacks: &[ErrorCallback], err: &StreamError) {
        for cb in callbacks {
            if !self.still_current(generation) {
                return;
            }
            if let Err(msg) = invoke(cb, err) {
                error!("Error subscriber panicked: {}", msg);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let conn = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = conn.task.take() {
            task.abort();
        }
    }
}

/// Handle returned by the `on_*` registrations.
///
/// Dropping it leaves the callback registered; call
/// [`Subscription::unsubscribe`] to detach.
#[derive(Debug)]
pub struct Subscription {
    service: Weak<Inner>,
    channel: Channel,
    id: u64,
}

impl Subscription {
    /// Returns false if the callback was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.service.upgrade() {
            Some(inner) => lock(&inner.subscribers).remove(self.channel, self.id),
            None => false,
        }
    }
}

/// Cheaply cloneable handle to one live stream and its subscribers.
#[derive(Clone)]
pub struct StreamService {
    inner: Arc<Inner>,
}

impl StreamService {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                default_window: capacity,
                conn: Mutex::new(Connection {
                    generation: 0,
                    status: StreamStatus::default(),
                    window: VecDeque::new(),
                    capacity,
                    task: None,
                }),
                subscribers: Mutex::new(Subscribers::default()),
                id_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Tear down any running connection and open a new one.
    ///
    /// Resolves once the first fetch or socket handshake succeeds. On failure
    /// the error is also reported on the error channel; a polling timer stays
    /// armed and keeps retrying regardless.
    pub async fn start_stream(&self, config: StreamingConfig) -> Result<(), StreamError> {
        info!(
            endpoint = %config.endpoint,
            websocket = config.use_web_socket,
            "Starting stream"
        );
        let (ready_tx, ready_rx) = oneshot::channel();
        let capacity = config.max_records.unwrap_or(self.inner.default_window).max(1);

        let (generation, status, callbacks) = {
            let mut conn = lock(&self.inner.conn);
            conn.generation += 1;
            if let Some(task) = conn.task.take() {
                debug!("Aborting previous connection");
                task.abort();
            }
            conn.window.clear();
            conn.capacity = capacity;
            conn.status = StreamStatus::default();
            conn.status.enter(ConnectionState::Connecting, None);
            let callbacks = lock(&self.inner.subscribers).status_callbacks();
            (conn.generation, conn.status.clone(), callbacks)
        };
        // Connecting goes out before the task exists, so no transition the
        // task makes can overtake it.
        self.inner.publish_status(generation, &status, &callbacks);

        {
            let mut conn = lock(&self.inner.conn);
            if conn.generation != generation {
                debug!("Connection superseded before it was opened");
                return Err(StreamError::Stopped);
            }
            let weak = Arc::downgrade(&self.inner);
            conn.task = Some(if config.use_web_socket {
                tokio::spawn(socket::run(weak, generation, config, ready_tx))
            } else {
                tokio::spawn(polling::run(weak, generation, config, ready_tx))
            });
        }

        // A dropped sender means the task was aborted by a stop or restart.
        ready_rx.await.unwrap_or(Err(StreamError::Stopped))
    }

    /// Close the connection and drop every subscriber. Safe in any state.
    ///
    /// Status subscribers see the final `Idle` status before being removed.
    /// The live window is kept for [`snapshot`](Self::snapshot) until the
    /// next start or [`clear`](Self::clear).
    pub fn stop_stream(&self) {
        let (generation, status, callbacks) = {
            let mut conn = lock(&self.inner.conn);
            conn.generation += 1;
            if let Some(task) = conn.task.take() {
                task.abort();
            }
            conn.status = StreamStatus {
                last_update: conn.status.last_update.take(),
                messages_received: conn.status.messages_received,
                ..StreamStatus::default()
            };

            let mut subs = lock(&self.inner.subscribers);
            let callbacks = subs.status_callbacks();
            subs.clear();
            (conn.generation, conn.status.clone(), callbacks)
        };
        self.inner.publish_status(generation, &status, &callbacks);
        info!("Stream stopped");
    }

    pub fn on_stream(&self, cb: impl Fn(&StreamBatch) + Send + Sync + 'static) -> Subscription {
        let id = lock(&self.inner.subscribers).add_batch(Arc::new(cb));
        self.subscription(Channel::Batch, id)
    }

    pub fn on_status_change(&self, cb: impl Fn(&StreamStatus) + Send + Sync + 'static) -> Subscription {
        let id = lock(&self.inner.subscribers).add_status(Arc::new(cb));
        self.subscription(Channel::Status, id)
    }

    pub fn on_error(&self, cb: impl Fn(&StreamError) + Send + Sync + 'static) -> Subscription {
        let id = lock(&self.inner.subscribers).add_error(Arc::new(cb));
        self.subscription(Channel::Error, id)
    }

    fn subscription(&self, channel: Channel, id: u64) -> Subscription {
        Subscription {
            service: Arc::downgrade(&self.inner),
            channel,
            id,
        }
    }

    pub fn status(&self) -> StreamStatus {
        lock(&self.inner.conn).status.clone()
    }

    /// Current live window, oldest first.
    pub fn snapshot(&self) -> Arc<[LogRecord]> {
        lock(&self.inner.conn).snapshot()
    }

    /// Empty the live window and tell subscribers to reset their view.
    pub fn clear(&self) {
        let (generation, batch, callbacks) = {
            let mut conn = lock(&self.inner.conn);
            conn.window.clear();
            let batch = StreamBatch {
                mode: BatchMode::Replace,
                records: Arc::from(Vec::new()),
                window: Arc::from(Vec::new()),
            };
            (conn.generation, batch, lock(&self.inner.subscribers).batch_callbacks())
        };
        info!("Cleared live window");
        self.inner.publish_batch(generation, &batch, &callbacks);
    }
}

impl Default for StreamService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message, WebSocketUpgrade};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use log_parser::LogLevel;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    async fn serve(router: Router) -> (SocketAddr, JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr, handle)
    }

    /// Each hit returns one aliased record with a remote id and one bare record.
    fn log_api(source: &'static str) -> Router {
        let hits = Arc::new(AtomicUsize::new(0));
        Router::new().route(
            "/logs",
            get(move || {
                let hits = hits.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!([
                        {"id": format!("{source}-{n}"), "lvl": "warn", "msg": "poll", "service": source},
                        {"text": "second"}
                    ]))
                }
            }),
        )
    }

    /// Each connection sends one record, then closes shortly after.
    fn socket_api() -> Router {
        let hits = Arc::new(AtomicUsize::new(0));
        Router::new().route(
            "/live",
            get(move |ws: WebSocketUpgrade| {
                let hits = hits.clone();
                async move {
                    ws.on_upgrade(move |mut socket| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        let payload = json!({"id": n, "level": "fatal", "message": format!("connection {n}")});
                        let _ = socket.send(Message::Text(payload.to_string())).await;
                        sleep(Duration::from_millis(100)).await;
                        let _ = socket.send(Message::Close(None)).await;
                    })
                }
            }),
        )
    }

    fn polling_config(addr: SocketAddr) -> StreamingConfig {
        let mut config = StreamingConfig::new(format!("http://{addr}/logs"));
        config.polling_interval = 50;
        config
    }

    fn socket_config(addr: SocketAddr) -> StreamingConfig {
        let mut config = StreamingConfig::new(format!("ws://{addr}/live"));
        config.use_web_socket = true;
        config.retry_attempts = 2;
        config.retry_delay = 20;
        config
    }

    fn batches(service: &StreamService) -> mpsc::UnboundedReceiver<StreamBatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        service.on_stream(move |batch| {
            let _ = tx.send(batch.clone());
        });
        rx
    }

    fn errors(service: &StreamService) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        service.on_error(move |err| {
            let _ = tx.send(err.to_string());
        });
        rx
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_polling_delivers_normalized_batches() {
        let (addr, _server) = serve(log_api("alpha")).await;
        let service = StreamService::new();
        let mut rx = batches(&service);

        service.start_stream(polling_config(addr)).await.unwrap();

        let first = next(&mut rx).await;
        assert_eq!(first.mode, BatchMode::Append);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].id, "alpha-0");
        assert_eq!(first.records[0].level, LogLevel::Warning);
        assert_eq!(first.records[0].source, "alpha");
        assert_eq!(first.records[0].message, "poll");
        assert_eq!(first.records[1].source, "API");
        assert_eq!(first.records[1].level, LogLevel::Info);
        assert_ne!(first.records[1].id, first.records[0].id);

        let second = next(&mut rx).await;
        assert_eq!(second.records[0].id, "alpha-1");
        assert_eq!(second.window.len(), 4);

        let status = service.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(status.is_connected);
        assert!(!status.is_loading);
        assert!(status.messages_received >= 4);
        assert!(status.last_update.is_some());

        service.stop_stream();
        assert_eq!(service.status().state, ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_polling_failure_keeps_timer_running() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new().route(
            "/logs",
            get(move || {
                let hits = hits.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})))
                    } else {
                        (StatusCode::OK, Json(json!({"message": "recovered"})))
                    }
                }
            }),
        );
        let (addr, _server) = serve(router).await;
        let service = StreamService::new();
        let mut rx = batches(&service);
        let mut errs = errors(&service);

        let err = service.start_stream(polling_config(addr)).await.unwrap_err();
        assert!(matches!(err, StreamError::Status { status: 500 }));
        assert!(next(&mut errs).await.contains("500"));
        assert_eq!(service.status().state, ConnectionState::Error);

        let batch = next(&mut rx).await;
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].message, "recovered");
        let status = service.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(status.error.is_none());

        service.stop_stream();
    }

    #[tokio::test]
    async fn test_stopped_connection_never_reaches_new_subscribers() {
        let slow = Router::new().route(
            "/logs",
            get(|| async {
                sleep(Duration::from_millis(300)).await;
                Json(json!([{"message": "stale", "source": "old"}]))
            }),
        );
        let (slow_addr, _slow) = serve(slow).await;
        let (fast_addr, _fast) = serve(log_api("new")).await;

        let service = StreamService::new();
        let mut stale_rx = batches(&service);

        let mut slow_config = polling_config(slow_addr);
        slow_config.polling_interval = 1000;
        let pending = {
            let service = service.clone();
            tokio::spawn(async move { service.start_stream(slow_config).await })
        };
        sleep(Duration::from_millis(50)).await;
        service.stop_stream();
        assert!(matches!(pending.await.unwrap(), Err(StreamError::Stopped)));

        let mut rx = batches(&service);
        service.start_stream(polling_config(fast_addr)).await.unwrap();
        sleep(Duration::from_millis(500)).await;
        service.stop_stream();

        let mut delivered = 0;
        while let Ok(batch) = rx.try_recv() {
            assert!(batch.records.iter().all(|r| r.source != "old"));
            delivered += 1;
        }
        assert!(delivered > 0);
        assert!(stale_rx.try_recv().is_err());
        assert!(service.snapshot().iter().all(|r| r.source != "old"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_abandons_delivery_in_progress() {
        let (old_addr, _old) = serve(log_api("old")).await;
        let (new_addr, _new) = serve(log_api("new")).await;
        let service = StreamService::new();

        // Registered first, so it runs first and holds up the old fan-out.
        let (blocked_tx, mut blocked_rx) = mpsc::unbounded_channel();
        service.on_stream(move |batch| {
            if batch.records.iter().any(|r| r.source == "old") {
                let _ = blocked_tx.send(());
                std::thread::sleep(Duration::from_millis(400));
            }
        });
        let mut rx = batches(&service);

        let mut old_config = polling_config(old_addr);
        old_config.polling_interval = 60_000;
        let pending = {
            let service = service.clone();
            tokio::spawn(async move { service.start_stream(old_config).await })
        };
        next(&mut blocked_rx).await;

        service.start_stream(polling_config(new_addr)).await.unwrap();
        sleep(Duration::from_millis(600)).await;
        service.stop_stream();
        let _ = pending.await;

        let mut delivered = 0;
        while let Ok(batch) = rx.try_recv() {
            assert!(batch
                .records
                .iter()
                .chain(batch.window.iter())
                .all(|r| r.source != "old"));
            delivered += 1;
        }
        assert!(delivered > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connecting_is_published_before_connected() {
        let (addr, _server) = serve(log_api("alpha")).await;
        let service = StreamService::new();
        let states = Arc::new(Mutex::new(Vec::new()));
        let seen = states.clone();
        service.on_status_change(move |status| seen.lock().unwrap().push(status.state));

        service.start_stream(polling_config(addr)).await.unwrap();

        let states = states.lock().unwrap().clone();
        assert_eq!(
            &states[..2],
            &[ConnectionState::Connecting, ConnectionState::Connected]
        );
        service.stop_stream();
    }

    #[tokio::test]
    async fn test_unanswered_poll_times_out_and_timer_keeps_running() {
        let router = Router::new().route("/logs", get(|| std::future::pending::<Json<Value>>()));
        let (addr, _server) = serve(router).await;
        let service = StreamService::new();
        let mut errs = errors(&service);

        let mut config = polling_config(addr);
        config.polling_interval = 100;
        let err = service.start_stream(config).await.unwrap_err();
        assert!(matches!(&err, StreamError::Http(e) if e.is_timeout()), "{err}");

        for _ in 0..3 {
            let reported = next(&mut errs).await;
            assert!(reported.starts_with("request failed"), "{reported}");
        }
        assert_eq!(service.status().state, ConnectionState::Error);

        service.stop_stream();
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let (addr, _server) = serve(log_api("alpha")).await;
        let service = StreamService::new();
        service.on_stream(|_| panic!("bad subscriber"));
        let mut rx = batches(&service);
        let mut errs = errors(&service);

        service.start_stream(polling_config(addr)).await.unwrap();

        assert_eq!(next(&mut rx).await.records.len(), 2);
        let reported = next(&mut errs).await;
        assert!(reported.contains("bad subscriber"), "{reported}");

        service.stop_stream();
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches_one_callback() {
        let (addr, _server) = serve(log_api("alpha")).await;
        let service = StreamService::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = service.on_stream(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = batches(&service);

        assert!(sub.unsubscribe());
        service.start_stream(polling_config(addr)).await.unwrap();
        next(&mut rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        service.stop_stream();
    }

    #[tokio::test]
    async fn test_window_is_capped_and_clear_replaces() {
        let (addr, _server) = serve(log_api("alpha")).await;
        let service = StreamService::new();
        let mut rx = batches(&service);

        let mut config = polling_config(addr);
        config.max_records = Some(3);
        service.start_stream(config).await.unwrap();
        for _ in 0..3 {
            next(&mut rx).await;
        }

        let window = service.snapshot();
        assert_eq!(window.len(), 3);
        assert_eq!(window[2].message, "second");

        service.clear();
        let replace = loop {
            let batch = next(&mut rx).await;
            if batch.mode == BatchMode::Replace {
                break batch;
            }
        };
        assert!(replace.records.is_empty());
        assert!(replace.window.is_empty());

        service.stop_stream();
    }

    #[tokio::test]
    async fn test_custom_payload_parser_output_is_used_verbatim() {
        let (addr, _server) = serve(log_api("alpha")).await;
        let service = StreamService::new();
        let mut rx = batches(&service);

        let config = polling_config(addr).with_parser(|payload| {
            let mut record = LogRecord::fallback("custom", &payload.to_string());
            record.level = LogLevel::Trace;
            vec![record]
        });
        service.start_stream(config).await.unwrap();

        let batch = next(&mut rx).await;
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].id, "custom");
        assert_eq!(batch.records[0].level, LogLevel::Trace);

        service.stop_stream();
    }

    #[tokio::test]
    async fn test_socket_reconnects_after_close() {
        let (addr, _server) = serve(socket_api()).await;
        let service = StreamService::new();
        let mut rx = batches(&service);

        service.start_stream(socket_config(addr)).await.unwrap();

        let first = next(&mut rx).await;
        assert_eq!(first.records[0].id, "0");
        assert_eq!(first.records[0].level, LogLevel::Error);
        assert_eq!(first.records[0].message, "connection 0");

        let second = next(&mut rx).await;
        assert_eq!(second.records[0].id, "1");
        assert_eq!(second.window.len(), 2);

        service.stop_stream();
    }

    #[tokio::test]
    async fn test_socket_gives_up_after_retry_budget() {
        let (addr, server) = serve(socket_api()).await;
        let service = StreamService::new();
        let mut rx = batches(&service);
        let mut errs = errors(&service);

        service.start_stream(socket_config(addr)).await.unwrap();
        next(&mut rx).await;
        server.abort();

        let reported = loop {
            let err = next(&mut errs).await;
            if err.contains("gave up") {
                break err;
            }
        };
        assert!(reported.contains("2 reconnect attempts"), "{reported}");
        let status = service.status();
        assert_eq!(status.state, ConnectionState::Error);
        assert!(!status.is_connected);
    }

    #[tokio::test]
    async fn test_socket_initial_connect_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = StreamService::new();
        let err = service.start_stream(socket_config(addr)).await.unwrap_err();

        assert!(matches!(err, StreamError::WebSocket(_)));
        assert_eq!(service.status().state, ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_clears_subscribers() {
        let service = StreamService::new();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let seen = statuses.clone();
        service.on_status_change(move |status| seen.lock().unwrap().push(status.state));

        service.stop_stream();
        service.stop_stream();

        assert_eq!(*statuses.lock().unwrap(), vec![ConnectionState::Idle]);
        assert_eq!(lock(&service.inner.subscribers).len(), 0);
    }
}
