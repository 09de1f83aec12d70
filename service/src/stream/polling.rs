use super::{Inner, StreamError, StreamingConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

struct Poller {
    client: Client,
    method: Method,
    endpoint: String,
    headers: HeaderMap,
}

impl Poller {
    fn new(config: &StreamingConfig) -> Result<Self, StreamError> {
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| StreamError::InvalidConfig(format!("unknown method '{}'", config.method)))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| StreamError::InvalidConfig(format!("header '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::InvalidConfig(format!("header '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        // A request never outlives its tick, which keeps the in-flight set
        // bounded when the endpoint stops answering.
        let client = Client::builder().timeout(config.polling_interval()).build()?;

        Ok(Self {
            client,
            method,
            endpoint: config.endpoint.clone(),
            headers,
        })
    }

    async fn fetch(&self) -> Result<Value, StreamError> {
        debug!(endpoint = %self.endpoint, "Polling");
        let response = self
            .client
            .request(self.method.clone(), self.endpoint.as_str())
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Fetch once, report the outcome on `ready`, then poll on a fixed timer.
///
/// Ticks are wall-clock based and each fetch runs as its own task, so a
/// slow response never delays the next request. Responses are ingested in
/// arrival order. A failed fetch never disarms the timer.
pub(super) async fn run(
    inner: Weak<Inner>,
    generation: u64,
    config: StreamingConfig,
    ready: oneshot::Sender<Result<(), StreamError>>,
) {
    let poller = match Poller::new(&config) {
        Ok(poller) => Arc::new(poller),
        Err(e) => {
            if let Some(service) = inner.upgrade() {
                service.fail(generation, &e);
            }
            let _ = ready.send(Err(e));
            return;
        }
    };

    let first = poller.fetch().await;
    {
        let Some(service) = inner.upgrade() else { return };
        match first {
            Ok(payload) => {
                info!(endpoint = %config.endpoint, "Polling connected");
                service.ingest(generation, &config, &payload);
                let _ = ready.send(Ok(()));
            }
            Err(e) => {
                service.fail(generation, &e);
                let _ = ready.send(Err(e));
            }
        }
    }

    let period = config.polling_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let poller = Arc::clone(&poller);
                in_flight.spawn(async move { poller.fetch().await });
            }
            Some(joined) = in_flight.join_next() => {
                let Some(service) = inner.upgrade() else { return };
                if !service.is_current(generation) {
                    return;
                }
                match joined {
                    Ok(Ok(payload)) => service.ingest(generation, &config, &payload),
                    Ok(Err(e)) => service.fail(generation, &e),
                    Err(e) => warn!("Polling request task failed: {}", e),
                }
            }
        }
    }
}
