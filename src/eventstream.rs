//! Upstream event stream management and ingress.
//!
//! The gateway hosts durable, replayable event streams. This module manages
//! the stream and its per-pool subscriptions over REST, and maintains the
//! WebSocket ingress connection that delivers event batches and transaction
//! receipts. Batches are redelivered by the gateway until acknowledged, so
//! the socket task simply reconnects on failure and lets replay close any
//! gap.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use url::Url;

use tokens_types::abi::AbiEntry;
use tokens_types::events::EventBatch;

use crate::blockchain::GatewayError;
use crate::config::Config;

const BATCH_SIZE: u32 = 50;
const BATCH_TIMEOUT_MS: u32 = 500;
const RETRY_TIMEOUT_SEC: u32 = 30;
const BLOCKED_RETRY_DELAY_SEC: u32 = 30;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct EventStream {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventStreamSubscription {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stream: Option<String>,
}

/// A message delivered on the ingress socket.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    Batch(EventBatch),
    /// A transaction receipt, kept raw for verbatim fan-out.
    Receipt(Value),
}

#[derive(Debug)]
enum AckCommand {
    Ack(Option<u64>),
    Error,
}

/// Handle for acknowledging (or rejecting) event batches upstream.
#[derive(Clone)]
pub struct AckSender {
    tx: mpsc::UnboundedSender<AckCommand>,
}

impl AckSender {
    pub fn ack(&self, batch_number: Option<u64>) {
        let _ = self.tx.send(AckCommand::Ack(batch_number));
    }

    pub fn error(&self) {
        let _ = self.tx.send(AckCommand::Error);
    }
}

/// An established ingress connection: messages in, acks out.
pub struct StreamConnection {
    pub messages: mpsc::Receiver<StreamMessage>,
    pub acks: AckSender,
}

/// REST client for stream and subscription management, plus the ingress
/// socket factory.
pub struct EventStreamService {
    client: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    name_cache: DashMap<String, String>,
}

impl EventStreamService {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        EventStreamService {
            client,
            base_url: config.ethconnect_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            name_cache: DashMap::new(),
        }
    }

    pub async fn list_streams(&self) -> Result<Vec<EventStream>, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, self.join("eventstreams"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Creates the stream for `topic`, or updates its settings if it already
    /// exists.
    pub async fn ensure_event_stream(&self, topic: &str) -> Result<EventStream, GatewayError> {
        let settings = stream_settings(topic);
        let existing = self
            .list_streams()
            .await?
            .into_iter()
            .find(|stream| stream.name == topic);
        let (method, url) = match &existing {
            Some(stream) => (
                reqwest::Method::PATCH,
                self.join(&format!("eventstreams/{}", stream.id)),
            ),
            None => (reqwest::Method::POST, self.join("eventstreams")),
        };
        let response = self.request(method, url).json(&settings).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<EventStreamSubscription>, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, self.join("subscriptions"))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Resolves a subscription id to its name, caching the answer.
    pub async fn subscription_name(&self, sub_id: &str) -> Option<String> {
        if let Some(name) = self.name_cache.get(sub_id) {
            return Some(name.clone());
        }
        let url = self.join(&format!("subscriptions/{sub_id}"));
        let response = self.request(reqwest::Method::GET, url).send().await.ok()?;
        let subscription: EventStreamSubscription = check(response).await.ok()?.json().await.ok()?;
        self.name_cache
            .insert(sub_id.to_string(), subscription.name.clone());
        Some(subscription.name)
    }

    /// Returns the subscription with the given name, creating it if absent.
    /// Creation is what makes activation idempotent.
    pub async fn get_or_create_subscription(
        &self,
        stream_id: &str,
        event: &AbiEntry,
        name: &str,
        address: &str,
        methods: &[&AbiEntry],
        from_block: &str,
    ) -> Result<EventStreamSubscription, GatewayError> {
        let existing = self
            .list_subscriptions()
            .await?
            .into_iter()
            .find(|sub| sub.name == name);
        if let Some(subscription) = existing {
            return Ok(subscription);
        }
        let body = json!({
            "name": name,
            "stream": stream_id,
            "event": event,
            "address": address,
            "methods": methods,
            "fromBlock": from_block,
        });
        let response = self
            .request(reqwest::Method::POST, self.join("subscriptions"))
            .json(&body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Opens the ingress socket and keeps it alive, reconnecting with a delay
    /// on any failure. The returned receiver yields batches and receipts in
    /// upstream order.
    pub fn connect(&self, topic: String) -> StreamConnection {
        let (msg_tx, msg_rx) = mpsc::channel(16);
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let ws_url = websocket_url(&self.base_url);
        let auth = self
            .username
            .as_ref()
            .map(|user| basic_auth(user, self.password.as_deref()));
        tokio::spawn(socket_task(ws_url, topic, auth, msg_tx, ack_rx));
        StreamConnection {
            messages: msg_rx,
            acks: AckSender { tx: ack_tx },
        }
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    fn join(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().expect("gateway URL is a base URL");
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        url
    }
}

fn stream_settings(topic: &str) -> Value {
    json!({
        "name": topic,
        "errorHandling": "block",
        "batchSize": BATCH_SIZE,
        "batchTimeoutMS": BATCH_TIMEOUT_MS,
        "retryTimeoutSec": RETRY_TIMEOUT_SEC,
        "blockedRetryDelaySec": BLOCKED_RETRY_DELAY_SEC,
        "type": "websocket",
        "websocket": { "topic": topic },
        "timestamps": true,
    })
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<Value>().await {
        Ok(body) => body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => format!("Gateway returned {status}"),
    };
    Err(GatewayError::Upstream {
        status: status.as_u16(),
        message,
    })
}

fn websocket_url(base: &Url) -> Url {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let _ = url.set_scheme(scheme);
    url.set_path("ws");
    url
}

fn basic_auth(username: &str, password: Option<&str>) -> String {
    let credentials = format!("{}:{}", username, password.unwrap_or(""));
    format!("Basic {}", b64.encode(credentials))
}

async fn socket_task(
    ws_url: Url,
    topic: String,
    auth: Option<String>,
    msg_tx: mpsc::Sender<StreamMessage>,
    mut ack_rx: mpsc::UnboundedReceiver<AckCommand>,
) {
    loop {
        match run_socket(&ws_url, &topic, auth.as_deref(), &msg_tx, &mut ack_rx).await {
            Ok(()) => return,
            Err(error) => {
                tracing::warn!(%error, "Event stream socket dropped, reconnecting");
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_socket(
    ws_url: &Url,
    topic: &str,
    auth: Option<&str>,
    msg_tx: &mpsc::Sender<StreamMessage>,
    ack_rx: &mut mpsc::UnboundedReceiver<AckCommand>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut request = ws_url.as_str().into_client_request()?;
    if let Some(auth) = auth {
        request
            .headers_mut()
            .insert(http::header::AUTHORIZATION, auth.parse()?);
    }
    let (stream, _) = connect_async(request).await?;
    let (mut write, mut read) = stream.split();

    write
        .send(Message::Text(
            json!({ "type": "listen", "topic": topic }).to_string().into(),
        ))
        .await?;
    write
        .send(Message::Text(
            json!({ "type": "listenreplies" }).to_string().into(),
        ))
        .await?;
    tracing::info!(topic, "Listening for events and replies");

    loop {
        tokio::select! {
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Err("connection closed".into());
                };
                if let Message::Text(text) = frame? {
                    if let Some(message) = classify(&text) {
                        if msg_tx.send(message).await.is_err() {
                            // Consumer gone; the service is shutting down.
                            return Ok(());
                        }
                    }
                }
            }
            command = ack_rx.recv() => {
                let Some(command) = command else {
                    return Ok(());
                };
                let reply = match command {
                    AckCommand::Ack(batch_number) => {
                        let mut reply = json!({ "type": "ack", "topic": topic });
                        if let Some(number) = batch_number {
                            reply["batchNumber"] = json!(number);
                        }
                        reply
                    }
                    AckCommand::Error => json!({ "type": "error", "topic": topic }),
                };
                write.send(Message::Text(reply.to_string().into())).await?;
            }
        }
    }
}

/// Sorts an inbound frame into a batch or a receipt. Unrecognized frames are
/// dropped with a debug log.
fn classify(text: &str) -> Option<StreamMessage> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(%error, "Ignoring unparseable stream frame");
            return None;
        }
    };
    if value.is_array() {
        let events = serde_json::from_value(value).ok()?;
        return Some(StreamMessage::Batch(EventBatch {
            batch_number: None,
            events,
        }));
    }
    if value.get("events").is_some() {
        return serde_json::from_value(value).ok().map(StreamMessage::Batch);
    }
    if value
        .get("headers")
        .and_then(|headers| headers.get("requestId"))
        .is_some()
    {
        return Some(StreamMessage::Receipt(value));
    }
    tracing::debug!("Ignoring unrecognized stream frame");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        let http: Url = "http://ethconnect.example:5102".parse().unwrap();
        assert_eq!(websocket_url(&http).as_str(), "ws://ethconnect.example:5102/ws");

        let https: Url = "https://ethconnect.example".parse().unwrap();
        assert_eq!(websocket_url(&https).as_str(), "wss://ethconnect.example/ws");
    }

    #[test]
    fn test_classify_batch() {
        let frame = json!({
            "batchNumber": 12,
            "events": [ { "signature": "Transfer(address,address,uint256)" } ]
        });
        match classify(&frame.to_string()) {
            Some(StreamMessage::Batch(batch)) => {
                assert_eq!(batch.batch_number, Some(12));
                assert_eq!(batch.events.len(), 1);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_bare_event_array() {
        let frame = json!([ { "signature": "Transfer(address,address,uint256)" } ]);
        match classify(&frame.to_string()) {
            Some(StreamMessage::Batch(batch)) => {
                assert_eq!(batch.batch_number, None);
                assert_eq!(batch.events.len(), 1);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_receipt() {
        let frame = json!({
            "headers": { "requestId": "req-1", "type": "TransactionSuccess" },
            "transactionHash": "0xabc"
        });
        assert!(matches!(
            classify(&frame.to_string()),
            Some(StreamMessage::Receipt(_))
        ));
    }

    #[test]
    fn test_classify_ignores_noise() {
        assert!(classify("not json").is_none());
        assert!(classify("{\"hello\":\"world\"}").is_none());
    }

    #[test]
    fn test_stream_settings_shape() {
        let settings = stream_settings("tokens");
        assert_eq!(settings["name"], "tokens");
        assert_eq!(settings["errorHandling"], "block");
        assert_eq!(settings["websocket"]["topic"], "tokens");
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth("user", Some("pass")), "Basic dXNlcjpwYXNz");
    }
}
