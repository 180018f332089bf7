//! Change-notification channel over the store's realtime websocket.
//!
//! Each watched collection gets its own channel worker. The worker joins the
//! collection's topic, forwards change events, keeps the socket alive with
//! heartbeats and reconnects with exponential backoff when it drops.

use crate::config::{ReconnectConfig, SessionConfig, StoreConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::store::Subscription;
use crate::types::{ChangeEvent, ChannelEvent, Collection};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CHANNEL_BUFFER: usize = 64;
const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Clone)]
pub struct RealtimeClient {
    endpoint: String,
    api_key: String,
    access_token: String,
    heartbeat: Duration,
    reconnect: ReconnectConfig,
}

impl RealtimeClient {
    pub fn new(config: &StoreConfig, session: &SessionConfig) -> GatewayResult<Self> {
        if config.realtime_url.trim().is_empty() {
            return Err(GatewayError::Config("realtime_url is empty".to_string()));
        }
        if config.heartbeat_interval_ms == 0 {
            return Err(GatewayError::Config(
                "heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            endpoint: config.realtime_url.clone(),
            api_key: config.api_key.clone(),
            access_token: session.access_token.clone(),
            heartbeat: Duration::from_millis(config.heartbeat_interval_ms),
            reconnect: config.reconnect.clone(),
        })
    }

    /// Start a channel worker for `collection`.
    pub fn subscribe(&self, collection: Collection) -> Subscription {
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER);
        let client = self.clone();
        let worker = tokio::spawn(async move { client.run_channel(collection, sender).await });
        Subscription::new(collection, receiver, worker)
    }

    async fn connect(&self) -> GatewayResult<WsStream> {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}apikey={}&vsn={}",
            self.endpoint, separator, self.api_key, PROTOCOL_VERSION
        );
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        Ok(stream)
    }

    async fn run_channel(self, collection: Collection, sender: mpsc::Sender<ChannelEvent>) {
        let mut backoff = Backoff::new(self.reconnect.clone());
        loop {
            let reason = match self.connect().await {
                Ok(stream) => self.pump(stream, collection, &sender, &mut backoff).await,
                Err(err) => err.to_string(),
            };
            if sender.is_closed() {
                debug!(%collection, "realtime channel released");
                return;
            }

            warn!(%collection, %reason, "realtime channel dropped");
            if sender
                .send(ChannelEvent::Disconnected { reason })
                .await
                .is_err()
            {
                return;
            }

            let delay = backoff.next_delay();
            debug!(%collection, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    /// Drive one connection until it drops. Returns the reason it ended.
    async fn pump(
        &self,
        stream: WsStream,
        collection: Collection,
        sender: &mpsc::Sender<ChannelEvent>,
        backoff: &mut Backoff,
    ) -> String {
        let (mut sink, mut source) = stream.split();
        let topic = topic_for(collection);
        let mut refs = RefCounter::default();
        let join_ref = refs.next();

        let join = PhoenixMessage::join(&topic, collection, &self.access_token, &join_ref);
        if let Err(err) = send_json(&mut sink, &join).await {
            return err.to_string();
        }

        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = sender.closed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return "subscriber released the channel".to_string();
                }
                _ = heartbeat.tick() => {
                    let beat = PhoenixMessage::heartbeat(&refs.next());
                    if let Err(err) = send_json(&mut sink, &beat).await {
                        return err.to_string();
                    }
                }
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        match decode_frame(&text, &topic, &join_ref, collection) {
                            Frame::Joined => {
                                info!(%collection, "realtime channel subscribed");
                                backoff.reset();
                                if sender.send(ChannelEvent::Subscribed).await.is_err() {
                                    return "subscriber released the channel".to_string();
                                }
                            }
                            Frame::JoinRejected(reason) => {
                                return format!("join rejected: {}", reason);
                            }
                            Frame::Change(event) => {
                                debug!(%collection, kind = ?event.kind, "change notification");
                                if sender.send(ChannelEvent::Change(event)).await.is_err() {
                                    return "subscriber released the channel".to_string();
                                }
                            }
                            Frame::Closed(reason) => return reason,
                            Frame::Ignored => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) => return "server closed the connection".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return err.to_string(),
                    None => return "connection ended".to_string(),
                }
            }
        }
    }
}

async fn send_json<S>(sink: &mut S, message: &PhoenixMessage) -> GatewayResult<()>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

fn topic_for(collection: Collection) -> String {
    format!("realtime:public:{}", collection.table())
}

#[derive(Default)]
struct RefCounter(u64);

impl RefCounter {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

/// Envelope of every message on the realtime socket.
#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

impl PhoenixMessage {
    fn join(topic: &str, collection: Collection, access_token: &str, join_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": collection.table() }
                    ]
                },
                "access_token": access_token,
            }),
            reference: Some(join_ref.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    fn heartbeat(reference: &str) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }
}

/// What one inbound text frame means for the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Joined,
    JoinRejected(String),
    Change(ChangeEvent),
    Closed(String),
    Ignored,
}

pub(crate) fn decode_frame(text: &str, topic: &str, join_ref: &str, collection: Collection) -> Frame {
    let message = match serde_json::from_str::<PhoenixMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(error = %err, "undecodable realtime frame");
            return Frame::Ignored;
        }
    };
    if message.topic != topic {
        return Frame::Ignored;
    }

    let status = message.payload.get("status").and_then(Value::as_str);
    match message.event.as_str() {
        "phx_reply" if message.reference.as_deref() == Some(join_ref) => match status {
            Some("ok") => Frame::Joined,
            other => Frame::JoinRejected(
                message
                    .payload
                    .get("response")
                    .map(Value::to_string)
                    .unwrap_or_else(|| other.unwrap_or("unknown").to_string()),
            ),
        },
        "postgres_changes" => Frame::Change(ChangeEvent {
            kind: message
                .payload
                .pointer("/data/type")
                .and_then(Value::as_str)
                .and_then(|kind| kind.parse().ok()),
            collection,
        }),
        "INSERT" | "UPDATE" | "DELETE" => Frame::Change(ChangeEvent {
            kind: message.event.parse().ok(),
            collection,
        }),
        "system" if status == Some("error") => Frame::JoinRejected(
            message
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("system error")
                .to_string(),
        ),
        "phx_error" => Frame::Closed("channel error".to_string()),
        "phx_close" => Frame::Closed("channel closed by server".to_string()),
        _ => Frame::Ignored,
    }
}

/// Reconnect delay schedule: grows by `multiplier` up to `max_ms`, plus jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current_ms: u64,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_ms = config.initial_ms;
        Self { config, current_ms }
    }

    /// Base delay the next attempt will wait, before jitter.
    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    /// Delay before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = jittered(self.current_ms, self.config.jitter_ms);
        let next = (self.current_ms as f64 * self.config.multiplier) as u64;
        self.current_ms = next.clamp(self.config.initial_ms, self.config.max_ms.max(self.config.initial_ms));
        Duration::from_millis(delay)
    }

    /// Back to the initial delay after a successful join.
    pub fn reset(&mut self) {
        self.current_ms = self.config.initial_ms;
    }
}

fn jittered(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    base_ms.saturating_add(rand::rng().random_range(0..jitter_ms))
}
