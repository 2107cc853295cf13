//! Realtime Bridge: one WebSocket connection to the backend's change feed.
//!
//! Each watched table is joined as a `realtime:{schema}:{table}` topic and
//! every matching INSERT/UPDATE frame is collapsed into a payload-less
//! [`RealtimeEvent::Changed`] signal; row payloads are logged at debug
//! level only and never forwarded. Connection lifecycle is part of the
//! emitted stream (`Connected` / `Disconnected` / `Error`) instead of
//! being swallowed by callbacks, and a dropped connection is re-established
//! automatically with exponential backoff.

use crate::chat::error::{ChatError, ChatResult};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const RECONNECT_FLOOR: Duration = Duration::from_secs(1);
const RECONNECT_CEILING: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 64;

/// Connection settings for the realtime endpoint.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `wss://example.supabase.co/realtime/v1/websocket`.
    pub ws_url: String,
    /// Project API key appended to the connection URL.
    pub api_key: String,
}

/// Change event kinds a subscription can watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

impl ChangeKind {
    fn wire(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
        }
    }
}

/// One watched table within a schema.
#[derive(Clone, Debug)]
pub struct TableSubscription {
    pub schema: String,
    pub table: String,
    pub events: Vec<ChangeKind>,
}

impl TableSubscription {
    /// The common subscription shape: INSERT and UPDATE on a public table.
    pub fn inserts_and_updates(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            events: vec![ChangeKind::Insert, ChangeKind::Update],
        }
    }

    fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    fn watches(&self, event: &str) -> bool {
        self.events.iter().any(|kind| kind.wire() == event)
    }
}

/// Tagged stream element emitted by the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    /// A watched table changed; carries the table name, never the payload.
    Changed(String),
    Error(String),
}

/// Handle to the running bridge; aborting it tears the connection down.
pub struct RealtimeBridge {
    task: JoinHandle<()>,
}

impl RealtimeBridge {
    /// Opens the bridge for the given subscriptions and returns the event
    /// stream. The connection task runs until the receiver is dropped or
    /// [`shutdown`](Self::shutdown) is called.
    pub fn open(
        config: RealtimeConfig,
        subscriptions: Vec<TableSubscription>,
    ) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(run(config, subscriptions, tx));
        (Self { task }, rx)
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Outer connect loop: reconnect with exponential backoff until the
/// consumer goes away.
async fn run(
    config: RealtimeConfig,
    subscriptions: Vec<TableSubscription>,
    tx: mpsc::Sender<RealtimeEvent>,
) {
    let mut backoff = RECONNECT_FLOOR;
    loop {
        if tx.is_closed() {
            return;
        }
        match connect_once(&config, &subscriptions, &tx).await {
            Ok(()) => {
                backoff = RECONNECT_FLOOR;
                warn!("[Realtime] connection closed by peer");
            }
            Err(e) => {
                error!("[Realtime] connection failed: {e}");
                let _ = tx.send(RealtimeEvent::Error(e.to_string())).await;
            }
        }
        if tx.send(RealtimeEvent::Disconnected).await.is_err() {
            return;
        }
        debug!("[Realtime] reconnecting in {backoff:?}");
        sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_CEILING);
    }
}

/// One connection lifetime: join topics, heartbeat, pump frames.
async fn connect_once(
    config: &RealtimeConfig,
    subscriptions: &[TableSubscription],
    tx: &mpsc::Sender<RealtimeEvent>,
) -> ChatResult<()> {
    let url = format!("{}?apikey={}&vsn=1.0.0", config.ws_url, config.api_key);
    let (ws_stream, response) = connect_async(&url)
        .await
        .map_err(|e| ChatError::Backend(format!("websocket connect: {e}")))?;
    info!(
        "[Realtime] websocket connected, status {}",
        response.status()
    );

    let (mut write, mut read) = ws_stream.split();

    for (index, subscription) in subscriptions.iter().enumerate() {
        let join = serde_json::json!({
            "topic": subscription.topic(),
            "event": "phx_join",
            "payload": {},
            "ref": (index + 1).to_string(),
        });
        write
            .send(WsMessage::Text(join.to_string()))
            .await
            .map_err(|e| ChatError::Backend(format!("topic join: {e}")))?;
        info!("[Realtime] joined topic {}", subscription.topic());
    }

    if tx.send(RealtimeEvent::Connected).await.is_err() {
        return Ok(());
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately
    let mut heartbeat_ref: u64 = 0;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                heartbeat_ref += 1;
                let frame = serde_json::json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": format!("hb-{heartbeat_ref}"),
                });
                write
                    .send(WsMessage::Text(frame.to_string()))
                    .await
                    .map_err(|e| ChatError::Backend(format!("heartbeat: {e}")))?;
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(event) = parse_change_frame(&text, subscriptions) {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    warn!("[Realtime] close frame: {frame:?}");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(ChatError::Backend(format!("websocket read: {e}")));
                }
                None => return Ok(()),
            }
        }
    }
}

/// Collapses a raw change frame into `Changed(table)` when its topic and
/// event match a watched subscription; anything else (heartbeat replies,
/// join acks, unwatched events) yields `None`.
fn parse_change_frame(
    text: &str,
    subscriptions: &[TableSubscription],
) -> Option<RealtimeEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let event = value.get("event")?.as_str()?;
    let topic = value.get("topic")?.as_str()?;

    let subscription = subscriptions
        .iter()
        .find(|s| s.topic() == topic && s.watches(event))?;

    debug!(
        "[Realtime] {event} on {topic}, payload: {}",
        value.get("payload").unwrap_or(&serde_json::Value::Null)
    );
    Some(RealtimeEvent::Changed(subscription.table.clone()))
}
