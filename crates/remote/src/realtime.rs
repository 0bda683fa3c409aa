//! Realtime change notifications over the platform's websocket channel.

use std::time::Duration;

use chatify_chats::utils::decode;
use chatify_chats::{ChatResult, Message, Subscription};
use chatify_config::ClientConfig;
use futures_util::stream::{self, SplitSink};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::RemoteError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";

/// Opens one websocket channel per conversation subscription.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    api_key: Option<String>,
    access_token: Option<String>,
    heartbeat: Duration,
    join_timeout: Duration,
    capacity: usize,
}

impl RealtimeClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            url: config.realtime_url(),
            api_key: config.backend.api_key.clone(),
            access_token: config.session.access_token.clone(),
            heartbeat: Duration::from_secs(config.realtime.heartbeat_seconds.max(1)),
            join_timeout: Duration::from_secs(config.backend.request_timeout_seconds.max(1)),
            capacity: config.realtime.channel_capacity.max(1),
        }
    }

    fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        match &self.api_key {
            Some(key) => format!("{}{separator}apikey={key}&vsn=1.0.0", self.url),
            None => format!("{}{separator}vsn=1.0.0", self.url),
        }
    }

    /// Join the insert channel of one conversation.
    ///
    /// Resolves once the server acknowledged the join, so no insert committed
    /// afterwards can be missed.
    pub async fn subscribe_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Subscription, RemoteError> {
        let (socket, _) = connect_async(self.endpoint()).await?;
        let (mut sink, mut frames) = socket.split();

        let topic = format!("realtime:messages:{conversation_id}");
        sink.send(text_frame(&self.join_frame(&topic, conversation_id)))
            .await?;

        tokio::time::timeout(self.join_timeout, await_join(&mut frames, &topic))
            .await
            .map_err(|_| RemoteError::JoinTimeout)??;
        info!(conversation_id, "realtime channel joined");

        let (events_tx, events_rx) = mpsc::channel(self.capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(run_channel(
            sink,
            frames,
            topic,
            conversation_id.to_string(),
            self.heartbeat,
            events_tx,
            stop_rx,
        ));

        let events = stream::unfold(events_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        Ok(Subscription::new(events, move || {
            let _ = stop_tx.send(());
        }))
    }

    fn join_frame(&self, topic: &str, conversation_id: &str) -> Value {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": "public",
                    "table": "messages",
                    "filter": format!("chat_id=eq.{conversation_id}"),
                }],
            },
        });
        if let Some(token) = self.access_token.as_ref().or(self.api_key.as_ref()) {
            payload["access_token"] = json!(token);
        }

        json!({
            "topic": topic,
            "event": "phx_join",
            "payload": payload,
            "ref": JOIN_REF,
            "join_ref": JOIN_REF,
        })
    }
}

fn text_frame(value: &Value) -> Frame {
    Frame::Text(value.to_string())
}

async fn await_join(
    frames: &mut futures_util::stream::SplitStream<Socket>,
    topic: &str,
) -> Result<(), RemoteError> {
    while let Some(frame) = frames.next().await {
        let Frame::Text(text) = frame? else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if value["event"] != "phx_reply" || value["topic"] != topic || value["ref"] != JOIN_REF {
            continue;
        }
        return match value["payload"]["status"].as_str() {
            Some("ok") => Ok(()),
            _ => Err(RemoteError::JoinRejected(value["payload"]["response"].to_string())),
        };
    }
    Err(RemoteError::UnexpectedResponse(
        "socket closed before the join was acknowledged".to_string(),
    ))
}

/// Inserted row carried by a change frame for `topic`, if any.
pub(crate) fn inserted_record<'a>(frame: &'a Value, topic: &str) -> Option<&'a Value> {
    if frame["topic"] != topic {
        return None;
    }
    match frame["event"].as_str()? {
        "postgres_changes" => {
            let data = &frame["payload"]["data"];
            (data["type"] == "INSERT").then(|| &data["record"])
        }
        "INSERT" => Some(&frame["payload"]["record"]),
        _ => None,
    }
}

async fn run_channel(
    mut sink: SplitSink<Socket, Frame>,
    mut frames: futures_util::stream::SplitStream<Socket>,
    topic: String,
    conversation_id: String,
    heartbeat: Duration,
    events: mpsc::Sender<ChatResult<Message>>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = &mut stop => {
                let leave = json!({
                    "topic": topic,
                    "event": "phx_leave",
                    "payload": {},
                    "ref": next_ref.to_string(),
                    "join_ref": JOIN_REF,
                });
                let _ = sink.send(text_frame(&leave)).await;
                let _ = sink.close().await;
                info!(conversation_id = %conversation_id, "realtime channel left");
                break;
            }
            _ = ticker.tick() => {
                let beat = json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": next_ref.to_string(),
                });
                next_ref += 1;
                if let Err(error) = sink.send(text_frame(&beat)).await {
                    warn!(conversation_id = %conversation_id, %error, "heartbeat failed");
                    break;
                }
            }
            frame = frames.next() => {
                let text = match frame {
                    Some(Ok(Frame::Text(text))) => text,
                    Some(Ok(Frame::Close(_))) | None => {
                        warn!(conversation_id = %conversation_id, "realtime socket closed");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        warn!(conversation_id = %conversation_id, %error, "realtime socket failed");
                        break;
                    }
                };
                let value = match serde_json::from_str::<Value>(&text) {
                    Ok(value) => value,
                    Err(error) => {
                        debug!(%error, "ignoring unparseable realtime frame");
                        continue;
                    }
                };
                if let Some(record) = inserted_record(&value, &topic) {
                    let event = decode::message_from_row(record);
                    if let Err(error) = &event {
                        warn!(conversation_id = %conversation_id, %error, "rejected realtime row");
                    }
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
