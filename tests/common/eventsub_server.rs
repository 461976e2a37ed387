//! Scriptable EventSub WebSocket server and frame builders
//!
//! Shared by the integration tests and the session client's unit tests.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────
// Mock EventSub Server
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum ServerEvent {
    Accepted,
    Closed,
}

/// Accepts one WebSocket connection and sends whatever the test queues
pub struct MockEventSub {
    pub url: String,
    to_client: Option<mpsc::UnboundedSender<String>>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl MockEventSub {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/eventsub", listener.local_addr().unwrap());
        let (to_client, mut outbound) = mpsc::unbounded_channel::<String>();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let ws_stream = match accept_async(stream).await {
                Ok(ws_stream) => ws_stream,
                Err(_) => return,
            };
            let _ = events_tx.send(ServerEvent::Accepted);
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    text = outbound.recv() => match text {
                        Some(text) => {
                            if write.send(WsMessage::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            break;
                        }
                    },
                    msg = read.next() => match msg {
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
            let _ = events_tx.send(ServerEvent::Closed);
        });

        Self {
            url,
            to_client: Some(to_client),
            events,
        }
    }

    pub fn send(&self, frame: String) {
        if let Some(ref tx) = self.to_client {
            tx.send(frame).unwrap();
        }
    }

    /// Close the connection from the server side
    pub fn close(&mut self) {
        self.to_client.take();
    }

    pub async fn expect(&mut self, expected: ServerEvent) {
        let event = tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for server event");
        assert_eq!(event, Some(expected));
    }

    pub fn is_closed(&mut self) -> bool {
        matches!(self.events.try_recv(), Ok(ServerEvent::Closed))
    }
}

// ─────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────

fn frame(message_type: &str, payload: serde_json::Value) -> String {
    serde_json::json!({
        "metadata": {
            "message_id": Uuid::new_v4().to_string(),
            "message_type": message_type,
            "message_timestamp": chrono::Utc::now().to_rfc3339(),
        },
        "payload": payload,
    })
    .to_string()
}

pub fn welcome(session_id: &str) -> String {
    frame(
        "session_welcome",
        serde_json::json!({
            "session": {
                "id": session_id,
                "status": "connected",
                "connected_at": chrono::Utc::now().to_rfc3339(),
                "keepalive_timeout_seconds": 10,
                "reconnect_url": null
            }
        }),
    )
}

pub fn keepalive() -> String {
    frame("session_keepalive", serde_json::json!({}))
}

pub fn reconnect(session_id: &str, url: &str) -> String {
    frame(
        "session_reconnect",
        serde_json::json!({
            "session": {
                "id": session_id,
                "status": "reconnecting",
                "keepalive_timeout_seconds": null,
                "reconnect_url": url
            }
        }),
    )
}

pub fn notification(event_type: &str, broadcaster_user_name: &str) -> String {
    frame(
        "notification",
        serde_json::json!({
            "subscription": {
                "id": Uuid::new_v4().to_string(),
                "type": event_type,
                "version": "1",
                "status": "enabled",
                "condition": { "broadcaster_user_id": "1337" },
                "created_at": chrono::Utc::now().to_rfc3339()
            },
            "event": {
                "user_id": "1234",
                "user_login": "cool_user",
                "user_name": "Cool_User",
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": broadcaster_user_name.to_lowercase(),
                "broadcaster_user_name": broadcaster_user_name
            }
        }),
    )
}
