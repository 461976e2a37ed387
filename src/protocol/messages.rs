//! EventSub frame definitions
//!
//! Every inbound frame carries a `metadata` block and a `payload` whose
//! shape depends on `metadata.message_type`. Parsing happens in two steps:
//! the envelope is read first, then the payload is decoded into the
//! variant that matches the message type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Frame Envelope
// ─────────────────────────────────────────────────────────────────

/// Metadata block present on every frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Unique message ID
    #[serde(default)]
    pub message_id: Option<String>,

    /// Message type discriminator
    pub message_type: String,

    /// When the server sent the message
    pub message_timestamp: DateTime<Utc>,

    /// Subscription type (notification and revocation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,

    /// Subscription version (notification and revocation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_version: Option<String>,
}

/// Undecoded frame as it comes off the wire
#[derive(Debug, Clone, Deserialize)]
struct RawFrame {
    metadata: FrameMetadata,
    #[serde(default)]
    payload: serde_json::Value,
}

/// A decoded EventSub frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame metadata
    pub metadata: FrameMetadata,

    /// The decoded message
    pub message: EventSubMessage,
}

impl Frame {
    /// Decode a frame from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(json)
            .map_err(|e| Error::malformed(format!("invalid frame: {}", e)))?;
        Self::from_raw(raw)
    }

    /// Decode a frame from JSON bytes
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: RawFrame = serde_json::from_slice(bytes)
            .map_err(|e| Error::malformed(format!("invalid frame: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawFrame) -> Result<Self> {
        let message = match MessageType::parse(&raw.metadata.message_type) {
            MessageType::SessionWelcome => EventSubMessage::Welcome(decode_payload(raw.payload, "session_welcome")?),
            MessageType::SessionKeepalive => EventSubMessage::Keepalive,
            MessageType::SessionReconnect => EventSubMessage::Reconnect(decode_payload(raw.payload, "session_reconnect")?),
            MessageType::Notification => EventSubMessage::Notification(decode_payload(raw.payload, "notification")?),
            MessageType::Revocation => EventSubMessage::Revocation(decode_payload(raw.payload, "revocation")?),
            MessageType::Unknown => EventSubMessage::Unknown(raw.metadata.message_type.clone()),
        };

        Ok(Self {
            metadata: raw.metadata,
            message,
        })
    }

    /// Server timestamp of this frame
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.message_timestamp
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(payload: serde_json::Value, kind: &str) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| Error::malformed(format!("invalid {} payload: {}", kind, e)))
}

// ─────────────────────────────────────────────────────────────────
// Message Types (Discriminated Union)
// ─────────────────────────────────────────────────────────────────

/// Known values of `metadata.message_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    SessionWelcome,
    SessionKeepalive,
    SessionReconnect,
    Notification,
    Revocation,
    Unknown,
}

impl MessageType {
    /// Map a wire discriminator to a message type
    pub fn parse(value: &str) -> Self {
        match value {
            "session_welcome" => MessageType::SessionWelcome,
            "session_keepalive" => MessageType::SessionKeepalive,
            "session_reconnect" => MessageType::SessionReconnect,
            "notification" => MessageType::Notification,
            "revocation" => MessageType::Revocation,
            _ => MessageType::Unknown,
        }
    }
}

/// All inbound EventSub messages
#[derive(Debug, Clone)]
pub enum EventSubMessage {
    /// Session established; carries the session id
    Welcome(SessionPayload),

    /// Liveness signal, no payload
    Keepalive,

    /// Server asks the client to move to a new URL
    Reconnect(SessionPayload),

    /// Subscribed event fired
    Notification(NotificationPayload),

    /// Subscription was revoked by the server
    Revocation(RevocationPayload),

    /// Message type this client does not know
    Unknown(String),
}

impl EventSubMessage {
    /// Get the message type name
    pub fn type_name(&self) -> &str {
        match self {
            EventSubMessage::Welcome(_) => "session_welcome",
            EventSubMessage::Keepalive => "session_keepalive",
            EventSubMessage::Reconnect(_) => "session_reconnect",
            EventSubMessage::Notification(_) => "notification",
            EventSubMessage::Revocation(_) => "revocation",
            EventSubMessage::Unknown(name) => name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Messages
// ─────────────────────────────────────────────────────────────────

/// Payload of `session_welcome` and `session_reconnect`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session: SessionInfo,
}

/// Session details sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session ID used when creating subscriptions
    pub id: String,

    /// Session status ("connected", "reconnecting")
    #[serde(default)]
    pub status: Option<String>,

    /// When the session was established
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,

    /// Seconds the server may stay silent before the session is dead
    #[serde(default)]
    pub keepalive_timeout_seconds: Option<u64>,

    /// URL to reconnect to (reconnect frames only)
    #[serde(default)]
    pub reconnect_url: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Notification Messages
// ─────────────────────────────────────────────────────────────────

/// Payload of `notification`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// The subscription that fired
    pub subscription: SubscriptionInfo,

    /// Event body; fields vary by subscription type
    #[serde(default)]
    pub event: NotificationEvent,
}

/// Subscription details attached to notifications and revocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    #[serde(default)]
    pub id: Option<String>,

    /// Event type, e.g. `channel.follow`
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub condition: serde_json::Value,
}

/// The subset of event fields the overlay reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(default)]
    pub broadcaster_user_id: Option<String>,

    #[serde(default)]
    pub broadcaster_user_name: Option<String>,

    #[serde(default)]
    pub user_name: Option<String>,

    /// Everything else, kept for logging
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Payload of `revocation`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationPayload {
    pub subscription: SubscriptionInfo,
}

// ─────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────

/// Body of `POST /subscribe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Event types to subscribe to, in order
    pub types: Vec<String>,

    /// Account whose events are wanted
    pub username: String,

    /// Session the subscriptions bind to
    pub session_id: String,
}
