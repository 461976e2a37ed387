//! Session state

use chrono::{DateTime, Utc};

use crate::protocol::SessionInfo;

/// State established by `session_welcome`
///
/// Owned by the session loop and threaded through the dispatcher, which
/// returns the updated value for every frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Session id from the latest welcome
    pub session_id: Option<String>,

    /// Keepalive timeout announced by the server
    pub keepalive_timeout_secs: Option<u64>,

    /// Timestamp of the last keepalive or notification
    pub last_keepalive_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Fresh session from a welcome payload
    pub fn welcomed(info: &SessionInfo) -> Self {
        Self {
            session_id: Some(info.id.clone()),
            keepalive_timeout_secs: info.keepalive_timeout_seconds,
            last_keepalive_at: None,
        }
    }

    /// Same session with the liveness timestamp moved forward
    pub fn touched(self, at: DateTime<Utc>) -> Self {
        Self {
            last_keepalive_at: Some(at),
            ..self
        }
    }

    pub fn is_established(&self) -> bool {
        self.session_id.is_some()
    }
}
