//! Frame dispatcher
//!
//! Turns one decoded frame plus the current session into the next session
//! and a list of actions for the session loop to carry out. Nothing here
//! touches the network or the surface.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::alert::AlertRequest;
use crate::config::OverlayConfig;
use crate::protocol::{EventSubMessage, Frame, NotificationPayload, SubscribeRequest};

use super::Session;

/// How the connection that delivered a frame was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOrigin {
    /// First connection to the configured endpoint
    Initial,

    /// Opened in response to `session_reconnect`
    Reconnect,
}

impl ConnectionOrigin {
    pub fn is_reconnect(self) -> bool {
        self == ConnectionOrigin::Reconnect
    }
}

/// Side effect requested by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// POST the subscription request
    Subscribe(SubscribeRequest),

    /// Close the connection this one replaced
    CloseSuperseded,

    /// Open a new connection to `url` after `delay`
    ScheduleReconnect { url: String, delay: Duration },

    /// Draw an alert
    ShowAlert(AlertRequest),
}

/// Image and text color shown for an event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertStyle {
    pub image_id: String,
    pub text_color: String,
}

/// Maps frames to actions
#[derive(Debug, Clone)]
pub struct Dispatcher {
    styles: HashMap<String, AlertStyle>,
    username: String,
    event_types: Vec<String>,
    alert_duration: Duration,
    reconnect_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        styles: HashMap<String, AlertStyle>,
        username: impl Into<String>,
        event_types: Vec<String>,
        alert_duration: Duration,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            styles,
            username: username.into(),
            event_types,
            alert_duration,
            reconnect_delay,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        let styles = config
            .alerts
            .events
            .iter()
            .map(|mapping| {
                (
                    mapping.event_type.clone(),
                    AlertStyle {
                        image_id: mapping.image_id.clone(),
                        text_color: mapping.text_color.clone(),
                    },
                )
            })
            .collect();

        Self::new(
            styles,
            config.subscription.username.clone(),
            config.subscription.event_types.clone(),
            Duration::from_millis(config.alerts.duration_ms),
            Duration::from_millis(config.eventsub.reconnect_delay_ms),
        )
    }

    /// Alert style for an event type, if the overlay knows it
    pub fn style_for(&self, event_type: &str) -> Option<&AlertStyle> {
        self.styles.get(event_type)
    }

    /// Apply one frame
    pub fn dispatch(
        &self,
        session: Session,
        origin: ConnectionOrigin,
        frame: &Frame,
    ) -> (Session, Vec<Action>) {
        let timestamp = frame.timestamp();

        match &frame.message {
            EventSubMessage::Welcome(payload) => {
                let next = Session::welcomed(&payload.session);
                info!(
                    session_id = %payload.session.id,
                    keepalive_timeout_secs = ?payload.session.keepalive_timeout_seconds,
                    reconnect = origin.is_reconnect(),
                    "Session welcome"
                );

                let action = match origin {
                    ConnectionOrigin::Reconnect => Action::CloseSuperseded,
                    ConnectionOrigin::Initial => Action::Subscribe(SubscribeRequest {
                        types: self.event_types.clone(),
                        username: self.username.clone(),
                        session_id: payload.session.id.clone(),
                    }),
                };
                (next, vec![action])
            }

            EventSubMessage::Keepalive => {
                debug!(timestamp = %timestamp, "Keepalive");
                (session.touched(timestamp), Vec::new())
            }

            EventSubMessage::Reconnect(payload) => match payload.session.reconnect_url {
                Some(ref url) => {
                    info!(
                        session_id = %payload.session.id,
                        reconnect_url = %url,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "Server requested reconnect"
                    );
                    (
                        session,
                        vec![Action::ScheduleReconnect {
                            url: url.clone(),
                            delay: self.reconnect_delay,
                        }],
                    )
                }
                None => {
                    warn!(session_id = %payload.session.id, "Reconnect frame without reconnect_url");
                    (session, Vec::new())
                }
            },

            EventSubMessage::Notification(payload) => {
                let session = session.touched(timestamp);
                let actions = self.alert_for(payload).map(Action::ShowAlert).into_iter().collect();
                (session, actions)
            }

            EventSubMessage::Revocation(payload) => {
                warn!(
                    subscription_id = ?payload.subscription.id,
                    event_type = %payload.subscription.event_type,
                    status = ?payload.subscription.status,
                    "Subscription revoked"
                );
                (session, Vec::new())
            }

            EventSubMessage::Unknown(message_type) => {
                debug!(message_type = %message_type, "Ignoring unknown message type");
                (session, Vec::new())
            }
        }
    }

    fn alert_for(&self, payload: &NotificationPayload) -> Option<AlertRequest> {
        let event_type = &payload.subscription.event_type;
        let style = match self.style_for(event_type) {
            Some(style) => style,
            None => {
                debug!(event_type = %event_type, "No alert for event type");
                return None;
            }
        };

        let username = match payload.event.broadcaster_user_name {
            Some(ref name) => name.clone(),
            None => {
                warn!(event_type = %event_type, "Notification without broadcaster_user_name");
                return None;
            }
        };

        Some(AlertRequest {
            username,
            image_id: style.image_id.clone(),
            text_color: style.text_color.clone(),
            duration: self.alert_duration,
        })
    }
}
